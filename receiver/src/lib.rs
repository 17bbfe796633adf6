//! Receive EUCAWS observations pushed by an Iridium DirectIP gateway.
//!
//! The gateway opens one TCP connection per mobile-originated session, writes the session, and
//! waits for us to close the connection. Each session is framed with `directip`, its payload is
//! decoded with `eucaws`, and the resulting `Report` is handed to the configured sinks.
//!
//! # Examples
//!
//! Reports can be built without a socket:
//!
//! ```
//! use receiver::{RawSession, Report, Status};
//! let session = RawSession::new(
//!     "127.0.0.1:49152".parse().unwrap(),
//!     include_bytes!("../fixtures/eucaws.sbd").to_vec(),
//! );
//! let report = Report::new(session);
//! assert_eq!(Some("300434065263440"), report.imei());
//! match report.status {
//!     Status::Decoded(ref observation) => assert_eq!(Some(999.7), observation.pressure()),
//!     ref status => panic!("unexpected status: {}", status),
//! }
//! ```

#![deny(missing_docs, missing_debug_implementations, unsafe_code)]

extern crate chrono;
extern crate directip;
extern crate eucaws;
#[macro_use]
extern crate failure;
extern crate hex;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate toml;

#[cfg(test)]
extern crate byteorder;
#[cfg(test)]
extern crate tempfile;

pub mod config;
pub mod publish;
pub mod report;
pub mod server;
pub mod session;
pub mod store;

pub use config::Config;
pub use publish::{LinePublisher, Publication, Publish};
pub use report::{Dispatcher, Reason, Report, Status};
pub use server::{Server, Shutdown};
pub use session::RawSession;
pub use store::{FilesystemStore, Record, Store};

use std::io;

/// Our custom error enum.
#[derive(Debug, Fail)]
pub enum Error {
    /// The peer stopped sending before the session was complete.
    #[fail(display = "timed out after receiving {} bytes", _0)]
    Timeout(usize),

    /// Wrapper around `std::io::Error`.
    #[fail(display = "io error: {}", _0)]
    Io(#[cause] io::Error),

    /// The IMEI can't be used as a store key.
    #[fail(display = "invalid imei: {:?}", _0)]
    InvalidImei(String),

    /// A session with this IMEI and MOMSN has already been stored.
    #[fail(display = "duplicate session: imei={} momsn={}", imei, momsn)]
    Duplicate {
        /// The modem IMEI.
        imei: String,

        /// The mobile-originated message sequence number.
        momsn: u16,
    },
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
