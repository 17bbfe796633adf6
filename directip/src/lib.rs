//! Read Iridium DirectIP mobile-originated sessions.
//!
//! # Background
//!
//! When an Iridium modem sends a Short Burst Data message, the Iridium gateway pushes it to the
//! vendor's server over a dedicated TCP connection. Each connection carries exactly one session:
//! a three byte header (protocol revision and overall length) followed by a sequence of
//! self-describing information elements. The elements carry the session header (IMEI, sequence
//! numbers, time of session), the application payload, and sometimes a location fix.
//!
//! # Examples
//!
//! ```
//! use directip::Message;
//! let message = Message::parse(include_bytes!("../fixtures/eucaws.sbd")).unwrap();
//! assert_eq!("300434065263440", message.header().imei);
//! assert_eq!(30, message.payload().unwrap().len());
//! ```

#![deny(missing_docs, missing_debug_implementations, unsafe_code)]

extern crate byteorder;
extern crate chrono;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate lazy_static;
extern crate regex;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[cfg(test)]
extern crate serde_json;

pub mod element;
pub mod message;

pub use element::{Header, InformationElement, Location, SessionStatus};
pub use message::{Malformed, Message, SessionMetadata};

use regex::bytes::Regex;

/// The only DirectIP protocol revision in use.
pub const PROTOCOL_REVISION: u8 = 1;

/// An error returned when a DirectIP session cannot be framed.
#[derive(Debug, Fail, PartialEq)]
pub enum Error {
    /// The buffer is too short to hold the three byte message header.
    #[fail(display = "the buffer is {} bytes, too short for the message header", _0)]
    ShortHeader(usize),

    /// An information element claims more bytes than the message has left.
    #[fail(
        display = "information element at offset {} needs {} bytes but only {} remain",
        offset,
        length,
        remaining
    )]
    IeOverrun {
        /// The offset of the element, counted from the end of the message header.
        offset: usize,

        /// The number of bytes the element needs, including its own three byte header.
        length: usize,

        /// The number of bytes left in the message.
        remaining: usize,
    },

    /// A recognized information element appeared more than once.
    #[fail(display = "duplicate information element: {:#04x}", _0)]
    DuplicateIe(u8),

    /// The session ended before the length declared in its header.
    #[fail(
        display = "the session declared {} bytes but only {} were received",
        declared,
        received
    )]
    IncompleteSession {
        /// The overall length from the message header.
        declared: usize,

        /// The number of bytes actually received after the message header.
        received: usize,
    },

    /// The message has no MO header information element.
    #[fail(display = "the message has no header information element")]
    MissingHeader,

    /// An information element body is too short for its type.
    #[fail(
        display = "information element {:#04x} is {} bytes, expected at least {}",
        id,
        actual,
        expected
    )]
    ElementTooShort {
        /// The information element identifier.
        id: u8,

        /// The minimum body length for this element type.
        expected: usize,

        /// The actual body length.
        actual: usize,
    },

    /// The time of session could not be represented as a UTC datetime.
    #[fail(display = "invalid time of session: {}", _0)]
    TimeOfSession(u32),
}

/// Builds the confirmation message a vendor server may send back before closing the connection.
///
/// # Examples
///
/// ```
/// assert_eq!(vec![1, 0, 4, 5, 0, 1, 1], directip::confirmation(true));
/// assert_eq!(vec![1, 0, 4, 5, 0, 1, 0], directip::confirmation(false));
/// ```
pub fn confirmation(accepted: bool) -> Vec<u8> {
    vec![
        PROTOCOL_REVISION,
        0,
        4,
        element::CONFIRMATION_ID,
        0,
        1,
        accepted as u8,
    ]
}

/// Searches raw bytes for something that looks like an IMEI.
///
/// Only used to label sessions whose framing could not be read.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     Some("300434065263440".to_string()),
///     directip::imei_from_bytes(b"\x01\x00\x10junk300434065263440junk")
/// );
/// assert_eq!(None, directip::imei_from_bytes(b"30043406526"));
/// ```
pub fn imei_from_bytes(bytes: &[u8]) -> Option<String> {
    lazy_static! {
        static ref RE: Regex = Regex::new("[0-9]{15}").unwrap();
    }
    RE.find(bytes)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
}
