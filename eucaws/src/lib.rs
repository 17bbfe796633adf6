//! Decode EUCAWS weather observations sent as E-SURFMAR Format #100 payloads.
//!
//! Shipborne automated weather stations pack one observation into a 30 byte Iridium SBD payload.
//! The mandatory "green block" is 235 bits of unsigned bit-fields, most significant bit first,
//! that don't line up with byte boundaries. Every field turns into a physical value with
//! `raw * slope + offset`, and a field whose bits are all ones is missing.
//!
//! Decoding is a two-step process. First, the bits are read into a `format100::GreenBlock`, which
//! maps directly onto the payload:
//!
//! ```
//! use eucaws::{bits::BitReader, format100::GreenBlock};
//! let mut reader = BitReader::new(include_bytes!("../fixtures/green-block.bin"));
//! let green_block = GreenBlock::read_from(&mut reader).unwrap();
//! assert_eq!(Some(100), green_block.get("format_identifier"));
//! ```
//!
//! The green block is then turned into an `Observation`, which scales the values, converts
//! temperatures to Celsius and pressures to hectopascals, and works out when the observation was
//! made. `decode` does both:
//!
//! ```
//! let observation = eucaws::decode(include_bytes!("../fixtures/green-block.bin"), None).unwrap();
//! assert_eq!(Some(999.7), observation.pressure());
//! assert_eq!(None, observation.wind_speed());
//! ```

#![deny(missing_docs, missing_debug_implementations, unsafe_code)]

extern crate chrono;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate lazy_static;
extern crate serde;
#[macro_use]
extern crate serde_derive;

#[cfg(test)]
extern crate hex;
#[cfg(test)]
extern crate serde_json;

pub mod bits;
pub mod field;
pub mod format100;
pub mod observation;

pub use field::{Field, Unit};
pub use format100::{decode, encode};
pub use observation::{Confidence, Observation, OptionalBlocks, Reading, TimestampSource};

use bits::Underrun;

/// An error returned when a payload can't be decoded.
#[derive(Debug, Fail, PartialEq)]
pub enum Error {
    /// The payload isn't the length of a Format #100 payload.
    ///
    /// The payload probably belongs to some other application.
    #[fail(display = "expected a {} byte payload, got {} bytes", expected, actual)]
    UnexpectedLength {
        /// The expected payload length.
        expected: usize,

        /// The actual payload length.
        actual: usize,
    },

    /// The payload ran out of bits while reading a field.
    #[fail(display = "payload truncated while reading {}: {}", field, underrun)]
    TruncatedPayload {
        /// The name of the field being read.
        field: &'static str,

        /// The bit reader's complaint.
        underrun: Underrun,
    },

    /// The format identifier isn't one we can decode.
    #[fail(display = "unknown format identifier: {}", _0)]
    UnknownFormat(u32),

    /// There's no field by that name in the table.
    #[fail(display = "no field named {}", _0)]
    UnknownField(String),
}
