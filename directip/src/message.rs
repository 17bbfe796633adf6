//! Framed DirectIP messages and the session metadata they carry.
//!
//! # Examples
//!
//! A message with a payload:
//!
//! ```
//! use directip::Message;
//! let message = Message::parse(include_bytes!("../fixtures/eucaws.sbd")).unwrap();
//! assert_eq!(1234, message.header().momsn);
//! assert!(message.payload().is_some());
//! ```
//!
//! Some sessions only report a location:
//!
//! ```
//! use directip::Message;
//! let message = Message::parse(include_bytes!("../fixtures/location-only.sbd")).unwrap();
//! assert_eq!(None, message.payload());
//! assert!(message.location().is_some());
//! ```

use byteorder::{BigEndian, ByteOrder};
use element::{self, Header, InformationElement, Kind, Location, ELEMENT_HEADER_LEN};
use failure::Error as FailureError;
use std::path::Path;
use Error;

/// The protocol revision and the overall length, three bytes in all.
pub const MESSAGE_HEADER_LEN: usize = 3;

/// A complete DirectIP message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    protocol_revision: u8,
    overall_length: u16,
    elements: Vec<InformationElement>,
    header: Header,
    payload: Option<usize>,
    location: Option<Location>,
    confirmation: Option<u8>,
}

/// A message that could not be framed.
///
/// If the MO header element was read before things went wrong, it's kept here so the session
/// isn't lost.
#[derive(Debug, Fail)]
#[fail(display = "{}", error)]
pub struct Malformed {
    /// What went wrong.
    pub error: Error,

    /// The session header, if it was read before the error.
    pub header: Option<Header>,
}

/// Everything downstream needs to know about a session, apart from its payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// The session header.
    pub header: Header,

    /// The location fix, if the gateway sent one.
    pub location: Option<Location>,
}

#[derive(Debug, Default)]
struct Parser {
    elements: Vec<InformationElement>,
    header: Option<Header>,
    payload: Option<usize>,
    location: Option<Location>,
    confirmation: Option<u8>,
}

/// Returns the number of bytes that follow the message header, as declared by the header.
///
/// # Examples
///
/// ```
/// use directip::message;
/// assert_eq!(78, message::overall_length(&[1, 0, 78]).unwrap());
/// assert!(message::overall_length(&[1, 0]).is_err());
/// ```
pub fn overall_length(bytes: &[u8]) -> Result<usize, Error> {
    if bytes.len() < MESSAGE_HEADER_LEN {
        Err(Error::ShortHeader(bytes.len()))
    } else {
        Ok(usize::from(BigEndian::read_u16(&bytes[1..3])))
    }
}

impl Message {
    /// Reads a message from a file.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::Message;
    /// let message = Message::from_path("fixtures/eucaws.sbd").unwrap();
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Message, FailureError> {
        use std::fs::File;
        use std::io::Read;

        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Message::parse(&bytes).map_err(FailureError::from)
    }

    /// Parses a message from bytes.
    ///
    /// Only the bytes covered by the declared overall length are read; anything after that is
    /// ignored. Unknown information elements are kept but otherwise skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::{Error, Message};
    /// let malformed = Message::parse(&[1, 0]).unwrap_err();
    /// assert_eq!(Error::ShortHeader(2), malformed.error);
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Message, Malformed> {
        let mut parser = Parser::default();
        parser.parse(bytes).map_err(|error| Malformed {
            error: error,
            header: parser.header.take(),
        })
    }

    /// Returns the protocol revision.
    pub fn protocol_revision(&self) -> u8 {
        self.protocol_revision
    }

    /// Returns the overall length declared in the message header.
    pub fn overall_length(&self) -> u16 {
        self.overall_length
    }

    /// Returns all information elements, in the order they were received.
    pub fn elements(&self) -> &[InformationElement] {
        &self.elements
    }

    /// Returns the session header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the application payload, if the message has one.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.map(|i| self.elements[i].data.as_slice())
    }

    /// Returns the location fix, if the message has one.
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Returns the confirmation status byte, if the message has one.
    pub fn confirmation(&self) -> Option<u8> {
        self.confirmation
    }

    /// Returns this message's session metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::Message;
    /// let message = Message::parse(include_bytes!("../fixtures/eucaws.sbd")).unwrap();
    /// let metadata = message.metadata();
    /// assert_eq!("300434065263440", metadata.imei());
    /// assert_eq!(-6.13, metadata.location.unwrap().longitude);
    /// ```
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            header: self.header.clone(),
            location: self.location,
        }
    }
}

impl Parser {
    fn parse(&mut self, bytes: &[u8]) -> Result<Message, Error> {
        let declared = overall_length(bytes)?;
        let received = bytes.len() - MESSAGE_HEADER_LEN;
        if received < declared {
            return Err(Error::IncompleteSession {
                declared: declared,
                received: received,
            });
        }
        let body = &bytes[MESSAGE_HEADER_LEN..MESSAGE_HEADER_LEN + declared];
        let mut offset = 0;
        while offset < body.len() {
            let remaining = body.len() - offset;
            if remaining < ELEMENT_HEADER_LEN {
                return Err(Error::IeOverrun {
                    offset: offset,
                    length: ELEMENT_HEADER_LEN,
                    remaining: remaining,
                });
            }
            let id = body[offset];
            let length = ELEMENT_HEADER_LEN + usize::from(BigEndian::read_u16(&body[offset + 1..]));
            if remaining < length {
                return Err(Error::IeOverrun {
                    offset: offset,
                    length: length,
                    remaining: remaining,
                });
            }
            self.add(InformationElement {
                id: id,
                data: body[offset + ELEMENT_HEADER_LEN..offset + length].to_vec(),
            })?;
            offset += length;
        }
        Ok(Message {
            protocol_revision: bytes[0],
            overall_length: declared as u16,
            header: self.header.take().ok_or(Error::MissingHeader)?,
            elements: ::std::mem::replace(&mut self.elements, Vec::new()),
            payload: self.payload,
            location: self.location,
            confirmation: self.confirmation,
        })
    }

    fn add(&mut self, element: InformationElement) -> Result<(), Error> {
        match element.kind() {
            Kind::Header => {
                if self.header.is_some() {
                    return Err(Error::DuplicateIe(element.id));
                }
                self.header = Some(Header::new(&element.data)?);
            }
            Kind::Payload => {
                if self.payload.is_some() {
                    return Err(Error::DuplicateIe(element.id));
                }
                self.payload = Some(self.elements.len());
            }
            Kind::Location => {
                if self.location.is_some() {
                    return Err(Error::DuplicateIe(element.id));
                }
                self.location = Some(Location::new(&element.data)?);
            }
            Kind::Confirmation => {
                if self.confirmation.is_some() {
                    return Err(Error::DuplicateIe(element.id));
                }
                self.confirmation = Some(*element.data.first().ok_or(Error::ElementTooShort {
                    id: element::CONFIRMATION_ID,
                    expected: 1,
                    actual: 0,
                })?);
            }
            Kind::Unknown(_) => {}
        }
        self.elements.push(element);
        Ok(())
    }
}

impl SessionMetadata {
    /// Returns the IMEI of the modem that sent the session.
    pub fn imei(&self) -> &str {
        &self.header.imei
    }

    /// Returns the mobile-originated message sequence number.
    pub fn momsn(&self) -> u16 {
        self.header.momsn
    }
}

impl From<Header> for SessionMetadata {
    fn from(header: Header) -> SessionMetadata {
        SessionMetadata {
            header: header,
            location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &[u8] = include_bytes!("../fixtures/eucaws.sbd");

    fn element(id: u8, data: &[u8]) -> Vec<u8> {
        let mut bytes = vec![id, (data.len() >> 8) as u8, data.len() as u8];
        bytes.extend(data);
        bytes
    }

    fn message(elements: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = elements.iter().flat_map(|e| e.iter().cloned()).collect();
        let mut bytes = vec![1, (body.len() >> 8) as u8, body.len() as u8];
        bytes.extend(body);
        bytes
    }

    fn header() -> Vec<u8> {
        element(0x01, &FIXTURE[6..34])
    }

    #[test]
    fn fixture() {
        let message = Message::parse(FIXTURE).unwrap();
        assert_eq!(1, message.protocol_revision());
        assert_eq!(78, message.overall_length());
        assert_eq!(3, message.elements().len());
        assert_eq!(1234, message.header().momsn);
        assert_eq!(30, message.payload().unwrap().len());
        assert_eq!(0x64, message.payload().unwrap()[0]);
        let location = message.location().unwrap();
        assert_eq!(53.3, location.latitude);
        assert_eq!(4, location.cep_radius);
        assert_eq!(None, message.confirmation());
    }

    #[test]
    fn from_path() {
        let message = Message::from_path("fixtures/location-only.sbd").unwrap();
        assert_eq!(None, message.payload());
    }

    #[test]
    fn short_header() {
        assert_eq!(Error::ShortHeader(0), Message::parse(&[]).unwrap_err().error);
        assert_eq!(Error::ShortHeader(2), Message::parse(&[1, 0]).unwrap_err().error);
    }

    #[test]
    fn declared_length_longer_than_buffer() {
        let mut bytes = FIXTURE.to_vec();
        bytes.truncate(60);
        let malformed = Message::parse(&bytes).unwrap_err();
        assert_eq!(
            Error::IncompleteSession {
                declared: 78,
                received: 57,
            },
            malformed.error
        );
        assert!(malformed.header.is_none());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut bytes = FIXTURE.to_vec();
        bytes.extend(&[0xff, 0xff, 0xff]);
        assert_eq!(Message::parse(FIXTURE).unwrap(), Message::parse(&bytes).unwrap());
    }

    #[test]
    fn payload_overrun_keeps_header() {
        // The payload element says 40 bytes but only 35 follow it.
        let header = header();
        let mut payload = vec![0x02, 0, 40];
        payload.extend(&[0xaa; 35]);
        let bytes = message(&[header, payload]);
        let malformed = Message::parse(&bytes).unwrap_err();
        assert_eq!(
            Error::IeOverrun {
                offset: 31,
                length: 43,
                remaining: 38,
            },
            malformed.error
        );
        let header = malformed.header.unwrap();
        assert_eq!("300434065263440", header.imei);
        assert_eq!(1234, header.momsn);
    }

    #[test]
    fn truncated_element_header() {
        let bytes = message(&[header(), vec![0x02, 0]]);
        assert_eq!(
            Error::IeOverrun {
                offset: 31,
                length: 3,
                remaining: 2,
            },
            Message::parse(&bytes).unwrap_err().error
        );
    }

    #[test]
    fn unknown_element_is_skipped() {
        let bytes = message(&[
            header(),
            element(0x42, &[1, 2, 3, 4, 5]),
            element(0x02, b"hello"),
        ]);
        let message = Message::parse(&bytes).unwrap();
        assert_eq!(3, message.elements().len());
        assert_eq!(Kind::Unknown(0x42), message.elements()[1].kind());
        assert_eq!(5, message.elements()[1].length());
        assert_eq!(Some(b"hello".as_ref()), message.payload());
    }

    #[test]
    fn empty_unknown_element() {
        let bytes = message(&[element(0x7f, &[]), header()]);
        let message = Message::parse(&bytes).unwrap();
        assert_eq!(2, message.elements().len());
        assert_eq!(None, message.payload());
    }

    #[test]
    fn duplicate_payload() {
        let bytes = message(&[header(), element(0x02, b"a"), element(0x02, b"b")]);
        let malformed = Message::parse(&bytes).unwrap_err();
        assert_eq!(Error::DuplicateIe(0x02), malformed.error);
        assert!(malformed.header.is_some());
    }

    #[test]
    fn duplicate_header() {
        let bytes = message(&[header(), header()]);
        assert_eq!(
            Error::DuplicateIe(0x01),
            Message::parse(&bytes).unwrap_err().error
        );
    }

    #[test]
    fn missing_header() {
        let bytes = message(&[element(0x02, b"payload")]);
        assert_eq!(
            Error::MissingHeader,
            Message::parse(&bytes).unwrap_err().error
        );
    }

    #[test]
    fn confirmation() {
        let bytes = message(&[header(), element(0x05, &[1])]);
        assert_eq!(Some(1), Message::parse(&bytes).unwrap().confirmation());
        let bytes = message(&[header(), element(0x05, &[])]);
        assert_eq!(
            Error::ElementTooShort {
                id: 0x05,
                expected: 1,
                actual: 0,
            },
            Message::parse(&bytes).unwrap_err().error
        );
    }

    #[test]
    fn confirmation_message_parses() {
        let bytes = ::confirmation(true);
        assert_eq!(7, bytes.len());
        assert_eq!(4, overall_length(&bytes).unwrap());
    }

    #[test]
    fn metadata_serializes() {
        use serde_json;

        let metadata = Message::parse(FIXTURE).unwrap().metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"imei\":\"300434065263440\""));
        assert!(json.contains("2025-12-03T11:00:15Z"));
        let roundtrip: SessionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, roundtrip);
    }

    #[test]
    fn malformed_display() {
        let malformed = Message::parse(&[1]).unwrap_err();
        assert_eq!(
            "the buffer is 1 bytes, too short for the message header",
            malformed.to_string()
        );
    }
}
