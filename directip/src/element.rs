//! Information elements, the typed `(id, length, body)` records that make up a DirectIP message.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, TimeZone, Utc};
use Error;

/// The MO header information element identifier.
pub const HEADER_ID: u8 = 0x01;

/// The MO payload information element identifier.
pub const PAYLOAD_ID: u8 = 0x02;

/// The MO location information element identifier.
pub const LOCATION_ID: u8 = 0x03;

/// The MO confirmation information element identifier.
pub const CONFIRMATION_ID: u8 = 0x05;

/// Every information element starts with a one byte id and a two byte length.
pub const ELEMENT_HEADER_LEN: usize = 3;

/// The length of the MO header information element body.
pub const HEADER_LEN: usize = 28;

/// The length of the MO location information element body.
pub const LOCATION_LEN: usize = 11;

const IMEI_START: usize = 4;
const IMEI_END: usize = 19;
const LOCATION_SCALE: f64 = 1_000_000.;

/// One information element, as it appeared on the wire.
///
/// Unrecognized elements are kept so they can be inspected, but nothing interprets them.
#[derive(Clone, Debug, PartialEq)]
pub struct InformationElement {
    /// The information element identifier.
    pub id: u8,

    /// The element body.
    pub data: Vec<u8>,
}

/// The kind of an information element, as determined by its identifier.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kind {
    Header,
    Payload,
    Location,
    Confirmation,
    Unknown(u8),
}

/// The MO header, which identifies the modem and the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// The call detail record reference, assigned by the gateway.
    pub cdr_reference: u32,

    /// The modem's IMEI.
    pub imei: String,

    /// How the session went, as reported by the gateway.
    pub session_status: SessionStatus,

    /// The mobile-originated message sequence number.
    pub momsn: u16,

    /// The mobile-terminated message sequence number.
    pub mtmsn: u16,

    /// When the session started.
    pub time_of_session: DateTime<Utc>,
}

/// The session status codes defined for the MO header.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// The session completed successfully.
    Ok,

    /// The session completed, but the MT message queued for the modem was too large.
    OkMtTooLarge,

    /// The session completed, but the reported location was of unacceptable quality.
    OkLocationUnacceptableQuality,

    /// The session timed out before completion.
    Timeout,

    /// The MO message was too large to be transferred.
    MoTooLarge,

    /// The RF link was lost during the session.
    RfLinkLoss,

    /// The modem violated the SBD protocol.
    ImeiProtocolAnomaly,

    /// The modem is not allowed to access the system.
    Prohibited,

    /// A status code we don't know about.
    Unknown(u8),
}

/// A location fix reported with the session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// The latitude [deg].
    pub latitude: f64,

    /// The longitude [deg].
    pub longitude: f64,

    /// The radius of the circular error probable [m].
    pub cep_radius: u16,
}

impl InformationElement {
    /// Returns the length of this element's body.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::InformationElement;
    /// let element = InformationElement { id: 0x02, data: vec![1, 2, 3] };
    /// assert_eq!(3, element.length());
    /// ```
    pub fn length(&self) -> u16 {
        self.data.len() as u16
    }

    /// Returns this element's kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::{InformationElement, element::Kind};
    /// let element = InformationElement { id: 0x02, data: vec![] };
    /// assert_eq!(Kind::Payload, element.kind());
    /// ```
    pub fn kind(&self) -> Kind {
        Kind::from(self.id)
    }
}

impl From<u8> for Kind {
    fn from(id: u8) -> Kind {
        match id {
            HEADER_ID => Kind::Header,
            PAYLOAD_ID => Kind::Payload,
            LOCATION_ID => Kind::Location,
            CONFIRMATION_ID => Kind::Confirmation,
            _ => Kind::Unknown(id),
        }
    }
}

impl Header {
    /// Reads a header from the body of an MO header information element.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::{Header, SessionStatus};
    /// let mut bytes = vec![0, 0, 0, 42];
    /// bytes.extend(b"300434065263440");
    /// bytes.extend(&[0, 0, 7, 0, 0, 0x69, 0x30, 0x18, 0x3f]);
    /// let header = Header::new(&bytes).unwrap();
    /// assert_eq!(42, header.cdr_reference);
    /// assert_eq!("300434065263440", header.imei);
    /// assert_eq!(SessionStatus::Ok, header.session_status);
    /// assert_eq!(7, header.momsn);
    /// ```
    pub fn new(bytes: &[u8]) -> Result<Header, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::ElementTooShort {
                id: HEADER_ID,
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let seconds = BigEndian::read_u32(&bytes[24..28]);
        let time_of_session = Utc
            .timestamp_opt(i64::from(seconds), 0)
            .single()
            .ok_or(Error::TimeOfSession(seconds))?;
        Ok(Header {
            cdr_reference: BigEndian::read_u32(&bytes[0..4]),
            imei: String::from_utf8_lossy(&bytes[IMEI_START..IMEI_END])
                .trim_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string(),
            session_status: SessionStatus::from(bytes[19]),
            momsn: BigEndian::read_u16(&bytes[20..22]),
            mtmsn: BigEndian::read_u16(&bytes[22..24]),
            time_of_session: time_of_session,
        })
    }
}

impl SessionStatus {
    /// Returns true if the gateway considers the session a success.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::SessionStatus;
    /// assert!(SessionStatus::Ok.is_success());
    /// assert!(SessionStatus::OkMtTooLarge.is_success());
    /// assert!(!SessionStatus::RfLinkLoss.is_success());
    /// ```
    pub fn is_success(&self) -> bool {
        match *self {
            SessionStatus::Ok
            | SessionStatus::OkMtTooLarge
            | SessionStatus::OkLocationUnacceptableQuality => true,
            _ => false,
        }
    }
}

impl From<u8> for SessionStatus {
    fn from(n: u8) -> SessionStatus {
        match n {
            0 => SessionStatus::Ok,
            1 => SessionStatus::OkMtTooLarge,
            2 => SessionStatus::OkLocationUnacceptableQuality,
            10 => SessionStatus::Timeout,
            12 => SessionStatus::MoTooLarge,
            13 => SessionStatus::RfLinkLoss,
            14 => SessionStatus::ImeiProtocolAnomaly,
            15 => SessionStatus::Prohibited,
            _ => SessionStatus::Unknown(n),
        }
    }
}

impl Location {
    /// Reads a location from the body of an MO location information element.
    ///
    /// The first byte is reserved. Latitude and longitude are signed millionths of a degree.
    ///
    /// # Examples
    ///
    /// ```
    /// use directip::Location;
    /// let location = Location::new(&[0, 3, 45, 75, 32, 255, 162, 118, 176, 0, 4]).unwrap();
    /// assert_eq!(53.3, location.latitude);
    /// assert_eq!(-6.13, location.longitude);
    /// assert_eq!(4, location.cep_radius);
    /// ```
    pub fn new(bytes: &[u8]) -> Result<Location, Error> {
        if bytes.len() < LOCATION_LEN {
            return Err(Error::ElementTooShort {
                id: LOCATION_ID,
                expected: LOCATION_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Location {
            latitude: f64::from(BigEndian::read_i32(&bytes[1..5])) / LOCATION_SCALE,
            longitude: f64::from(BigEndian::read_i32(&bytes[5..9])) / LOCATION_SCALE,
            cep_radius: BigEndian::read_u16(&bytes[9..11]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes() -> Vec<u8> {
        let mut bytes = vec![0x00, 0x01, 0xe2, 0x40];
        bytes.extend(b"300434065263440");
        bytes.extend(&[0, 0x04, 0xd2, 0, 0, 0x69, 0x30, 0x18, 0x3f]);
        bytes
    }

    #[test]
    fn header() {
        use chrono::TimeZone;

        let header = Header::new(&header_bytes()).unwrap();
        assert_eq!(123456, header.cdr_reference);
        assert_eq!("300434065263440", header.imei);
        assert_eq!(SessionStatus::Ok, header.session_status);
        assert_eq!(1234, header.momsn);
        assert_eq!(0, header.mtmsn);
        assert_eq!(
            Utc.ymd(2025, 12, 3).and_hms(11, 0, 15),
            header.time_of_session
        );
    }

    #[test]
    fn header_padded_imei() {
        let mut bytes = header_bytes();
        bytes[15] = 0;
        bytes[16] = 0;
        bytes[17] = 0;
        bytes[18] = 0;
        assert_eq!("30043406526", Header::new(&bytes).unwrap().imei);
    }

    #[test]
    fn header_too_short() {
        assert_eq!(
            Error::ElementTooShort {
                id: HEADER_ID,
                expected: 28,
                actual: 27,
            },
            Header::new(&header_bytes()[..27]).unwrap_err()
        );
    }

    #[test]
    fn session_status() {
        assert_eq!(SessionStatus::Timeout, SessionStatus::from(10));
        assert_eq!(SessionStatus::Prohibited, SessionStatus::from(15));
        assert_eq!(SessionStatus::Unknown(11), SessionStatus::from(11));
        assert!(!SessionStatus::Unknown(11).is_success());
    }

    #[test]
    fn location_southern_hemisphere() {
        let mut bytes = vec![0];
        bytes.extend(&(-33_856_000i32).to_be_bytes());
        bytes.extend(&151_215_000i32.to_be_bytes());
        bytes.extend(&[0x01, 0x00]);
        let location = Location::new(&bytes).unwrap();
        assert_eq!(-33.856, location.latitude);
        assert_eq!(151.215, location.longitude);
        assert_eq!(256, location.cep_radius);
    }

    #[test]
    fn location_too_short() {
        assert_eq!(
            Error::ElementTooShort {
                id: LOCATION_ID,
                expected: 11,
                actual: 4,
            },
            Location::new(&[0, 1, 2, 3]).unwrap_err()
        );
    }

    #[test]
    fn kind() {
        assert_eq!(Kind::Header, Kind::from(0x01));
        assert_eq!(Kind::Location, Kind::from(0x03));
        assert_eq!(Kind::Confirmation, Kind::from(0x05));
        assert_eq!(Kind::Unknown(0x04), Kind::from(0x04));
    }
}
