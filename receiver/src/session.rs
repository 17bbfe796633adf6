//! Read one DirectIP session off a connection.

use chrono::{DateTime, Utc};
use directip::message::{self, MESSAGE_HEADER_LEN};
use std::io::{self, ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::time::Instant;
use Error;

/// The bytes of one session, as they came off the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSession {
    /// Who sent the session.
    pub peer: SocketAddr,

    /// When we finished reading it.
    pub received: DateTime<Utc>,

    /// Everything we read, which may be less than the session declared.
    pub bytes: Vec<u8>,
}

impl RawSession {
    /// Creates a session received now.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::RawSession;
    /// let session = RawSession::new("127.0.0.1:49152".parse().unwrap(), vec![1, 0, 0]);
    /// assert_eq!(3, session.bytes.len());
    /// ```
    pub fn new(peer: SocketAddr, bytes: Vec<u8>) -> RawSession {
        RawSession {
            peer: peer,
            received: Utc::now(),
            bytes: bytes,
        }
    }

    /// Reads one session from a reader.
    ///
    /// Reads the three byte message header, then exactly as many bytes as the header declares. If
    /// the peer closes early, the short session is returned as-is and framing will reject it. A
    /// read that times out abandons the session.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::RawSession;
    /// let mut bytes = include_bytes!("../fixtures/eucaws.sbd").to_vec();
    /// bytes.extend(b"trailing");
    /// let session = RawSession::read_from(&mut bytes.as_slice(), "127.0.0.1:49152".parse().unwrap()).unwrap();
    /// assert_eq!(81, session.bytes.len());
    /// ```
    pub fn read_from<R: Read>(reader: &mut R, peer: SocketAddr) -> Result<RawSession, Error> {
        let mut bytes = Vec::new();
        read_up_to(reader, MESSAGE_HEADER_LEN, &mut bytes)?;
        if let Ok(overall_length) = message::overall_length(&bytes) {
            read_up_to(reader, overall_length, &mut bytes)?;
        }
        Ok(RawSession::new(peer, bytes))
    }

    /// Reads one session from a socket, giving up once the deadline passes.
    ///
    /// The deadline covers the whole session, not each read, so a peer can't hold the
    /// connection open by trickling bytes.
    pub fn read_before(
        stream: &TcpStream,
        peer: SocketAddr,
        deadline: Instant,
    ) -> Result<RawSession, Error> {
        let mut reader = Deadline {
            stream: stream,
            deadline: deadline,
        };
        RawSession::read_from(&mut reader, peer)
    }
}

/// Sets the socket's read timeout to whatever is left before each read.
struct Deadline<'a> {
    stream: &'a TcpStream,
    deadline: Instant,
}

impl<'a> Read for Deadline<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let now = Instant::now();
        if now >= self.deadline {
            return Err(io::Error::new(ErrorKind::TimedOut, "session deadline passed"));
        }
        self.stream
            .set_read_timeout(Some(self.deadline.duration_since(now)))?;
        let mut stream = self.stream;
        stream.read(buf)
    }
}

fn read_up_to<R: Read>(reader: &mut R, len: usize, bytes: &mut Vec<u8>) -> Result<(), Error> {
    match reader.take(len as u64).read_to_end(bytes) {
        Ok(_) => Ok(()),
        Err(ref err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
            Err(Error::Timeout(bytes.len()))
        }
        Err(err) => Err(err.into()),
    }
}
