//! What became of a session, and where it goes next.

use chrono::{DateTime, Utc};
use directip::{self, Message, SessionMetadata};
use eucaws::{self, Observation};
use publish::{Publication, Publish};
use session::RawSession;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use store::Store;

/// The result of handling one session.
#[derive(Debug)]
pub struct Report {
    /// Who sent the session.
    pub peer: SocketAddr,

    /// When the session was received.
    pub received: DateTime<Utc>,

    /// The session metadata, if the session header could be read.
    pub metadata: Option<SessionMetadata>,

    /// The payload, if the session was framed and had one.
    pub payload: Option<Vec<u8>>,

    /// How far the session got.
    pub status: Status,

    size: usize,
    label: Option<String>,
}

/// How far a session got.
#[derive(Debug)]
pub enum Status {
    /// The payload was decoded.
    Decoded(Observation),

    /// The session was framed but had no payload.
    NoPayload,

    /// The session or its payload was rejected.
    Rejected(Reason),
}

/// Why a session was rejected.
#[derive(Debug, Fail)]
pub enum Reason {
    /// The session could not be framed.
    #[fail(display = "framing: {}", _0)]
    Framing(#[cause] directip::Error),

    /// The payload could not be decoded.
    #[fail(display = "decode: {}", _0)]
    Decode(#[cause] eucaws::Error),
}

/// Hands reports to the store and the publisher.
///
/// Sink failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct Dispatcher {
    namespace: String,
    store: Option<Arc<dyn Store>>,
    publisher: Option<Arc<dyn Publish>>,
}

impl Report {
    /// Frames and decodes a raw session.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::{RawSession, Report};
    /// let report = Report::new(RawSession::new("127.0.0.1:49152".parse().unwrap(), vec![1, 0]));
    /// assert!(report.metadata.is_none());
    /// assert!(report.is_rejected());
    /// ```
    pub fn new(session: RawSession) -> Report {
        let size = session.bytes.len();
        let (metadata, payload, status) = match Message::parse(&session.bytes) {
            Ok(message) => {
                let metadata = message.metadata();
                let payload = message.payload().map(|payload| payload.to_vec());
                let status = Status::new(
                    payload.as_ref().map(|payload| payload.as_slice()),
                    Some(metadata.header.time_of_session),
                );
                (Some(metadata), payload, status)
            }
            Err(malformed) => (
                malformed.header.map(SessionMetadata::from),
                None,
                Status::Rejected(Reason::Framing(malformed.error)),
            ),
        };
        let label = metadata
            .as_ref()
            .map(|metadata| metadata.imei().to_string())
            .or_else(|| directip::imei_from_bytes(&session.bytes));
        Report {
            peer: session.peer,
            received: session.received,
            metadata: metadata,
            payload: payload,
            status: status,
            size: size,
            label: label,
        }
    }

    /// Returns the IMEI from the session header, if the header was read.
    pub fn imei(&self) -> Option<&str> {
        self.metadata.as_ref().map(|metadata| metadata.imei())
    }

    /// Returns true if the session or its payload was rejected.
    pub fn is_rejected(&self) -> bool {
        match self.status {
            Status::Rejected(_) => true,
            _ => false,
        }
    }

    /// Logs a one line summary.
    pub fn log(&self) {
        let imei = self.label.as_ref().map(|s| s.as_str()).unwrap_or("unknown");
        let momsn = self
            .metadata
            .as_ref()
            .map(|metadata| metadata.momsn().to_string())
            .unwrap_or_else(|| "-".to_string());
        let payload = self.payload.as_ref().map(|payload| payload.len()).unwrap_or(0);
        match self.status {
            Status::Rejected(Reason::Framing(_)) => warn!(
                "{} imei={} received={}B: {}",
                self.peer, imei, self.size, self.status
            ),
            Status::Rejected(Reason::Decode(_)) => warn!(
                "{} imei={} momsn={} payload={}B: {}",
                self.peer, imei, momsn, payload, self.status
            ),
            _ => info!(
                "{} imei={} momsn={} payload={}B: {}",
                self.peer, imei, momsn, payload, self.status
            ),
        }
    }
}

impl Status {
    /// Decodes an optional payload.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::Status;
    /// let status = Status::new(Some(&include_bytes!("../../eucaws/fixtures/green-block.bin")[..]), None);
    /// assert_eq!("decoded", status.name());
    /// assert_eq!("no_payload", Status::new(None, None).name());
    /// ```
    pub fn new(payload: Option<&[u8]>, session_time: Option<DateTime<Utc>>) -> Status {
        match payload {
            Some(payload) => match eucaws::decode(payload, session_time) {
                Ok(observation) => Status::Decoded(observation),
                Err(err) => Status::Rejected(Reason::Decode(err)),
            },
            None => Status::NoPayload,
        }
    }

    /// Returns a short machine-friendly name.
    pub fn name(&self) -> &'static str {
        match *self {
            Status::Decoded(_) => "decoded",
            Status::NoPayload => "no_payload",
            Status::Rejected(_) => "rejected",
        }
    }

    /// Returns the observation, if there is one.
    pub fn observation(&self) -> Option<&Observation> {
        match *self {
            Status::Decoded(ref observation) => Some(observation),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Status::Decoded(ref observation) if observation.is_low_confidence() => {
                write!(f, "decoded (low confidence)")
            }
            Status::Decoded(_) => write!(f, "decoded"),
            Status::NoPayload => write!(f, "no payload"),
            Status::Rejected(ref reason) => write!(f, "rejected: {}", reason),
        }
    }
}

impl Dispatcher {
    /// Creates a dispatcher with no sinks.
    pub fn new<S: Into<String>>(namespace: S) -> Dispatcher {
        Dispatcher {
            namespace: namespace.into(),
            store: None,
            publisher: None,
        }
    }

    /// Sets the store.
    pub fn with_store<S: Store + 'static>(mut self, store: S) -> Dispatcher {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets the publisher.
    pub fn with_publisher<P: Publish + 'static>(mut self, publisher: P) -> Dispatcher {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    /// Stores a report with metadata, and publishes its observation if it has one.
    ///
    /// Reports without metadata can't be keyed, so they're only logged.
    pub fn dispatch(&self, report: &Report) {
        let metadata = match report.metadata {
            Some(ref metadata) => metadata,
            None => {
                debug!("{}: nothing to dispatch", report.peer);
                return;
            }
        };
        if let Some(ref store) = self.store {
            let payload = report.payload.as_ref().map(|payload| payload.as_slice());
            if let Err(err) = store.store(metadata, payload, &report.status) {
                error!(
                    "could not store imei={} momsn={}: {}",
                    metadata.imei(),
                    metadata.momsn(),
                    err
                );
            }
        }
        if let (Some(publisher), Some(observation)) =
            (self.publisher.as_ref(), report.status.observation())
        {
            let publication = Publication::new(&self.namespace, metadata.imei(), observation);
            let result = publication
                .to_json()
                .and_then(|json| publisher.publish(&publication.topic, &json));
            match result {
                Ok(()) => debug!("published to {}", publication.topic),
                Err(err) => error!("could not publish to {}: {}", publication.topic, err),
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("namespace", &self.namespace)
            .field("store", &self.store.is_some())
            .field("publisher", &self.publisher.is_some())
            .finish()
    }
}
