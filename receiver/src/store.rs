//! Persist sessions.
//!
//! A store is keyed by IMEI and MOMSN. Detecting duplicates is the store's job: the gateway
//! retransmits sessions it thinks weren't delivered.

use directip::SessionMetadata;
use eucaws::Observation;
use failure::Error as FailureError;
use hex;
use report::Status;
use serde_json;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use Error;

/// Something that can persist sessions.
///
/// Stores are shared by every connection, so they must handle concurrent calls.
pub trait Store: Send + Sync {
    /// Stores one session.
    fn store(
        &self,
        metadata: &SessionMetadata,
        payload: Option<&[u8]>,
        status: &Status,
    ) -> Result<(), FailureError>;
}

/// Stores each session as a JSON file at `<root>/<imei>/<momsn>.json`.
#[derive(Clone, Debug)]
pub struct FilesystemStore {
    root: PathBuf,
}

/// The JSON record for one session.
#[derive(Debug, Serialize, Deserialize)]
pub struct Record {
    /// The session metadata.
    pub metadata: SessionMetadata,

    /// The payload as a hex string.
    pub payload: Option<String>,

    /// The status name, one of `decoded`, `no_payload` or `rejected`.
    pub status: String,

    /// Why the session was rejected.
    pub reason: Option<String>,

    /// The decoded observation.
    #[serde(skip_deserializing)]
    pub observation: Option<Observation>,
}

impl FilesystemStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created on the first write if it doesn't exist.
    pub fn new<P: AsRef<Path>>(root: P) -> FilesystemStore {
        FilesystemStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path where a session is stored.
    ///
    /// The IMEI comes off the wire, so anything but ASCII letters and digits is refused rather
    /// than joined onto the root.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::FilesystemStore;
    /// let store = FilesystemStore::new("/var/lib/valentia");
    /// assert_eq!(
    ///     std::path::Path::new("/var/lib/valentia/300434065263440/1234.json"),
    ///     store.path("300434065263440", 1234).unwrap()
    /// );
    /// assert!(store.path("../../etc", 1234).is_err());
    /// ```
    pub fn path(&self, imei: &str, momsn: u16) -> Result<PathBuf, Error> {
        if imei.is_empty() || !imei.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidImei(imei.to_string()));
        }
        Ok(self.root.join(imei).join(format!("{}.json", momsn)))
    }
}

impl Store for FilesystemStore {
    fn store(
        &self,
        metadata: &SessionMetadata,
        payload: Option<&[u8]>,
        status: &Status,
    ) -> Result<(), FailureError> {
        let record = Record::new(metadata.clone(), payload, status);
        let path = self.path(metadata.imei(), metadata.momsn())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(ref err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Duplicate {
                    imei: metadata.imei().to_string(),
                    momsn: metadata.momsn(),
                }.into());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::to_writer_pretty(&mut file, &record)?;
        file.write_all(b"\n")?;
        debug!("stored {}", path.display());
        Ok(())
    }
}

impl Record {
    /// Creates a new record.
    pub fn new(metadata: SessionMetadata, payload: Option<&[u8]>, status: &Status) -> Record {
        let reason = match *status {
            Status::Rejected(ref reason) => Some(reason.to_string()),
            _ => None,
        };
        Record {
            metadata: metadata,
            payload: payload.map(hex::encode),
            status: status.name().to_string(),
            reason: reason,
            observation: status.observation().cloned(),
        }
    }

    /// Reads a record from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Record, FailureError> {
        let mut file = File::open(path)?;
        let mut string = String::new();
        file.read_to_string(&mut string)?;
        serde_json::from_str(&string).map_err(FailureError::from)
    }

    /// Returns the payload bytes.
    pub fn payload(&self) -> Result<Option<Vec<u8>>, FailureError> {
        match self.payload {
            Some(ref payload) => Ok(Some(hex::decode(payload)?)),
            None => Ok(None),
        }
    }

    /// Decodes the payload again, using the session time for the timestamp fallback.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::Record;
    /// let record = Record::from_path("fixtures/record.json").unwrap();
    /// let record = record.reprocess().unwrap();
    /// assert_eq!("decoded", record.status);
    /// assert!(record.observation.is_some());
    /// ```
    pub fn reprocess(self) -> Result<Record, FailureError> {
        let payload = self.payload()?;
        let status = Status::new(
            payload.as_ref().map(|payload| payload.as_slice()),
            Some(self.metadata.header.time_of_session),
        );
        Ok(Record::new(
            self.metadata,
            payload.as_ref().map(|payload| payload.as_slice()),
            &status,
        ))
    }

    /// Writes this record to a JSON file, replacing any existing file.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), FailureError> {
        let mut file = File::create(path)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        Ok(())
    }
}
