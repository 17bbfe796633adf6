//! Configuration for the receiver.
//!
//! # Examples
//!
//! Configs are usually specified in TOML files:
//!
//! ```
//! use receiver::Config;
//! let config = Config::from_path("fixtures/config.toml").unwrap();
//! assert_eq!("127.0.0.1:7777", config.bind);
//! ```
//!
//! Every key is optional:
//!
//! ```
//! use receiver::Config;
//! let config: Config = "".parse().unwrap();
//! assert_eq!(Config::default(), config);
//! ```

use failure::Error;
use publish::LinePublisher;
use report::Dispatcher;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use store::FilesystemStore;
use toml;

/// Configure the receiver.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The address to listen on.
    pub bind: String,

    /// How many seconds a peer has to send a whole session before it's abandoned.
    pub read_timeout: u64,

    /// How many sessions may be in flight at once.
    pub max_connections: usize,

    /// The first segment of every published topic.
    pub namespace: String,

    /// The root directory of the filesystem store.
    pub storage: Option<PathBuf>,

    /// Where to write published lines, or `-` for stdout.
    pub publish: Option<PathBuf>,

    /// Send a confirmation message before closing each connection.
    pub confirm: bool,
}

impl Config {
    /// Reads configuration from a toml file.
    ///
    /// # Examples
    ///
    /// ```
    /// let config = receiver::Config::from_path("fixtures/config.toml").unwrap();
    /// assert!(config.confirm);
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        use std::fs::File;
        use std::io::Read;

        let mut file = File::open(path)?;
        let mut string = String::new();
        file.read_to_string(&mut string)?;
        string.parse()
    }

    /// Returns the read timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// let config = receiver::Config::default();
    /// assert_eq!(Duration::from_secs(30), config.read_timeout());
    /// ```
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    /// Creates a dispatcher for the configured sinks.
    pub fn dispatcher(&self) -> Result<Dispatcher, Error> {
        let mut dispatcher = Dispatcher::new(self.namespace.as_str());
        if let Some(ref storage) = self.storage {
            dispatcher = dispatcher.with_store(FilesystemStore::new(storage));
        }
        if let Some(ref publish) = self.publish {
            dispatcher = dispatcher.with_publisher(LinePublisher::from_path(publish)?);
        }
        Ok(dispatcher)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bind: "0.0.0.0:7777".to_string(),
            read_timeout: 30,
            max_connections: 64,
            namespace: "valentia".to_string(),
            storage: None,
            publish: None,
            confirm: false,
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Config, Error> {
        toml::from_str(s).map_err(Error::from)
    }
}
