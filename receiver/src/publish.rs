//! Publish observations to a message bus.
//!
//! Topics look like `<namespace>/eucaws/<imei>/observation`. The payload is a flat JSON object
//! with only the fields that were present, plus a data quality flag.

use chrono::{DateTime, Utc};
use eucaws::Observation;
use failure::Error;
use serde_json;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Something that can publish a payload to a topic.
///
/// Publishers are shared by every connection, so they must handle concurrent calls.
pub trait Publish: Send + Sync {
    /// Publishes one payload.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), Error>;
}

/// Writes `<topic> <payload>` lines.
///
/// # Examples
///
/// ```
/// use receiver::{LinePublisher, Publish};
/// let publisher = LinePublisher::new(Vec::new());
/// publisher.publish("valentia/eucaws/300434065263440/observation", "{}").unwrap();
/// assert_eq!(
///     b"valentia/eucaws/300434065263440/observation {}\n".to_vec(),
///     publisher.into_inner()
/// );
/// ```
#[derive(Debug)]
pub struct LinePublisher<W> {
    writer: Mutex<W>,
}

/// An observation, ready to publish.
#[derive(Clone, Debug, PartialEq)]
pub struct Publication {
    /// The topic.
    pub topic: String,

    /// The payload.
    pub payload: Payload,
}

/// The published fields.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atmospheric_pressure: Option<f64>,

    /// Zero when every mandatory field is present, otherwise one bit per missing field.
    pub data_quality_flag: u8,
}

/// Bits of the data quality flag.
pub mod quality {
    /// No observation time.
    pub const TIME: u8 = 1 << 0;
    /// No latitude.
    pub const LATITUDE: u8 = 1 << 1;
    /// No longitude.
    pub const LONGITUDE: u8 = 1 << 2;
    /// No wind speed.
    pub const WIND_SPEED: u8 = 1 << 3;
    /// No wind direction.
    pub const WIND_DIRECTION: u8 = 1 << 4;
    /// No air temperature.
    pub const AIR_TEMPERATURE: u8 = 1 << 5;
    /// No relative humidity.
    pub const RELATIVE_HUMIDITY: u8 = 1 << 6;
    /// No pressure.
    pub const PRESSURE: u8 = 1 << 7;
}

impl<W: Write> LinePublisher<W> {
    /// Creates a new publisher that writes to the given writer.
    pub fn new(writer: W) -> LinePublisher<W> {
        LinePublisher {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LinePublisher<Box<dyn Write + Send>> {
    /// Creates a publisher that appends to a file, or writes to stdout if the path is `-`.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<LinePublisher<Box<dyn Write + Send>>, Error> {
        let writer: Box<dyn Write + Send> = if path.as_ref() == Path::new("-") {
            Box::new(io::stdout())
        } else {
            Box::new(OpenOptions::new().create(true).append(true).open(path)?)
        };
        Ok(LinePublisher::new(writer))
    }
}

impl<W: Write + Send> Publish for LinePublisher<W> {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), Error> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| format_err!("publisher lock poisoned"))?;
        writeln!(writer, "{} {}", topic, payload)?;
        writer.flush()?;
        Ok(())
    }
}

impl Publication {
    /// Creates a publication for an observation.
    ///
    /// # Examples
    ///
    /// ```
    /// use receiver::Publication;
    /// let observation = eucaws::decode(include_bytes!("../../eucaws/fixtures/green-block.bin"), None).unwrap();
    /// let publication = Publication::new("valentia", "300434065263440", &observation);
    /// assert_eq!("valentia/eucaws/300434065263440/observation", publication.topic);
    /// assert_eq!(Some(999.7), publication.payload.atmospheric_pressure);
    /// ```
    pub fn new(namespace: &str, imei: &str, observation: &Observation) -> Publication {
        let payload = Payload {
            observation_time: observation.timestamp,
            latitude: observation.latitude(),
            longitude: observation.longitude(),
            wind_speed: observation.wind_speed(),
            wind_direction: observation.wind_direction(),
            air_temperature: observation.air_temperature(),
            relative_humidity: observation.relative_humidity(),
            atmospheric_pressure: observation.pressure(),
            data_quality_flag: 0,
        };
        Publication {
            topic: format!("{}/eucaws/{}/observation", namespace, imei),
            payload: Payload {
                data_quality_flag: payload.missing(),
                ..payload
            },
        }
    }

    /// Serializes the payload.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(&self.payload).map_err(Error::from)
    }
}

impl Payload {
    fn missing(&self) -> u8 {
        let checks = [
            (self.observation_time.is_none(), quality::TIME),
            (self.latitude.is_none(), quality::LATITUDE),
            (self.longitude.is_none(), quality::LONGITUDE),
            (self.wind_speed.is_none(), quality::WIND_SPEED),
            (self.wind_direction.is_none(), quality::WIND_DIRECTION),
            (self.air_temperature.is_none(), quality::AIR_TEMPERATURE),
            (self.relative_humidity.is_none(), quality::RELATIVE_HUMIDITY),
            (self.atmospheric_pressure.is_none(), quality::PRESSURE),
        ];
        checks
            .iter()
            .filter(|&&(missing, _)| missing)
            .fold(0, |flag, &(_, bit)| flag | bit)
    }
}
