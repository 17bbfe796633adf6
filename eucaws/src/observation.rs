//! Scaled, converted and timestamped observations.

use bits::{BitReader, BitWriter, Underrun};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use field::Unit;
use format100::{GreenBlock, GREEN_BLOCK};

/// Metres per second to knots.
const KNOTS_PER_METRE_PER_SECOND: f64 = 1.94384;

/// A weather observation from one payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    /// When the observation was made.
    pub timestamp: Option<DateTime<Utc>>,

    /// Where the timestamp came from.
    pub timestamp_source: TimestampSource,

    /// One reading per green block field, in transmission order.
    pub readings: Vec<Reading>,

    /// Which optional blocks the station says follow the green block.
    pub blocks: OptionalBlocks,

    /// How much the values can be trusted.
    pub confidence: Confidence,
}

/// One field of an observation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    /// The field name.
    pub name: &'static str,

    /// The bits as sent.
    pub raw: u32,

    /// The physical value, converted for reporting, or `None` if the field is missing.
    pub value: Option<f64>,

    /// The unit of `value`.
    pub unit: Unit,
}

/// The optional block presence bits that follow the green block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalBlocks {
    /// Visual observations.
    pub visual: bool,

    /// Wave observations.
    pub wave: bool,

    /// Ice observations.
    pub ice: bool,

    /// Other sensors.
    pub other: bool,
}

/// How much an observation can be trusted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Confidence {
    /// Every present value is physically sensible and the timestamp came from the payload.
    Nominal,

    /// Something is off. The reasons are human readable.
    Low(Vec<String>),
}

/// The origin of an observation's timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TimestampSource {
    /// All five date fields were present and made a valid date.
    Payload,

    /// The date came from the Iridium time of session, combined with the payload's hour.
    SessionHour,

    /// There was nothing to build a timestamp from.
    Missing,
}

impl OptionalBlocks {
    /// Reads the four presence bits.
    pub fn read_from(reader: &mut BitReader) -> Result<OptionalBlocks, Underrun> {
        let bits = reader.read(4)?;
        Ok(OptionalBlocks {
            visual: bits & 0b1000 != 0,
            wave: bits & 0b0100 != 0,
            ice: bits & 0b0010 != 0,
            other: bits & 0b0001 != 0,
        })
    }

    /// Writes the four presence bits.
    pub fn write_to(&self, writer: &mut BitWriter) {
        let bits = (self.visual as u32) << 3
            | (self.wave as u32) << 2
            | (self.ice as u32) << 1
            | self.other as u32;
        writer.write(bits, 4);
    }
}

impl Observation {
    /// Creates an observation from a green block.
    ///
    /// If the green block's date is incomplete or invalid, the session time supplies the date.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::{bits::BitReader, format100::GreenBlock, Observation, TimestampSource};
    /// let mut reader = BitReader::new(include_bytes!("../fixtures/green-block.bin"));
    /// let green_block = GreenBlock::read_from(&mut reader).unwrap();
    /// let observation = Observation::new(&green_block, None);
    /// assert_eq!(TimestampSource::Payload, observation.timestamp_source);
    /// ```
    pub fn new(green_block: &GreenBlock, session_time: Option<DateTime<Utc>>) -> Observation {
        let mut reasons = Vec::new();
        let readings: Vec<Reading> = GREEN_BLOCK
            .iter()
            .zip(&green_block.raw)
            .map(|(field, &raw)| {
                let value = field.decode(raw);
                if let Some(value) = value {
                    if !field.in_range(value) {
                        reasons.push(format!(
                            "{} out of range: {} {}",
                            field.name, value, field.unit
                        ));
                    }
                }
                Reading {
                    name: field.name,
                    raw: raw,
                    value: value.map(|v| field.unit.convert(v)),
                    unit: field.unit.converted(),
                }
            })
            .collect();

        let (timestamp, timestamp_source) = match payload_timestamp(green_block) {
            Ok(timestamp) => (Some(timestamp), TimestampSource::Payload),
            Err(reason) => {
                reasons.push(reason);
                match session_time {
                    Some(session_time) => {
                        reasons.push("observation time derived from the time of session".into());
                        let hour = green_block
                            .get("hour")
                            .filter(|&hour| hour < 24)
                            .unwrap_or_else(|| session_time.hour());
                        (
                            Some(from_session_hour(session_time, hour)),
                            TimestampSource::SessionHour,
                        )
                    }
                    None => (None, TimestampSource::Missing),
                }
            }
        };

        Observation {
            timestamp: timestamp,
            timestamp_source: timestamp_source,
            readings: readings,
            blocks: green_block.blocks,
            confidence: if reasons.is_empty() {
                Confidence::Nominal
            } else {
                Confidence::Low(reasons)
            },
        }
    }

    /// Returns a reading by field name.
    pub fn get(&self, name: &str) -> Option<&Reading> {
        self.readings.iter().find(|reading| reading.name == name)
    }

    /// Returns the converted value of a field by name, or `None` if it's missing.
    ///
    /// # Examples
    ///
    /// ```
    /// let observation = eucaws::decode(include_bytes!("../fixtures/green-block.bin"), None).unwrap();
    /// assert_eq!(Some(1002.7), observation.value("msl_pressure"));
    /// assert_eq!(None, observation.value("gps_height"));
    /// assert_eq!(None, observation.value("visibility"));
    /// ```
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|reading| reading.value)
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> Option<f64> {
        self.value("latitude")
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> Option<f64> {
        self.value("longitude")
    }

    /// Station pressure in hectopascals.
    pub fn pressure(&self) -> Option<f64> {
        self.value("pressure")
    }

    /// Pressure reduced to mean sea level in hectopascals.
    pub fn msl_pressure(&self) -> Option<f64> {
        self.value("msl_pressure")
    }

    /// True wind speed in metres per second.
    pub fn wind_speed(&self) -> Option<f64> {
        self.value("wind_speed")
    }

    /// True wind speed in knots.
    pub fn wind_speed_knots(&self) -> Option<f64> {
        self.wind_speed().map(|speed| speed * KNOTS_PER_METRE_PER_SECOND)
    }

    /// True wind direction in degrees.
    pub fn wind_direction(&self) -> Option<f64> {
        self.value("wind_direction")
    }

    /// Air temperature in degrees Celsius.
    pub fn air_temperature(&self) -> Option<f64> {
        self.value("air_temperature")
    }

    /// Relative humidity in percent.
    pub fn relative_humidity(&self) -> Option<f64> {
        self.value("relative_humidity")
    }

    /// Sea surface temperature in degrees Celsius.
    pub fn sea_surface_temperature(&self) -> Option<f64> {
        self.value("sea_surface_temperature")
    }

    /// Returns true if the station says its callsign is encrypted.
    ///
    /// The flag is zero for encrypted, so this is the one field where all ones isn't "missing".
    pub fn callsign_encrypted(&self) -> bool {
        self.get("callsign_encryption")
            .map(|reading| reading.raw == 0)
            .unwrap_or(false)
    }

    /// Returns true if the observation has low confidence.
    pub fn is_low_confidence(&self) -> bool {
        match self.confidence {
            Confidence::Nominal => false,
            Confidence::Low(_) => true,
        }
    }
}

fn payload_timestamp(green_block: &GreenBlock) -> Result<DateTime<Utc>, String> {
    let mut parts = [0u32; 5];
    for (part, &name) in parts
        .iter_mut()
        .zip(&["year", "month", "day", "hour", "minute"])
    {
        *part = green_block
            .value(name)
            .ok_or_else(|| format!("{} is missing", name))? as u32;
    }
    NaiveDate::from_ymd_opt(parts[0] as i32, parts[1], parts[2])
        .and_then(|date| date.and_hms_opt(parts[3], parts[4], 0))
        .map(|datetime| Utc.from_utc_datetime(&datetime))
        .ok_or_else(|| {
            format!(
                "invalid observation time: {:04}-{:02}-{:02} {:02}:{:02}",
                parts[0], parts[1], parts[2], parts[3], parts[4]
            )
        })
}

/// The most recent top of `hour` at or before the session time.
fn from_session_hour(session_time: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let date = session_time.naive_utc().date();
    let candidate = Utc.from_utc_datetime(&date.and_hms(hour, 0, 0));
    if candidate > session_time {
        candidate - Duration::days(1)
    } else {
        candidate
    }
}
