//! E-SURFMAR Format #100, for shipborne automated weather stations.
//!
//! The green block is mandatory and always comes first. It's followed by four presence bits for
//! the optional visual, wave, ice and other-sensor blocks; those blocks are not decoded here. A
//! station without optional blocks sends 235 bits, padded out to 30 bytes.
//!
//! The field table follows "E-SURFMAR recommended ship-to-shore dataformats", version 1.9.
//! Fields are transcribed in their native units (kelvin, pascals) and converted afterwards.

use bits::{BitReader, BitWriter};
use chrono::{DateTime, Utc};
use field::{Field, Unit};
use observation::{Observation, OptionalBlocks};
use std::collections::HashMap;
use Error;

/// The format identifier at the start of every Format #100 payload.
pub const FORMAT_IDENTIFIER: u32 = 100;

/// The length of a payload with only the green block.
pub const PAYLOAD_LEN: usize = 30;

/// The number of meaningful bits in a payload with only the green block.
pub const GREEN_BLOCK_BITS: usize = 235;

macro_rules! entry {
    ($name:expr, $width:expr, $slope:expr, $offset:expr, $min:expr, $max:expr, $unit:expr) => {
        Field {
            name: $name,
            width: $width,
            slope: $slope,
            offset: $offset,
            min: $min,
            max: $max,
            unit: $unit,
        }
    };
}

/// The green block field table, in transmission order.
pub static GREEN_BLOCK: [Field; 29] = [
    entry!("format_identifier", 8, 1., 0., 0., 254., Unit::Code),
    entry!("callsign_encryption", 1, 1., 0., 0., 1., Unit::Flag),
    entry!("course_over_ground", 7, 5., 0., 0., 360., Unit::Degree),
    entry!("speed_over_ground", 6, 0.5, 0., 0., 30., Unit::MetrePerSecond),
    entry!("true_heading", 7, 5., 0., 0., 360., Unit::Degree),
    entry!("loadline_departure", 5, 1., -10., -10., 20., Unit::Metre),
    entry!("year", 7, 1., 2000., 2000., 2126., Unit::Year),
    entry!("month", 4, 1., 0., 1., 12., Unit::Month),
    entry!("day", 6, 1., 0., 1., 31., Unit::Day),
    entry!("hour", 5, 1., 0., 0., 23., Unit::Hour),
    entry!("minute", 6, 1., 0., 0., 59., Unit::Minute),
    entry!("latitude", 15, 0.01, -90., -90., 90., Unit::Degree),
    entry!("longitude", 16, 0.01, -180., -180., 180., Unit::Degree),
    entry!("pressure", 11, 10., 85000., 85000., 105460., Unit::Pascal),
    entry!("msl_pressure", 11, 10., 85000., 85000., 105460., Unit::Pascal),
    entry!("pressure_change", 10, 10., -5000., -5000., 5000., Unit::Pascal),
    entry!("pressure_tendency", 4, 1., 0., 0., 8., Unit::Code),
    entry!("wind_direction", 7, 5., 0., 0., 360., Unit::Degree),
    entry!("wind_speed", 10, 0.1, 0., 0., 102., Unit::MetrePerSecond),
    entry!("relative_wind_direction", 7, 5., 0., 0., 360., Unit::Degree),
    entry!("relative_wind_speed", 8, 0.5, 0., 0., 127., Unit::MetrePerSecond),
    entry!("max_gust_speed", 8, 0.5, 0., 0., 127., Unit::MetrePerSecond),
    entry!("max_gust_direction", 7, 5., 0., 0., 360., Unit::Degree),
    entry!("air_temperature", 10, 0.1, 223.2, 223.2, 325.4, Unit::Kelvin),
    entry!("relative_humidity", 10, 0.1, 0., 0., 100., Unit::Percent),
    entry!("sea_surface_temperature", 12, 0.01, 268.15, 268.15, 309.05, Unit::Kelvin),
    entry!("battery_voltage", 7, 0.2, 5., 5., 30.2, Unit::Volt),
    entry!("processor_temperature", 8, 0.5, 233.15, 233.15, 360.15, Unit::Kelvin),
    entry!("gps_height", 8, 1., -50., -50., 204., Unit::Metre),
];

lazy_static! {
    static ref INDEX: HashMap<&'static str, usize> = GREEN_BLOCK
        .iter()
        .enumerate()
        .map(|(i, field)| (field.name, i))
        .collect();
}

/// The raw green block bit-fields, before any scaling.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GreenBlock {
    /// One raw value per entry in `GREEN_BLOCK`, in the same order.
    pub raw: Vec<u32>,

    /// The optional block presence bits.
    pub blocks: OptionalBlocks,
}

/// Looks up a green block field by name.
///
/// # Examples
///
/// ```
/// use eucaws::format100;
/// assert_eq!(12, format100::field("sea_surface_temperature").unwrap().width);
/// assert!(format100::field("visibility").is_none());
/// ```
pub fn field(name: &str) -> Option<&'static Field> {
    INDEX.get(name).map(|&i| &GREEN_BLOCK[i])
}

/// Decodes a Format #100 payload.
///
/// The payload must be exactly 30 bytes. The session time is used to reconstruct the observation
/// time when the payload's own timestamp is incomplete.
///
/// # Examples
///
/// ```
/// use eucaws::{Error, format100};
/// let observation = format100::decode(include_bytes!("../fixtures/green-block.bin"), None).unwrap();
/// assert_eq!(
///     Err(Error::UnexpectedLength { expected: 30, actual: 3 }),
///     format100::decode(&[100, 0, 0], None)
/// );
/// ```
pub fn decode(bytes: &[u8], session_time: Option<DateTime<Utc>>) -> Result<Observation, Error> {
    if bytes.len() != PAYLOAD_LEN {
        return Err(Error::UnexpectedLength {
            expected: PAYLOAD_LEN,
            actual: bytes.len(),
        });
    }
    let mut reader = BitReader::new(bytes);
    let green_block = GreenBlock::read_from(&mut reader)?;
    let format = green_block.raw[0];
    if format != FORMAT_IDENTIFIER {
        return Err(Error::UnknownFormat(format));
    }
    Ok(Observation::new(&green_block, session_time))
}

/// Encodes physical values, in the table's native units, into a 30 byte payload.
///
/// Fields that aren't provided are sent as missing. The format identifier is always 100.
///
/// # Examples
///
/// ```
/// use eucaws::{format100, OptionalBlocks};
/// let bytes = format100::encode(
///     vec![("air_temperature", 283.9), ("wind_speed", 7.5)],
///     OptionalBlocks::default(),
/// ).unwrap();
/// let observation = format100::decode(&bytes, None).unwrap();
/// assert_eq!(Some(7.5), observation.wind_speed());
/// assert_eq!(None, observation.pressure());
/// ```
pub fn encode<'a, I>(values: I, blocks: OptionalBlocks) -> Result<Vec<u8>, Error>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut raw: Vec<u32> = GREEN_BLOCK.iter().map(Field::missing).collect();
    raw[0] = FORMAT_IDENTIFIER;
    for (name, value) in values {
        let i = *INDEX
            .get(name)
            .ok_or_else(|| Error::UnknownField(name.to_string()))?;
        raw[i] = GREEN_BLOCK[i].encode(Some(value));
    }
    let mut writer = BitWriter::new();
    GreenBlock {
        raw: raw,
        blocks: blocks,
    }.write_to(&mut writer);
    Ok(writer.into_padded_bytes(PAYLOAD_LEN))
}

impl GreenBlock {
    /// Reads the green block and the optional block presence bits.
    ///
    /// Running out of bits is a `TruncatedPayload` error naming the field that couldn't be read.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::{bits::BitReader, format100::GreenBlock, Error};
    /// let mut reader = BitReader::new(&[100, 0, 0, 0]);
    /// match GreenBlock::read_from(&mut reader).unwrap_err() {
    ///     Error::TruncatedPayload { field, .. } => assert_eq!("latitude", field),
    ///     err => panic!("unexpected error: {}", err),
    /// }
    /// ```
    pub fn read_from(reader: &mut BitReader) -> Result<GreenBlock, Error> {
        let mut raw = Vec::with_capacity(GREEN_BLOCK.len());
        for field in GREEN_BLOCK.iter() {
            raw.push(reader.read(field.width).map_err(|underrun| {
                Error::TruncatedPayload {
                    field: field.name,
                    underrun: underrun,
                }
            })?);
        }
        let blocks = OptionalBlocks::read_from(reader).map_err(|underrun| {
            Error::TruncatedPayload {
                field: "optional_blocks",
                underrun: underrun,
            }
        })?;
        Ok(GreenBlock {
            raw: raw,
            blocks: blocks,
        })
    }

    /// Writes the green block and the optional block presence bits.
    pub fn write_to(&self, writer: &mut BitWriter) {
        for (field, &raw) in GREEN_BLOCK.iter().zip(&self.raw) {
            writer.write(raw, field.width);
        }
        self.blocks.write_to(writer);
    }

    /// Returns the raw value of a field, by name.
    pub fn get(&self, name: &str) -> Option<u32> {
        INDEX.get(name).and_then(|&i| self.raw.get(i).cloned())
    }

    /// Returns the physical value of a field in the table's native unit.
    pub fn value(&self, name: &str) -> Option<f64> {
        INDEX
            .get(name)
            .and_then(|&i| self.raw.get(i).and_then(|&raw| GREEN_BLOCK[i].decode(raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hex;

    const SAMPLE: &str = "648003fb4ce06b01bfd21f5dd9beef9bffffffffffff97ed5fffc0f1fe00";

    fn sample() -> Vec<u8> {
        hex::decode(SAMPLE).unwrap()
    }

    #[test]
    fn table() {
        assert_eq!(29, GREEN_BLOCK.len());
        let bits: usize = GREEN_BLOCK.iter().map(|f| usize::from(f.width)).sum();
        assert_eq!(GREEN_BLOCK_BITS, bits + 4);
        assert_eq!(GREEN_BLOCK.len(), INDEX.len());
    }

    #[test]
    fn fixture_matches_sample() {
        assert_eq!(sample().as_slice(), &include_bytes!("../fixtures/green-block.bin")[..]);
    }

    #[test]
    fn reads_exactly_the_green_block() {
        let bytes = sample();
        let mut reader = BitReader::new(&bytes);
        GreenBlock::read_from(&mut reader).unwrap();
        assert_eq!(GREEN_BLOCK_BITS, reader.bits_read());
        assert_eq!(5, reader.bits_remaining());
    }

    #[test]
    fn sample_raw_values() {
        let bytes = sample();
        let green_block = GreenBlock::read_from(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(Some(100), green_block.get("format_identifier"));
        assert_eq!(Some(25), green_block.get("year"));
        assert_eq!(Some(12), green_block.get("month"));
        assert_eq!(Some(3), green_block.get("day"));
        assert_eq!(Some(11), green_block.get("hour"));
        assert_eq!(Some(0), green_block.get("minute"));
        assert_eq!(Some(1497), green_block.get("pressure"));
        assert_eq!(Some(1023), green_block.get("wind_speed"));
        assert_eq!(Some(607), green_block.get("air_temperature"));
        assert_eq!(Some(4095), green_block.get("sea_surface_temperature"));
        assert_eq!(None, green_block.get("visibility"));
        assert_eq!(Some(99970.), green_block.value("pressure"));
        assert_eq!(None, green_block.value("wind_speed"));
        assert_eq!(OptionalBlocks::default(), green_block.blocks);
    }

    #[test]
    fn sample_observation() {
        let session_time = Utc.ymd(2025, 12, 3).and_hms(11, 0, 15);
        let observation = decode(&sample(), Some(session_time)).unwrap();
        assert_eq!(Some(999.7), observation.pressure());
        assert_eq!(Some(1002.7), observation.value("msl_pressure"));
        assert_eq!(None, observation.wind_speed());
        assert_eq!(None, observation.wind_direction());
        assert_eq!(None, observation.sea_surface_temperature());
        assert!((observation.air_temperature().unwrap() - 10.75).abs() < 1e-9);
        assert!((observation.relative_humidity().unwrap() - 72.5).abs() < 1e-9);
        assert!((observation.latitude().unwrap() - 53.3).abs() < 1e-9);
        assert!((observation.longitude().unwrap() + 6.13).abs() < 1e-9);
        assert!((observation.value("battery_voltage").unwrap() - 24.2).abs() < 1e-9);
        assert!((observation.value("processor_temperature").unwrap() - 20.).abs() < 1e-9);
        assert_eq!(Some(-0.1), observation.value("pressure_change"));
        assert_eq!(Some(7.), observation.value("pressure_tendency"));
        assert_eq!(Some(3.), observation.value("loadline_departure"));
        assert_eq!(None, observation.value("gps_height"));
        assert_eq!(
            Some(Utc.ymd(2025, 12, 3).and_hms(11, 0, 0)),
            observation.timestamp
        );
        assert!(!observation.callsign_encrypted());
        assert!(!observation.is_low_confidence());
    }

    #[test]
    fn unexpected_length() {
        let mut bytes = sample();
        bytes.push(0);
        assert_eq!(
            Error::UnexpectedLength {
                expected: 30,
                actual: 31,
            },
            decode(&bytes, None).unwrap_err()
        );
        assert_eq!(
            Error::UnexpectedLength {
                expected: 30,
                actual: 0,
            },
            decode(&[], None).unwrap_err()
        );
    }

    #[test]
    fn unexpected_length_ignores_content() {
        assert_eq!(
            Error::UnexpectedLength {
                expected: 30,
                actual: 29,
            },
            decode(&sample()[..29], None).unwrap_err()
        );
    }

    #[test]
    fn unknown_format() {
        let mut bytes = sample();
        bytes[0] = 101;
        assert_eq!(Error::UnknownFormat(101), decode(&bytes, None).unwrap_err());
    }

    #[test]
    fn truncated_payload() {
        let bytes = sample();
        let mut reader = BitReader::new(&bytes[..29]);
        match GreenBlock::read_from(&mut reader).unwrap_err() {
            Error::TruncatedPayload { field, underrun } => {
                assert_eq!("optional_blocks", field);
                assert_eq!(231, underrun.position);
                assert_eq!(1, underrun.remaining);
            }
            err => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn encode_then_decode() {
        let values = vec![
            ("course_over_ground", 185.),
            ("speed_over_ground", 6.5),
            ("year", 2024.),
            ("month", 2.),
            ("day", 29.),
            ("hour", 23.),
            ("minute", 59.),
            ("latitude", -45.67),
            ("longitude", 170.25),
            ("pressure", 101320.),
            ("wind_direction", 270.),
            ("wind_speed", 12.3),
            ("air_temperature", 268.2),
            ("relative_humidity", 88.8),
            ("sea_surface_temperature", 275.4),
            ("gps_height", 22.),
        ];
        let blocks = OptionalBlocks {
            visual: false,
            wave: true,
            ice: false,
            other: true,
        };
        let bytes = encode(values.clone(), blocks).unwrap();
        assert_eq!(PAYLOAD_LEN, bytes.len());
        assert_eq!(0, bytes[29] & 0b0001_1111);

        let green_block = GreenBlock::read_from(&mut BitReader::new(&bytes)).unwrap();
        for (name, value) in values {
            let decoded = green_block.value(name).unwrap();
            let slope = field(name).unwrap().slope;
            assert!(
                (decoded - value).abs() < slope / 2.,
                "{}: {} != {}",
                name,
                decoded,
                value
            );
        }
        assert_eq!(None, green_block.value("msl_pressure"));
        assert_eq!(blocks, green_block.blocks);

        let observation = decode(&bytes, None).unwrap();
        assert_eq!(
            Some(Utc.ymd(2024, 2, 29).and_hms(23, 59, 0)),
            observation.timestamp
        );
        assert!(observation.blocks.wave);
        assert!(observation.blocks.other);
    }

    #[test]
    fn encode_unknown_field() {
        assert_eq!(
            Error::UnknownField("visibility".to_string()),
            encode(vec![("visibility", 10.)], OptionalBlocks::default()).unwrap_err()
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        let a = decode(&sample(), None).unwrap();
        let b = decode(&sample(), None).unwrap();
        assert_eq!(a, b);
    }
}
