//! Bit-field descriptions: how wide a field is and how to turn its bits into a physical value.

use std::fmt;

/// Decoded values within this distance of a range limit are still in range.
const RANGE_TOLERANCE: f64 = 1e-9;

/// One entry of a payload's field table.
///
/// The physical value of a field is `raw * slope + offset`, in `unit`. All ones is the missing
/// value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Field {
    /// The field name.
    pub name: &'static str,

    /// The number of bits.
    pub width: u8,

    /// The multiplier applied to the raw value.
    pub slope: f64,

    /// The value added after scaling.
    pub offset: f64,

    /// The smallest physically sensible value.
    pub min: f64,

    /// The largest physically sensible value.
    pub max: f64,

    /// The unit of the scaled value.
    pub unit: Unit,
}

/// Units of measure.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Code,
    Flag,
    Degree,
    MetrePerSecond,
    Metre,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Pascal,
    Hectopascal,
    Kelvin,
    Celsius,
    Percent,
    Volt,
}

impl Field {
    /// Returns the all-ones missing value for this field's width.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::format100;
    /// let wind_speed = format100::field("wind_speed").unwrap();
    /// assert_eq!(1023, wind_speed.missing());
    /// ```
    pub fn missing(&self) -> u32 {
        ((1u64 << self.width) - 1) as u32
    }

    /// Turns a raw value into a physical value, or `None` if the raw value is the missing value.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::format100;
    /// let pressure = format100::field("pressure").unwrap();
    /// assert_eq!(Some(99970.), pressure.decode(1497));
    /// assert_eq!(None, pressure.decode(2047));
    /// ```
    pub fn decode(&self, raw: u32) -> Option<f64> {
        if raw == self.missing() {
            None
        } else {
            Some(f64::from(raw) * self.slope + self.offset)
        }
    }

    /// Turns a physical value into the nearest raw value, or the missing value for `None`.
    ///
    /// Values that don't fit are clamped so they never collide with the missing value.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::format100;
    /// let air_temperature = format100::field("air_temperature").unwrap();
    /// assert_eq!(607, air_temperature.encode(Some(283.9)));
    /// assert_eq!(1023, air_temperature.encode(None));
    /// ```
    pub fn encode(&self, value: Option<f64>) -> u32 {
        match value {
            Some(value) => {
                let raw = ((value - self.offset) / self.slope).round();
                if raw <= 0. {
                    0
                } else if raw >= f64::from(self.missing() - 1) {
                    self.missing() - 1
                } else {
                    raw as u32
                }
            }
            None => self.missing(),
        }
    }

    /// Returns true if the physical value is within this field's sensible range.
    pub fn in_range(&self, value: f64) -> bool {
        value >= self.min - RANGE_TOLERANCE && value <= self.max + RANGE_TOLERANCE
    }
}

impl Unit {
    /// Converts a value in this unit to the unit it's reported in.
    ///
    /// Kelvin become Celsius, Pascals become hectopascals, and everything else stays put.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::Unit;
    /// assert_eq!(999.7, Unit::Pascal.convert(99970.));
    /// assert_eq!(0., Unit::Kelvin.convert(273.15));
    /// assert_eq!(42., Unit::Percent.convert(42.));
    /// ```
    pub fn convert(&self, value: f64) -> f64 {
        match *self {
            Unit::Kelvin => value - 273.15,
            Unit::Pascal => value / 100.,
            _ => value,
        }
    }

    /// Returns the unit that `convert` produces.
    ///
    /// # Examples
    ///
    /// ```
    /// use eucaws::Unit;
    /// assert_eq!(Unit::Celsius, Unit::Kelvin.converted());
    /// assert_eq!(Unit::Degree, Unit::Degree.converted());
    /// ```
    pub fn converted(&self) -> Unit {
        match *self {
            Unit::Kelvin => Unit::Celsius,
            Unit::Pascal => Unit::Hectopascal,
            unit => unit,
        }
    }

    /// Returns a short symbol for this unit.
    pub fn symbol(&self) -> &'static str {
        match *self {
            Unit::Code | Unit::Flag => "",
            Unit::Degree => "deg",
            Unit::MetrePerSecond => "m/s",
            Unit::Metre => "m",
            Unit::Year => "yr",
            Unit::Month => "mon",
            Unit::Day => "d",
            Unit::Hour => "h",
            Unit::Minute => "min",
            Unit::Pascal => "Pa",
            Unit::Hectopascal => "hPa",
            Unit::Kelvin => "K",
            Unit::Celsius => "C",
            Unit::Percent => "%",
            Unit::Volt => "V",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
