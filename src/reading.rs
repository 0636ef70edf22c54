/// A single physical quantity decoded from a sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Measurement {
    /// Degrees Celsius.
    Temperature(f32),
    /// Relative humidity in percent.
    Humidity(f32),
    /// Hectopascals.
    Pressure(f32),
}

impl Measurement {
    /// The line-protocol field key for this quantity.
    pub fn field_name(&self) -> &'static str {
        match self {
            Measurement::Temperature(_) => "temperature",
            Measurement::Humidity(_) => "humidity",
            Measurement::Pressure(_) => "pressure",
        }
    }

    pub fn value(&self) -> f32 {
        match *self {
            Measurement::Temperature(value)
            | Measurement::Humidity(value)
            | Measurement::Pressure(value) => value,
        }
    }
}

/// An inclusive window of values a sensor can physically report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlausibleRange {
    pub min: f32,
    pub max: f32,
}

impl PlausibleRange {
    pub const fn new(min: f32, max: f32) -> PlausibleRange {
        PlausibleRange { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const RELATIVE_HUMIDITY_RANGE: PlausibleRange = PlausibleRange::new(0.0, 100.0);

/// A validated result from one sensor read.
pub trait Reading {
    /// The decoded quantities, in the order they are written out.
    fn measurements(&self) -> Vec<Measurement>;

    /// Whether every quantity lies inside its sensor's plausible range.
    fn is_plausible(&self) -> bool;
}
