//! Renders readings as InfluxDB line protocol.
//!
//! Only the subset the readers need is produced: `measurement,tag=value,... field=value,...`
//! without a timestamp, so the collecting agent stamps the line on arrival. Nothing is escaped;
//! tag values are hostnames, pin numbers and sensor names, and field values are numbers.

use core::fmt;

use crate::reading::{Measurement, Reading};

/// The measurement name every reader writes under unless configured otherwise.
pub const DEFAULT_MEASUREMENT: &str = "Weather";

pub const HOST_TAG: &str = "host";
pub const PIN_TAG: &str = "pinnum";
pub const SENSOR_TAG: &str = "sensor_type_name";

/// How a field's number is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    /// Fixed number of digits after the decimal point.
    Decimals(usize),
    /// Truncated towards zero and written as an integer.
    Integer,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    Float { value: f32, decimals: usize },
    Integer(i64),
}

impl FieldValue {
    pub fn with_precision(value: f32, precision: Precision) -> FieldValue {
        match precision {
            Precision::Decimals(decimals) => FieldValue::Float { value, decimals },
            // `as` saturates and truncates towards zero.
            Precision::Integer => FieldValue::Integer(value as i64),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float { value, decimals } => write!(f, "{:.*}", decimals, value),
            FieldValue::Integer(value) => write!(f, "{}", value),
        }
    }
}

/// One line-protocol record.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Point {
        Point {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Appends a tag. Tags are written in insertion order.
    pub fn tag(mut self, key: &str, value: impl fmt::Display) -> Point {
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    pub fn field(mut self, key: &str, value: FieldValue) -> Point {
        self.fields.push((key.to_string(), value));
        self
    }

    /// Appends a measurement under its own field name.
    pub fn measurement(self, measurement: &Measurement, precision: Precision) -> Point {
        self.field(
            measurement.field_name(),
            FieldValue::with_precision(measurement.value(), precision),
        )
    }

    /// Appends every measurement of a reading, all at the same precision.
    pub fn reading(self, reading: &impl Reading, precision: Precision) -> Point {
        reading
            .measurements()
            .iter()
            .fold(self, |point, measurement| {
                point.measurement(measurement, precision)
            })
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.measurement)?;
        for (key, value) in self.tags.iter() {
            write!(f, ",{}={}", key, value)?;
        }
        for (i, (key, value)) in self.fields.iter().enumerate() {
            let separator = if i == 0 { ' ' } else { ',' };
            write!(f, "{}{}={}", separator, key, value)?;
        }
        Ok(())
    }
}

/// Formats a single record without the trailing newline.
pub fn format(measurement: &str, tags: &[(&str, &str)], fields: &[(&str, FieldValue)]) -> String {
    let point = tags
        .iter()
        .fold(Point::new(measurement), |point, (key, value)| {
            point.tag(key, value)
        });
    fields
        .iter()
        .fold(point, |point, (key, value)| point.field(key, *value))
        .to_string()
}
