use embedded_hal::delay::DelayNs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::reading::{Measurement, PlausibleRange, Reading};
use crate::retry::{Exhausted, RetryPolicy};

/// Where the kernel's w1 bus driver lists its devices.
pub const DEFAULT_W1_ROOT: &str = "/sys/bus/w1/devices";

/// Every DS18B20 device directory starts with the sensor's family code.
pub const FAMILY_PREFIX: &str = "28-";

/// The file w1-therm exposes for each sensor.
pub const SLAVE_FILE: &str = "w1_slave";

/// The sensor's rated operating range.
pub const TEMPERATURE_RANGE: PlausibleRange = PlausibleRange::new(-55.0, 125.0);

const CRC_VALID_MARKER: &str = "YES";
const TEMPERATURE_MARKER: &str = "t=";

#[derive(Debug, Error)]
pub enum Error {
    /// The w1 device root could not be listed, usually because the kernel modules are not loaded.
    #[error("cannot open {}", root.display())]
    BusUnavailable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no DS18B20 sensor found")]
    SensorNotFound,
    #[error("DS18B20 sensor with serial {0} not found")]
    SerialNotFound(String),
    #[error("cannot read device file {}", path.display())]
    DeviceFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The kernel's CRC check on the scratchpad did not report `YES`.
    #[error("CRC not valid")]
    CrcNotValid,
    #[error("no temperature marker in device file")]
    MarkerMissing,
    #[error("unparseable temperature value {0:?}")]
    InvalidValue(String),
    #[error("temperature out of valid range: {0:.1}")]
    OutOfRange(f32),
}

/// A temperature as reported by w1-therm, in thousandths of a degree Celsius.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Temperature {
    millidegrees: i32,
}

impl Temperature {
    pub fn from_millidegrees(millidegrees: i32) -> Temperature {
        Temperature { millidegrees }
    }

    pub fn millidegrees(&self) -> i32 {
        self.millidegrees
    }

    pub fn celsius(&self) -> f32 {
        f32::from(*self)
    }
}

impl From<Temperature> for f32 {
    fn from(temp: Temperature) -> Self {
        temp.millidegrees as f32 / 1000.0
    }
}

impl From<Temperature> for f64 {
    fn from(temp: Temperature) -> Self {
        temp.millidegrees as f64 / 1000.0
    }
}

impl Reading for Temperature {
    fn measurements(&self) -> Vec<Measurement> {
        vec![Measurement::Temperature(self.celsius())]
    }

    fn is_plausible(&self) -> bool {
        TEMPERATURE_RANGE.contains(self.celsius())
    }
}

/// Parses the two-line `w1_slave` format:
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
///
/// Range is not checked here.
pub fn parse(contents: &str) -> Result<Temperature, Error> {
    let mut lines = contents.lines();
    let crc_line = lines.next().ok_or(Error::CrcNotValid)?;
    if !crc_line.contains(CRC_VALID_MARKER) {
        return Err(Error::CrcNotValid);
    }

    let data_line = lines.next().ok_or(Error::MarkerMissing)?;
    let start = data_line
        .find(TEMPERATURE_MARKER)
        .ok_or(Error::MarkerMissing)?;
    let value = &data_line[start + TEMPERATURE_MARKER.len()..];
    let millidegrees =
        leading_integer(value).ok_or_else(|| Error::InvalidValue(value.trim().to_string()))?;
    Ok(Temperature::from_millidegrees(millidegrees))
}

/// Reads an optionally signed decimal prefix, ignoring anything after it.
fn leading_integer(value: &str) -> Option<i32> {
    let value = value.trim_start();
    let sign_len = if value.starts_with(['-', '+']) { 1 } else { 0 };
    let digits_len = value[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    value[..sign_len + digits_len].parse().ok()
}

/// A DS18B20 exposed by the kernel's w1-therm driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ds18b20 {
    path: PathBuf,
}

impl Ds18b20 {
    /// Finds a sensor under `root`.
    ///
    /// With a serial, only the device directory with exactly that name matches. Without one, the
    /// first `28-` directory in name order is used.
    pub fn locate(root: &Path, serial: Option<&str>) -> Result<Ds18b20, Error> {
        let entries = fs::read_dir(root).map_err(|source| Error::BusUnavailable {
            root: root.to_path_buf(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(FAMILY_PREFIX))
            .collect();
        names.sort();

        let name = match serial {
            Some(serial) => names
                .into_iter()
                .find(|name| name == serial)
                .ok_or_else(|| Error::SerialNotFound(serial.to_string()))?,
            None => names.into_iter().next().ok_or(Error::SensorNotFound)?,
        };
        Ok(Ds18b20::from_path(root.join(name).join(SLAVE_FILE)))
    }

    /// Uses the given `w1_slave` file directly.
    pub fn from_path(path: PathBuf) -> Ds18b20 {
        Ds18b20 { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the device file once and checks the range.
    pub fn read_once(&self) -> Result<Temperature, Error> {
        let contents = fs::read_to_string(&self.path).map_err(|source| Error::DeviceFile {
            path: self.path.clone(),
            source,
        })?;
        let temperature = parse(&contents)?;
        if !temperature.is_plausible() {
            return Err(Error::OutOfRange(temperature.celsius()));
        }
        Ok(temperature)
    }

    /// Reads until a valid temperature arrives or `policy` gives up.
    pub fn read<TDelay: DelayNs>(
        &self,
        delay: &mut TDelay,
        policy: &RetryPolicy,
    ) -> Result<Temperature, Exhausted<Error>> {
        policy.run(delay, |_, _| self.read_once())
    }
}
