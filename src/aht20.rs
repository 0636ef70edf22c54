use core::fmt;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::warn;
use thiserror::Error;

use crate::reading::{Measurement, PlausibleRange, Reading, RELATIVE_HUMIDITY_RANGE};
use crate::retry::{Exhausted, RetryPolicy};

/// The sensor's fixed I2C address.
pub const DEFAULT_ADDRESS: u8 = 0x38;

pub const TEMPERATURE_RANGE: PlausibleRange = PlausibleRange::new(-40.0, 100.0);

const SOFT_RESET_TIME: Duration = Duration::from_millis(20);
const INITIALIZATION_TIME: Duration = Duration::from_millis(50);
const MEASUREMENT_TIME: Duration = Duration::from_millis(100);

// Both raw values are 20 bits wide.
const FULL_SCALE: f64 = 1_048_576.0;

#[repr(u8)]
#[derive(Clone, Copy, Debug)]
enum Command {
    SoftReset = 0xBA,
    // Followed by 0x08, 0x00.
    Initialize = 0xBE,
    // Followed by 0x33, 0x00.
    TriggerMeasurement = 0xAC,
}

const INITIALIZE_PARAMETERS: [u8; 2] = [0x08, 0x00];
const MEASUREMENT_PARAMETERS: [u8; 2] = [0x33, 0x00];

#[derive(Debug, Error, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the I2C bus.
    #[error("I2C error: {0:?}")]
    Wrapped(TIoError),
    /// The status byte did not have the calibration bit set after initialization.
    #[error("sensor reports it is not calibrated (status {0:#04x})")]
    NotCalibrated(u8),
    /// The measurement was still in progress when the result was read.
    #[error("sensor busy")]
    Busy,
    #[error("reading out of range: humidity {humidity}%, temperature {temperature}C")]
    OutOfRange { humidity: f32, temperature: f32 },
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

/// The sensor's status byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    pub fn is_busy(&self) -> bool {
        self.0 & 0x80 != 0
    }

    pub fn is_calibrated(&self) -> bool {
        self.0 & 0x08 != 0
    }
}

/// What to do when initialization finds the calibration bit cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationCheck {
    /// Log a warning and measure anyway.
    Warn,
    /// Treat it as a failed attempt.
    Require,
}

/// Options to modify the behavior of the AHT20 driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Options {
    pub address: u8,
    pub calibration_check: CalibrationCheck,
}

pub const DEFAULT_OPTIONS: Options = Options {
    address: DEFAULT_ADDRESS,
    calibration_check: CalibrationCheck::Warn,
};

impl Default for Options {
    fn default() -> Self {
        DEFAULT_OPTIONS
    }
}

/// The two 20-bit values packed into a measurement.
#[derive(Debug, PartialEq)]
pub struct Aht20Response {
    pub raw_humidity: u32,
    pub raw_temperature: u32,
}

impl Aht20Response {
    /// Unpacks a measurement. Byte 0 is the status byte and is ignored.
    pub fn from_raw_bytes(bytes: &[u8; 6]) -> Aht20Response {
        Aht20Response {
            raw_humidity: (bytes[1] as u32) << 12 | (bytes[2] as u32) << 4 | (bytes[3] as u32) >> 4,
            raw_temperature: ((bytes[3] & 0x0F) as u32) << 16
                | (bytes[4] as u32) << 8
                | bytes[5] as u32,
        }
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> f32 {
        (self.raw_humidity as f64 * 100.0 / FULL_SCALE) as f32
    }

    /// Degrees Celsius.
    pub fn temperature(&self) -> f32 {
        (self.raw_temperature as f64 * 200.0 / FULL_SCALE - 50.0) as f32
    }
}

impl Reading for Aht20Response {
    fn measurements(&self) -> Vec<Measurement> {
        vec![
            Measurement::Humidity(self.humidity()),
            Measurement::Temperature(self.temperature()),
        ]
    }

    fn is_plausible(&self) -> bool {
        RELATIVE_HUMIDITY_RANGE.contains(self.humidity())
            && TEMPERATURE_RANGE.contains(self.temperature())
    }
}

/// An AHT20 humidity and temperature sensor on an I2C bus.
#[derive(Debug)]
pub struct Aht20<TI2c> {
    i2c: TI2c,
    options: Options,
}

impl<TI2c, TError> Aht20<TI2c>
where
    TI2c: I2c<Error = TError>,
    TError: fmt::Debug,
{
    /// If options is `None`, [`DEFAULT_OPTIONS`] are used.
    pub fn new(i2c: TI2c, options: Option<Options>) -> Aht20<TI2c> {
        Aht20 {
            i2c,
            options: options.unwrap_or(DEFAULT_OPTIONS),
        }
    }

    /// Soft-resets and initializes the sensor, then checks the calibration bit.
    ///
    /// Returns [`Error::NotCalibrated`] if the bit is clear, regardless of
    /// [`Options::calibration_check`]; callers decide whether that is fatal.
    pub fn init<TDelay: DelayNs>(&mut self, delay: &mut TDelay) -> Result<Status, Error<TError>> {
        let address = self.options.address;
        self.i2c.write(address, &[Command::SoftReset as u8])?;
        delay.delay_ms(SOFT_RESET_TIME.as_millis() as u32);

        let [first, second] = INITIALIZE_PARAMETERS;
        self.i2c
            .write(address, &[Command::Initialize as u8, first, second])?;
        delay.delay_ms(INITIALIZATION_TIME.as_millis() as u32);

        let status = self.read_status()?;
        if !status.is_calibrated() {
            return Err(Error::NotCalibrated(status.0));
        }
        Ok(status)
    }

    /// Triggers one measurement and waits for it.
    ///
    /// Fails with [`Error::Busy`] if the sensor has not finished after the fixed wait, and with
    /// [`Error::OutOfRange`] if the values are implausible.
    pub fn measure<TDelay: DelayNs>(
        &mut self,
        delay: &mut TDelay,
    ) -> Result<Aht20Response, Error<TError>> {
        let address = self.options.address;
        let [first, second] = MEASUREMENT_PARAMETERS;
        self.i2c
            .write(address, &[Command::TriggerMeasurement as u8, first, second])?;
        delay.delay_ms(MEASUREMENT_TIME.as_millis() as u32);

        if self.read_status()?.is_busy() {
            return Err(Error::Busy);
        }

        let mut data = [0u8; 6];
        self.i2c.read(address, &mut data)?;
        let response = Aht20Response::from_raw_bytes(&data);
        if !response.is_plausible() {
            return Err(Error::OutOfRange {
                humidity: response.humidity(),
                temperature: response.temperature(),
            });
        }
        Ok(response)
    }

    /// Measures until a plausible response arrives or `policy` gives up.
    ///
    /// Expects [`Aht20::init`] to have been called. Every retry re-initializes the sensor before
    /// measuring again.
    pub fn read<TDelay: DelayNs>(
        &mut self,
        delay: &mut TDelay,
        policy: &RetryPolicy,
    ) -> Result<Aht20Response, Exhausted<Error<TError>>> {
        policy.run(delay, |attempt, delay| {
            if attempt > 1 {
                self.reinit(delay)?;
            }
            self.measure(delay)
        })
    }

    /// Runs [`Aht20::init`], applying [`Options::calibration_check`] to a cleared calibration bit.
    pub fn reinit<TDelay: DelayNs>(&mut self, delay: &mut TDelay) -> Result<(), Error<TError>> {
        match self.init(delay) {
            Ok(_) => Ok(()),
            Err(Error::NotCalibrated(status))
                if self.options.calibration_check == CalibrationCheck::Warn =>
            {
                warn!(
                    "AHT20 not calibrated (status {:#04x}), measuring anyway",
                    status
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Releases the bus.
    pub fn into_inner(self) -> TI2c {
        self.i2c
    }

    fn read_status(&mut self) -> Result<Status, Error<TError>> {
        let mut status = [0u8; 1];
        self.i2c.read(self.options.address, &mut status)?;
        Ok(Status(status[0]))
    }
}
