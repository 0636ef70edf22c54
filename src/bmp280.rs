use core::fmt;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use thiserror::Error;

use crate::reading::{Measurement, PlausibleRange, Reading};
use crate::retry::{Exhausted, RetryPolicy};

/// The address with SDO pulled high.
pub const DEFAULT_ADDRESS: u8 = 0x77;
/// The address with SDO pulled low.
pub const SECONDARY_ADDRESS: u8 = 0x76;

pub const TEMPERATURE_RANGE: PlausibleRange = PlausibleRange::new(-40.0, 100.0);
/// Hectopascals.
pub const PRESSURE_RANGE: PlausibleRange = PlausibleRange::new(300.0, 1300.0);

const CALIBRATION_REGISTER: u8 = 0x88;
const CALIBRATION_LENGTH: usize = 24;
const PRESSURE_DATA_REGISTER: u8 = 0xF7;
const TEMPERATURE_DATA_REGISTER: u8 = 0xFA;
const CONTROL_REGISTER: u8 = 0xF4;

// osrs_t = x4 (0b011), osrs_p = x4 (0b011), mode = normal (0b11).
const CONTROL_NORMAL_X4: u8 = 0b011_011_11;

// Longest conversion at x4/x4 oversampling is 13.3ms.
const FIRST_CONVERSION_TIME: Duration = Duration::from_millis(20);

#[derive(Debug, Error, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the I2C bus.
    #[error("I2C error: {0:?}")]
    Wrapped(TIoError),
    /// The pressure formula's divisor came out as zero, usually from an unreadable calibration.
    #[error("pressure compensation divisor is zero")]
    DivisionGuard,
    #[error("reading out of range: temperature {temperature}C, pressure {pressure}hPa")]
    OutOfRange { temperature: f32, pressure: f32 },
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

/// Trimming coefficients burned into each sensor at the factory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

/// The result of temperature compensation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompensatedTemperature {
    /// Hundredths of a degree Celsius.
    pub centi_celsius: i32,
    /// Fine temperature carried into pressure compensation.
    pub t_fine: i32,
}

impl Calibration {
    /// Unpacks the 24-byte calibration block, which holds little-endian pairs.
    pub fn from_bytes(bytes: &[u8; CALIBRATION_LENGTH]) -> Calibration {
        let unsigned = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let signed = |i: usize| i16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Calibration {
            t1: unsigned(0),
            t2: signed(2),
            t3: signed(4),
            p1: unsigned(6),
            p2: signed(8),
            p3: signed(10),
            p4: signed(12),
            p5: signed(14),
            p6: signed(16),
            p7: signed(18),
            p8: signed(20),
            p9: signed(22),
        }
    }

    /// Bosch's 32-bit fixed-point temperature compensation.
    pub fn compensate_temperature(&self, adc_t: i32) -> CompensatedTemperature {
        let t1 = self.t1 as i32;
        let t2 = self.t2 as i32;
        let t3 = self.t3 as i32;

        let var1 = ((adc_t >> 3).wrapping_sub(t1 << 1)).wrapping_mul(t2) >> 11;
        let delta = (adc_t >> 4).wrapping_sub(t1);
        let var2 = ((delta.wrapping_mul(delta) >> 12).wrapping_mul(t3)) >> 14;
        let t_fine = var1.wrapping_add(var2);
        CompensatedTemperature {
            centi_celsius: t_fine.wrapping_mul(5).wrapping_add(128) >> 8,
            t_fine,
        }
    }

    /// Bosch's 32-bit fixed-point pressure compensation, in pascals.
    ///
    /// Returns `None` when the divisor is zero.
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> Option<u32> {
        let p1 = self.p1 as i32;
        let p2 = self.p2 as i32;
        let p3 = self.p3 as i32;
        let p4 = self.p4 as i32;
        let p5 = self.p5 as i32;
        let p6 = self.p6 as i32;
        let p7 = self.p7 as i32;
        let p8 = self.p8 as i32;
        let p9 = self.p9 as i32;

        let mut var1 = (t_fine >> 1).wrapping_sub(64000);
        let quarter_squared = (var1 >> 2).wrapping_mul(var1 >> 2);
        let mut var2 = (quarter_squared >> 11).wrapping_mul(p6);
        var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 1);
        var2 = (var2 >> 2).wrapping_add(p4 << 16);
        var1 = (p3.wrapping_mul(quarter_squared >> 13) >> 3)
            .wrapping_add(p2.wrapping_mul(var1) >> 1)
            >> 18;
        var1 = (32768i32.wrapping_add(var1)).wrapping_mul(p1) >> 15;
        if var1 == 0 {
            return None;
        }

        let mut pressure = (1_048_576i32.wrapping_sub(adc_p).wrapping_sub(var2 >> 12) as u32)
            .wrapping_mul(3125);
        if pressure < 0x8000_0000 {
            pressure = (pressure << 1) / var1 as u32;
        } else {
            pressure = (pressure / var1 as u32).wrapping_mul(2);
        }
        let eighth_squared = (pressure >> 3).wrapping_mul(pressure >> 3) >> 13;
        let var1 = p9.wrapping_mul(eighth_squared as i32) >> 12;
        let var2 = ((pressure >> 2) as i32).wrapping_mul(p8) >> 13;
        let correction = var1.wrapping_add(var2).wrapping_add(p7) >> 4;
        Some((pressure as i32).wrapping_add(correction) as u32)
    }
}

/// Combines a 20-bit, left-aligned ADC reading.
pub fn adc_value(bytes: [u8; 3]) -> i32 {
    (bytes[0] as i32) << 12 | (bytes[1] as i32) << 4 | (bytes[2] as i32) >> 4
}

/// A compensated temperature and pressure pair.
#[derive(Debug, PartialEq)]
pub struct Bmp280Response {
    pub temperature_centi_celsius: i32,
    pub pressure_pa: u32,
}

impl Bmp280Response {
    /// Compensates one pair of ADC readings.
    pub fn compensate<TIoError>(
        calibration: &Calibration,
        adc_t: i32,
        adc_p: i32,
    ) -> Result<Bmp280Response, Error<TIoError>> {
        let temperature = calibration.compensate_temperature(adc_t);
        let pressure_pa = calibration
            .compensate_pressure(adc_p, temperature.t_fine)
            .ok_or(Error::DivisionGuard)?;
        Ok(Bmp280Response {
            temperature_centi_celsius: temperature.centi_celsius,
            pressure_pa,
        })
    }

    /// Degrees Celsius.
    pub fn temperature(&self) -> f32 {
        self.temperature_centi_celsius as f32 / 100.0
    }

    /// Hectopascals.
    pub fn pressure(&self) -> f32 {
        self.pressure_pa as f32 / 100.0
    }

    /// Hectopascals truncated to the integer that gets written out.
    pub fn whole_hectopascals(&self) -> u32 {
        self.pressure_pa / 100
    }
}

impl Reading for Bmp280Response {
    fn measurements(&self) -> Vec<Measurement> {
        vec![
            Measurement::Pressure(self.pressure()),
            Measurement::Temperature(self.temperature()),
        ]
    }

    fn is_plausible(&self) -> bool {
        TEMPERATURE_RANGE.contains(self.temperature())
            && PRESSURE_RANGE.contains(self.whole_hectopascals() as f32)
    }
}

/// A BMP280 pressure and temperature sensor on an I2C bus.
#[derive(Debug)]
pub struct Bmp280<TI2c> {
    i2c: TI2c,
    address: u8,
}

impl<TI2c, TError> Bmp280<TI2c>
where
    TI2c: I2c<Error = TError>,
    TError: fmt::Debug,
{
    pub fn new(i2c: TI2c, address: u8) -> Bmp280<TI2c> {
        Bmp280 { i2c, address }
    }

    /// Reads the calibration block and starts continuous measurement.
    ///
    /// Waits for the first conversion so an immediate [`Bmp280::measure`] sees real data
    /// rather than the reset value.
    pub fn init<TDelay: DelayNs>(
        &mut self,
        delay: &mut TDelay,
    ) -> Result<Calibration, Error<TError>> {
        let mut bytes = [0u8; CALIBRATION_LENGTH];
        self.i2c
            .write_read(self.address, &[CALIBRATION_REGISTER], &mut bytes)?;
        self.i2c
            .write(self.address, &[CONTROL_REGISTER, CONTROL_NORMAL_X4])?;
        delay.delay_ms(FIRST_CONVERSION_TIME.as_millis() as u32);
        Ok(Calibration::from_bytes(&bytes))
    }

    /// Reads the raw temperature and pressure ADC values, in that order.
    pub fn read_raw(&mut self) -> Result<(i32, i32), Error<TError>> {
        let mut temperature = [0u8; 3];
        self.i2c
            .write_read(self.address, &[TEMPERATURE_DATA_REGISTER], &mut temperature)?;
        let mut pressure = [0u8; 3];
        self.i2c
            .write_read(self.address, &[PRESSURE_DATA_REGISTER], &mut pressure)?;
        Ok((adc_value(temperature), adc_value(pressure)))
    }

    /// Reads and compensates one measurement.
    pub fn measure(&mut self, calibration: &Calibration) -> Result<Bmp280Response, Error<TError>> {
        let (adc_t, adc_p) = self.read_raw()?;
        let response = Bmp280Response::compensate(calibration, adc_t, adc_p)?;
        if !response.is_plausible() {
            return Err(Error::OutOfRange {
                temperature: response.temperature(),
                pressure: response.pressure(),
            });
        }
        Ok(response)
    }

    /// Measures until a plausible response arrives or `policy` gives up.
    ///
    /// The first attempt uses `calibration` from [`Bmp280::init`]; every retry reads the
    /// calibration again before measuring.
    pub fn read<TDelay: DelayNs>(
        &mut self,
        delay: &mut TDelay,
        policy: &RetryPolicy,
        calibration: Calibration,
    ) -> Result<Bmp280Response, Exhausted<Error<TError>>> {
        let mut calibration = calibration;
        policy.run(delay, |attempt, delay| {
            if attempt > 1 {
                calibration = self.init(delay)?;
            }
            self.measure(&calibration)
        })
    }

    /// Releases the bus.
    pub fn into_inner(self) -> TI2c {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    // Example values from the BMP280 datasheet, section 8.2.
    const DATASHEET_CALIBRATION: Calibration = Calibration {
        t1: 27504,
        t2: 26435,
        t3: -1000,
        p1: 36477,
        p2: -10685,
        p3: 3024,
        p4: 2855,
        p5: 140,
        p6: -7,
        p7: 15500,
        p8: -14600,
        p9: 6000,
    };
    const DATASHEET_ADC_T: i32 = 519888;
    const DATASHEET_ADC_P: i32 = 415148;

    #[test]
    fn datasheet_temperature() {
        let temperature = DATASHEET_CALIBRATION.compensate_temperature(DATASHEET_ADC_T);

        assert_eq!(temperature.t_fine, 128422);
        assert_eq!(temperature.centi_celsius, 2508);
    }

    #[test]
    fn datasheet_pressure() {
        let pressure = DATASHEET_CALIBRATION.compensate_pressure(DATASHEET_ADC_P, 128422);

        assert_eq!(pressure, Some(100656));
    }

    #[test]
    fn datasheet_response() {
        let response = Bmp280Response::compensate::<Infallible>(
            &DATASHEET_CALIBRATION,
            DATASHEET_ADC_T,
            DATASHEET_ADC_P,
        )
        .unwrap();

        assert_eq!(response.temperature(), 25.08);
        assert_eq!(response.pressure(), 1006.56);
        assert!(response.is_plausible());
    }

    #[test]
    fn zero_p1_trips_division_guard() {
        let calibration = Calibration {
            p1: 0,
            ..DATASHEET_CALIBRATION
        };

        assert_eq!(calibration.compensate_pressure(DATASHEET_ADC_P, 128422), None);
        assert_eq!(
            Bmp280Response::compensate::<Infallible>(
                &calibration,
                DATASHEET_ADC_T,
                DATASHEET_ADC_P
            ),
            Err(Error::DivisionGuard)
        );
    }

    #[test]
    fn unpacks_little_endian_calibration() {
        let mut bytes = [0u8; CALIBRATION_LENGTH];
        bytes[0..2].copy_from_slice(&27504u16.to_le_bytes());
        bytes[2..4].copy_from_slice(&26435i16.to_le_bytes());
        bytes[4..6].copy_from_slice(&(-1000i16).to_le_bytes());
        bytes[6..8].copy_from_slice(&36477u16.to_le_bytes());
        bytes[8..10].copy_from_slice(&(-10685i16).to_le_bytes());
        bytes[22..24].copy_from_slice(&6000i16.to_le_bytes());

        let calibration = Calibration::from_bytes(&bytes);
        assert_eq!(calibration.t1, 27504);
        assert_eq!(calibration.t2, 26435);
        assert_eq!(calibration.t3, -1000);
        assert_eq!(calibration.p1, 36477);
        assert_eq!(calibration.p2, -10685);
        assert_eq!(calibration.p9, 6000);
    }

    #[test]
    fn combines_adc_bytes() {
        assert_eq!(adc_value([0x7E, 0xED, 0x00]), DATASHEET_ADC_T);
        assert_eq!(adc_value([0x65, 0x5A, 0xC0]), DATASHEET_ADC_P);
        assert_eq!(adc_value([0xFF, 0xFF, 0xFF]), 0xFFFFF);
    }

    #[test]
    fn plausibility() {
        let response = |temperature_centi_celsius, pressure_pa| Bmp280Response {
            temperature_centi_celsius,
            pressure_pa,
        };

        assert!(response(2508, 100656).is_plausible());
        assert!(response(-4000, 30000).is_plausible());
        assert!(!response(2508, 0).is_plausible());
        assert!(!response(2508, 130100).is_plausible());
        assert!(!response(-4001, 100656).is_plausible());
        assert!(!response(10001, 100656).is_plausible());
    }

    #[test]
    fn pressure_range_uses_whole_hectopascals() {
        let response = |pressure_pa| Bmp280Response {
            temperature_centi_celsius: 2500,
            pressure_pa,
        };

        assert_eq!(response(130099).whole_hectopascals(), 1300);
        assert!(response(130050).is_plausible());
        assert!(response(130099).is_plausible());
        assert!(!response(29999).is_plausible());
        assert!(response(30000).is_plausible());
    }
}
