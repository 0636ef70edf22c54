//! Raspberry Pi adapters for the sensor drivers.
//!
//! I2C and millisecond delays come straight from `linux-embedded-hal`. GPIO goes through `rppal`,
//! which can switch a pin's direction in place, and [`SpinDelay`] busy-waits short delays so the
//! DHT pulse counter ticks at roughly one per microsecond.

use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};
use rppal::gpio::{Gpio, IoPin, Level, Mode};
use std::hint;
use std::thread;
use std::time::{Duration, Instant};

use crate::pin::FlexPin;

pub use linux_embedded_hal::{Delay, I2cdev};

/// A BCM-numbered GPIO line that can be switched between input and output.
#[derive(Debug)]
pub struct RpiPin(IoPin);

impl RpiPin {
    /// Claims the pin, starting as an output.
    pub fn new(bcm: u8) -> Result<RpiPin, rppal::gpio::Error> {
        let pin = Gpio::new()?.get(bcm)?;
        Ok(RpiPin(pin.into_io(Mode::Output)))
    }
}

impl ErrorType for RpiPin {
    type Error = Infallible;
}

impl InputPin for RpiPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.is_high())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.is_low())
    }
}

impl OutputPin for RpiPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.write(Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.write(Level::High);
        Ok(())
    }
}

impl FlexPin for RpiPin {
    fn set_input_mode(&mut self) -> Result<(), Self::Error> {
        self.0.set_mode(Mode::Input);
        Ok(())
    }

    fn set_output_mode(&mut self, state: PinState) -> Result<(), Self::Error> {
        // Latch the level first so the line never glitches to the other state.
        self.0.write(match state {
            PinState::High => Level::High,
            PinState::Low => Level::Low,
        });
        self.0.set_mode(Mode::Output);
        Ok(())
    }
}

/// A delay that spins for anything under a millisecond and sleeps for the rest.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpinDelay;

const SLEEP_THRESHOLD: Duration = Duration::from_millis(1);

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let duration = Duration::from_nanos(ns as u64);
        if duration >= SLEEP_THRESHOLD {
            thread::sleep(duration);
            return;
        }
        let start = Instant::now();
        while start.elapsed() < duration {
            hint::spin_loop();
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_ns(us.saturating_mul(1_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
