use super::concurrent;
use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin, PinState};
use std::collections::VecDeque;
use weather_sensors::pin::FlexPin;

#[derive(Debug, PartialEq)]
pub enum Error {}

impl digital::Error for Error {
    fn kind(&self) -> ErrorKind {
        match *self {}
    }
}

/// A sequence of line states and how many microseconds each one lasts.
pub type Waveform = Vec<(PinState, u32)>;

/// A pin whose input level follows a scripted waveform against a named fake clock.
///
/// Each switch to input mode starts the next queued waveform. Once a waveform ends, or if none is
/// queued, the line idles high as the pull-up would leave it.
#[derive(Debug)]
pub struct Pin {
    clock: &'static str,
    waveforms: VecDeque<Waveform>,
    playing: Option<(u64, Waveform)>,
    output: Option<PinState>,
    written: Vec<PinState>,
}

impl Pin {
    /// Creates the pin and resets the clock it shares with a [`super::delay::Delay`].
    pub fn new(clock: &'static str) -> Pin {
        concurrent::set_named_value(clock, 0);
        Pin {
            clock,
            waveforms: VecDeque::new(),
            playing: None,
            output: None,
            written: Vec::new(),
        }
    }

    pub fn queue_waveform(&mut self, waveform: Waveform) {
        self.waveforms.push_back(waveform);
    }

    /// Every level driven onto the line, in order.
    pub fn written(&self) -> &[PinState] {
        &self.written
    }

    pub fn is_output(&self) -> bool {
        self.output.is_some()
    }

    fn level(&self) -> PinState {
        if let Some(state) = self.output {
            return state;
        }
        let Some((start, waveform)) = &self.playing else {
            return PinState::High;
        };
        let elapsed_us = (concurrent::get_named_value(self.clock) - start) / 1_000;
        let mut end = 0u64;
        for (state, duration_us) in waveform.iter() {
            end += *duration_us as u64;
            if elapsed_us < end {
                return *state;
            }
        }
        PinState::High
    }

    fn drive(&mut self, state: PinState) {
        self.output = Some(state);
        self.written.push(state);
    }
}

impl ErrorType for Pin {
    type Error = Error;
}

impl InputPin for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level() == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level() == PinState::Low)
    }
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(PinState::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(PinState::High);
        Ok(())
    }
}

impl FlexPin for Pin {
    fn set_input_mode(&mut self) -> Result<(), Self::Error> {
        self.output = None;
        let start = concurrent::get_named_value(self.clock);
        self.playing = self.waveforms.pop_front().map(|waveform| (start, waveform));
        Ok(())
    }

    fn set_output_mode(&mut self, state: PinState) -> Result<(), Self::Error> {
        self.playing = None;
        self.drive(state);
        Ok(())
    }
}

/// Line states for a DHT transmission of the given five bytes, sent MSB-first.
///
/// Zeros are 8µs high and ones 30µs high, either side of the default 16 tick threshold.
pub fn dht_waveform(bytes: [u8; 5]) -> Waveform {
    let mut waveform = vec![
        (PinState::High, 10),
        (PinState::Low, 80),
        (PinState::High, 80),
    ];
    for byte in bytes.iter() {
        for bit in (0..8).rev() {
            waveform.push((PinState::Low, 50));
            let high = if byte & (1 << bit) != 0 { 30 } else { 8 };
            waveform.push((PinState::High, high));
        }
    }
    waveform.push((PinState::Low, 50));
    waveform
}
