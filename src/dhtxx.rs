use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;
use log::debug;
use thiserror::Error;

use crate::pin::FlexPin;
use crate::reading::{Measurement, PlausibleRange, Reading, RELATIVE_HUMIDITY_RANGE};
use crate::retry::{Exhausted, RetryPolicy};

/// The most line states sampled during one transaction.
///
/// Covers the sensor's response (low, high), the 40 data bits (low, high each) and the closing
/// low, with a few to spare.
pub const MAX_TIMINGS: usize = 85;

/// Spin ticks after which a state is considered stuck and the frame is abandoned.
pub const TICK_LIMIT: u8 = 255;

/// High states longer than this many ticks are read as a `1` bit.
///
/// Each tick is one spin of the sampling loop: a pin read plus a 1µs delay. On a Raspberry Pi the
/// loop overhead makes a tick noticeably longer than 1µs, so this may need tuning per board.
pub const DEFAULT_BIT_THRESHOLD: u8 = 16;

const START_SIGNAL_DURATION: Duration = Duration::from_millis(18);
const RELEASE_DURATION: Duration = Duration::from_micros(40);
const TICK_DURATION: Duration = Duration::from_micros(1);

// Sensor response low, response high and the low before the first bit come first.
const FIRST_DATA_TIMING: usize = 4;
const FRAME_BITS: usize = 40;

const DHT11_TEMPERATURE_RANGE: PlausibleRange = PlausibleRange::new(0.0, 80.0);
const DHT22_TEMPERATURE_RANGE: PlausibleRange = PlausibleRange::new(-40.0, 80.0);

#[derive(Debug, Error, PartialEq)]
pub enum Error<TIoError> {
    /// Wrapped error from the HAL.
    #[error("GPIO error: {0:?}")]
    Wrapped(TIoError),
    /// The line stopped toggling before a full frame was received.
    #[error("frame timed out after {bits} of 40 bits")]
    FrameTimeout { bits: usize },
    /// The fifth byte did not match the sum of the first four.
    #[error("checksum mismatch: expected {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },
    /// The frame was intact but decoded to physically implausible values.
    #[error("reading out of range: humidity {humidity}%, temperature {temperature}C")]
    OutOfRange { humidity: f32, temperature: f32 },
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

/// Which member of the DHT family is on the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Dht11,
    Dht22,
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown sensor type {0:?}, expected dht11 or dht22")]
pub struct UnknownVariant(String);

impl Variant {
    /// The name written to the `sensor_type_name` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Dht11 => "dht11",
            Variant::Dht22 => "dht22",
        }
    }

    pub fn temperature_range(&self) -> PlausibleRange {
        match self {
            Variant::Dht11 => DHT11_TEMPERATURE_RANGE,
            Variant::Dht22 => DHT22_TEMPERATURE_RANGE,
        }
    }

    /// Interprets the four data bytes of a checksum-valid frame.
    pub fn decode(&self, frame: &Frame) -> DhtResponse {
        let data = frame.data();
        match self {
            Variant::Dht11 => DhtResponse::Dht11(Dht11Response::from_raw_bytes(data)),
            Variant::Dht22 => DhtResponse::Dht22(Dht22Response::from_raw_bytes(data)),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Variant, UnknownVariant> {
        match s {
            "dht11" => Ok(Variant::Dht11),
            "dht22" => Ok(Variant::Dht22),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

pub trait Response {
    fn get_humidity(&self) -> f32;
    fn get_temperature(&self) -> f32;
}

/// Data read from the DHT11. Only the integer parts are meaningful.
#[derive(Debug, PartialEq)]
pub struct Dht11Response {
    pub humidity: u8,
    pub temperature: u8,
}

impl Dht11Response {
    fn from_raw_bytes(bytes: [u8; 4]) -> Dht11Response {
        Dht11Response {
            humidity: bytes[0],
            temperature: bytes[2],
        }
    }
}

impl Response for Dht11Response {
    fn get_humidity(&self) -> f32 {
        self.humidity as f32
    }

    fn get_temperature(&self) -> f32 {
        self.temperature as f32
    }
}

/// Data read from the DHT22.
///
/// The temperature is sign-magnitude: bit 15 is the sign, the rest tenths of a degree.
#[derive(Debug, PartialEq)]
pub struct Dht22Response {
    pub humidity_x10: u16,
    pub temperature_x10: u16,
}

impl Dht22Response {
    fn from_raw_bytes(bytes: [u8; 4]) -> Dht22Response {
        Dht22Response {
            humidity_x10: u16::from_be_bytes([bytes[0], bytes[1]]),
            temperature_x10: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }
}

impl Response for Dht22Response {
    fn get_humidity(&self) -> f32 {
        self.humidity_x10 as f32 / 10.0
    }

    fn get_temperature(&self) -> f32 {
        let result = (self.temperature_x10 & 0x7FFF) as f32 / 10.0;
        if (self.temperature_x10 & 0x8000) != 0 {
            return -result;
        }
        result
    }
}

#[derive(Debug, PartialEq)]
pub enum DhtResponse {
    Dht11(Dht11Response),
    Dht22(Dht22Response),
}

impl DhtResponse {
    pub fn variant(&self) -> Variant {
        match self {
            DhtResponse::Dht11(_) => Variant::Dht11,
            DhtResponse::Dht22(_) => Variant::Dht22,
        }
    }
}

impl Response for DhtResponse {
    fn get_humidity(&self) -> f32 {
        match self {
            DhtResponse::Dht11(response) => response.get_humidity(),
            DhtResponse::Dht22(response) => response.get_humidity(),
        }
    }

    fn get_temperature(&self) -> f32 {
        match self {
            DhtResponse::Dht11(response) => response.get_temperature(),
            DhtResponse::Dht22(response) => response.get_temperature(),
        }
    }
}

impl Reading for DhtResponse {
    fn measurements(&self) -> Vec<Measurement> {
        vec![
            Measurement::Humidity(self.get_humidity()),
            Measurement::Temperature(self.get_temperature()),
        ]
    }

    fn is_plausible(&self) -> bool {
        RELATIVE_HUMIDITY_RANGE.contains(self.get_humidity())
            && self
                .variant()
                .temperature_range()
                .contains(self.get_temperature())
    }
}

/// The five bytes of a DHT transmission: four data bytes and their checksum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame([u8; 5]);

impl Frame {
    pub fn from_bytes(bytes: [u8; 5]) -> Frame {
        Frame(bytes)
    }

    /// Builds a frame with a correct checksum.
    pub fn from_data(data: [u8; 4]) -> Frame {
        Frame([data[0], data[1], data[2], data[3], checksum(&data)])
    }

    pub fn bytes(&self) -> [u8; 5] {
        self.0
    }

    pub fn data(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    pub fn checksum(&self) -> u8 {
        self.0[4]
    }
}

fn checksum(data: &[u8; 4]) -> u8 {
    data.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// One observed state of the data line and how many ticks it was held for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pulse {
    pub state: PinState,
    pub ticks: u8,
}

/// The line states captured during one transaction, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PulseTrain {
    pulses: Vec<Pulse>,
    timed_out: bool,
}

impl PulseTrain {
    pub fn new() -> PulseTrain {
        PulseTrain {
            pulses: Vec::with_capacity(MAX_TIMINGS),
            timed_out: false,
        }
    }

    pub fn push(&mut self, pulse: Pulse) {
        self.pulses.push(pulse);
    }

    /// Marks that sampling stopped on a state held for [`TICK_LIMIT`] ticks.
    pub fn mark_timed_out(&mut self) {
        self.timed_out = true;
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Recovers the frame from the high-state durations.
    ///
    /// Every even timing from [`FIRST_DATA_TIMING`] onwards is the high half of a bit. Bits are
    /// packed MSB-first; anything past the 40th is ignored.
    pub fn decode<TIoError>(&self, bit_threshold: u8) -> Result<Frame, Error<TIoError>> {
        let mut bytes = [0u8; 5];
        let mut bits = 0usize;
        for (i, pulse) in self.pulses.iter().enumerate() {
            if i < FIRST_DATA_TIMING || i % 2 != 0 {
                continue;
            }
            if bits < FRAME_BITS {
                bytes[bits / 8] <<= 1;
                if pulse.ticks > bit_threshold {
                    bytes[bits / 8] |= 1;
                }
            }
            bits += 1;
        }
        if bits < FRAME_BITS {
            return Err(Error::FrameTimeout { bits });
        }

        let frame = Frame(bytes);
        let expected = checksum(&frame.data());
        if frame.checksum() != expected {
            return Err(Error::ChecksumMismatch {
                expected,
                received: frame.checksum(),
            });
        }
        Ok(frame)
    }
}

/// Options to modify the behavior of the DHT driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Options {
    /// See [`DEFAULT_BIT_THRESHOLD`].
    pub bit_threshold: u8,
    /// Reject readings outside the sensor's plausible range. When disabled, any checksum-valid
    /// frame is accepted.
    pub validate_range: bool,
}

pub const DEFAULT_OPTIONS: Options = Options {
    bit_threshold: DEFAULT_BIT_THRESHOLD,
    validate_range: true,
};

impl Default for Options {
    fn default() -> Self {
        DEFAULT_OPTIONS
    }
}

/// A DHT11 or DHT22 on a single bidirectional GPIO line.
#[derive(Debug)]
pub struct Dht<TPin> {
    pin: TPin,
    variant: Variant,
    options: Options,
}

impl<TPin, TError> Dht<TPin>
where
    TPin: FlexPin<Error = TError>,
    TError: fmt::Debug,
{
    /// Constructs a DHT sensor that reads from the given pin, leaving the line driven high.
    ///
    /// If options is `None`, [`DEFAULT_OPTIONS`] are used.
    pub fn new(
        mut pin: TPin,
        variant: Variant,
        options: Option<Options>,
    ) -> Result<Self, Error<TError>> {
        pin.set_output_mode(PinState::High)?;
        Ok(Dht {
            pin,
            variant,
            options: options.unwrap_or(DEFAULT_OPTIONS),
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Makes a single read attempt: start signal, capture, decode and validate.
    ///
    /// Due to the tight timing necessary to distinguish bits in the DHT's response, this
    /// busy-waits on `delay` in 1µs steps while receiving data.
    pub fn read_once<TDelay: DelayNs>(
        &mut self,
        delay: &mut TDelay,
    ) -> Result<DhtResponse, Error<TError>> {
        read_once(&mut self.pin, delay, self.variant, &self.options)
    }

    /// Reads until a valid response arrives or `policy` gives up.
    pub fn read<TDelay: DelayNs>(
        &mut self,
        delay: &mut TDelay,
        policy: &RetryPolicy,
    ) -> Result<DhtResponse, Exhausted<Error<TError>>> {
        let Dht {
            pin,
            variant,
            options,
        } = self;
        policy.run(delay, |_, delay| read_once(pin, delay, *variant, options))
    }

    /// Releases the pin.
    pub fn into_inner(self) -> TPin {
        self.pin
    }
}

fn read_once<TPin, TError, TDelay>(
    pin: &mut TPin,
    delay: &mut TDelay,
    variant: Variant,
    options: &Options,
) -> Result<DhtResponse, Error<TError>>
where
    TPin: FlexPin<Error = TError>,
    TDelay: DelayNs,
{
    request_data(pin, delay)?;
    let train = capture(pin, delay)?;
    debug!(
        "captured {} line states{}",
        train.pulses().len(),
        if train.timed_out() { " before timeout" } else { "" }
    );

    let frame = train.decode(options.bit_threshold)?;
    let response = variant.decode(&frame);
    if options.validate_range && !response.is_plausible() {
        return Err(Error::OutOfRange {
            humidity: response.get_humidity(),
            temperature: response.get_temperature(),
        });
    }
    Ok(response)
}

/// Sends the start signal and releases the line to the sensor.
fn request_data<TPin, TError, TDelay>(
    pin: &mut TPin,
    delay: &mut TDelay,
) -> Result<(), Error<TError>>
where
    TPin: FlexPin<Error = TError>,
    TDelay: DelayNs,
{
    pin.set_output_mode(PinState::Low)?;
    delay.delay_us(START_SIGNAL_DURATION.as_micros() as u32);
    pin.set_high()?;
    delay.delay_us(RELEASE_DURATION.as_micros() as u32);
    pin.set_input_mode()?;
    Ok(())
}

/// Samples the line until [`MAX_TIMINGS`] states were seen or one was held too long.
pub fn capture<TPin, TError, TDelay>(
    pin: &mut TPin,
    delay: &mut TDelay,
) -> Result<PulseTrain, Error<TError>>
where
    TPin: FlexPin<Error = TError>,
    TDelay: DelayNs,
{
    let mut train = PulseTrain::new();
    let mut last_state = PinState::High;
    for _ in 0..MAX_TIMINGS {
        let mut ticks = 0u8;
        while read_state(pin)? == last_state {
            ticks += 1;
            delay.delay_ns(TICK_DURATION.as_nanos() as u32);
            if ticks == TICK_LIMIT {
                break;
            }
        }
        if ticks == TICK_LIMIT {
            train.mark_timed_out();
            break;
        }
        train.push(Pulse {
            state: last_state,
            ticks,
        });
        last_state = read_state(pin)?;
    }
    Ok(train)
}

#[inline]
fn read_state<TPin: FlexPin>(pin: &mut TPin) -> Result<PinState, TPin::Error> {
    Ok(PinState::from(pin.is_high()?))
}
