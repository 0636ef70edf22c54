use embedded_hal::digital::{InputPin, OutputPin, PinState};

/// A GPIO line that can be switched between driving and sensing at runtime.
///
/// Single-wire sensors such as the DHT11 need the host to drive the start pulse and then release
/// the line to listen for the reply on the same pin. embedded-hal 1.0 has no trait for changing a
/// pin's direction in place, so adapters implement this one on top of their input/output impls.
pub trait FlexPin: InputPin + OutputPin {
    /// Stops driving the line and starts sensing it.
    fn set_input_mode(&mut self) -> Result<(), Self::Error>;

    /// Starts driving the line, beginning at the given level.
    fn set_output_mode(&mut self, state: PinState) -> Result<(), Self::Error>;
}
