use super::concurrent;
use embedded_hal::delay::DelayNs;
use std::time::Duration;

/// Advances a named fake clock instead of sleeping.
///
/// Millisecond delays are also recorded, so tests can check settle times and retry pauses
/// without wading through the microsecond ticks of a pulse capture.
#[derive(Debug)]
pub struct Delay {
    clock: &'static str,
    sleeps: Vec<Duration>,
}

impl Delay {
    pub fn new(clock: &'static str) -> Delay {
        Delay {
            clock,
            sleeps: Vec::new(),
        }
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    pub fn now(&self) -> Duration {
        Duration::from_nanos(concurrent::get_named_value(self.clock))
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        concurrent::add_to_named_value(self.clock, ns as u64);
    }

    fn delay_us(&mut self, us: u32) {
        concurrent::add_to_named_value(self.clock, us as u64 * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        concurrent::add_to_named_value(self.clock, ms as u64 * 1_000_000);
        self.sleeps.push(Duration::from_millis(ms as u64));
    }
}
