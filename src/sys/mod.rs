use std::time::Duration;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(value: Level) -> Self {
        matches!(value, Level::High)
    }
}

/// Access to the DOUT and PD_SCK lines of the amplifier, plus the timing primitives needed to
/// drive them.
pub trait Driver {
    /// Sample the DOUT line.
    fn read_data(&mut self) -> Result<Level, Error>;
    /// Drive the PD_SCK line.
    fn write_clock(&mut self, level: Level) -> Result<(), Error>;

    /// Wait for at least `duration` without giving up the processor.
    fn hold(&mut self, duration: Duration);
    /// Wait for at least `duration`, letting other work run meanwhile.
    fn sleep(&mut self, duration: Duration);
    /// Monotonic time elapsed since the driver was opened.
    fn now(&self) -> Duration;
}

#[cfg(any(target_os = "linux"))]
#[path = "linux.rs"]
pub mod imp;

#[cfg(not(target_os = "linux"))]
#[path = "stub.rs"]
pub mod imp;
