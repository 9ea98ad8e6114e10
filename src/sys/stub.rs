use std::time::Duration;

use crate::{Error, Result};
use super::Level;

#[derive(Debug)]
pub struct GpioDriverImpl;

impl GpioDriverImpl {
    pub fn new(_dout_gpio: u32, _pd_sck_gpio: u32) -> Result<GpioDriverImpl> {
        Err(Error::NotFound)
    }
}

impl super::Driver for GpioDriverImpl {
    fn read_data(&mut self) -> Result<Level> {
        Err(Error::NotFound)
    }

    fn write_clock(&mut self, _level: Level) -> Result<()> {
        Err(Error::NotFound)
    }

    fn hold(&mut self, _duration: Duration) {}

    fn sleep(&mut self, _duration: Duration) {}

    fn now(&self) -> Duration {
        Duration::ZERO
    }
}
