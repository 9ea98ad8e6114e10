use std::time::Duration;

use crate::{Error, Result};
use crate::sys::{Driver, Level};
use crate::params::{ChannelGain, PowerState};

/// Minimum time each PD_SCK phase is held while clocking. The amplifier needs at least 0.2 μs;
/// the margin covers slow GPIO paths.
pub const CLOCK_HOLD: Duration = Duration::from_micros(2);

/// PD_SCK must stay high for more than 60 μs to power the amplifier down.
pub const POWER_DOWN_HOLD: Duration = Duration::from_micros(100);

/// Assemble a 24-bit two's complement value from its bytes, most significant first.
pub fn decode(b2: u8, b1: u8, b0: u8) -> i32 {
    // sign extension comes from the top byte
    (b2 as i8 as i32) << 16 | (b1 as i32) << 8 | (b0 as i32)
}

#[derive(Debug)]
pub struct Device<D: Driver> {
    driver: D,
    channel_gain: ChannelGain,
    power_state: PowerState,
    sample_period: Duration,
}

impl Device<crate::sys::imp::GpioDriverImpl> {
    pub fn open(dout_gpio: u32, pd_sck_gpio: u32) -> Result<Device<crate::sys::imp::GpioDriverImpl>> {
        let driver = crate::sys::imp::GpioDriverImpl::new(dout_gpio, pd_sck_gpio)?;
        Ok(Device::new(driver))
    }
}

impl<D: Driver> Device<D> {
    pub fn new(driver: D) -> Device<D> {
        Device {
            driver,
            channel_gain: ChannelGain::default(),
            power_state: PowerState::Normal,
            sample_period: Duration::from_millis(150),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Bring the amplifier into a known state: power it down, then back up.
    ///
    /// After this the amplifier converts on channel A with gain 128, regardless of any
    /// selection made before.
    pub fn startup(&mut self) -> Result<()> {
        self.driver.write_clock(Level::High)?;
        self.driver.hold(POWER_DOWN_HOLD);
        self.driver.write_clock(Level::Low)?;
        self.power_state = PowerState::Normal;
        log::debug!("startup() done, selection is {}", self.channel_gain);
        Ok(())
    }

    pub fn channel_gain(&self) -> ChannelGain {
        self.channel_gain
    }

    /// Select the input for conversions following the next completed read.
    pub fn set_channel_gain(&mut self, channel_gain: ChannelGain) {
        log::debug!("set_channel_gain({:?})", channel_gain);
        self.channel_gain = channel_gain;
    }

    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }

    /// Set the wall clock period whose multiples pace `read_averaged`. Only whole milliseconds
    /// count; a period under 1 ms disables pacing.
    pub fn set_sample_period(&mut self, sample_period: Duration) {
        self.sample_period = sample_period;
    }

    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    pub fn power_down(&mut self) -> Result<()> {
        self.driver.write_clock(Level::Low)?;
        self.driver.write_clock(Level::High)?;
        self.driver.hold(POWER_DOWN_HOLD);
        self.power_state = PowerState::PoweredDown;
        log::debug!("power_down()");
        Ok(())
    }

    pub fn power_up(&mut self) -> Result<()> {
        self.driver.write_clock(Level::Low)?;
        self.power_state = PowerState::Normal;
        log::debug!("power_up()");
        Ok(())
    }

    fn pulse(&mut self) -> Result<()> {
        self.driver.write_clock(Level::High)?;
        self.driver.hold(CLOCK_HOLD);
        self.driver.write_clock(Level::Low)?;
        self.driver.hold(CLOCK_HOLD);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut value = 0u8;
        for bit in (0..8).rev() {
            self.driver.write_clock(Level::High)?;
            self.driver.hold(CLOCK_HOLD);
            if bool::from(self.driver.read_data()?) {
                value |= 1 << bit;
            }
            self.driver.write_clock(Level::Low)?;
            self.driver.hold(CLOCK_HOLD);
        }
        Ok(value)
    }

    /// Read one conversion result.
    ///
    /// Spins until the amplifier signals data ready by pulling DOUT low, which takes up to one
    /// conversion period. The exchange cannot be interrupted once it has started.
    pub fn read_raw(&mut self) -> Result<i32> {
        if self.power_state == PowerState::PoweredDown {
            return Err(Error::Precondition("amplifier is powered down"))
        }
        while self.driver.read_data()? == Level::High {
            std::hint::spin_loop();
        }
        let mut bytes = [0u8; 3];
        for byte in bytes.iter_mut() {
            *byte = self.read_byte()?;
        }
        // select input and gain for the next conversion
        for _ in 0..self.channel_gain.pulse_count() {
            self.pulse()?;
        }
        let value = decode(bytes[0], bytes[1], bytes[2]);
        log::trace!("read_raw() = {} ({:02x?})", value, bytes);
        Ok(value)
    }

    /// Wait for a sampling slot that is later than `previous`, and return it.
    fn wait_for_slot(&mut self, previous: Option<u128>) -> Option<u128> {
        let period = self.sample_period.as_millis();
        if period == 0 {
            return None
        }
        let now = self.driver.now().as_millis();
        let slot = now / period;
        match previous {
            None if now % period == 0 => Some(slot),
            Some(previous) if slot > previous => Some(slot),
            _ => {
                let boundary = (slot + 1) * period;
                self.driver.sleep(Duration::from_millis((boundary - now) as u64));
                Some(slot + 1)
            }
        }
    }

    /// Average `count` conversion results, truncating toward zero.
    ///
    /// Each result is read at the start of a fresh slot of the sample period, and the driver
    /// sleeps in between instead of spinning.
    pub fn read_averaged(&mut self, count: usize) -> Result<i32> {
        if count == 0 {
            return Err(Error::Precondition("at least one sample must be averaged"))
        }
        if self.power_state == PowerState::PoweredDown {
            return Err(Error::Precondition("amplifier is powered down"))
        }
        let mut sum = 0i64;
        let mut slot = None;
        for _ in 0..count {
            slot = self.wait_for_slot(slot);
            sum += self.read_raw()? as i64;
        }
        let average = (sum / count as i64) as i32;
        log::debug!("read_averaged({}) = {}", count, average);
        Ok(average)
    }
}
