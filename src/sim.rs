//! Cycle-level model of an HX711 attached to a load cell.
//!
//! The model runs on virtual time: holds, sleeps and polls of the DOUT line advance its clock
//! instead of waiting, so the driver can be exercised without hardware and without delays.

use std::collections::VecDeque;
use std::time::Duration;

use crate::Result;
use crate::params::ChannelGain;
use crate::sys::{Driver, Level};

/// The amplifier enters power-down once PD_SCK stays high for longer than this.
const POWER_DOWN_TIME: Duration = Duration::from_micros(60);
/// Virtual time spent by one poll of DOUT while waiting for a conversion.
const POLL_TIME: Duration = Duration::from_micros(50);
/// Conversion time at the 10 SPS output data rate.
const DEFAULT_CONVERSION_TIME: Duration = Duration::from_millis(100);

/// One conversion result as it was clocked out of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// The 24-bit word presented on DOUT.
    pub word: u32,
    /// Input selection the conversion was made with.
    pub channel_gain: ChannelGain,
    /// Clock pulses issued after the 24th data bit.
    pub pulses: u32,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    word: u32,
    channel_gain: ChannelGain,
    edges: u32,
}

#[derive(Debug)]
pub struct SimulatedCell {
    now: Duration,
    clock: Level,
    clock_high_since: Duration,
    conversion_time: Duration,
    ready_at: Duration,
    channel_gain: ChannelGain,
    frame: Option<Frame>,
    samples: VecDeque<i32>,
    offset: i32,
    counts_per_gram: f64,
    load: f64,
    transfers: Vec<Transfer>,
    power_cycles: usize,
}

impl SimulatedCell {
    /// A cell whose every conversion on channel A with gain 128 returns `value`.
    pub fn new(value: i32) -> SimulatedCell {
        SimulatedCell::load_cell(value, 0.0)
    }

    /// A cell with `offset` counts at zero load, and `counts_per_gram` counts per gram of load
    /// on channel A with gain 128. Other selections scale the span with their gain.
    pub fn load_cell(offset: i32, counts_per_gram: f64) -> SimulatedCell {
        SimulatedCell {
            now: Duration::ZERO,
            clock: Level::Low,
            clock_high_since: Duration::ZERO,
            conversion_time: DEFAULT_CONVERSION_TIME,
            ready_at: DEFAULT_CONVERSION_TIME,
            channel_gain: ChannelGain::default(),
            frame: None,
            samples: VecDeque::new(),
            offset,
            counts_per_gram,
            load: 0.0,
            transfers: Vec::new(),
            power_cycles: 0,
        }
    }

    pub fn with_conversion_time(mut self, conversion_time: Duration) -> SimulatedCell {
        self.conversion_time = conversion_time;
        self.ready_at = self.now + conversion_time;
        self
    }

    /// Queue raw results for upcoming conversions, taking precedence over the load model.
    pub fn push_samples<I: IntoIterator<Item = i32>>(&mut self, samples: I) {
        self.samples.extend(samples)
    }

    /// Place `grams` on the cell.
    pub fn set_load(&mut self, grams: f64) {
        log::debug!("simulated load set to {} g", grams);
        self.load = grams;
    }

    pub fn load(&self) -> f64 {
        self.load
    }

    /// Input selection the next conversion will be made with.
    pub fn channel_gain(&self) -> ChannelGain {
        self.channel_gain
    }

    /// All conversions clocked out so far, including the one in progress once its data bits
    /// have been read.
    pub fn transfers(&self) -> Vec<Transfer> {
        let mut transfers = self.transfers.clone();
        transfers.extend(self.frame.and_then(Self::completed));
        transfers
    }

    /// Number of times the amplifier was powered down and back up.
    pub fn power_cycles(&self) -> usize {
        self.power_cycles
    }

    pub fn is_powered_down(&self) -> bool {
        self.clock == Level::High && self.now - self.clock_high_since > POWER_DOWN_TIME
    }

    fn completed(frame: Frame) -> Option<Transfer> {
        if frame.edges >= 24 {
            Some(Transfer { word: frame.word, channel_gain: frame.channel_gain, pulses: frame.edges - 24 })
        } else {
            None
        }
    }

    fn convert(&mut self) -> u32 {
        let raw = match self.samples.pop_front() {
            Some(raw) => raw,
            None => {
                let scale = self.channel_gain.gain().unwrap_or(0) as f64 / 128.0;
                let span = (self.load * self.counts_per_gram * scale).round() as i64;
                (self.offset as i64 + span).clamp(-(1 << 23), (1 << 23) - 1) as i32
            }
        };
        raw as u32 & 0xff_ffff
    }

    fn finish_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            if let Some(transfer) = Self::completed(frame) {
                // with no extra pulses the amplifier keeps its previous selection
                if let Some(channel_gain) = ChannelGain::from_pulse_count(transfer.pulses) {
                    if channel_gain != ChannelGain::NoChannel {
                        self.channel_gain = channel_gain;
                    }
                }
                if transfer.pulses == 0 {
                    self.ready_at = self.now + self.conversion_time;
                }
                log::trace!("simulated transfer {:?}", transfer);
                self.transfers.push(transfer);
            }
        }
    }
}

impl Driver for SimulatedCell {
    fn read_data(&mut self) -> Result<Level> {
        if self.is_powered_down() {
            self.now += POLL_TIME;
            return Ok(Level::High)
        }
        match self.frame {
            Some(Frame { edges, .. }) if edges >= 24 && self.clock == Level::Low => {
                self.finish_frame();
                self.read_data()
            }
            Some(Frame { edges: 0, .. }) => Ok(Level::Low),
            Some(Frame { word, edges, .. }) if edges <= 24 =>
                Ok(Level::from(word & (1 << (24 - edges)) != 0)),
            Some(_) => Ok(Level::High),
            None if self.now >= self.ready_at => {
                let word = self.convert();
                self.frame = Some(Frame { word, channel_gain: self.channel_gain, edges: 0 });
                Ok(Level::Low)
            }
            None => {
                self.now += POLL_TIME;
                Ok(Level::High)
            }
        }
    }

    fn write_clock(&mut self, level: Level) -> Result<()> {
        match (self.clock, level) {
            (Level::Low, Level::High) => {
                self.clock_high_since = self.now;
                if let Some(frame) = self.frame.as_mut() {
                    frame.edges += 1;
                    // the next conversion starts with the 25th pulse
                    if frame.edges == 25 {
                        self.ready_at = self.now + self.conversion_time;
                    }
                }
            }
            (Level::High, Level::Low) if self.is_powered_down() => {
                // leaving power-down resets the amplifier
                log::trace!("simulated power cycle");
                self.frame = None;
                self.channel_gain = ChannelGain::ChannelA128;
                self.ready_at = self.now + self.conversion_time;
                self.power_cycles += 1;
            }
            _ => (),
        }
        self.clock = level;
        Ok(())
    }

    fn hold(&mut self, duration: Duration) {
        self.now += duration;
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn clock_out(cell: &mut SimulatedCell, pulses: u32) -> u32 {
        let mut word = 0;
        for _ in 0..pulses {
            cell.write_clock(Level::High).unwrap();
            cell.hold(Duration::from_micros(1));
            word = word << 1 | bool::from(cell.read_data().unwrap()) as u32;
            cell.write_clock(Level::Low).unwrap();
            cell.hold(Duration::from_micros(1));
        }
        word
    }

    #[test]
    fn test_not_ready_before_conversion() {
        let mut cell = SimulatedCell::new(5);
        assert_eq!(cell.read_data().unwrap(), Level::High);
        cell.sleep(Duration::from_millis(100));
        assert_eq!(cell.read_data().unwrap(), Level::Low);
    }

    #[test]
    fn test_shift_out() {
        let mut cell = SimulatedCell::new(0x123456).with_conversion_time(Duration::ZERO);
        assert_eq!(cell.read_data().unwrap(), Level::Low);
        assert_eq!(clock_out(&mut cell, 24), 0x123456);
        clock_out(&mut cell, 2);
        assert_eq!(cell.transfers(), vec![Transfer {
            word: 0x123456,
            channel_gain: ChannelGain::ChannelA128,
            pulses: 2,
        }]);
        assert_eq!(cell.read_data().unwrap(), Level::Low);
        assert_eq!(cell.channel_gain(), ChannelGain::ChannelB32);
    }

    #[test]
    fn test_load_model() {
        let mut cell = SimulatedCell::load_cell(-1000, 2.0).with_conversion_time(Duration::ZERO);
        cell.set_load(250.0);
        assert_eq!(cell.read_data().unwrap(), Level::Low);
        assert_eq!(clock_out(&mut cell, 24), (-500i32) as u32 & 0xff_ffff);
    }

    #[test]
    fn test_power_down() {
        let mut cell = SimulatedCell::new(0);
        cell.write_clock(Level::High).unwrap();
        cell.hold(Duration::from_micros(61));
        assert!(cell.is_powered_down());
        cell.write_clock(Level::Low).unwrap();
        assert!(!cell.is_powered_down());
        assert_eq!(cell.power_cycles(), 1);
    }
}
