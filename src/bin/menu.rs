use std::io::{self, BufRead, Write};

use loadscale::{Calibration, CalibrationRecord, ChannelGain, Driver, FileStorage};
use loadscale::{GenericDevice, GpioConfiguration, ScaleConfiguration, Storage};
use loadscale::sim::SimulatedCell;

// simulated cell: zero offset and sensitivity of a typical 1 kg cell at 5 V excitation
const SIMULATED_OFFSET: i32 = 8_432;
const SIMULATED_COUNTS_PER_GRAM: f64 = 420.0;

const MENU: &[&str] = &[
    "[r] Enter reference weight [grams]",
    "[z] Set to 0 (Tare)",
    "[c] Calibrate with reference weight",
    "[g] Get raw sensor value",
    "[w] Get weight [grams]",
    "[a] Set channel A, gain 128",
    "[A] Set channel A, gain 64",
    "[b] Set channel B, gain 32",
    "[p] Power down",
    "[u] Power up to normal mode",
    "[S] Store calibration data",
    "[s] Show stored calibration data",
    "[e] Show equation",
    "[m] Show menu",
    "[q] Quit",
];

/// Whatever can put a load on the cell without a human.
trait Bench {
    fn place(&mut self, grams: f64) -> bool;
}

impl Bench for loadscale::Device {
    fn place(&mut self, _grams: f64) -> bool {
        false
    }
}

impl Bench for loadscale::SimulatedDevice {
    fn place(&mut self, grams: f64) -> bool {
        self.driver_mut().set_load(grams);
        true
    }
}

struct Menu<D: Driver, S: Storage> {
    device: GenericDevice<D>,
    calibration: Calibration,
    config: ScaleConfiguration,
    storage: S,
}

impl<D: Driver, S: Storage> Menu<D, S> where GenericDevice<D>: Bench {
    fn new(mut device: GenericDevice<D>, config: ScaleConfiguration, mut storage: S)
            -> loadscale::Result<Self> {
        device.startup()?;
        device.set_sample_period(config.sample_period);
        let mut calibration = Calibration::from_configuration(&config);
        // calibration constants stored earlier take effect right away
        if let Some(record) = CalibrationRecord::load(&mut storage)? {
            record.apply(&mut calibration, &mut device);
        }
        Ok(Menu { device, calibration, config, storage })
    }

    fn show_menu(&self) {
        println!("------------------");
        println!(" HX711 {} kg scale", self.calibration.max_load() as f64 / 1000.0);
        println!("------------------");
        for text in MENU {
            println!("{}", text);
        }
        println!("[l] Place load [grams] (simulation only)");
    }

    fn set_channel_gain(&mut self, channel_gain: ChannelGain) {
        self.device.set_channel_gain(channel_gain);
        println!("Set {}", channel_gain);
    }

    fn enter_reference_mass(&mut self, argument: &str) {
        let (min, max) = self.calibration.reference_mass_range();
        match argument.parse::<i32>() {
            Ok(grams) => match self.calibration.set_reference_mass(grams) {
                Ok(()) => println!("Reference weight set to {}", grams),
                Err(error) => println!("{}", error),
            }
            Err(_) => println!("Enter the reference weight as `r <grams>`, allowed: {} .. {}", min, max),
        }
    }

    fn calibrate(&mut self) {
        match self.calibration.calibrate(&mut self.device, self.config.calibrate_samples) {
            Ok(report) => {
                println!("Calibrated: weight = {:.9} * v {:+9.4}", report.slope, report.intercept);
                if let Some(warning) = report.warning {
                    println!("Warning: {}", warning);
                }
            }
            Err(error) => println!("{}", error),
        }
    }

    fn show_stored(&mut self) -> loadscale::Result<()> {
        match CalibrationRecord::load(&mut self.storage)? {
            Some(record) => println!(
                "wRef = {}, v0 = {}, vRef = {}, chn_gain = {}",
                record.reference_mass, record.zero_raw, record.reference_raw, record.channel_gain),
            None => println!("No calibration data stored"),
        }
        Ok(())
    }

    /// Execute one command line. Returns `false` once the user asks to quit.
    fn dispatch(&mut self, line: &str) -> loadscale::Result<bool> {
        let mut chars = line.trim().chars();
        let Some(key) = chars.next() else { return Ok(true) };
        let argument = chars.as_str().trim();
        match key {
            'r' => self.enter_reference_mass(argument),
            'z' => match self.calibration.tare(&mut self.device, self.config.tare_samples) {
                Ok(zero_raw) => println!("v0 = {}", zero_raw),
                Err(error) => println!("{}", error),
            }
            'c' => self.calibrate(),
            'g' => match self.device.read_averaged(self.config.raw_samples) {
                Ok(raw) => println!("{}", raw),
                Err(error) => println!("{}", error),
            }
            'w' => match self.calibration.weight_of(&mut self.device, self.config.weigh_samples) {
                Ok(grams) => println!("{:.1}", grams),
                Err(error) => println!("{}", error),
            }
            'a' => self.set_channel_gain(ChannelGain::ChannelA128),
            'A' => self.set_channel_gain(ChannelGain::ChannelA64),
            'b' => self.set_channel_gain(ChannelGain::ChannelB32),
            'p' => {
                self.device.power_down()?;
                println!("Power down mode set");
            }
            'u' => {
                self.device.power_up()?;
                println!("Normal mode set");
            }
            'S' => {
                CalibrationRecord::capture(&self.calibration, &self.device).store(&mut self.storage)?;
                println!("Calibration data stored");
            }
            's' => self.show_stored()?,
            'e' => match self.calibration.equation() {
                Some(equation) => println!("{}", equation),
                None => println!("Not calibrated"),
            }
            'm' => self.show_menu(),
            'l' => match argument.parse::<f64>() {
                Ok(grams) => if self.device.place(grams) {
                    println!("Load set to {} g", grams)
                } else {
                    println!("Place the load on the cell by hand")
                }
                Err(_) => println!("Enter the load as `l <grams>`"),
            }
            'q' => return Ok(false),
            _ => println!("Unknown command {:?}, press m for the menu", key),
        }
        Ok(true)
    }

    fn run(mut self) -> loadscale::Result<()> {
        self.show_menu();
        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("\nPress a key: ");
            io::stdout().flush()?;
            let Some(line) = lines.next() else { break };
            if !self.dispatch(&line?)? {
                break
            }
        }
        Ok(())
    }
}

fn main() -> loadscale::Result<()> {
    env_logger::init();
    let config = ScaleConfiguration::from_env();
    let storage = FileStorage::new(loadscale::storage_path_from_env());
    log::info!("using calibration record at {:?}", storage.path());
    if std::env::var_os("LOADSCALE_SIMULATE").is_some() {
        let cell = SimulatedCell::load_cell(SIMULATED_OFFSET, SIMULATED_COUNTS_PER_GRAM);
        Menu::new(GenericDevice::new(cell), config, storage)?.run()
    } else {
        let gpio = GpioConfiguration::from_env();
        Menu::new(loadscale::Device::open(gpio.dout, gpio.pd_sck)?, config, storage)?.run()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use loadscale::SimulatedDevice;

    fn menu(storage: Vec<u8>) -> Menu<SimulatedCell, Vec<u8>> {
        let cell = SimulatedCell::load_cell(SIMULATED_OFFSET, SIMULATED_COUNTS_PER_GRAM);
        let device: SimulatedDevice = GenericDevice::new(cell);
        Menu::new(device, ScaleConfiguration::default(), storage).unwrap()
    }

    #[test]
    fn test_calibrate_store_weigh() {
        let mut menu = menu(Vec::new());
        for line in ["r 500", "z", "l 500", "c", "S", "w", "s", "e"] {
            assert!(menu.dispatch(line).unwrap(), "{:?} quit", line);
        }
        assert_eq!(menu.calibration.zero_raw(), Some(SIMULATED_OFFSET));
        assert_eq!(menu.calibration.reference_raw(), Some(SIMULATED_OFFSET + 210_000));

        assert_eq!(menu.storage.len(), loadscale::RECORD_SIZE);
        assert_eq!(CalibrationRecord::load(&mut menu.storage).unwrap(), Some(CalibrationRecord {
            reference_mass: 500,
            zero_raw: SIMULATED_OFFSET,
            reference_raw: SIMULATED_OFFSET + 210_000,
            channel_gain: ChannelGain::ChannelA128,
        }));
        let weigh_samples = menu.config.weigh_samples;
        assert_eq!(menu.calibration.weight_of(&mut menu.device, weigh_samples).unwrap(), 500.0);
    }

    #[test]
    fn test_calibrate_ordering() {
        let mut menu = menu(Vec::new());
        assert!(menu.dispatch("c").unwrap());
        assert!(!menu.calibration.is_calibrated());
        assert!(menu.dispatch("r 50").unwrap());
        assert_eq!(menu.calibration.reference_mass(), None);
        assert!(menu.dispatch("r 500").unwrap());
        assert!(menu.dispatch("c").unwrap());
        assert_eq!(menu.calibration.reference_raw(), None);
        assert!(menu.dispatch("w").unwrap());
        assert!(menu.dispatch("S").unwrap());
        assert_eq!(CalibrationRecord::load(&mut menu.storage).unwrap().map(|record| record.reference_mass),
                   Some(500));
    }

    #[test]
    fn test_channel_and_power_keys() {
        let mut menu = menu(Vec::new());
        assert!(menu.dispatch("A").unwrap());
        assert_eq!(menu.device.channel_gain(), ChannelGain::ChannelA64);
        assert!(menu.dispatch("b").unwrap());
        assert_eq!(menu.device.channel_gain(), ChannelGain::ChannelB32);
        assert!(menu.dispatch("a").unwrap());
        assert_eq!(menu.device.channel_gain(), ChannelGain::ChannelA128);
        assert!(menu.dispatch("p").unwrap());
        assert_eq!(menu.device.power_state(), loadscale::PowerState::PoweredDown);
        assert!(menu.dispatch("g").unwrap());
        assert!(menu.dispatch("u").unwrap());
        assert_eq!(menu.device.power_state(), loadscale::PowerState::Normal);
        assert!(menu.dispatch("").unwrap());
        assert!(menu.dispatch("x").unwrap());
        assert!(!menu.dispatch("q").unwrap());
    }

    #[test]
    fn test_stored_record_applied_at_start() {
        let mut storage = Vec::new();
        CalibrationRecord {
            reference_mass: 250,
            zero_raw: SIMULATED_OFFSET,
            reference_raw: SIMULATED_OFFSET + 105_000,
            channel_gain: ChannelGain::ChannelA128,
        }.store(&mut storage).unwrap();
        let mut menu = menu(storage);
        assert!(menu.calibration.is_calibrated());
        assert!(menu.dispatch("l 100").unwrap());
        let weigh_samples = menu.config.weigh_samples;
        assert_eq!(menu.calibration.weight_of(&mut menu.device, weigh_samples).unwrap(), 100.0);
    }
}
