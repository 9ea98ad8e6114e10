use std::io::{self, BufRead, Write};

use loadscale::{Calibration, CalibrationRecord, FileStorage, GpioConfiguration, ScaleConfiguration};

fn wait_for_enter(prompt: &str) -> loadscale::Result<()> {
    print!("{} and press Enter: ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn main() -> loadscale::Result<()> {
    env_logger::init();
    let config = ScaleConfiguration::from_env();

    let mut calibration = Calibration::from_configuration(&config);
    let (min, max) = calibration.reference_mass_range();
    let Some(grams) = std::env::args().nth(1).and_then(|arg| arg.parse::<i32>().ok()) else {
        eprintln!("usage: loadscale-calibrate <reference mass in grams, {} .. {}>", min, max);
        std::process::exit(2)
    };
    calibration.set_reference_mass(grams)?;

    let gpio = GpioConfiguration::from_env();
    let mut device = loadscale::Device::open(gpio.dout, gpio.pd_sck)?;
    device.startup()?;
    device.set_sample_period(config.sample_period);

    println!("==> calibrating {} g load cell with {} g reference", calibration.max_load(), grams);
    wait_for_enter("Remove all load from the cell")?;
    let zero_raw = calibration.tare(&mut device, config.tare_samples)?;
    println!("  v0:   {:+}", zero_raw);

    wait_for_enter(&format!("Place the {} g reference on the cell", grams))?;
    let report = calibration.calibrate(&mut device, config.calibrate_samples)?;
    println!("  vref: {:+}", report.reference_raw);
    println!("  weight = {:.9} * v {:+9.4}", report.slope, report.intercept);
    if let Some(warning) = report.warning {
        println!("warning: {}", warning);
        println!("calibration not stored");
        return Ok(())
    }

    let check = calibration.weight_of(&mut device, config.weigh_samples)?;
    println!("  check: {:.1} g", check);

    let mut storage = FileStorage::new(loadscale::storage_path_from_env());
    CalibrationRecord::capture(&calibration, &device).store(&mut storage)?;
    println!("calibration stored to {:?}", storage.path());

    device.power_down()?;
    Ok(())
}
