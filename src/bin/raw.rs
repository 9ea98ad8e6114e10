use loadscale::{ChannelGain, GpioConfiguration};

const DEFAULT_COUNT: usize = 32;

fn parse_channel(arg: Option<&str>) -> Option<ChannelGain> {
    match arg {
        None | Some("a128") => Some(ChannelGain::ChannelA128),
        Some("a64") => Some(ChannelGain::ChannelA64),
        Some("b32") => Some(ChannelGain::ChannelB32),
        Some(_) => None,
    }
}

fn main() -> loadscale::Result<()> {
    env_logger::init();

    let count = std::env::args().nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_COUNT);
    let channel_arg = std::env::args().nth(2);
    let Some(channel_gain) = parse_channel(channel_arg.as_deref()) else {
        eprintln!("unknown channel {:?}", channel_arg.unwrap_or_default());
        eprintln!("usage: loadscale-raw [count] [a128|a64|b32]");
        std::process::exit(2)
    };

    let gpio = GpioConfiguration::from_env();
    let mut device = loadscale::Device::open(gpio.dout, gpio.pd_sck)?;
    device.startup()?;
    device.set_channel_gain(channel_gain);
    // the first conversion after startup is always channel A with gain 128
    device.read_raw()?;

    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let sample = device.read_raw()?;
        println!("{:+9} ({:06X})", sample, sample as u32 & 0xff_ffff);
        samples.push(sample);
    }
    if let (Some(min), Some(max)) = (samples.iter().min(), samples.iter().max()) {
        let average = samples.iter().map(|&sample| sample as i64).sum::<i64>() / count as i64;
        println!("{} samples on {}:", count, channel_gain);
        println!("  minimum: {:+}", min);
        println!("  maximum: {:+}", max);
        println!("  average: {:+}", average);
        println!("  spread:  {}", max - min);
    }

    device.power_down()?;
    Ok(())
}
