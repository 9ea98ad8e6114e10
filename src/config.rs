//! Configuration of the scale in terms of the physical load cell and the measurement procedure.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleConfiguration {
    /// Rated capacity of the load cell in grams.
    pub max_load: i32,
    /// Averaged samples are taken only at multiples of this period of the wall clock.
    /// A zero period samples back to back.
    pub sample_period: Duration,
    /// Largest plausible slope magnitude in grams per count. Depends on the load cell.
    pub slope_bound: f64,
    pub tare_samples: usize,
    pub calibrate_samples: usize,
    pub weigh_samples: usize,
    pub raw_samples: usize,
}

impl Default for ScaleConfiguration {
    fn default() -> Self {
        Self {
            max_load: 1000, // 1 kg cell
            sample_period: Duration::from_millis(150),
            slope_bound: 1.0,
            tare_samples: 32,
            calibrate_samples: 16,
            weigh_samples: 8,
            raw_samples: 16,
        }
    }
}

impl ScaleConfiguration {
    /// Apply overrides from the environment on top of the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `LOADSCALE_MAX_LOAD`: rated capacity in grams
    /// - `LOADSCALE_SAMPLE_PERIOD_MS`: sampling slot period
    /// - `LOADSCALE_SLOPE_BOUND`: slope sanity bound
    /// - `LOADSCALE_TARE_SAMPLES`, `LOADSCALE_CALIBRATE_SAMPLES`, `LOADSCALE_WEIGH_SAMPLES`,
    ///   `LOADSCALE_RAW_SAMPLES`: averaging counts (zero is ignored)
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_load: env_parse("LOADSCALE_MAX_LOAD")
                .filter(|&grams: &i32| grams > 0)
                .unwrap_or(defaults.max_load),
            sample_period: env_parse("LOADSCALE_SAMPLE_PERIOD_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sample_period),
            slope_bound: env_parse("LOADSCALE_SLOPE_BOUND")
                .filter(|bound: &f64| bound.is_finite() && *bound > 0.0)
                .unwrap_or(defaults.slope_bound),
            tare_samples: env_count("LOADSCALE_TARE_SAMPLES")
                .unwrap_or(defaults.tare_samples),
            calibrate_samples: env_count("LOADSCALE_CALIBRATE_SAMPLES")
                .unwrap_or(defaults.calibrate_samples),
            weigh_samples: env_count("LOADSCALE_WEIGH_SAMPLES")
                .unwrap_or(defaults.weigh_samples),
            raw_samples: env_count("LOADSCALE_RAW_SAMPLES")
                .unwrap_or(defaults.raw_samples),
        }
    }
}

/// GPIO numbers of the amplifier lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioConfiguration {
    pub dout: u32,
    pub pd_sck: u32,
}

impl Default for GpioConfiguration {
    fn default() -> Self {
        Self { dout: 3, pd_sck: 2 }
    }
}

impl GpioConfiguration {
    /// Apply `LOADSCALE_DOUT` and `LOADSCALE_SCK` on top of the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dout: env_parse("LOADSCALE_DOUT").unwrap_or(defaults.dout),
            pd_sck: env_parse("LOADSCALE_SCK").unwrap_or(defaults.pd_sck),
        }
    }
}

/// Location of the calibration record file, `LOADSCALE_STORAGE` or `loadscale.cal`.
pub fn storage_path_from_env() -> PathBuf {
    std::env::var_os("LOADSCALE_STORAGE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("loadscale.cal"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a valid value", name, value);
            None
        }
    }
}

fn env_count(name: &str) -> Option<usize> {
    env_parse(name).filter(|&count: &usize| count > 0)
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "LOADSCALE_MAX_LOAD",
        "LOADSCALE_SAMPLE_PERIOD_MS",
        "LOADSCALE_SLOPE_BOUND",
        "LOADSCALE_TARE_SAMPLES",
        "LOADSCALE_CALIBRATE_SAMPLES",
        "LOADSCALE_WEIGH_SAMPLES",
        "LOADSCALE_RAW_SAMPLES",
        "LOADSCALE_DOUT",
        "LOADSCALE_SCK",
        "LOADSCALE_STORAGE",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear();
        assert_eq!(ScaleConfiguration::from_env(), ScaleConfiguration::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear();
        std::env::set_var("LOADSCALE_MAX_LOAD", "5000");
        std::env::set_var("LOADSCALE_SAMPLE_PERIOD_MS", "0");
        std::env::set_var("LOADSCALE_SLOPE_BOUND", "0.05");
        std::env::set_var("LOADSCALE_WEIGH_SAMPLES", "4");
        let config = ScaleConfiguration::from_env();
        clear();
        assert_eq!(config.max_load, 5000);
        assert_eq!(config.sample_period, Duration::ZERO);
        assert_eq!(config.slope_bound, 0.05);
        assert_eq!(config.weigh_samples, 4);
        assert_eq!(config.tare_samples, 32);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid() {
        clear();
        std::env::set_var("LOADSCALE_MAX_LOAD", "heavy");
        std::env::set_var("LOADSCALE_TARE_SAMPLES", "0");
        std::env::set_var("LOADSCALE_SLOPE_BOUND", "-1");
        let config = ScaleConfiguration::from_env();
        clear();
        assert_eq!(config.max_load, 1000);
        assert_eq!(config.tare_samples, 32);
        assert_eq!(config.slope_bound, 1.0);
    }

    #[test]
    #[serial]
    fn test_gpio_from_env() {
        clear();
        assert_eq!(GpioConfiguration::from_env(), GpioConfiguration { dout: 3, pd_sck: 2 });
        std::env::set_var("LOADSCALE_DOUT", "17");
        std::env::set_var("LOADSCALE_SCK", "27");
        let gpio = GpioConfiguration::from_env();
        clear();
        assert_eq!(gpio, GpioConfiguration { dout: 17, pd_sck: 27 });
    }

    #[test]
    #[serial]
    fn test_storage_path_from_env() {
        clear();
        assert_eq!(storage_path_from_env(), PathBuf::from("loadscale.cal"));
        std::env::set_var("LOADSCALE_STORAGE", "/var/lib/scale.cal");
        let path = storage_path_from_env();
        clear();
        assert_eq!(path, PathBuf::from("/var/lib/scale.cal"));
    }
}
