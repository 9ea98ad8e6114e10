//! Two-point linear calibration of a load cell.
//!
//! With `v0` the raw reading without load and `vref` the raw reading with the reference mass
//! loaded, a raw reading `v` corresponds to
//!
//! ```text
//! weight = grams * (v - v0) / (vref - v0) = m * v + b
//! m = grams / (vref - v0)
//! b = -m * v0
//! ```

use std::fmt;

use crate::{Error, Result};
use crate::config::ScaleConfiguration;
use crate::device::Device;
use crate::sys::Driver;

/// A source of averaged raw readings.
pub trait Sampler {
    fn read_averaged(&mut self, count: usize) -> Result<i32>;
}

impl<D: Driver> Sampler for Device<D> {
    fn read_averaged(&mut self, count: usize) -> Result<i32> {
        Device::read_averaged(self, count)
    }
}

/// A calibration that was recorded, but looks like the procedure was not followed properly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Warning {
    ImplausibleSlope { slope: f64, bound: f64 },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ImplausibleSlope { slope, bound } =>
                write!(f, "slope {:.9} exceeds {} g per count; tare without load and calibrate \
                           with the reference mass loaded", slope, bound),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationReport {
    pub reference_raw: i32,
    pub slope: f64,
    pub intercept: f64,
    pub warning: Option<Warning>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    slope: f64,
    intercept: f64,
}

impl Coefficients {
    fn derive(grams: i32, zero_raw: i32, reference_raw: i32) -> Option<Coefficients> {
        let span = reference_raw as i64 - zero_raw as i64;
        if span == 0 {
            return None
        }
        let slope = grams as f64 / span as f64;
        Some(Coefficients { slope, intercept: -slope * zero_raw as f64 })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    max_load: i32,
    slope_bound: f64,
    reference_mass: Option<i32>,
    zero_raw: Option<i32>,
    reference_raw: Option<i32>,
    coefficients: Option<Coefficients>,
}

impl Calibration {
    /// An empty calibration for a load cell rated for `max_load` grams. Ratings below 1 g are
    /// raised to 1 g.
    pub fn new(max_load: i32) -> Calibration {
        Calibration {
            max_load: max_load.max(1),
            slope_bound: ScaleConfiguration::default().slope_bound,
            reference_mass: None,
            zero_raw: None,
            reference_raw: None,
            coefficients: None,
        }
    }

    pub fn from_configuration(config: &ScaleConfiguration) -> Calibration {
        Calibration { slope_bound: config.slope_bound, ..Calibration::new(config.max_load) }
    }

    pub fn max_load(&self) -> i32 {
        self.max_load
    }

    pub fn slope_bound(&self) -> f64 {
        self.slope_bound
    }

    pub fn reference_mass(&self) -> Option<i32> {
        self.reference_mass
    }

    pub fn zero_raw(&self) -> Option<i32> {
        self.zero_raw
    }

    pub fn reference_raw(&self) -> Option<i32> {
        self.reference_raw
    }

    pub fn slope(&self) -> Option<f64> {
        self.coefficients.map(|coefficients| coefficients.slope)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.coefficients.map(|coefficients| coefficients.intercept)
    }

    pub fn is_calibrated(&self) -> bool {
        self.coefficients.is_some()
    }

    /// Range of accepted reference masses: 10% to 100% of the rated load, and at least 1 g.
    pub fn reference_mass_range(&self) -> (i32, i32) {
        ((self.max_load / 10).max(1), self.max_load)
    }

    fn check_reference_mass(&self, grams: i32) -> Result<()> {
        let (min, max) = self.reference_mass_range();
        if grams < min || grams > max {
            return Err(Error::OutOfRange { grams, min, max })
        }
        Ok(())
    }

    fn update(&mut self) {
        self.coefficients = match (self.reference_mass, self.zero_raw, self.reference_raw) {
            (Some(grams), Some(zero_raw), Some(reference_raw)) =>
                Coefficients::derive(grams, zero_raw, reference_raw),
            _ => None
        };
    }

    pub fn set_reference_mass(&mut self, grams: i32) -> Result<()> {
        self.check_reference_mass(grams)?;
        log::debug!("set_reference_mass({})", grams);
        self.reference_mass = Some(grams);
        self.update();
        Ok(())
    }

    /// Set all calibration points at once, e.g. from a stored record. A reference mass outside
    /// of [`reference_mass_range`](Self::reference_mass_range) is dropped.
    pub fn restore(&mut self, reference_mass: Option<i32>, zero_raw: Option<i32>,
                   reference_raw: Option<i32>) {
        log::debug!("restore({:?}, {:?}, {:?})", reference_mass, zero_raw, reference_raw);
        let reference_mass = reference_mass.filter(|&grams| match self.check_reference_mass(grams) {
            Ok(()) => true,
            Err(error) => {
                log::warn!("discarding stored {}", error);
                false
            }
        });
        self.reference_mass = reference_mass;
        self.zero_raw = zero_raw;
        self.reference_raw = reference_raw;
        self.update();
    }

    /// Record the raw reading without load.
    pub fn tare<S: Sampler>(&mut self, sampler: &mut S, count: usize) -> Result<i32> {
        let zero_raw = sampler.read_averaged(count)?;
        log::debug!("tare({}) = {}", count, zero_raw);
        self.zero_raw = Some(zero_raw);
        self.update();
        Ok(zero_raw)
    }

    /// Record the raw reading with the reference mass loaded, and derive the coefficients.
    ///
    /// Fails without changing anything if the reference mass has not been set, if the scale has
    /// not been tared, or if the reading is identical to the tare reading. A slope steeper than
    /// the slope bound is recorded, but reported with a warning.
    pub fn calibrate<S: Sampler>(&mut self, sampler: &mut S, count: usize)
            -> Result<CalibrationReport> {
        let grams = self.reference_mass
            .ok_or(Error::Precondition("reference mass must be entered first"))?;
        let zero_raw = self.zero_raw
            .ok_or(Error::Precondition("scale must be tared first"))?;
        let reference_raw = sampler.read_averaged(count)?;
        let Some(coefficients) = Coefficients::derive(grams, zero_raw, reference_raw) else {
            return Err(Error::InvalidCalibration { raw: reference_raw })
        };
        self.reference_raw = Some(reference_raw);
        self.coefficients = Some(coefficients);
        log::debug!("calibrate({}) = {} => weight = {} * v + {}",
                    count, reference_raw, coefficients.slope, coefficients.intercept);

        let warning = if coefficients.slope.abs() > self.slope_bound {
            let warning = Warning::ImplausibleSlope {
                slope: coefficients.slope,
                bound: self.slope_bound,
            };
            log::warn!("{}", warning);
            Some(warning)
        } else {
            None
        };
        Ok(CalibrationReport {
            reference_raw,
            slope: coefficients.slope,
            intercept: coefficients.intercept,
            warning,
        })
    }

    /// Convert an averaged raw reading to grams, rounded to one decimal.
    pub fn weight_of_raw(&self, raw: i32) -> Result<f64> {
        match (self.coefficients, self.reference_mass, self.zero_raw, self.reference_raw) {
            (Some(_), Some(grams), Some(zero_raw), Some(reference_raw)) => {
                let weight = grams as f64 * (raw as i64 - zero_raw as i64) as f64
                    / (reference_raw as i64 - zero_raw as i64) as f64;
                Ok((weight * 10.0).round() / 10.0)
            }
            _ => Err(Error::Precondition("scale is not calibrated"))
        }
    }

    /// Measure the load in grams, rounded to one decimal.
    pub fn weight_of<S: Sampler>(&self, sampler: &mut S, count: usize) -> Result<f64> {
        if !self.is_calibrated() {
            return Err(Error::Precondition("scale is not calibrated"))
        }
        let raw = sampler.read_averaged(count)?;
        let weight = self.weight_of_raw(raw)?;
        log::debug!("weight_of({}) = {} ({})", count, weight, raw);
        Ok(weight)
    }

    /// The conversion as a linear equation of the raw reading `v`.
    pub fn equation(&self) -> Option<String> {
        self.coefficients.map(|Coefficients { slope, intercept }|
            format!("weight = {:.9} * v {:+9.4}", slope, intercept))
    }
}
