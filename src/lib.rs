mod sys;
mod config;
mod params;
mod device;
mod calibration;
mod storage;
pub mod sim;

#[derive(Debug)]
pub enum Error {
    NotFound,
    Gpio(std::io::Error),
    OutOfRange { grams: i32, min: i32, max: i32 },
    InvalidCalibration { raw: i32 },
    Precondition(&'static str),
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotFound =>
                write!(f, "GPIO lines not available"),
            Self::Gpio(io_error) =>
                write!(f, "GPIO I/O error: {}", io_error),
            Self::OutOfRange { grams, min, max } =>
                write!(f, "reference mass {} g out of range, allowed: {} .. {} g", grams, min, max),
            Self::InvalidCalibration { raw } =>
                write!(f, "reading under load equals zero-load reading ({}), cannot calibrate", raw),
            Self::Precondition(reason) =>
                write!(f, "{}", reason),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Gpio(ref io_error) => Some(io_error),
            _ => None
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound => // converted from std::io::Error in first place
                Self::new(io::ErrorKind::NotFound, error),
            Error::Gpio(io_error) =>
                io_error,
            Error::OutOfRange { .. } | Error::InvalidCalibration { .. } | Error::Precondition(_) =>
                Self::new(io::ErrorKind::InvalidInput, error),
            Error::Other(error) => {
                match error.downcast::<std::io::Error>() {
                    Ok(error) => *error,
                    Err(error) => std::io::Error::new(io::ErrorKind::Other, error)
                }
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => error,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Error::NotFound,
            Err(error) => Error::Gpio(error),
        }
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

use std::io;

pub use sys::{Driver, Level};

pub use config::{
    ScaleConfiguration,
    GpioConfiguration,
    storage_path_from_env,
};

pub use params::{
    ChannelGain,
    PowerState,
};

pub use device::{
    CLOCK_HOLD,
    POWER_DOWN_HOLD,
    decode,
};

pub use calibration::{
    Sampler,
    Calibration,
    CalibrationReport,
    Warning,
};

pub use storage::{
    RECORD_MARKER,
    RECORD_SIZE,
    CalibrationRecord,
    Storage,
    FileStorage,
};

pub type Device =
    device::Device<crate::sys::imp::GpioDriverImpl>;

pub type SimulatedDevice =
    device::Device<crate::sim::SimulatedCell>;

pub use device::Device as GenericDevice;
