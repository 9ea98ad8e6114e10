//! Persistent calibration record.
//!
//! The record is a 14 byte image with fields at fixed offsets, little endian:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 1    | marker, [`RECORD_MARKER`] when present  |
//! | 1      | 4    | reference mass in grams, -1 when unset  |
//! | 5      | 4    | raw reading without load                |
//! | 9      | 4    | raw reading with the reference mass     |
//! | 13     | 1    | channel and gain code                   |

use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};
use crate::calibration::Calibration;
use crate::device::Device;
use crate::params::ChannelGain;
use crate::sys::Driver;

pub const RECORD_MARKER: u8 = 42;
pub const RECORD_SIZE: usize = ADDR_END;

const ADDR_MARKER: usize = 0;
const ADDR_REFERENCE_MASS: usize = ADDR_MARKER + 1;
const ADDR_ZERO_RAW: usize = ADDR_REFERENCE_MASS + 4;
const ADDR_REFERENCE_RAW: usize = ADDR_ZERO_RAW + 4;
const ADDR_CHANNEL_GAIN: usize = ADDR_REFERENCE_RAW + 4;
const ADDR_END: usize = ADDR_CHANNEL_GAIN + 1;

/// A medium holding one record image.
pub trait Storage {
    /// Read the image, or `None` if nothing was ever written.
    fn read(&mut self) -> Result<Option<[u8; RECORD_SIZE]>>;
    fn write(&mut self, image: &[u8; RECORD_SIZE]) -> Result<()>;
}

/// An in-memory image, e.g. a copy of an EEPROM.
impl Storage for Vec<u8> {
    fn read(&mut self) -> Result<Option<[u8; RECORD_SIZE]>> {
        Ok(self.get(..RECORD_SIZE).and_then(|image| image.try_into().ok()))
    }

    fn write(&mut self, image: &[u8; RECORD_SIZE]) -> Result<()> {
        if self.len() < RECORD_SIZE {
            self.resize(RECORD_SIZE, 0xff);
        }
        self[..RECORD_SIZE].copy_from_slice(image);
        Ok(())
    }
}

/// An image kept at the start of a file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> FileStorage {
        FileStorage { path: path.as_ref().to_owned() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read(&mut self) -> Result<Option<[u8; RECORD_SIZE]>> {
        match std::fs::read(&self.path) {
            Ok(mut contents) => contents.read(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::Other(error.into())),
        }
    }

    fn write(&mut self, image: &[u8; RECORD_SIZE]) -> Result<()> {
        std::fs::write(&self.path, image).map_err(|error| Error::Other(error.into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationRecord {
    pub reference_mass: i32,
    pub zero_raw: i32,
    pub reference_raw: i32,
    pub channel_gain: ChannelGain,
}

impl CalibrationRecord {
    /// Snapshot the calibration points and the input selection. An unset reference mass is
    /// stored as -1, an unset zero-load reading as 0, and an unset reading with the reference mass
    /// as a copy of the zero-load reading.
    pub fn capture<D: Driver>(calibration: &Calibration, device: &Device<D>) -> CalibrationRecord {
        let zero_raw = calibration.zero_raw().unwrap_or(0);
        CalibrationRecord {
            reference_mass: calibration.reference_mass().unwrap_or(-1),
            zero_raw,
            reference_raw: calibration.reference_raw().unwrap_or(zero_raw),
            channel_gain: device.channel_gain(),
        }
    }

    /// Restore the calibration points and the input selection.
    ///
    /// A zero-load reading is always taken as established, including a reading of 0. A reading
    /// with the reference mass equal to the zero-load reading cannot come from a calibration and
    /// is taken as not established.
    pub fn apply<D: Driver>(&self, calibration: &mut Calibration, device: &mut Device<D>) {
        calibration.restore(
            Some(self.reference_mass).filter(|&grams| grams != -1),
            Some(self.zero_raw),
            Some(self.reference_raw).filter(|&raw| raw != self.zero_raw),
        );
        device.set_channel_gain(self.channel_gain);
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut image = [0u8; RECORD_SIZE];
        image[ADDR_MARKER] = RECORD_MARKER;
        image[ADDR_REFERENCE_MASS..][..4].copy_from_slice(&self.reference_mass.to_le_bytes());
        image[ADDR_ZERO_RAW..][..4].copy_from_slice(&self.zero_raw.to_le_bytes());
        image[ADDR_REFERENCE_RAW..][..4].copy_from_slice(&self.reference_raw.to_le_bytes());
        image[ADDR_CHANNEL_GAIN] = self.channel_gain.storage_code();
        image
    }

    /// Parse an image. Returns `None` if the marker is absent or the image is damaged.
    pub fn from_bytes(image: &[u8; RECORD_SIZE]) -> Option<CalibrationRecord> {
        if image[ADDR_MARKER] != RECORD_MARKER {
            log::debug!("no calibration record (marker {:#04x})", image[ADDR_MARKER]);
            return None
        }
        let read_i32 = |addr: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&image[addr..][..4]);
            i32::from_le_bytes(bytes)
        };
        let Some(channel_gain) = ChannelGain::from_storage_code(image[ADDR_CHANNEL_GAIN]) else {
            log::warn!("discarding calibration record with channel code {:#04x}",
                       image[ADDR_CHANNEL_GAIN]);
            return None
        };
        Some(CalibrationRecord {
            reference_mass: read_i32(ADDR_REFERENCE_MASS),
            zero_raw: read_i32(ADDR_ZERO_RAW),
            reference_raw: read_i32(ADDR_REFERENCE_RAW),
            channel_gain,
        })
    }

    pub fn load<S: Storage + ?Sized>(storage: &mut S) -> Result<Option<CalibrationRecord>> {
        let record = storage.read()?.and_then(|image| CalibrationRecord::from_bytes(&image));
        log::debug!("load() = {:?}", record);
        Ok(record)
    }

    pub fn store<S: Storage + ?Sized>(&self, storage: &mut S) -> Result<()> {
        log::debug!("store({:?})", self);
        storage.write(&self.to_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::SimulatedCell;

    #[test]
    fn test_layout() {
        assert_eq!(RECORD_SIZE, 14);
        let record = CalibrationRecord {
            reference_mass: 500,
            zero_raw: -2,
            reference_raw: 0x01020304,
            channel_gain: ChannelGain::ChannelB32,
        };
        assert_eq!(record.to_bytes(), [
            42,
            0xf4, 0x01, 0x00, 0x00,
            0xfe, 0xff, 0xff, 0xff,
            0x04, 0x03, 0x02, 0x01,
            2,
        ]);
    }

    #[test]
    fn test_round_trip() {
        let mut storage = Vec::new();
        assert_eq!(CalibrationRecord::load(&mut storage).unwrap(), None);
        for channel_gain in ChannelGain::ALL {
            let record = CalibrationRecord {
                reference_mass: 1000,
                zero_raw: -8_388_608,
                reference_raw: 8_388_607,
                channel_gain,
            };
            record.store(&mut storage).unwrap();
            assert_eq!(CalibrationRecord::load(&mut storage).unwrap(), Some(record));
        }
    }

    #[test]
    fn test_marker() {
        // erased EEPROM
        assert_eq!(CalibrationRecord::from_bytes(&[0xff; RECORD_SIZE]), None);
        assert_eq!(CalibrationRecord::from_bytes(&[0x00; RECORD_SIZE]), None);
        let mut image = [0u8; RECORD_SIZE];
        image[0] = RECORD_MARKER;
        image[13] = 1;
        assert_eq!(CalibrationRecord::from_bytes(&image), Some(CalibrationRecord {
            reference_mass: 0,
            zero_raw: 0,
            reference_raw: 0,
            channel_gain: ChannelGain::ChannelA128,
        }));
        image[13] = 4;
        assert_eq!(CalibrationRecord::from_bytes(&image), None);
    }

    #[test]
    fn test_capture_apply() {
        let mut device = Device::new(SimulatedCell::new(0));
        let mut calibration = Calibration::new(1000);
        let blank = CalibrationRecord::capture(&calibration, &device);
        assert_eq!(blank, CalibrationRecord {
            reference_mass: -1,
            zero_raw: 0,
            reference_raw: 0,
            channel_gain: ChannelGain::ChannelA128,
        });

        calibration.restore(Some(500), Some(0), Some(600));
        device.set_channel_gain(ChannelGain::ChannelA64);
        let record = CalibrationRecord::capture(&calibration, &device);

        let mut restored_device = Device::new(SimulatedCell::new(0));
        let mut restored = Calibration::new(1000);
        record.apply(&mut restored, &mut restored_device);
        assert_eq!(restored, calibration);
        assert_eq!(restored.zero_raw(), Some(0));
        assert_eq!(restored_device.channel_gain(), ChannelGain::ChannelA64);
        assert_eq!(restored.weight_of_raw(300).unwrap(), 250.0);

        blank.apply(&mut restored, &mut restored_device);
        assert_eq!(restored.reference_mass(), None);
        assert_eq!(restored.zero_raw(), Some(0));
        assert_eq!(restored.reference_raw(), None);
        assert!(!restored.is_calibrated());
    }

    #[test]
    fn test_zero_reference_raw_survives() {
        let device = Device::new(SimulatedCell::new(0));
        let mut calibration = Calibration::new(1000);
        calibration.restore(Some(500), Some(-5000), Some(0));
        assert!(calibration.is_calibrated());

        let mut storage = Vec::new();
        CalibrationRecord::capture(&calibration, &device).store(&mut storage).unwrap();
        let record = CalibrationRecord::load(&mut storage).unwrap().unwrap();
        let mut restored_device = Device::new(SimulatedCell::new(0));
        let mut restored = Calibration::new(1000);
        record.apply(&mut restored, &mut restored_device);
        assert_eq!(restored.reference_raw(), Some(0));
        assert!(restored.is_calibrated());
        assert_eq!(restored, calibration);
    }

    #[test]
    fn test_tared_only_stays_uncalibrated() {
        let device = Device::new(SimulatedCell::new(0));
        let mut calibration = Calibration::new(1000);
        calibration.restore(Some(500), Some(-5000), None);

        let record = CalibrationRecord::capture(&calibration, &device);
        assert_eq!(record.reference_raw, -5000);
        let mut restored_device = Device::new(SimulatedCell::new(0));
        let mut restored = Calibration::new(1000);
        record.apply(&mut restored, &mut restored_device);
        assert_eq!(restored.reference_mass(), Some(500));
        assert_eq!(restored.zero_raw(), Some(-5000));
        assert_eq!(restored.reference_raw(), None);
        assert!(!restored.is_calibrated());
    }

    #[test]
    fn test_apply_rejects_reference_mass_out_of_range() {
        let record = CalibrationRecord {
            reference_mass: 50_000,
            zero_raw: 100,
            reference_raw: 600,
            channel_gain: ChannelGain::ChannelA128,
        };
        let mut device = Device::new(SimulatedCell::new(0));
        let mut calibration = Calibration::new(1000);
        record.apply(&mut calibration, &mut device);
        assert_eq!(calibration.reference_mass(), None);
        assert_eq!(calibration.zero_raw(), Some(100));
        assert_eq!(calibration.reference_raw(), Some(600));
        assert!(!calibration.is_calibrated());
    }

    #[test]
    fn test_file_storage() {
        let path = std::env::temp_dir().join(format!("loadscale-test-{}.bin", std::process::id()));
        let mut storage = FileStorage::new(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(CalibrationRecord::load(&mut storage).unwrap(), None);
        let record = CalibrationRecord {
            reference_mass: 200,
            zero_raw: 31337,
            reference_raw: 91337,
            channel_gain: ChannelGain::ChannelA128,
        };
        record.store(&mut storage).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), RECORD_SIZE);
        assert_eq!(CalibrationRecord::load(&mut storage).unwrap(), Some(record));
        std::fs::remove_file(&path).unwrap();
    }
}
