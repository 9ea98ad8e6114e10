use std::ffi::{CStr, CString};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};
use libc::{c_int, c_void};
use crate::{Error, Result};
use super::Level;

const GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Debug)]
struct Fd(c_int);

impl Fd {
    fn open(path: &CStr, flags: c_int) -> io::Result<Fd> {
        unsafe {
            let fd = libc::open(path.as_ptr(), flags);
            if fd == -1 {
                Err(io::Error::last_os_error())
            } else {
                Ok(Fd(fd))
            }
        }
    }

    fn read_at(&self, offset: usize, data: &mut [u8]) -> io::Result<()> {
        unsafe {
            let bytes_read = libc::pread(self.0, data.as_mut_ptr() as *mut c_void, data.len(), offset as libc::off_t);
            if bytes_read < 0 || bytes_read as usize != data.len() {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }

    fn write_at(&self, offset: usize, data: &[u8]) -> io::Result<()> {
        unsafe {
            let bytes_written = libc::pwrite(self.0, data.as_ptr() as *const c_void, data.len(), offset as libc::off_t);
            if bytes_written < 0 || bytes_written as usize != data.len() {
                Err(io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            if libc::close(self.0) == -1 {
                panic!("error closing fd: {}", io::Error::last_os_error())
            }
        }
    }
}

fn c_path(path: String) -> Result<CString> {
    CString::new(path).map_err(|error| Error::Other(error.into()))
}

fn write_file(path: String, data: &[u8]) -> Result<()> {
    let fd = Fd::open(c_path(path)?.as_ref(), libc::O_WRONLY)?;
    Ok(fd.write_at(0, data)?)
}

/// Export `gpio` through sysfs (if it isn't already) and configure its direction.
fn export(gpio: u32, direction: &str) -> Result<Fd> {
    if !Path::new(GPIO_ROOT).exists() {
        return Err(Error::NotFound)
    }
    let pin_root = format!("{}/gpio{}", GPIO_ROOT, gpio);
    if !Path::new(&pin_root).exists() {
        log::debug!("exporting gpio{}", gpio);
        write_file(format!("{}/export", GPIO_ROOT), gpio.to_string().as_bytes())?;
    }
    // udev may need a moment to fix up permissions of a freshly exported pin
    let mut attempts = 0;
    loop {
        match write_file(format!("{}/direction", pin_root), direction.as_bytes()) {
            Ok(()) => break,
            Err(Error::Gpio(error)) if error.kind() == io::ErrorKind::PermissionDenied && attempts < 10 => {
                attempts += 1;
                sleep(Duration::from_millis(10));
            }
            Err(error) => return Err(error),
        }
    }
    let flags = if direction == "in" { libc::O_RDONLY } else { libc::O_RDWR };
    Ok(Fd::open(c_path(format!("{}/value", pin_root))?.as_ref(), flags)?)
}

/// Bit-banged lines through the sysfs GPIO interface.
#[derive(Debug)]
pub struct GpioDriverImpl {
    dout_fd: Fd,
    pd_sck_fd: Fd,
    epoch: Instant,
}

impl GpioDriverImpl {
    pub fn new(dout_gpio: u32, pd_sck_gpio: u32) -> Result<GpioDriverImpl> {
        let dout_fd = export(dout_gpio, "in")?;
        // "low" configures the pin as an output that starts out low
        let pd_sck_fd = export(pd_sck_gpio, "low")?;
        log::debug!("opened gpio{} as DOUT, gpio{} as PD_SCK", dout_gpio, pd_sck_gpio);
        Ok(GpioDriverImpl { dout_fd, pd_sck_fd, epoch: Instant::now() })
    }
}

impl super::Driver for GpioDriverImpl {
    fn read_data(&mut self) -> Result<Level> {
        let mut value = [0u8; 1];
        self.dout_fd.read_at(0, &mut value)?;
        Ok(Level::from(value[0] == b'1'))
    }

    fn write_clock(&mut self, level: Level) -> Result<()> {
        let value = if bool::from(level) { b"1" } else { b"0" };
        Ok(self.pd_sck_fd.write_at(0, value)?)
    }

    fn hold(&mut self, duration: Duration) {
        // sleeping has far too coarse a granularity for microsecond holds
        let start = Instant::now();
        while start.elapsed() < duration {
            std::hint::spin_loop();
        }
    }

    fn sleep(&mut self, duration: Duration) {
        sleep(duration)
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
