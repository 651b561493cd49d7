//! FLI precision focuser over `libfli`.
//!
//! Every library call is blocking, so each one runs on
//! `tokio::task::spawn_blocking`. Return codes are `0` on success and a
//! negated errno otherwise; those become [`DriverError`]s carrying the code.
#![allow(unsafe_code)]

use std::ffi::CString;
use std::os::raw::{c_double, c_long};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fli_sys::{flidev_t, FLIDEVICE_FOCUSER, FLIDOMAIN_USB, FLI_TEMPERATURE_INTERNAL};
use tracing::debug;

use crate::error::{DriverError, DriverErrorKind};
use crate::hardware::capabilities::{FocuserDriver, FocuserHandle};
use crate::hardware::MotionMode;

const DRIVER: &str = "fli";

fn check(call: &str, rc: c_long) -> Result<(), DriverError> {
    if rc == 0 {
        return Ok(());
    }
    let errno = i32::try_from(-rc).unwrap_or(0);
    let kind = match errno {
        2 | 19 => DriverErrorKind::Initialization, // ENOENT, ENODEV
        5 => DriverErrorKind::Communication,       // EIO
        22 => DriverErrorKind::InvalidParameter,   // EINVAL
        110 => DriverErrorKind::Timeout,           // ETIMEDOUT
        _ => DriverErrorKind::Hardware,
    };
    let text = std::io::Error::from_raw_os_error(errno);
    Err(DriverError::new(DRIVER, kind, format!("{} failed: {}", call, text)).with_code(i64::from(rc)))
}

async fn blocking<T, F>(f: F) -> Result<T, DriverError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DriverError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        DriverError::new(
            DRIVER,
            DriverErrorKind::Unknown,
            format!("task join error: {}", e),
        )
    })?
}

/// Opens FLI focusers on the USB bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct FliFocuserDriver;

impl FliFocuserDriver {
    /// Create the driver.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FocuserDriver for FliFocuserDriver {
    fn driver_type(&self) -> &'static str {
        DRIVER
    }

    async fn open(&self, device_path: &str) -> Result<Box<dyn FocuserHandle>, DriverError> {
        let path = CString::new(device_path).map_err(|_| {
            DriverError::new(
                DRIVER,
                DriverErrorKind::InvalidParameter,
                format!("device path contains a NUL byte: {:?}", device_path),
            )
        })?;
        let dev = blocking(move || {
            let mut dev: flidev_t = 0;
            // SAFETY: `dev` is a valid out-pointer and `path` outlives the call;
            // the library does not write through the name pointer.
            let rc = unsafe {
                fli_sys::FLIOpen(
                    &mut dev,
                    path.as_ptr().cast_mut(),
                    FLIDOMAIN_USB | FLIDEVICE_FOCUSER,
                )
            };
            check("FLIOpen", rc)?;
            Ok(dev)
        })
        .await?;
        debug!(device = device_path, handle = dev, "FLIOpen succeeded");
        Ok(Box::new(FliFocuserHandle {
            dev,
            closed: AtomicBool::new(false),
        }))
    }
}

/// An open FLI focuser.
pub struct FliFocuserHandle {
    dev: flidev_t,
    closed: AtomicBool,
}

impl FliFocuserHandle {
    fn live(&self) -> Result<flidev_t, DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                DRIVER,
                DriverErrorKind::Closed,
                "handle already closed",
            ));
        }
        Ok(self.dev)
    }

    async fn read_long(
        &self,
        call: &'static str,
        f: unsafe extern "C" fn(flidev_t, *mut c_long) -> c_long,
    ) -> Result<i64, DriverError> {
        let dev = self.live()?;
        blocking(move || {
            let mut value: c_long = 0;
            // SAFETY: `value` is a valid out-pointer for the duration of the call.
            let rc = unsafe { f(dev, &mut value) };
            check(call, rc)?;
            Ok(i64::from(value))
        })
        .await
    }
}

#[async_trait]
impl FocuserHandle for FliFocuserHandle {
    async fn position(&self) -> Result<i64, DriverError> {
        self.read_long("FLIGetStepperPosition", fli_sys::FLIGetStepperPosition)
            .await
    }

    async fn extent(&self) -> Result<i64, DriverError> {
        self.read_long("FLIGetFocuserExtent", fli_sys::FLIGetFocuserExtent)
            .await
    }

    async fn temperature(&self) -> Result<f64, DriverError> {
        let dev = self.live()?;
        blocking(move || {
            let mut celsius: c_double = 0.0;
            // SAFETY: `celsius` is a valid out-pointer for the duration of the call.
            let rc = unsafe {
                fli_sys::FLIReadTemperature(dev, FLI_TEMPERATURE_INTERNAL, &mut celsius)
            };
            check("FLIReadTemperature", rc)?;
            Ok(celsius)
        })
        .await
    }

    async fn home(&self) -> Result<(), DriverError> {
        let dev = self.live()?;
        // SAFETY: plain call on an open handle.
        blocking(move || check("FLIHomeFocuser", unsafe { fli_sys::FLIHomeFocuser(dev) })).await
    }

    async fn step_motor(&self, steps: i64, mode: MotionMode) -> Result<(), DriverError> {
        let dev = self.live()?;
        let steps = c_long::try_from(steps).map_err(|_| {
            DriverError::new(
                DRIVER,
                DriverErrorKind::InvalidParameter,
                format!("step count {} does not fit the driver", steps),
            )
        })?;
        blocking(move || {
            // SAFETY: plain calls on an open handle.
            let rc = match mode {
                MotionMode::Blocking => unsafe { fli_sys::FLIStepMotor(dev, steps) },
                MotionMode::Async => unsafe { fli_sys::FLIStepMotorAsync(dev, steps) },
            };
            check("FLIStepMotor", rc)
        })
        .await
    }

    async fn steps_remaining(&self) -> Result<i64, DriverError> {
        self.read_long("FLIGetStepsRemaining", fli_sys::FLIGetStepsRemaining)
            .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let dev = self.dev;
        // SAFETY: the handle is closed exactly once (guarded by `closed`).
        blocking(move || check("FLIClose", unsafe { fli_sys::FLIClose(dev) })).await
    }
}

impl Drop for FliFocuserHandle {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // SAFETY: the handle is closed exactly once (guarded by `closed`).
            let rc = unsafe { fli_sys::FLIClose(self.dev) };
            if rc != 0 {
                debug!(rc, "FLIClose on drop failed");
            }
        }
    }
}
