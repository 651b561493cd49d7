//! Focuser controller.
//!
//! Owns at most one open [`FocuserHandle`] and layers the safety rules on top
//! of the raw driver: every motion is range-checked against the travel limits
//! before any command is sent, and blocking moves are confirmed by polling
//! `steps_remaining` until the motor reports idle.
//!
//! The lower limit is always 0 (the hardware has no query for it); the upper
//! limit is always read from the device.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{CommandError, MotionError, OpenError, QueryError};
use crate::hardware::capabilities::{FocuserDriver, FocuserHandle};
use crate::hardware::MotionMode;
use crate::limits::PollSettings;

/// Attachment state of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FocuserState {
    /// A device handle is open.
    pub attached: bool,
    /// Path the handle was opened with.
    pub device_path: Option<String>,
}

/// Snapshot of every focuser reading. Readings that failed are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocuserStatus {
    /// A device handle is open.
    pub attached: bool,
    /// Path the handle was opened with.
    pub device_path: Option<String>,
    /// Absolute step position.
    pub position: Option<i64>,
    /// Lower travel limit.
    pub lower_limit: Option<i64>,
    /// Upper travel limit.
    pub upper_limit: Option<i64>,
    /// Internal temperature in °C.
    pub temperature_c: Option<f64>,
}

/// Bounds-checked control of one stepper focuser.
///
/// # Example
///
/// ```rust,ignore
/// let mut focuser = FocuserController::new(Arc::new(SimulatedFocuser::new()));
/// focuser.open("/dev/fliusb0").await?;
/// focuser.goto(4200, MotionMode::Blocking).await?;
/// assert_eq!(focuser.position().await?, 4200);
/// ```
pub struct FocuserController {
    driver: Arc<dyn FocuserDriver>,
    handle: Option<Box<dyn FocuserHandle>>,
    device_path: Option<String>,
    polling: PollSettings,
}

impl FocuserController {
    /// Detached controller that will open devices through `driver`.
    pub fn new(driver: Arc<dyn FocuserDriver>) -> Self {
        Self {
            driver,
            handle: None,
            device_path: None,
            polling: PollSettings::focuser(),
        }
    }

    /// Override the motion polling cadence and timeout.
    pub fn with_polling(mut self, polling: PollSettings) -> Self {
        self.polling = polling;
        self
    }

    /// Open the focuser at `device_path`.
    ///
    /// Idempotent: when already attached the existing state is returned and
    /// the device is not reopened. On failure the controller stays detached.
    pub async fn open(&mut self, device_path: &str) -> Result<FocuserState, OpenError> {
        if self.handle.is_some() {
            return Ok(self.state());
        }

        match self.driver.open(device_path).await {
            Ok(handle) => {
                info!(
                    device = device_path,
                    driver = self.driver.driver_type(),
                    "Opened focuser"
                );
                self.handle = Some(handle);
                self.device_path = Some(device_path.to_string());
                Ok(self.state())
            }
            Err(source) => {
                warn!(device = device_path, error = %source, "Can't open focuser device");
                Err(OpenError::Driver {
                    device: device_path.to_string(),
                    source,
                })
            }
        }
    }

    /// Release the device. Closing a detached controller is a no-op.
    pub async fn close(&mut self) -> Result<(), CommandError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let device = self.device_path.take().unwrap_or_default();
        handle.close().await.map_err(|e| {
            warn!(device = %device, error = %e, "Error closing focuser");
            CommandError::Driver(e)
        })?;
        info!(device = %device, "Closed focuser");
        Ok(())
    }

    /// Current attachment state.
    pub fn state(&self) -> FocuserState {
        FocuserState {
            attached: self.handle.is_some(),
            device_path: self.device_path.clone(),
        }
    }

    /// Whether a device is open.
    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    fn attached(&self, query: &str) -> Result<&dyn FocuserHandle, QueryError> {
        self.handle.as_deref().ok_or_else(|| {
            warn!("Can't query {}: no device attached", query);
            QueryError::NotAttached
        })
    }

    /// Current absolute step position.
    pub async fn position(&self) -> Result<i64, QueryError> {
        let handle = self.attached("stepper position")?;
        let position = handle.position().await.map_err(|e| {
            warn!(error = %e, "Can't query stepper position: error in read");
            QueryError::Driver(e)
        })?;
        info!(position, "Focuser position");
        Ok(position)
    }

    /// Hardware-reported maximum position.
    pub async fn upper_limit(&self) -> Result<i64, QueryError> {
        let handle = self.attached("stepper limit")?;
        let limit = handle.extent().await.map_err(|e| {
            warn!(error = %e, "Can't query stepper limit: error in read");
            QueryError::Driver(e)
        })?;
        info!(limit, "Focuser maximum position");
        Ok(limit)
    }

    /// Minimum position: 0 whenever a device is attached.
    pub fn lower_limit(&self) -> Result<i64, QueryError> {
        self.attached("stepper limit")?;
        info!(limit = 0, "Focuser minimum position");
        Ok(0)
    }

    /// Internal focuser temperature in °C.
    pub async fn temperature(&self) -> Result<f64, QueryError> {
        let handle = self.attached("focuser temperature")?;
        let celsius = handle.temperature().await.map_err(|e| {
            warn!(error = %e, "Can't query focuser temperature: error in read");
            QueryError::Driver(e)
        })?;
        info!("Focuser internal temperature (C): {:.2}", celsius);
        Ok(celsius)
    }

    /// Drive to the home position.
    pub async fn home(&self) -> Result<(), CommandError> {
        let Some(handle) = self.handle.as_deref() else {
            warn!("Can't home focuser: no device attached");
            return Err(CommandError::NotAttached);
        };
        info!("Homing focuser");
        handle.home().await.map_err(|e| {
            warn!(error = %e, "Can't home focuser: error in command");
            CommandError::Driver(e)
        })?;
        info!("Focuser successfully homed");
        Ok(())
    }

    /// Move `delta` steps relative to the current position.
    ///
    /// The target `position + delta` must lie within
    /// `[lower_limit, upper_limit]`; otherwise [`MotionError::OutOfRange`] is
    /// returned and nothing is sent to the device. In blocking mode this
    /// returns only once the focuser reports no steps remaining; in async
    /// mode it returns as soon as the driver accepted the command.
    pub async fn step(&self, delta: i64, mode: MotionMode) -> Result<(), MotionError> {
        let Some(handle) = self.handle.as_deref() else {
            warn!("Can't step focuser: no device attached");
            return Err(MotionError::NotAttached);
        };

        let now = self.position().await?;
        let target = now.saturating_add(delta);
        let lower = self.lower_limit()?;
        let upper = self.upper_limit().await?;
        if target < lower || target > upper {
            warn!(
                "Attempted motion to position {} is out of range ({},{})",
                target, lower, upper
            );
            return Err(MotionError::OutOfRange {
                target,
                lower,
                upper,
            });
        }

        info!(steps = delta, from = now, ?mode, "Stepping focuser");
        handle.step_motor(delta, mode).await.map_err(|e| {
            warn!(error = %e, "Can't step focuser: error in command");
            MotionError::Driver(e)
        })?;

        if mode == MotionMode::Blocking {
            self.wait_settled().await?;
        }
        info!(target, "Focuser successfully commanded to step to position");
        Ok(())
    }

    /// Move to an absolute position: `step(absolute - position())`.
    pub async fn goto(&self, absolute: i64, mode: MotionMode) -> Result<(), MotionError> {
        let now = self.position().await?;
        self.step(absolute.saturating_sub(now), mode).await
    }

    /// Poll `steps_remaining` until the motor is idle.
    ///
    /// Fails with [`MotionError::Timeout`] when steps are still outstanding
    /// after the configured motion timeout.
    pub async fn wait_settled(&self) -> Result<(), MotionError> {
        let Some(handle) = self.handle.as_deref() else {
            return Err(MotionError::NotAttached);
        };
        let started = Instant::now();
        loop {
            let remaining = handle
                .steps_remaining()
                .await
                .map_err(|e| MotionError::Query(QueryError::Driver(e)))?;
            if remaining == 0 {
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= self.polling.timeout {
                warn!(remaining, ?elapsed, "Focuser motion timed out");
                return Err(MotionError::Timeout { elapsed, remaining });
            }
            sleep(self.polling.interval).await;
        }
    }

    /// Gather every reading into one snapshot; failed readings become `None`.
    pub async fn status(&self) -> FocuserStatus {
        FocuserStatus {
            attached: self.is_attached(),
            device_path: self.device_path.clone(),
            position: self.position().await.ok(),
            lower_limit: self.lower_limit().ok(),
            upper_limit: self.upper_limit().await.ok(),
            temperature_c: self.temperature().await.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::simulated::SimulatedFocuser;

    #[tokio::test]
    async fn detached_controller_degrades_to_not_attached() {
        let focuser = FocuserController::new(Arc::new(SimulatedFocuser::new()));
        assert!(!focuser.state().attached);
        assert_eq!(focuser.position().await, Err(QueryError::NotAttached));
        assert_eq!(focuser.upper_limit().await, Err(QueryError::NotAttached));
        assert_eq!(focuser.lower_limit(), Err(QueryError::NotAttached));
        assert_eq!(focuser.temperature().await, Err(QueryError::NotAttached));
        assert_eq!(focuser.home().await, Err(CommandError::NotAttached));
        assert_eq!(
            focuser.step(10, MotionMode::Async).await,
            Err(MotionError::NotAttached)
        );
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let sim = SimulatedFocuser::new();
        let mut focuser = FocuserController::new(Arc::new(sim.clone()));
        let first = focuser.open("/dev/fliusb0").await.unwrap();
        let second = focuser.open("/dev/fliusb0").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sim.commands().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_all_readings() {
        let mut focuser =
            FocuserController::new(Arc::new(SimulatedFocuser::with_position(1234, 7000)));
        focuser.open("/dev/fliusb0").await.unwrap();
        let status = focuser.status().await;
        assert!(status.attached);
        assert_eq!(status.position, Some(1234));
        assert_eq!(status.lower_limit, Some(0));
        assert_eq!(status.upper_limit, Some(7000));
        assert!(status.temperature_c.is_some());
    }
}
