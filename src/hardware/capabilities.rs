//! Device Capability Traits
//!
//! The vendor libraries are treated as opaque. Each device class is split
//! into a *driver* (what you open the device with) and a *handle* (an open
//! connection). A controller owns exactly one handle at a time; nothing in
//! this crate keeps handles in global state, so tests can hand controllers a
//! simulated driver instead of real hardware.
//!
//! # Design Philosophy
//!
//! Each trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Returns [`DriverError`] for every failure
//! - Takes `&self`; implementations use interior mutability for state
//!
//! # Example
//!
//! ```rust,ignore
//! let driver: Arc<dyn FocuserDriver> = Arc::new(SimulatedFocuser::new());
//! let handle = driver.open("/dev/fliusb0").await?;
//! handle.step_motor(100, MotionMode::Blocking).await?;
//! assert_eq!(handle.steps_remaining().await?, 0);
//! ```

use async_trait::async_trait;

use crate::error::DriverError;
use crate::hardware::discovery::{CameraKind, DeviceDescriptor};
use crate::hardware::{
    CoolingStatus, ExposureStatus, FanMode, MotionMode, RoiRegisters, SensorGeometry,
    Temperatures,
};

// =============================================================================
// Focuser
// =============================================================================

/// Opens stepper focusers.
#[async_trait]
pub trait FocuserDriver: Send + Sync {
    /// Short driver identifier used in logs and errors.
    fn driver_type(&self) -> &'static str;

    /// Open the focuser at `device_path` (USB interface, focuser device class).
    async fn open(&self, device_path: &str) -> Result<Box<dyn FocuserHandle>, DriverError>;
}

/// An open stepper focuser.
///
/// # Contract
/// - Positions are absolute step counts
/// - `step_motor(_, Blocking)` returns when the driver call returns; drivers
///   may return before the motor has physically stopped, so callers that need
///   completion poll `steps_remaining`
/// - `step_motor(_, Async)` returns once the command is accepted
/// - No range checking happens here
#[async_trait]
pub trait FocuserHandle: Send + Sync {
    /// Current absolute step position.
    async fn position(&self) -> Result<i64, DriverError>;

    /// Maximum reachable position (travel extent).
    async fn extent(&self) -> Result<i64, DriverError>;

    /// Internal focuser temperature in °C.
    async fn temperature(&self) -> Result<f64, DriverError>;

    /// Drive to the home position. Blocks until the driver call returns.
    async fn home(&self) -> Result<(), DriverError>;

    /// Step the motor by `steps` relative to the current position.
    async fn step_motor(&self, steps: i64, mode: MotionMode) -> Result<(), DriverError>;

    /// Steps still outstanding from the last move (0 when idle).
    async fn steps_remaining(&self) -> Result<i64, DriverError>;

    /// Release the device. Further calls fail with [`DriverErrorKind::Closed`](crate::error::DriverErrorKind::Closed).
    async fn close(&self) -> Result<(), DriverError>;
}

// =============================================================================
// Camera
// =============================================================================

/// Discovers and connects CCD cameras.
#[async_trait]
pub trait CameraDriver: Send + Sync {
    /// Short driver identifier used in logs and errors.
    fn driver_type(&self) -> &'static str;

    /// Enumerate attached cameras as a raw descriptor string
    /// (`<d>key=value,...</d>` records).
    async fn discover(&self) -> Result<String, DriverError>;

    /// Open a connection to `device` as a camera of family `kind` and initialise it.
    async fn connect(
        &self,
        kind: CameraKind,
        device: &DeviceDescriptor,
    ) -> Result<Box<dyn CameraHandle>, DriverError>;
}

/// An open, initialised CCD camera.
///
/// # Contract
/// - `set_roi` programs all six ROI registers; values are assumed already
///   clamped to [`SensorGeometry`]
/// - `start_exposure` returns immediately; progress is observed through
///   `imaging_status`
/// - `read_image` returns the samples of the last exposure in row-major order
#[async_trait]
pub trait CameraHandle: Send + Sync {
    /// Camera model name.
    async fn model(&self) -> Result<String, DriverError>;

    /// Sensor name.
    async fn sensor(&self) -> Result<String, DriverError>;

    /// Binning and size limits plus pixel pitch.
    async fn geometry(&self) -> Result<SensorGeometry, DriverError>;

    /// Read back the ROI registers.
    async fn roi(&self) -> Result<RoiRegisters, DriverError>;

    /// Program the ROI registers for both axes.
    async fn set_roi(&self, roi: RoiRegisters) -> Result<(), DriverError>;

    /// Cooler readback.
    async fn cooling(&self) -> Result<CoolingStatus, DriverError>;

    /// Enable or disable the cooler.
    async fn set_cooler(&self, enabled: bool) -> Result<(), DriverError>;

    /// Set the fan speed.
    async fn set_fan_mode(&self, mode: FanMode) -> Result<(), DriverError>;

    /// Set the cooler backoff point in °C.
    async fn set_cooler_backoff_point(&self, celsius: f64) -> Result<(), DriverError>;

    /// Set the cooler set point in °C.
    async fn set_cooler_set_point(&self, celsius: f64) -> Result<(), DriverError>;

    /// CCD and heatsink temperatures.
    async fn temperatures(&self) -> Result<Temperatures, DriverError>;

    /// Begin an exposure of `seconds` with the shutter open or closed.
    async fn start_exposure(&self, seconds: f64, shutter_open: bool) -> Result<(), DriverError>;

    /// Current imaging state.
    async fn imaging_status(&self) -> Result<ExposureStatus, DriverError>;

    /// Raw samples of the last exposure.
    async fn read_image(&self) -> Result<Vec<u16>, DriverError>;

    /// Release the camera.
    async fn close(&self) -> Result<(), DriverError>;
}
