//! Simulated Hardware
//!
//! In-process stand-ins for the focuser and camera drivers, used by the test
//! suite and by `bcam --simulate`. Both keep physical state outside the
//! handle (position, ROI registers, cooler) so it survives close/reopen, and
//! both use `tokio::time`, so tests running on a paused clock see motion and
//! exposures progress deterministically.
//!
//! # Available Simulations
//!
//! - [`SimulatedFocuser`] - stepper focuser moving at a fixed step rate, hard
//!   stops at 0 and the extent
//! - [`SimulatedCamera`] - CCD camera with ROI registers, cooler model and a
//!   synthetic bias/dark/light image
//!
//! Every driver command is recorded so tests can assert on what reached the
//! "hardware" (in particular, that rejected moves issued nothing).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

use crate::config::{SimulatedCameraConfig, SimulatedFocuserConfig};
use crate::error::{DriverError, DriverErrorKind};
use crate::hardware::capabilities::{CameraDriver, CameraHandle, FocuserDriver, FocuserHandle};
use crate::hardware::discovery::{CameraKind, DeviceDescriptor};
use crate::hardware::{
    CoolerStatus, CoolingStatus, ExposureStatus, FanMode, MotionMode, RoiRegisters,
    SensorGeometry, Temperatures,
};

const FOCUSER_DRIVER: &str = "simulated_focuser";
const CAMERA_DRIVER: &str = "simulated_camera";

// =============================================================================
// SimulatedFocuser
// =============================================================================

/// A command that reached the simulated focuser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocuserCommand {
    /// Device opened at this path.
    Open(String),
    /// Homing requested.
    Home,
    /// Relative step command.
    Step {
        /// Requested steps.
        steps: i64,
        /// Completion mode.
        mode: MotionMode,
    },
    /// Device closed.
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Motion {
    from: i64,
    to: i64,
    started: Instant,
}

impl Motion {
    fn at_rest(position: i64) -> Self {
        Self {
            from: position,
            to: position,
            started: Instant::now(),
        }
    }

    fn position(&self, steps_per_second: f64) -> i64 {
        let total = (self.to - self.from).abs();
        if steps_per_second <= 0.0 {
            return self.to;
        }
        let travelled = self.started.elapsed().as_secs_f64() * steps_per_second;
        let done = (travelled.floor() as i64).min(total);
        self.from + (self.to - self.from).signum() * done
    }
}

struct FocuserShared {
    extent: i64,
    temperature_c: f64,
    steps_per_second: f64,
    motion: Mutex<Motion>,
    commands: Mutex<Vec<FocuserCommand>>,
    is_open: AtomicBool,
    fail_open: AtomicBool,
    fail_reads: AtomicBool,
    blocking_returns_early: AtomicBool,
}

impl FocuserShared {
    fn travel_time(&self, steps: i64) -> Duration {
        if self.steps_per_second <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(steps.unsigned_abs() as f64 / self.steps_per_second)
            .unwrap_or(Duration::MAX)
    }
}

/// Simulated stepper focuser (driver side).
///
/// Clones share the same physical device, so a test can keep one clone for
/// inspection while the controller owns the opened handle.
///
/// # Example
///
/// ```rust,ignore
/// let focuser = SimulatedFocuser::new();
/// let handle = focuser.open("/dev/fliusb0").await?;
/// handle.step_motor(-500, MotionMode::Blocking).await?;
/// assert_eq!(focuser.motion_commands().await, 1);
/// ```
#[derive(Clone)]
pub struct SimulatedFocuser {
    shared: Arc<FocuserShared>,
}

impl SimulatedFocuser {
    /// Focuser with the default parameters (extent 7000, centred).
    pub fn new() -> Self {
        Self::from_config(&SimulatedFocuserConfig::default())
    }

    /// Focuser built from configuration.
    pub fn from_config(config: &SimulatedFocuserConfig) -> Self {
        let start = config.initial_position.clamp(0, config.extent.max(0));
        Self {
            shared: Arc::new(FocuserShared {
                extent: config.extent,
                temperature_c: config.temperature_c,
                steps_per_second: config.steps_per_second,
                motion: Mutex::new(Motion::at_rest(start)),
                commands: Mutex::new(Vec::new()),
                is_open: AtomicBool::new(false),
                fail_open: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
                blocking_returns_early: AtomicBool::new(false),
            }),
        }
    }

    /// Focuser at `position` with the given extent, otherwise default.
    pub fn with_position(position: i64, extent: i64) -> Self {
        Self::from_config(&SimulatedFocuserConfig {
            extent,
            initial_position: position,
            ..Default::default()
        })
    }

    /// Make subsequent open calls fail as if no device were plugged in.
    pub fn set_fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make position/extent/temperature/steps-remaining reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.shared.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Let blocking step commands return before the motor has stopped,
    /// as the real library does for long moves.
    pub fn set_blocking_returns_early(&self, early: bool) {
        self.shared
            .blocking_returns_early
            .store(early, Ordering::SeqCst);
    }

    /// Every command received so far.
    pub async fn commands(&self) -> Vec<FocuserCommand> {
        self.shared.commands.lock().await.clone()
    }

    /// Number of step and home commands received so far.
    pub async fn motion_commands(&self) -> usize {
        self.shared
            .commands
            .lock()
            .await
            .iter()
            .filter(|c| matches!(c, FocuserCommand::Step { .. } | FocuserCommand::Home))
            .count()
    }

    /// Physical position right now, bypassing any handle.
    pub async fn physical_position(&self) -> i64 {
        self.shared
            .motion
            .lock()
            .await
            .position(self.shared.steps_per_second)
    }
}

impl Default for SimulatedFocuser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FocuserDriver for SimulatedFocuser {
    fn driver_type(&self) -> &'static str {
        FOCUSER_DRIVER
    }

    async fn open(&self, device_path: &str) -> Result<Box<dyn FocuserHandle>, DriverError> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                FOCUSER_DRIVER,
                DriverErrorKind::Initialization,
                format!("no focuser at {}", device_path),
            )
            .with_code(-19));
        }
        if self.shared.is_open.swap(true, Ordering::SeqCst) {
            return Err(DriverError::new(
                FOCUSER_DRIVER,
                DriverErrorKind::Initialization,
                "device busy",
            )
            .with_code(-16));
        }
        self.shared
            .commands
            .lock()
            .await
            .push(FocuserCommand::Open(device_path.to_string()));
        Ok(Box::new(SimulatedFocuserHandle {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

/// An open simulated focuser.
pub struct SimulatedFocuserHandle {
    shared: Arc<FocuserShared>,
    closed: AtomicBool,
}

impl SimulatedFocuserHandle {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                FOCUSER_DRIVER,
                DriverErrorKind::Closed,
                "handle already closed",
            ));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), DriverError> {
        self.check_open()?;
        if self.shared.fail_reads.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                FOCUSER_DRIVER,
                DriverErrorKind::Communication,
                "read timed out",
            )
            .with_code(-110));
        }
        Ok(())
    }

    /// Start a move to `target(current)` (hard-stopped at the travel ends)
    /// and return its duration.
    async fn start_move(&self, target: impl FnOnce(i64) -> i64 + Send) -> Duration {
        let mut motion = self.shared.motion.lock().await;
        let current = motion.position(self.shared.steps_per_second);
        let target = target(current).clamp(0, self.shared.extent);
        *motion = Motion {
            from: current,
            to: target,
            started: Instant::now(),
        };
        self.shared.travel_time(target - current)
    }
}

#[async_trait]
impl FocuserHandle for SimulatedFocuserHandle {
    async fn position(&self) -> Result<i64, DriverError> {
        self.check_read()?;
        Ok(self
            .shared
            .motion
            .lock()
            .await
            .position(self.shared.steps_per_second))
    }

    async fn extent(&self) -> Result<i64, DriverError> {
        self.check_read()?;
        Ok(self.shared.extent)
    }

    async fn temperature(&self) -> Result<f64, DriverError> {
        self.check_read()?;
        Ok(self.shared.temperature_c)
    }

    async fn home(&self) -> Result<(), DriverError> {
        self.check_open()?;
        self.shared.commands.lock().await.push(FocuserCommand::Home);
        let travel = self.start_move(|_| 0).await;
        sleep(travel).await;
        Ok(())
    }

    async fn step_motor(&self, steps: i64, mode: MotionMode) -> Result<(), DriverError> {
        self.check_open()?;
        self.shared
            .commands
            .lock()
            .await
            .push(FocuserCommand::Step { steps, mode });

        let travel = self.start_move(|current| current + steps).await;

        let waits = mode == MotionMode::Blocking
            && !self.shared.blocking_returns_early.load(Ordering::SeqCst);
        if waits {
            sleep(travel).await;
        }
        Ok(())
    }

    async fn steps_remaining(&self) -> Result<i64, DriverError> {
        self.check_read()?;
        let motion = self.shared.motion.lock().await;
        Ok((motion.to - motion.position(self.shared.steps_per_second)).abs())
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.is_open.store(false, Ordering::SeqCst);
        self.shared.commands.lock().await.push(FocuserCommand::Close);
        Ok(())
    }
}

// =============================================================================
// SimulatedCamera
// =============================================================================

/// Fault to inject into the simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFault {
    /// Behave normally.
    #[default]
    None,
    /// Report `Error` status once an exposure has started.
    ErrorDuringExposure,
    /// Return one sample fewer than the programmed ROI.
    ShortReadout,
    /// Never leave `ExposureInProgress`.
    NeverReady,
    /// Report an exposure already running before any has been started.
    Busy,
    /// Temperature reads fail; imaging is unaffected.
    SensorReadFailure,
}

/// A command that reached the simulated camera.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCommand {
    /// Connection opened as this family at this address.
    Connect {
        /// Camera family.
        kind: CameraKind,
        /// Address from discovery.
        address: String,
    },
    /// ROI registers programmed.
    SetRoi(RoiRegisters),
    /// Exposure started.
    StartExposure {
        /// Seconds.
        seconds: f64,
        /// Shutter state.
        shutter_open: bool,
    },
    /// Image read back.
    ReadImage,
    /// Cooler enabled/disabled.
    SetCooler(bool),
    /// Fan mode changed.
    SetFanMode(FanMode),
    /// Backoff point changed.
    SetBackoffPoint(f64),
    /// Set point changed.
    SetSetPoint(f64),
    /// Connection closed.
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Exposure {
    started: Instant,
    duration: Duration,
    seconds: f64,
    shutter_open: bool,
    roi: RoiRegisters,
}

#[derive(Debug, Clone, Copy)]
struct Cooler {
    enabled: bool,
    set_point_c: f64,
    backoff_point_c: f64,
    fan_mode: FanMode,
}

const AMBIENT_C: f64 = 18.0;
const BIAS_LEVEL: f64 = 1000.0;
const DARK_RATE: f64 = 0.4;
const SKY_RATE: f64 = 150.0;

struct CameraShared {
    model: String,
    sensor: String,
    geometry: SensorGeometry,
    full_frame_readout: Duration,
    descriptor: Mutex<String>,
    fault: Mutex<CameraFault>,
    roi: Mutex<RoiRegisters>,
    cooler: Mutex<Cooler>,
    exposure: Mutex<Option<Exposure>>,
    commands: Mutex<Vec<CameraCommand>>,
    connected: AtomicBool,
}

/// Simulated CCD camera (driver side).
///
/// Defaults model an Alta U16M: 4096×4096 9 µm pixels, column binning up to
/// 16, row binning up to 64. Clones share the same device.
#[derive(Clone)]
pub struct SimulatedCamera {
    shared: Arc<CameraShared>,
}

impl SimulatedCamera {
    /// Camera with the default parameters.
    pub fn new() -> Self {
        Self::from_config(&SimulatedCameraConfig::default())
    }

    /// Camera built from configuration.
    pub fn from_config(config: &SimulatedCameraConfig) -> Self {
        let geometry = SensorGeometry {
            max_bin_rows: config.max_bin_rows,
            max_bin_cols: config.max_bin_cols,
            max_img_rows: config.max_img_rows,
            max_img_cols: config.max_img_cols,
            pixel_height_um: config.pixel_size_um,
            pixel_width_um: config.pixel_size_um,
        };
        let descriptor = format!(
            "<d>interface=usb,address=0x01,id=0x22,firmwareRev=0x10,model={},interfaceStatus=\"OK\"</d>",
            config.model
        );
        let full_roi = RoiRegisters {
            start_row: 0,
            num_rows: config.max_img_rows,
            bin_row: 1,
            start_col: 0,
            num_cols: config.max_img_cols,
            bin_col: 1,
        };
        Self {
            shared: Arc::new(CameraShared {
                model: config.model.clone(),
                sensor: config.sensor.clone(),
                geometry,
                full_frame_readout: config.full_frame_readout,
                descriptor: Mutex::new(descriptor),
                fault: Mutex::new(CameraFault::None),
                roi: Mutex::new(full_roi),
                cooler: Mutex::new(Cooler {
                    enabled: false,
                    set_point_c: -20.0,
                    backoff_point_c: 2.0,
                    fan_mode: FanMode::Low,
                }),
                exposure: Mutex::new(None),
                commands: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Replace the string returned by discovery.
    pub async fn set_descriptor(&self, descriptor: impl Into<String>) {
        *self.shared.descriptor.lock().await = descriptor.into();
    }

    /// Inject a fault for subsequent exposures.
    pub async fn inject(&self, fault: CameraFault) {
        *self.shared.fault.lock().await = fault;
    }

    /// Every command received so far.
    pub async fn commands(&self) -> Vec<CameraCommand> {
        self.shared.commands.lock().await.clone()
    }

    /// Sensor geometry this camera reports.
    pub fn geometry(&self) -> SensorGeometry {
        self.shared.geometry
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDriver for SimulatedCamera {
    fn driver_type(&self) -> &'static str {
        CAMERA_DRIVER
    }

    async fn discover(&self) -> Result<String, DriverError> {
        Ok(self.shared.descriptor.lock().await.clone())
    }

    async fn connect(
        &self,
        kind: CameraKind,
        device: &DeviceDescriptor,
    ) -> Result<Box<dyn CameraHandle>, DriverError> {
        if self.shared.connected.swap(true, Ordering::SeqCst) {
            return Err(DriverError::new(
                CAMERA_DRIVER,
                DriverErrorKind::Initialization,
                "camera already connected",
            ));
        }
        self.shared.commands.lock().await.push(CameraCommand::Connect {
            kind,
            address: device.address.clone(),
        });
        Ok(Box::new(SimulatedCameraHandle {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

/// An open simulated camera.
pub struct SimulatedCameraHandle {
    shared: Arc<CameraShared>,
    closed: AtomicBool,
}

impl SimulatedCameraHandle {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::new(
                CAMERA_DRIVER,
                DriverErrorKind::Closed,
                "handle already closed",
            ));
        }
        Ok(())
    }

    async fn record(&self, command: CameraCommand) {
        self.shared.commands.lock().await.push(command);
    }

    fn readout_time(&self, roi: &RoiRegisters) -> Duration {
        let geometry = &self.shared.geometry;
        let full = f64::from(geometry.max_img_rows) * f64::from(geometry.max_img_cols);
        if full <= 0.0 {
            return Duration::ZERO;
        }
        self.shared
            .full_frame_readout
            .mul_f64(roi.sample_count() as f64 / full)
    }

    fn synthesize(exposure: &Exposure) -> Vec<u16> {
        let roi = exposure.roi;
        let binned = f64::from(roi.bin_row * roi.bin_col);
        let mut level = BIAS_LEVEL + DARK_RATE * exposure.seconds * binned;
        if exposure.shutter_open {
            level += SKY_RATE * exposure.seconds * binned;
        }
        let mut pixels = Vec::with_capacity(roi.sample_count());
        for row in 0..roi.num_rows {
            for col in 0..roi.num_cols {
                let ripple = f64::from((row + col) % 8);
                pixels.push((level + ripple).min(f64::from(u16::MAX)) as u16);
            }
        }
        pixels
    }
}

#[async_trait]
impl CameraHandle for SimulatedCameraHandle {
    async fn model(&self) -> Result<String, DriverError> {
        self.check_open()?;
        Ok(self.shared.model.clone())
    }

    async fn sensor(&self) -> Result<String, DriverError> {
        self.check_open()?;
        Ok(self.shared.sensor.clone())
    }

    async fn geometry(&self) -> Result<SensorGeometry, DriverError> {
        self.check_open()?;
        Ok(self.shared.geometry)
    }

    async fn roi(&self) -> Result<RoiRegisters, DriverError> {
        self.check_open()?;
        Ok(*self.shared.roi.lock().await)
    }

    async fn set_roi(&self, roi: RoiRegisters) -> Result<(), DriverError> {
        self.check_open()?;
        let g = &self.shared.geometry;
        if roi.bin_row == 0
            || roi.bin_col == 0
            || roi.bin_row > g.max_bin_rows
            || roi.bin_col > g.max_bin_cols
            || roi.end_row() > g.max_img_rows
            || roi.end_col() > g.max_img_cols
        {
            return Err(DriverError::new(
                CAMERA_DRIVER,
                DriverErrorKind::InvalidParameter,
                format!("ROI {:?} exceeds sensor limits", roi),
            ));
        }
        self.record(CameraCommand::SetRoi(roi)).await;
        *self.shared.roi.lock().await = roi;
        Ok(())
    }

    async fn cooling(&self) -> Result<CoolingStatus, DriverError> {
        self.check_open()?;
        let cooler = *self.shared.cooler.lock().await;
        let (status, drive) = if cooler.enabled {
            (CoolerStatus::AtSetPoint, 45.326)
        } else {
            (CoolerStatus::Off, 0.0)
        };
        Ok(CoolingStatus {
            set_point_c: cooler.set_point_c,
            status,
            drive_percent: drive,
            fan_mode: cooler.fan_mode,
            backoff_point_c: cooler.backoff_point_c,
        })
    }

    async fn set_cooler(&self, enabled: bool) -> Result<(), DriverError> {
        self.check_open()?;
        self.record(CameraCommand::SetCooler(enabled)).await;
        self.shared.cooler.lock().await.enabled = enabled;
        Ok(())
    }

    async fn set_fan_mode(&self, mode: FanMode) -> Result<(), DriverError> {
        self.check_open()?;
        self.record(CameraCommand::SetFanMode(mode)).await;
        self.shared.cooler.lock().await.fan_mode = mode;
        Ok(())
    }

    async fn set_cooler_backoff_point(&self, celsius: f64) -> Result<(), DriverError> {
        self.check_open()?;
        self.record(CameraCommand::SetBackoffPoint(celsius)).await;
        self.shared.cooler.lock().await.backoff_point_c = celsius;
        Ok(())
    }

    async fn set_cooler_set_point(&self, celsius: f64) -> Result<(), DriverError> {
        self.check_open()?;
        self.record(CameraCommand::SetSetPoint(celsius)).await;
        self.shared.cooler.lock().await.set_point_c = celsius;
        Ok(())
    }

    async fn temperatures(&self) -> Result<Temperatures, DriverError> {
        self.check_open()?;
        if *self.shared.fault.lock().await == CameraFault::SensorReadFailure {
            return Err(DriverError::new(
                CAMERA_DRIVER,
                DriverErrorKind::Communication,
                "temperature read failed",
            ));
        }
        let cooler = *self.shared.cooler.lock().await;
        let ccd_c = if cooler.enabled {
            cooler.set_point_c + 0.031
        } else {
            AMBIENT_C
        };
        Ok(Temperatures {
            ccd_c,
            heatsink_c: AMBIENT_C + 3.7,
        })
    }

    async fn start_exposure(&self, seconds: f64, shutter_open: bool) -> Result<(), DriverError> {
        self.check_open()?;
        let roi = *self.shared.roi.lock().await;
        let mut exposure = self.shared.exposure.lock().await;
        if exposure.is_some() {
            return Err(DriverError::new(
                CAMERA_DRIVER,
                DriverErrorKind::Hardware,
                "exposure already in progress",
            ));
        }
        let duration = Duration::try_from_secs_f64(seconds.max(0.0))
            .ok()
            .and_then(|d| d.checked_add(self.readout_time(&roi)))
            .ok_or_else(|| {
                DriverError::new(
                    CAMERA_DRIVER,
                    DriverErrorKind::InvalidParameter,
                    format!("exposure time {} s out of range", seconds),
                )
            })?;
        self.record(CameraCommand::StartExposure {
            seconds,
            shutter_open,
        })
        .await;
        *exposure = Some(Exposure {
            started: Instant::now(),
            duration,
            seconds,
            shutter_open,
            roi,
        });
        Ok(())
    }

    async fn imaging_status(&self) -> Result<ExposureStatus, DriverError> {
        self.check_open()?;
        let fault = *self.shared.fault.lock().await;
        let exposure = *self.shared.exposure.lock().await;
        let status = match (exposure, fault) {
            (None, CameraFault::Busy) => ExposureStatus::ExposureInProgress,
            (None, _) => ExposureStatus::Flushing,
            (Some(_), CameraFault::ErrorDuringExposure) => ExposureStatus::Error,
            (Some(_), CameraFault::NeverReady) => ExposureStatus::ExposureInProgress,
            (Some(exp), _) if exp.started.elapsed() < exp.duration => {
                ExposureStatus::ExposureInProgress
            }
            (Some(_), _) => ExposureStatus::ImageReady,
        };
        Ok(status)
    }

    async fn read_image(&self) -> Result<Vec<u16>, DriverError> {
        self.check_open()?;
        let exposure = self.shared.exposure.lock().await.take();
        let Some(exposure) = exposure else {
            return Err(DriverError::new(
                CAMERA_DRIVER,
                DriverErrorKind::Hardware,
                "no image available",
            ));
        };
        self.record(CameraCommand::ReadImage).await;
        let mut pixels = Self::synthesize(&exposure);
        if *self.shared.fault.lock().await == CameraFault::ShortReadout {
            pixels.pop();
        }
        Ok(pixels)
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.exposure.lock().await.take();
        self.shared.connected.store(false, Ordering::SeqCst);
        self.record(CameraCommand::Close).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::discovery::parse_device_str;

    #[tokio::test(start_paused = true)]
    async fn focuser_async_move_progresses_over_time() {
        let focuser = SimulatedFocuser::with_position(1000, 7000);
        let handle = focuser.open("/dev/fliusb0").await.unwrap();

        handle.step_motor(2000, MotionMode::Async).await.unwrap();
        assert_eq!(handle.steps_remaining().await.unwrap(), 2000);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.position().await.unwrap(), 2000);
        assert_eq!(handle.steps_remaining().await.unwrap(), 1000);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.position().await.unwrap(), 3000);
        assert_eq!(handle.steps_remaining().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn focuser_hard_stops_at_travel_ends() {
        let focuser = SimulatedFocuser::with_position(100, 7000);
        let handle = focuser.open("/dev/fliusb0").await.unwrap();
        handle.step_motor(-500, MotionMode::Blocking).await.unwrap();
        assert_eq!(handle.position().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn focuser_single_open_and_closed_handle() {
        let focuser = SimulatedFocuser::new();
        let handle = focuser.open("/dev/fliusb0").await.unwrap();
        let second = focuser.open("/dev/fliusb0").await;
        assert!(matches!(second, Err(ref e) if e.kind == DriverErrorKind::Initialization));

        handle.close().await.unwrap();
        let err = handle.position().await.unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Closed);

        assert!(focuser.open("/dev/fliusb0").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn camera_exposure_cycle() {
        let camera = SimulatedCamera::new();
        let descriptor = camera.discover().await.unwrap();
        let device = &parse_device_str(&descriptor)[0];
        let handle = camera.connect(CameraKind::Alta, device).await.unwrap();

        let roi = RoiRegisters {
            start_row: 0,
            num_rows: 4,
            bin_row: 2,
            start_col: 0,
            num_cols: 3,
            bin_col: 2,
        };
        handle.set_roi(roi).await.unwrap();
        assert_eq!(handle.imaging_status().await.unwrap(), ExposureStatus::Flushing);

        handle.start_exposure(1.0, true).await.unwrap();
        assert_eq!(
            handle.imaging_status().await.unwrap(),
            ExposureStatus::ExposureInProgress
        );

        sleep(Duration::from_secs(2)).await;
        assert_eq!(
            handle.imaging_status().await.unwrap(),
            ExposureStatus::ImageReady
        );
        let pixels = handle.read_image().await.unwrap();
        assert_eq!(pixels.len(), 12);
        assert!(pixels.iter().all(|&p| p >= 1000));
        assert_eq!(handle.imaging_status().await.unwrap(), ExposureStatus::Flushing);
    }

    #[tokio::test]
    async fn camera_rejects_unrepresentable_exposure() {
        let camera = SimulatedCamera::new();
        let device = &parse_device_str(&camera.discover().await.unwrap())[0];
        let handle = camera.connect(CameraKind::Alta, device).await.unwrap();

        let err = handle.start_exposure(1e20, true).await.unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::InvalidParameter);
        assert_eq!(handle.imaging_status().await.unwrap(), ExposureStatus::Flushing);
    }

    #[tokio::test]
    async fn camera_rejects_roi_beyond_sensor() {
        let camera = SimulatedCamera::new();
        let device = &parse_device_str(&camera.discover().await.unwrap())[0];
        let handle = camera.connect(CameraKind::Alta, device).await.unwrap();
        let roi = RoiRegisters {
            start_row: 0,
            num_rows: 4096,
            bin_row: 2,
            start_col: 0,
            num_cols: 1,
            bin_col: 1,
        };
        let err = handle.set_roi(roi).await.unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::InvalidParameter);
    }
}
