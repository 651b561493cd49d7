//! Hardware layer: capability traits, controllers and drivers.
//!
//! - [`capabilities`]: the driver seams (`FocuserDriver`/`FocuserHandle`,
//!   `CameraDriver`/`CameraHandle`) every backend implements.
//! - [`focuser`]: [`FocuserController`](focuser::FocuserController), bounds-checked focus motion.
//! - [`acquisition`]: [`AcquisitionController`](acquisition::AcquisitionController),
//!   ROI negotiation and exposure polling.
//! - [`discovery`]: camera descriptor string parsing and camera family selection.
//! - [`simulated`]: in-process focuser and camera used by tests and `--simulate`.
//! - `fli` (feature `fli_hardware`): the FLI focuser over `libfli`.

use serde::{Deserialize, Serialize};

pub mod acquisition;
pub mod capabilities;
pub mod discovery;
#[cfg(feature = "fli_hardware")]
pub mod fli;
pub mod focuser;
pub mod simulated;

/// Completion semantics of a focus move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMode {
    /// Return once the motion has finished.
    Blocking,
    /// Return as soon as the driver accepted the command.
    Async,
}

/// Camera imaging state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureStatus {
    /// Nothing happening.
    Idle,
    /// Continuously clearing the sensor between exposures.
    Flushing,
    /// Integrating or reading out.
    ExposureInProgress,
    /// An image is waiting to be read.
    ImageReady,
    /// The camera faulted.
    Error,
}

/// Fixed sensor capabilities reported by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorGeometry {
    /// Largest supported row (Y) binning factor.
    pub max_bin_rows: u32,
    /// Largest supported column (X) binning factor.
    pub max_bin_cols: u32,
    /// Sensor height in pixels.
    pub max_img_rows: u32,
    /// Sensor width in pixels.
    pub max_img_cols: u32,
    /// Pixel height in micrometres.
    pub pixel_height_um: f64,
    /// Pixel width in micrometres.
    pub pixel_width_um: f64,
}

/// Readout region as programmed into the camera registers.
///
/// `num_*` counts binned output pixels, so the covered sensor span along an
/// axis is `bin * num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoiRegisters {
    /// First sensor row read out.
    pub start_row: u32,
    /// Number of output rows.
    pub num_rows: u32,
    /// Row binning factor.
    pub bin_row: u32,
    /// First sensor column read out.
    pub start_col: u32,
    /// Number of output columns.
    pub num_cols: u32,
    /// Column binning factor.
    pub bin_col: u32,
}

impl RoiRegisters {
    /// Sensor row one past the last one read out.
    pub fn end_row(&self) -> u32 {
        self.start_row + self.bin_row * self.num_rows
    }

    /// Sensor column one past the last one read out.
    pub fn end_col(&self) -> u32 {
        self.start_col + self.bin_col * self.num_cols
    }

    /// Samples in one readout.
    pub fn sample_count(&self) -> usize {
        self.num_rows as usize * self.num_cols as usize
    }
}

/// Thermoelectric cooler regulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoolerStatus {
    /// Cooler disabled.
    Off,
    /// Driving towards the set point.
    RampingToSetPoint,
    /// Regulating at the set point.
    AtSetPoint,
    /// Set point unreachable; regulating at the backoff point.
    Revision,
    /// Regulation paused during readout.
    Suspended,
}

impl CoolerStatus {
    /// Numeric code stored in the image header.
    pub fn code(self) -> i64 {
        match self {
            CoolerStatus::Off => 0,
            CoolerStatus::RampingToSetPoint => 1,
            CoolerStatus::AtSetPoint => 2,
            CoolerStatus::Revision => 3,
            CoolerStatus::Suspended => 4,
        }
    }
}

/// Camera fan speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanMode {
    /// Fan stopped.
    Off,
    /// Low speed.
    Low,
    /// Medium speed.
    Medium,
    /// High speed.
    High,
}

impl FanMode {
    /// All modes in code order.
    pub const ALL: [FanMode; 4] = [FanMode::Off, FanMode::Low, FanMode::Medium, FanMode::High];

    /// Numeric code used by the driver and the image header.
    pub fn code(self) -> i64 {
        match self {
            FanMode::Off => 0,
            FanMode::Low => 1,
            FanMode::Medium => 2,
            FanMode::High => 3,
        }
    }

    /// Parse a numeric fan mode code.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.code() == code)
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            FanMode::Off => "Off",
            FanMode::Low => "Low",
            FanMode::Medium => "Medium",
            FanMode::High => "High",
        }
    }
}

/// Cooler readback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoolingStatus {
    /// Target CCD temperature in °C.
    pub set_point_c: f64,
    /// Regulation state.
    pub status: CoolerStatus,
    /// Cooler drive in percent.
    pub drive_percent: f64,
    /// Fan speed.
    pub fan_mode: FanMode,
    /// Fallback regulation offset in °C.
    pub backoff_point_c: f64,
}

/// Camera temperature sensors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    /// CCD temperature in °C.
    pub ccd_c: f64,
    /// Heatsink temperature in °C.
    pub heatsink_c: f64,
}
