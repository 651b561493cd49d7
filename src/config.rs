//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/bcam.toml` (or an explicit path)
//! 2. Environment variables prefixed with `BCAM_`, nested keys split on `__`
//!    (`BCAM_FOCUSER__DEVICE_PATH=/dev/fliusb1`)
//!
//! Every section has defaults, so an empty or missing file is a valid
//! configuration that runs the simulated rig.
//!
//! # Example
//! ```no_run
//! use bcam::config::BcamConfig;
//!
//! let config = BcamConfig::load()?;
//! config.validate()?;
//! println!("Serving on {}", config.server.bind);
//! # Ok::<(), bcam::error::BcamError>(())
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, BcamError};
use crate::limits::{
    PollSettings, CAMERA_POLL_INTERVAL, CAMERA_READOUT_TIMEOUT, FOCUSER_MOTION_TIMEOUT,
    FOCUSER_POLL_INTERVAL,
};
use crate::logging::{self, OutputFormat};
use crate::validation;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/bcam.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BcamConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Focuser settings
    pub focuser: FocuserConfig,
    /// Camera settings
    pub camera: CameraConfig,
    /// Exposure form defaults
    pub exposure: ExposureDefaults,
    /// HTTP front-end settings
    pub server: ServerConfig,
    /// Image output settings
    pub output: OutputConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Console log format
    pub log_format: OutputFormat,
    /// Optional DEBUG log file
    pub log_file: Option<PathBuf>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "BCAM".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Pretty,
            log_file: None,
        }
    }
}

/// Which focuser backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocuserDriverKind {
    /// In-process simulation.
    Simulated,
    /// FLI focuser through `libfli` (feature `fli_hardware`).
    Fli,
}

/// Focuser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocuserConfig {
    /// Open the focuser at startup
    pub enabled: bool,
    /// Backend
    pub driver: FocuserDriverKind,
    /// Device node passed to the driver open call
    pub device_path: String,
    /// Interval between `steps_remaining` polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Longest a blocking move may take
    #[serde(with = "humantime_serde")]
    pub motion_timeout: Duration,
    /// Simulated focuser parameters
    pub simulated: SimulatedFocuserConfig,
}

impl Default for FocuserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: FocuserDriverKind::Simulated,
            device_path: "/dev/fliusb0".to_string(),
            poll_interval: FOCUSER_POLL_INTERVAL,
            motion_timeout: FOCUSER_MOTION_TIMEOUT,
            simulated: SimulatedFocuserConfig::default(),
        }
    }
}

impl FocuserConfig {
    /// Polling settings for blocking moves.
    pub fn polling(&self) -> PollSettings {
        PollSettings::new(self.poll_interval, self.motion_timeout)
    }
}

/// Simulated focuser parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedFocuserConfig {
    /// Travel extent in steps
    pub extent: i64,
    /// Position at power-on
    pub initial_position: i64,
    /// Internal temperature in °C
    pub temperature_c: f64,
    /// Motor speed
    pub steps_per_second: f64,
}

impl Default for SimulatedFocuserConfig {
    fn default() -> Self {
        Self {
            extent: 7000,
            initial_position: 3500,
            temperature_c: 12.5,
            steps_per_second: 2000.0,
        }
    }
}

/// Which camera backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraDriverKind {
    /// In-process simulation.
    Simulated,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Connect the camera at startup
    pub enabled: bool,
    /// Backend
    pub driver: CameraDriverKind,
    /// Interval between imaging status polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Time allowed past the exposure length for readout
    #[serde(with = "humantime_serde")]
    pub readout_timeout: Duration,
    /// Simulated camera parameters
    pub simulated: SimulatedCameraConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: CameraDriverKind::Simulated,
            poll_interval: CAMERA_POLL_INTERVAL,
            readout_timeout: CAMERA_READOUT_TIMEOUT,
            simulated: SimulatedCameraConfig::default(),
        }
    }
}

impl CameraConfig {
    /// Polling settings for exposures.
    pub fn polling(&self) -> PollSettings {
        PollSettings::new(self.poll_interval, self.readout_timeout)
    }
}

/// Simulated camera parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedCameraConfig {
    /// Model string reported by discovery (`<family>-<variant>`)
    pub model: String,
    /// Sensor name
    pub sensor: String,
    /// Sensor height in pixels
    pub max_img_rows: u32,
    /// Sensor width in pixels
    pub max_img_cols: u32,
    /// Largest row binning
    pub max_bin_rows: u32,
    /// Largest column binning
    pub max_bin_cols: u32,
    /// Pixel pitch in micrometres
    pub pixel_size_um: f64,
    /// Readout time for a full unbinned frame
    #[serde(with = "humantime_serde")]
    pub full_frame_readout: Duration,
}

impl Default for SimulatedCameraConfig {
    fn default() -> Self {
        Self {
            model: "AltaU-16M".to_string(),
            sensor: "KAF16803".to_string(),
            max_img_rows: 4096,
            max_img_cols: 4096,
            max_bin_rows: 64,
            max_bin_cols: 16,
            pixel_size_um: 9.0,
            full_frame_readout: Duration::from_millis(200),
        }
    }
}

/// Defaults pre-filled in the exposure form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureDefaults {
    /// Exposure time in seconds
    pub exposure_seconds: f64,
    /// Column binning
    pub x_bin: u32,
    /// Row binning
    pub y_bin: u32,
    /// Shutter open (light frame)
    pub shutter_open: bool,
}

impl Default for ExposureDefaults {
    fn default() -> Self {
        Self {
            exposure_seconds: 2.0,
            x_bin: 8,
            y_bin: 8,
            shutter_open: true,
        }
    }
}

/// HTTP front-end configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Image output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory FITS files are written to
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            prefix: "bcam".to_string(),
        }
    }
}

impl BcamConfig {
    /// Load configuration from `config/bcam.toml` and environment variables.
    ///
    /// Example override: `BCAM_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The layered provider stack used by [`load_from`](Self::load_from).
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BCAM_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        logging::parse_log_level(&self.application.log_level)?;

        if self.focuser.poll_interval.is_zero() {
            return Err(BcamError::Configuration(
                "focuser.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.camera.poll_interval.is_zero() {
            return Err(BcamError::Configuration(
                "camera.poll_interval must be greater than zero".to_string(),
            ));
        }

        validation::is_valid_path(&self.focuser.device_path)
            .map_err(|e| BcamError::Configuration(format!("focuser.device_path: {}", e)))?;
        validation::is_not_empty(&self.output.prefix)
            .map_err(|e| BcamError::Configuration(format!("output.prefix: {}", e)))?;
        validation::is_valid_port(self.server.bind.port())
            .map_err(|e| BcamError::Configuration(format!("server.bind: {}", e)))?;

        let sim = &self.focuser.simulated;
        validation::is_in_range(sim.initial_position, 0..=sim.extent).map_err(|e| {
            BcamError::Configuration(format!("focuser.simulated.initial_position: {}", e))
        })?;

        let cam = &self.camera.simulated;
        for (name, value) in [
            ("max_img_rows", cam.max_img_rows),
            ("max_img_cols", cam.max_img_cols),
            ("max_bin_rows", cam.max_bin_rows),
            ("max_bin_cols", cam.max_bin_cols),
        ] {
            if value == 0 {
                return Err(BcamError::Configuration(format!(
                    "camera.simulated.{} must be greater than zero",
                    name
                )));
            }
        }

        if self.focuser.enabled
            && self.focuser.driver == FocuserDriverKind::Fli
            && !cfg!(feature = "fli_hardware")
        {
            return Err(BcamError::FeatureNotEnabled("fli_hardware".to_string()));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| BcamError::Configuration(e.to_string()))
    }
}
