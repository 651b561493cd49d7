//! Acquisition controller.
//!
//! A capture goes through four stages:
//!
//! 1. **Negotiate**: inverted bounds are swapped, then binning and region
//!    ends are clamped silently to the sensor limits. Out-of-range imaging
//!    requests are honoured up to what the hardware can do, never rejected.
//! 2. **Program**: `rows = (end_y - start_y) / y_bin` and
//!    `cols = (end_x - start_x) / x_bin` (integer division) are written to the
//!    ROI registers together with the start and bin values.
//! 3. **Expose and poll**: the exposure is started and the imaging status is
//!    polled until `ImageReady`. An `Error` status aborts the capture.
//! 4. **Read**: the raw buffer must hold exactly `rows * cols` samples.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{CaptureError, CommandError, OpenError, QueryError};
use crate::hardware::capabilities::{CameraDriver, CameraHandle};
use crate::hardware::discovery::{parse_device_str, CameraKind, DeviceDescriptor};
use crate::hardware::{
    CoolingStatus, ExposureStatus, FanMode, RoiRegisters, SensorGeometry, Temperatures,
};
use crate::limits::{PollSettings, MAX_EXPOSURE_SECONDS};

// =============================================================================
// Requests and frames
// =============================================================================

/// A user-level capture request, in unbinned sensor coordinates.
///
/// Region ends default to `u32::MAX`, which clamps to the sensor edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoiRequest {
    /// Exposure time in seconds (>= 0).
    pub exposure_seconds: f64,
    /// Shutter open (light frame) or closed (dark/bias).
    pub shutter_open: bool,
    /// Column binning (>= 1).
    pub x_bin: u32,
    /// Row binning (>= 1).
    pub y_bin: u32,
    /// First column.
    pub start_x: u32,
    /// First row.
    pub start_y: u32,
    /// Column one past the region.
    pub end_x: u32,
    /// Row one past the region.
    pub end_y: u32,
}

impl RoiRequest {
    /// Full-frame, unbinned request.
    pub fn new(exposure_seconds: f64, shutter_open: bool) -> Self {
        Self {
            exposure_seconds,
            shutter_open,
            x_bin: 1,
            y_bin: 1,
            start_x: 0,
            start_y: 0,
            end_x: u32::MAX,
            end_y: u32::MAX,
        }
    }

    /// Set binning on both axes.
    pub fn with_binning(mut self, x_bin: u32, y_bin: u32) -> Self {
        self.x_bin = x_bin;
        self.y_bin = y_bin;
        self
    }

    /// Set the region corners (either order).
    pub fn with_region(mut self, start_x: u32, start_y: u32, end_x: u32, end_y: u32) -> Self {
        self.start_x = start_x;
        self.start_y = start_y;
        self.end_x = end_x;
        self.end_y = end_y;
        self
    }

    /// Reject requests no camera could honour.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.exposure_seconds.is_finite() || self.exposure_seconds < 0.0 {
            return Err(CaptureError::InvalidRequest(format!(
                "exposure must be a finite number >= 0, got {}",
                self.exposure_seconds
            )));
        }
        if self.exposure_seconds > MAX_EXPOSURE_SECONDS {
            return Err(CaptureError::InvalidRequest(format!(
                "exposure must be <= {} s, got {}",
                MAX_EXPOSURE_SECONDS, self.exposure_seconds
            )));
        }
        if self.x_bin == 0 || self.y_bin == 0 {
            return Err(CaptureError::InvalidRequest(format!(
                "binning must be >= 1, got {}x{}",
                self.x_bin, self.y_bin
            )));
        }
        Ok(())
    }

    /// Swap inverted bounds so that `start <= end` on both axes.
    pub fn normalized(mut self) -> Self {
        if self.start_x > self.end_x {
            std::mem::swap(&mut self.start_x, &mut self.end_x);
        }
        if self.start_y > self.end_y {
            std::mem::swap(&mut self.start_y, &mut self.end_y);
        }
        self
    }

    /// Clamp binning and region ends to the sensor. A start beyond the
    /// clamped end collapses onto it (empty region).
    pub fn clamped(mut self, geometry: &SensorGeometry) -> Self {
        self.y_bin = self.y_bin.min(geometry.max_bin_rows);
        self.end_y = self.end_y.min(geometry.max_img_rows);
        self.x_bin = self.x_bin.min(geometry.max_bin_cols);
        self.end_x = self.end_x.min(geometry.max_img_cols);
        self.start_y = self.start_y.min(self.end_y);
        self.start_x = self.start_x.min(self.end_x);
        self
    }

    /// Register values for an already normalized and clamped request.
    pub fn registers(&self) -> RoiRegisters {
        let y_bin = self.y_bin.max(1);
        let x_bin = self.x_bin.max(1);
        RoiRegisters {
            start_row: self.start_y,
            num_rows: (self.end_y - self.start_y) / y_bin,
            bin_row: y_bin,
            start_col: self.start_x,
            num_cols: (self.end_x - self.start_x) / x_bin,
            bin_col: x_bin,
        }
    }

    /// Normalize, clamp against `geometry` and compute the registers.
    pub fn negotiate(&self, geometry: &SensorGeometry) -> RoiRegisters {
        self.normalized().clamped(geometry).registers()
    }
}

/// Light (shutter open) or dark (shutter closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameType {
    /// Shutter open.
    Light,
    /// Shutter closed.
    Dark,
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameType::Light => write!(f, "Light"),
            FrameType::Dark => write!(f, "Dark"),
        }
    }
}

/// One captured image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    /// `rows * cols` samples, row-major.
    pub pixels: Vec<u16>,
    /// Output rows.
    pub rows: u32,
    /// Output columns.
    pub cols: u32,
    /// Exposure time in seconds.
    pub exposure_seconds: f64,
    /// Shutter state during the exposure.
    pub shutter_open: bool,
    /// Registers the frame was read out with.
    pub roi: RoiRegisters,
}

impl CapturedFrame {
    /// Light or dark.
    pub fn frame_type(&self) -> FrameType {
        if self.shutter_open {
            FrameType::Light
        } else {
            FrameType::Dark
        }
    }

    /// Samples of row `row`.
    pub fn row(&self, row: u32) -> Option<&[u16]> {
        let cols = self.cols as usize;
        let start = row as usize * cols;
        self.pixels.get(start..start + cols)
    }

    /// Sample at (`row`, `col`).
    pub fn pixel(&self, row: u32, col: u32) -> Option<u16> {
        if col >= self.cols {
            return None;
        }
        self.row(row).and_then(|r| r.get(col as usize).copied())
    }
}

// =============================================================================
// Cooling and status
// =============================================================================

/// Cooler configuration applied by [`AcquisitionController::configure_cooling`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoolingSettings {
    /// Fan speed.
    pub fan_mode: FanMode,
    /// Backoff point in °C.
    pub backoff_point_c: f64,
    /// Set point in °C.
    pub set_point_c: f64,
}

/// Snapshot of camera state for the status page and image headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraStatus {
    /// Camera model.
    pub model: String,
    /// Sensor name.
    pub sensor: String,
    /// Camera family.
    pub kind: Option<CameraKind>,
    /// Link the camera was connected through.
    pub interface: Option<String>,
    /// Sensor limits.
    pub geometry: SensorGeometry,
    /// ROI registers as currently programmed.
    pub roi: RoiRegisters,
    /// Cooler readback.
    pub cooling: CoolingStatus,
    /// Temperatures.
    pub temperatures: Temperatures,
}

// =============================================================================
// AcquisitionController
// =============================================================================

/// Owns one camera connection and runs captures on it.
pub struct AcquisitionController {
    driver: Arc<dyn CameraDriver>,
    handle: Option<Box<dyn CameraHandle>>,
    device: Option<DeviceDescriptor>,
    kind: Option<CameraKind>,
    polling: PollSettings,
}

impl AcquisitionController {
    /// Disconnected controller using `driver`.
    pub fn new(driver: Arc<dyn CameraDriver>) -> Self {
        Self {
            driver,
            handle: None,
            device: None,
            kind: None,
            polling: PollSettings::camera(),
        }
    }

    /// Override the status polling cadence and readout timeout.
    pub fn with_polling(mut self, polling: PollSettings) -> Self {
        self.polling = polling;
        self
    }

    /// Discover cameras and connect to the first valid one.
    ///
    /// Idempotent while connected.
    pub async fn connect(&mut self) -> Result<DeviceDescriptor, OpenError> {
        if let Some(device) = &self.device {
            if self.handle.is_some() {
                return Ok(device.clone());
            }
        }

        let listing = self
            .driver
            .discover()
            .await
            .map_err(|source| OpenError::Driver {
                device: "discovery".to_string(),
                source,
            })?;
        let devices = parse_device_str(&listing);
        debug!(count = devices.len(), "Discovered cameras");
        let device = devices.into_iter().next().ok_or_else(|| {
            warn!("No camera found during discovery");
            OpenError::NoCameraFound
        })?;

        let kind = device.kind()?;
        let firmware_rev = device.firmware_rev_value()?;
        let id = device.id_value()?;
        debug!(
            interface = %device.interface,
            address = %device.address,
            firmware_rev,
            id,
            %kind,
            "Opening camera connection"
        );

        let handle = self
            .driver
            .connect(kind, &device)
            .await
            .map_err(|source| {
                warn!(address = %device.address, error = %source, "Can't connect camera");
                OpenError::Driver {
                    device: device.address.clone(),
                    source,
                }
            })?;
        let model = handle
            .model()
            .await
            .unwrap_or_else(|_| device.model.clone());
        info!(
            "Camera {} connected and initialized via {}",
            model, device.interface
        );

        self.handle = Some(handle);
        self.kind = Some(kind);
        self.device = Some(device.clone());
        Ok(device)
    }

    /// Whether a camera is connected.
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Descriptor of the connected camera.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    fn connected(&self) -> Option<&dyn CameraHandle> {
        self.handle.as_deref()
    }

    /// Run one exposure and return the frame.
    pub async fn capture(&self, request: &RoiRequest) -> Result<CapturedFrame, CaptureError> {
        let handle = self.connected().ok_or(CaptureError::NotConnected)?;
        request.validate()?;

        if handle.imaging_status().await? == ExposureStatus::ExposureInProgress {
            warn!("Capture refused: exposure already in progress");
            return Err(CaptureError::Busy);
        }

        let geometry = handle.geometry().await?;
        let roi = request.negotiate(&geometry);
        if roi.num_rows == 0 || roi.num_cols == 0 {
            return Err(CaptureError::InvalidRequest(format!(
                "region yields an empty {}x{} readout",
                roi.num_cols, roi.num_rows
            )));
        }
        handle.set_roi(roi).await?;

        handle
            .start_exposure(request.exposure_seconds, request.shutter_open)
            .await?;
        self.wait_image_ready(handle, request.exposure_seconds)
            .await?;

        let frame_type = if request.shutter_open {
            FrameType::Light
        } else {
            FrameType::Dark
        };
        info!(
            "Reading {} exp={}, xbin={}, ybin={}, r={}, c={}",
            frame_type, request.exposure_seconds, roi.bin_col, roi.bin_row, roi.num_rows,
            roi.num_cols
        );

        let pixels = handle.read_image().await?;
        let expected = roi.sample_count();
        if pixels.len() != expected {
            warn!(expected, actual = pixels.len(), "Image size mismatch");
            return Err(CaptureError::ShapeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        Ok(CapturedFrame {
            pixels,
            rows: roi.num_rows,
            cols: roi.num_cols,
            exposure_seconds: request.exposure_seconds,
            shutter_open: request.shutter_open,
            roi,
        })
    }

    async fn wait_image_ready(
        &self,
        handle: &dyn CameraHandle,
        exposure_seconds: f64,
    ) -> Result<(), CaptureError> {
        let timeout = Duration::try_from_secs_f64(exposure_seconds)
            .ok()
            .and_then(|exposure| exposure.checked_add(self.polling.timeout))
            .ok_or_else(|| {
                CaptureError::InvalidRequest(format!(
                    "exposure of {} s has no representable timeout",
                    exposure_seconds
                ))
            })?;
        let started = Instant::now();
        loop {
            match handle.imaging_status().await? {
                ExposureStatus::ImageReady => return Ok(()),
                ExposureStatus::Error => {
                    warn!("Camera reported error status during exposure");
                    return Err(CaptureError::DeviceFault(
                        "imaging status Error during exposure".to_string(),
                    ));
                }
                _ => {}
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!(?elapsed, "Image not ready before timeout");
                return Err(CaptureError::Timeout(elapsed));
            }
            sleep(self.polling.interval).await;
        }
    }

    /// Enable the cooler and apply fan mode, backoff point and set point, in that order.
    pub async fn configure_cooling(&self, settings: CoolingSettings) -> Result<(), CommandError> {
        let handle = self.connected().ok_or(CommandError::NotAttached)?;
        handle.set_cooler(true).await?;
        handle.set_fan_mode(settings.fan_mode).await?;
        handle
            .set_cooler_backoff_point(settings.backoff_point_c)
            .await?;
        handle.set_cooler_set_point(settings.set_point_c).await?;
        info!(
            fan = settings.fan_mode.label(),
            backoff = settings.backoff_point_c,
            set_point = settings.set_point_c,
            "Cooling configured"
        );
        Ok(())
    }

    /// Read every camera parameter shown on the status page.
    pub async fn status(&self) -> Result<CameraStatus, QueryError> {
        let handle = self.connected().ok_or(QueryError::NotAttached)?;
        Ok(CameraStatus {
            model: handle.model().await?,
            sensor: handle.sensor().await?,
            kind: self.kind,
            interface: self.device.as_ref().map(|d| d.interface.clone()),
            geometry: handle.geometry().await?,
            roi: handle.roi().await?,
            cooling: handle.cooling().await?,
            temperatures: handle.temperatures().await?,
        })
    }

    /// Release the camera. Closing a disconnected controller is a no-op.
    pub async fn close(&mut self) -> Result<(), CommandError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.kind = None;
        let device = self.device.take();
        handle.close().await?;
        info!(
            address = device.as_ref().map(|d| d.address.as_str()).unwrap_or(""),
            "Camera closed"
        );
        Ok(())
    }
}
