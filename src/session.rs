//! Imaging session: one camera plus one focuser.
//!
//! Each controller sits behind its own `tokio::sync::Mutex`, so every public
//! operation on a device is serialized. When both are needed (building an
//! image header) the camera lock is always taken first.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{BcamConfig, FocuserDriverKind};
use crate::error::{AppResult, QueryError};
use crate::fits::{self, FitsError, FitsHeader};
use crate::hardware::acquisition::{
    AcquisitionController, CameraStatus, CapturedFrame, RoiRequest,
};
use crate::hardware::capabilities::{CameraDriver, FocuserDriver};
use crate::hardware::focuser::{FocuserController, FocuserStatus};
use crate::hardware::simulated::{SimulatedCamera, SimulatedFocuser};

/// Header image type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageType {
    /// Shutter open.
    Object,
    /// Shutter closed, non-zero exposure.
    Dark,
    /// Shutter closed, zero exposure.
    Bias,
}

impl ImageType {
    /// Classify an exposure.
    pub fn select(shutter_open: bool, exposure_seconds: f64) -> Self {
        if shutter_open {
            ImageType::Object
        } else if exposure_seconds > 0.0 {
            ImageType::Dark
        } else {
            ImageType::Bias
        }
    }

    /// `CCDTYPE` header value.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Object => "OBJECT",
            ImageType::Dark => "DARK",
            ImageType::Bias => "BIAS",
        }
    }
}

/// A captured frame with its header.
#[derive(Debug, Clone)]
pub struct Exposure {
    /// Pixel data.
    pub frame: CapturedFrame,
    /// Header cards describing the rig at capture time.
    pub header: FitsHeader,
    /// Image type recorded in the header.
    pub image_type: ImageType,
}

impl Exposure {
    /// Encode as a FITS file.
    pub async fn to_fits(&self) -> Result<Vec<u8>, FitsError> {
        fits::encode_async(&self.frame, &self.header).await
    }
}

/// Combined status of both devices.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Camera readings when connected and readable.
    pub camera: Option<CameraStatus>,
    /// Why camera readings are missing.
    pub camera_error: Option<String>,
    /// Focuser readings.
    pub focuser: FocuserStatus,
}

/// The rig: one camera controller and one focuser controller.
pub struct Session {
    camera: Mutex<AcquisitionController>,
    focuser: Mutex<FocuserController>,
}

impl Session {
    /// Session over already constructed controllers.
    pub fn new(camera: AcquisitionController, focuser: FocuserController) -> Self {
        Self {
            camera: Mutex::new(camera),
            focuser: Mutex::new(focuser),
        }
    }

    /// Build drivers from configuration and attach the enabled devices.
    ///
    /// `simulate` forces the simulated backends. Devices that fail to attach
    /// are logged and left detached; the session is still usable.
    pub async fn from_config(config: &BcamConfig, simulate: bool) -> AppResult<Self> {
        let camera_driver: Arc<dyn CameraDriver> =
            Arc::new(SimulatedCamera::from_config(&config.camera.simulated));
        let focuser_driver = focuser_driver(config, simulate)?;

        let mut camera =
            AcquisitionController::new(camera_driver).with_polling(config.camera.polling());
        let mut focuser =
            FocuserController::new(focuser_driver).with_polling(config.focuser.polling());

        if config.camera.enabled {
            if let Err(e) = camera.connect().await {
                warn!(error = %e, "Camera not available");
            }
        }
        if config.focuser.enabled {
            if let Err(e) = focuser.open(&config.focuser.device_path).await {
                warn!(error = %e, "Focuser not available");
            }
        }

        info!(
            camera = camera.is_connected(),
            focuser = focuser.is_attached(),
            "Session ready"
        );
        Ok(Self::new(camera, focuser))
    }

    /// The camera controller.
    pub fn camera(&self) -> &Mutex<AcquisitionController> {
        &self.camera
    }

    /// The focuser controller.
    pub fn focuser(&self) -> &Mutex<FocuserController> {
        &self.focuser
    }

    /// Capture a frame and build its header.
    ///
    /// A frame is never dropped for want of a header: when the rig state
    /// cannot be read after readout, the header carries only what the frame
    /// itself records.
    pub async fn expose(&self, request: &RoiRequest) -> AppResult<Exposure> {
        let camera = self.camera.lock().await;
        let frame = camera.capture(request).await?;
        let image_type = ImageType::select(request.shutter_open, request.exposure_seconds);
        let focuser = self.focuser.lock().await;
        let header =
            match build_header(&camera, &focuser, image_type, request.exposure_seconds).await {
                Ok(header) => header,
                Err(e) => {
                    warn!(error = %e, "Rig state unreadable, writing frame header only");
                    frame_header(&frame, image_type)
                }
            };
        Ok(Exposure {
            frame,
            header,
            image_type,
        })
    }

    /// Header cards for an image of `image_type` with the current rig state.
    pub async fn header(
        &self,
        image_type: ImageType,
        exposure_seconds: f64,
    ) -> Result<FitsHeader, QueryError> {
        let camera = self.camera.lock().await;
        let focuser = self.focuser.lock().await;
        build_header(&camera, &focuser, image_type, exposure_seconds).await
    }

    /// Status of both devices; never fails.
    pub async fn status(&self) -> SessionStatus {
        let camera = self.camera.lock().await;
        let (camera_status, camera_error) = match camera.status().await {
            Ok(status) => (Some(status), None),
            Err(e) => (None, Some(e.to_string())),
        };
        drop(camera);
        let focuser = self.focuser.lock().await.status().await;
        SessionStatus {
            camera: camera_status,
            camera_error,
            focuser,
        }
    }

    /// Release both devices.
    pub async fn close(&self) -> AppResult<()> {
        let camera_result = self.camera.lock().await.close().await;
        let focuser_result = self.focuser.lock().await.close().await;
        camera_result?;
        focuser_result?;
        Ok(())
    }
}

fn focuser_driver(config: &BcamConfig, simulate: bool) -> AppResult<Arc<dyn FocuserDriver>> {
    if simulate {
        return Ok(Arc::new(SimulatedFocuser::from_config(
            &config.focuser.simulated,
        )));
    }
    match config.focuser.driver {
        FocuserDriverKind::Simulated => Ok(Arc::new(SimulatedFocuser::from_config(
            &config.focuser.simulated,
        ))),
        #[cfg(feature = "fli_hardware")]
        FocuserDriverKind::Fli => Ok(Arc::new(crate::hardware::fli::FliFocuserDriver::new())),
        #[cfg(not(feature = "fli_hardware"))]
        FocuserDriverKind::Fli => Err(crate::error::BcamError::FeatureNotEnabled("fli_hardware".to_string())),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Cards recoverable from the frame alone.
fn frame_header(frame: &CapturedFrame, image_type: ImageType) -> FitsHeader {
    let roi = frame.roi;
    let mut header = FitsHeader::new();
    header
        .push("CCDTYPE", image_type.as_str(), "CCD type")
        .push("EXPTIME", frame.exposure_seconds, "Exposure time (s)")
        .push("ROIBIN_X", roi.bin_col, "X binning")
        .push("ROIBIN_Y", roi.bin_row, "Y binning")
        .push("ROIMIN_X", roi.start_col, "ROI start X")
        .push("ROIMAX_X", roi.end_col(), "ROI end X")
        .push("ROIMIN_Y", roi.start_row, "ROI start Y")
        .push("ROIMAX_Y", roi.end_row(), "ROI end Y")
        .push("ROI_NX", roi.num_cols, "ROI width")
        .push("ROI_NY", roi.num_rows, "ROI height");
    header
}

async fn build_header(
    camera: &AcquisitionController,
    focuser: &FocuserController,
    image_type: ImageType,
    exposure_seconds: f64,
) -> Result<FitsHeader, QueryError> {
    let status = camera.status().await?;
    let geometry = status.geometry;
    let roi = status.roi;
    let cooling = status.cooling;

    let mut header = FitsHeader::new();
    header
        .push("CCDTYPE", image_type.as_str(), "CCD type")
        .push("EXPTIME", exposure_seconds, "Exposure time (s)")
        .push("PXHEIGHT", geometry.pixel_height_um, "Pixel height in um")
        .push("PXWIDTH", geometry.pixel_width_um, "Pixel width in um")
        .push("CCDMAX_X", geometry.max_img_cols, "CCD width in pixels")
        .push("CCDMAX_Y", geometry.max_img_rows, "CCD height in pixels")
        .push("ROIBIN_X", roi.bin_col, "X binning")
        .push("ROIBIN_Y", roi.bin_row, "Y binning")
        .push("ROIMIN_X", roi.start_col, "ROI start X")
        .push("ROIMAX_X", roi.end_col(), "ROI end X")
        .push("ROIMIN_Y", roi.start_row, "ROI start Y")
        .push("ROIMAX_Y", roi.end_row(), "ROI end Y")
        .push("ROI_NX", roi.num_cols, "ROI width")
        .push("ROI_NY", roi.num_rows, "ROI height")
        .push("SETPOINT", round2(cooling.set_point_c), "Cooler setpoint in C")
        .push("COOLING", cooling.status.code(), "Cooler status")
        .push("COOLDRIV", round2(cooling.drive_percent), "Cooler drive (%)")
        .push("FANMODE", cooling.fan_mode.code(), "Cooler fan mode")
        .push("BACKOFF", round2(cooling.backoff_point_c), "Cooler backoff point")
        .push("T_CCD", round2(status.temperatures.ccd_c), "CCD temperature in C")
        .push(
            "T_HSINK",
            round2(status.temperatures.heatsink_c),
            "Camera heatsink temperature in C",
        )
        .push("MODEL", status.model, "Camera model")
        .push("SENSOR", status.sensor, "Camera sensor");

    if focuser.is_attached() {
        match focuser.position().await {
            Ok(position) => {
                header.push("BCAMFOC", position, "BCAM focus position");
            }
            Err(e) => warn!(error = %e, "Focus position missing from header"),
        }
        match focuser.temperature().await {
            Ok(celsius) => {
                header.push("FLITEMP", celsius, "BCAM focuser temperature (C)");
            }
            Err(e) => warn!(error = %e, "Focuser temperature missing from header"),
        }
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_follows_shutter_and_exposure() {
        assert_eq!(ImageType::select(true, 0.0), ImageType::Object);
        assert_eq!(ImageType::select(false, 2.0), ImageType::Dark);
        assert_eq!(ImageType::select(false, 0.0), ImageType::Bias);
        assert_eq!(ImageType::Bias.as_str(), "BIAS");
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(45.326), 45.33);
        assert_eq!(round2(-19.969), -19.97);
    }

    #[tokio::test]
    async fn simulate_overrides_fli_driver() {
        let mut config = BcamConfig::default();
        config.focuser.driver = FocuserDriverKind::Fli;
        let driver = focuser_driver(&config, true).unwrap();
        assert_eq!(driver.driver_type(), "simulated_focuser");
    }
}
