//! Session tests: header assembly and end-to-end exposure to a FITS file

use std::sync::Arc;

use bcam::config::BcamConfig;
use bcam::fits::{self, HeaderValue, BLOCK_SIZE};
use bcam::hardware::acquisition::{AcquisitionController, RoiRequest};
use bcam::hardware::focuser::FocuserController;
use bcam::hardware::simulated::{CameraFault, SimulatedCamera, SimulatedFocuser};
use bcam::hardware::MotionMode;
use bcam::session::{ImageType, Session};
use fitsio::FitsFile;

const HEADER_ORDER: [&str; 25] = [
    "CCDTYPE", "EXPTIME", "PXHEIGHT", "PXWIDTH", "CCDMAX_X", "CCDMAX_Y", "ROIBIN_X", "ROIBIN_Y",
    "ROIMIN_X", "ROIMAX_X", "ROIMIN_Y", "ROIMAX_Y", "ROI_NX", "ROI_NY", "SETPOINT", "COOLING",
    "COOLDRIV", "FANMODE", "BACKOFF", "T_CCD", "T_HSINK", "MODEL", "SENSOR", "BCAMFOC", "FLITEMP",
];

async fn simulated_session() -> Session {
    Session::from_config(&BcamConfig::default(), true)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_exposure_header_lists_rig_state_in_order() {
    let session = simulated_session().await;

    let exposure = session
        .expose(&RoiRequest::new(2.0, true).with_binning(8, 8))
        .await
        .unwrap();

    assert_eq!(exposure.image_type, ImageType::Object);
    assert_eq!(exposure.header.keywords(), HEADER_ORDER.to_vec());
    let header = &exposure.header;
    assert_eq!(header.get("EXPTIME"), Some(&HeaderValue::Float(2.0)));
    assert_eq!(header.get("ROI_NX"), Some(&HeaderValue::Int(512)));
    assert_eq!(header.get("ROIMAX_Y"), Some(&HeaderValue::Int(4096)));
    assert_eq!(header.get("BCAMFOC"), Some(&HeaderValue::Int(3500)));
    assert_eq!(
        header.get("MODEL"),
        Some(&HeaderValue::Str("AltaU-16M".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_header_tracks_focus_moves() {
    let session = simulated_session().await;
    session
        .focuser()
        .lock()
        .await
        .goto(4100, MotionMode::Blocking)
        .await
        .unwrap();

    let header = session.header(ImageType::Bias, 0.0).await.unwrap();
    assert_eq!(header.get("CCDTYPE"), Some(&HeaderValue::Str("BIAS".to_string())));
    assert_eq!(header.get("BCAMFOC"), Some(&HeaderValue::Int(4100)));
}

#[tokio::test]
async fn test_header_omits_focuser_cards_when_detached() {
    let mut config = BcamConfig::default();
    config.focuser.enabled = false;
    let session = Session::from_config(&config, true).await.unwrap();

    let header = session.header(ImageType::Dark, 1.0).await.unwrap();
    let keywords = header.keywords();
    assert_eq!(keywords.len(), 23);
    assert!(!keywords.contains(&"BCAMFOC"));
    assert!(!keywords.contains(&"FLITEMP"));
}

#[tokio::test(start_paused = true)]
async fn test_exposure_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bias.fits");
    let session = simulated_session().await;

    let exposure = session
        .expose(&RoiRequest::new(0.0, false).with_binning(16, 16))
        .await
        .unwrap();
    assert_eq!(exposure.image_type, ImageType::Bias);
    fits::write(&path, &exposure.frame, &exposure.header)
        .await
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), exposure.to_fits().await.unwrap().len());
    // Header blocks, then 256 * 256 * 2 bytes of data padded to blocks.
    let data_len = (256 * 256 * 2usize).div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    assert!(bytes.len() > data_len);
    assert_eq!(bytes.len() % BLOCK_SIZE, 0);

    let mut fptr = FitsFile::open(&path).unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    assert_eq!(hdu.read_key::<i64>(&mut fptr, "NAXIS1").unwrap(), 256);
    assert_eq!(hdu.read_key::<String>(&mut fptr, "CCDTYPE").unwrap(), "BIAS");
    assert_eq!(hdu.read_key::<i64>(&mut fptr, "BCAMFOC").unwrap(), 3500);
    let data: Vec<i32> = hdu.read_image(&mut fptr).unwrap();
    let expected: Vec<i32> = exposure.frame.pixels.iter().map(|&v| i32::from(v)).collect();
    assert_eq!(data, expected);
}

#[tokio::test(start_paused = true)]
async fn test_exposure_kept_when_rig_state_unreadable() {
    let camera = SimulatedCamera::new();
    let mut controller = AcquisitionController::new(Arc::new(camera.clone()));
    controller.connect().await.unwrap();
    let session = Session::new(
        controller,
        FocuserController::new(Arc::new(SimulatedFocuser::new())),
    );
    camera.inject(CameraFault::SensorReadFailure).await;

    let exposure = session
        .expose(&RoiRequest::new(1.0, true).with_binning(16, 16))
        .await
        .unwrap();

    assert_eq!(exposure.frame.pixels.len(), 256 * 256);
    assert_eq!(
        exposure.header.keywords(),
        vec![
            "CCDTYPE", "EXPTIME", "ROIBIN_X", "ROIBIN_Y", "ROIMIN_X", "ROIMAX_X", "ROIMIN_Y",
            "ROIMAX_Y", "ROI_NX", "ROI_NY",
        ]
    );
    assert_eq!(exposure.header.get("ROI_NX"), Some(&HeaderValue::Int(256)));
    assert!(session.header(ImageType::Object, 1.0).await.is_err());
}

#[tokio::test]
async fn test_status_survives_missing_camera() {
    let mut config = BcamConfig::default();
    config.camera.enabled = false;
    let session = Session::from_config(&config, true).await.unwrap();

    let status = session.status().await;
    assert!(status.camera.is_none());
    assert!(status.camera_error.is_some());
    assert_eq!(status.focuser.position, Some(3500));
}

#[tokio::test]
async fn test_close_releases_both_devices() {
    let session = simulated_session().await;
    session.close().await.unwrap();

    let status = session.status().await;
    assert!(status.camera.is_none());
    assert!(!status.focuser.attached);
    session.close().await.unwrap();
}

#[cfg(not(feature = "fli_hardware"))]
#[tokio::test]
async fn test_fli_driver_requires_feature() {
    use bcam::config::FocuserDriverKind;

    let mut config = BcamConfig::default();
    config.focuser.driver = FocuserDriverKind::Fli;

    assert!(Session::from_config(&config, false).await.is_err());
}
