//! HTTP front-end tests against a simulated rig

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bcam::config::{BcamConfig, ExposureDefaults};
use bcam::hardware::acquisition::AcquisitionController;
use bcam::hardware::focuser::FocuserController;
use bcam::hardware::simulated::{SimulatedCamera, SimulatedFocuser};
use bcam::hardware::FanMode;
use bcam::server::{router, AppState};
use bcam::session::Session;
use tower::ServiceExt;

async fn rig() -> (Router, Arc<Session>) {
    let session = Arc::new(
        Session::from_config(&BcamConfig::default(), true)
            .await
            .unwrap(),
    );
    let state = Arc::new(AppState::new(
        Arc::clone(&session),
        ExposureDefaults::default(),
    ));
    (router(state), session)
}

fn detached_rig() -> Router {
    let session = Arc::new(Session::new(
        AcquisitionController::new(Arc::new(SimulatedCamera::new())),
        FocuserController::new(Arc::new(SimulatedFocuser::new())),
    ));
    router(Arc::new(AppState::new(session, ExposureDefaults::default())))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: axum::response::Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_status_page_shows_both_devices() {
    let (app, _session) = rig().await;

    for uri in ["/", "/status"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("AltaU-16M"));
        assert!(html.contains("<tr><th>Position</th><td>3500</td></tr>"));
        assert!(html.contains("<tr><th>Upper limit</th><td>7000</td></tr>"));
    }
}

#[tokio::test]
async fn test_status_json() {
    let (app, _session) = rig().await;

    let response = app.oneshot(get("/api/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["camera"]["model"], "AltaU-16M");
    assert_eq!(json["focuser"]["position"], 3500);
    assert_eq!(json["focuser"]["lower_limit"], 0);
}

#[tokio::test]
async fn test_status_page_without_devices() {
    let response = detached_rig().oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Camera unavailable"));
    assert!(html.contains("No focuser attached"));
}

// =============================================================================
// Expose
// =============================================================================

#[tokio::test]
async fn test_expose_form_prefills_defaults() {
    let (app, _session) = rig().await;

    let html = body_text(app.oneshot(get("/expose")).await.unwrap()).await;
    assert!(html.contains("name=\"exptime\" value=\"2.0\""));
    assert!(html.contains("name=\"xbin\" value=\"8\""));
    assert!(html.contains("name=\"shutter\" value=\"Open\" checked=\"checked\""));
}

#[tokio::test(start_paused = true)]
async fn test_expose_returns_fits_attachment() {
    let (app, _session) = rig().await;

    let response = app
        .oneshot(post_form(
            "/expose",
            "exptime=0.5&xbin=16&ybin=16&shutter=Open",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/fits");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=bcam.fits"
    );
    let bytes = body_bytes(response).await;
    assert_eq!(bytes.len() % 2880, 0);
    let header = String::from_utf8_lossy(&bytes[..2880]).into_owned();
    assert!(header.starts_with("SIMPLE  ="));
    assert!(header.contains("NAXIS1  =                  256"));
    assert!(header.contains("CCDTYPE = 'OBJECT  '"));
    assert!(header.contains("BCAMFOC =                 3500"));
}

#[tokio::test(start_paused = true)]
async fn test_expose_without_shutter_is_dark() {
    let (app, _session) = rig().await;

    let response = app
        .oneshot(post_form("/expose", "exptime=1&xbin=16&ybin=16"))
        .await
        .unwrap();
    let bytes = body_bytes(response).await;
    let header = String::from_utf8_lossy(&bytes[..2880]).into_owned();
    assert!(header.contains("CCDTYPE = 'DARK    '"));
}

#[tokio::test]
async fn test_expose_rejects_invalid_fields() {
    let (app, _session) = rig().await;

    let response = app
        .oneshot(post_form("/expose", "exptime=-1&xbin=0&ybin=abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("Must be &gt;= 0.0"));
    assert_eq!(html.matches("Must be an integer &gt; 0").count(), 2);
    assert!(html.contains("name=\"exptime\" value=\"-1\""));
}

#[tokio::test]
async fn test_expose_rejects_overlong_exposure() {
    let (app, session) = rig().await;

    let response = app
        .oneshot(post_form("/expose", "exptime=1e20&xbin=8&ybin=8&shutter=Open"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Must be &lt;= 10485.75"));
    assert!(session.camera().lock().await.status().await.is_ok());
}

#[tokio::test]
async fn test_expose_without_camera_is_unavailable() {
    let response = detached_rig()
        .oneshot(post_form("/expose", "exptime=1&xbin=1&ybin=1&shutter=Open"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Cooling
// =============================================================================

#[tokio::test]
async fn test_cooling_form_shows_current_settings() {
    let (app, _session) = rig().await;

    let html = body_text(app.oneshot(get("/cooling")).await.unwrap()).await;
    assert!(html.contains("<option value=\"1\" selected=\"selected\">Low</option>"));
    assert!(html.contains("name=\"setpoint\" value=\"-20.00\""));
}

#[tokio::test]
async fn test_cooling_post_configures_camera() {
    let (app, session) = rig().await;

    let response = app
        .oneshot(post_form(
            "/cooling",
            "fanmode=3&backoff=2.5&setpoint=-30",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Cooling configured"));

    let status = session.camera().lock().await.status().await.unwrap();
    assert_eq!(status.cooling.fan_mode, FanMode::High);
    assert_eq!(status.cooling.backoff_point_c, 2.5);
    assert_eq!(status.cooling.set_point_c, -30.0);
}

#[tokio::test]
async fn test_cooling_post_validates_ranges() {
    let (app, session) = rig().await;

    let response = app
        .oneshot(post_form(
            "/cooling",
            "fanmode=4&backoff=0.5&setpoint=-41",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let html = body_text(response).await;
    assert!(html.contains("Must be between 0 and 3"));
    assert!(html.contains("Must be &gt;= 1.0"));
    assert!(html.contains("Must be &gt;= -40.0"));

    let status = session.camera().lock().await.status().await.unwrap();
    assert_eq!(status.cooling.fan_mode, FanMode::Low);
}

// =============================================================================
// Focus
// =============================================================================

#[tokio::test]
async fn test_focus_form_shows_position_and_range() {
    let (app, _session) = rig().await;

    let html = body_text(app.oneshot(get("/focus")).await.unwrap()).await;
    assert!(html.contains("name=\"focus\" value=\"3500\""));
    assert!(html.contains("Range 0 to 7000"));
}

#[tokio::test(start_paused = true)]
async fn test_focus_post_moves_and_redirects() {
    let (app, session) = rig().await;

    let response = app
        .oneshot(post_form("/focus", "focus=4000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/status");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        session.focuser().lock().await.position().await.unwrap(),
        4000
    );
}

#[tokio::test]
async fn test_focus_post_out_of_range() {
    let (app, session) = rig().await;

    let response = app
        .oneshot(post_form("/focus", "focus=8000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response)
        .await
        .contains("Must be between 0 and 7000"));
    assert_eq!(
        session.focuser().lock().await.position().await.unwrap(),
        3500
    );
}

#[tokio::test]
async fn test_focus_without_focuser_is_unavailable() {
    let response = detached_rig().oneshot(get("/focus")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
