//! HTTP front-end.
//!
//! | Route | Method | Purpose |
//! |---|---|---|
//! | `/`, `/status` | GET | HTML status page |
//! | `/api/status` | GET | the same readings as JSON |
//! | `/expose` | GET / POST | exposure form; POST returns the frame as `bcam.fits` |
//! | `/cooling` | GET / POST | fan mode, backoff point and set point |
//! | `/focus` | GET / POST | absolute focus target; POST issues an async move |
//!
//! Invalid form input re-renders the form with messages and status 400.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ExposureDefaults;
use crate::error::{AppResult, BcamError, CaptureError, CommandError, MotionError, QueryError};
use crate::hardware::acquisition::{CoolingSettings, RoiRequest};
use crate::hardware::{FanMode, MotionMode};
use crate::limits::MAX_EXPOSURE_SECONDS;
use crate::session::{Session, SessionStatus};
use crate::validation;

/// Shared state of all handlers.
pub struct AppState {
    /// The rig.
    pub session: Arc<Session>,
    /// Values pre-filled in the exposure form.
    pub exposure_defaults: ExposureDefaults,
}

impl AppState {
    /// Wrap a session.
    pub fn new(session: Arc<Session>, exposure_defaults: ExposureDefaults) -> Self {
        Self {
            session,
            exposure_defaults,
        }
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/status", get(status_page))
        .route("/api/status", get(status_json))
        .route("/expose", get(expose_form).post(expose_submit))
        .route("/cooling", get(cooling_form).post(cooling_submit))
        .route("/focus", get(focus_form).post(focus_submit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, bind: SocketAddr) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("BCAM web front-end listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("BCAM web front-end stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }
}

// =============================================================================
// Errors
// =============================================================================

struct HttpError(BcamError);

impl<E: Into<BcamError>> From<E> for HttpError {
    fn from(err: E) -> Self {
        HttpError(err.into())
    }
}

fn error_status(err: &BcamError) -> StatusCode {
    match err {
        BcamError::Capture(CaptureError::InvalidRequest(_))
        | BcamError::Motion(MotionError::OutOfRange { .. }) => StatusCode::BAD_REQUEST,
        BcamError::Capture(CaptureError::NotConnected)
        | BcamError::Query(QueryError::NotAttached)
        | BcamError::Command(CommandError::NotAttached)
        | BcamError::Motion(MotionError::NotAttached) => StatusCode::SERVICE_UNAVAILABLE,
        BcamError::Capture(CaptureError::Busy) => StatusCode::CONFLICT,
        BcamError::Capture(CaptureError::Timeout(_)) | BcamError::Motion(MotionError::Timeout { .. }) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        warn!(%status, error = %self.0, "Request failed");
        let body = format!("<h2>Error</h2><p>{}</p>", escape(&self.0.to_string()));
        (status, Html(page("BCAM error", &body))).into_response()
    }
}

// =============================================================================
// HTML helpers
// =============================================================================

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head><body>\n\
         <p><a href=\"/status\">Status</a> | <a href=\"/expose\">Expose</a> | \
         <a href=\"/cooling\">Cooling</a> | <a href=\"/focus\">Focus</a></p>\n\
         {body}\n</body></html>\n",
        title = escape(title),
        body = body
    )
}

enum Input {
    Text(String),
    Checkbox(bool),
    Select(Vec<(String, String)>, String),
}

struct Field {
    name: &'static str,
    label: &'static str,
    input: Input,
    error: Option<String>,
}

impl Field {
    fn text(name: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            label,
            input: Input::Text(value.into()),
            error: None,
        }
    }

    fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

fn render_form(title: &str, action: &str, submit: &str, fields: &[Field], message: Option<&str>) -> String {
    let mut body = format!("<h2>{}</h2>\n", escape(title));
    if let Some(message) = message {
        let _ = writeln!(body, "<p class=\"message\">{}</p>", escape(message));
    }
    let _ = writeln!(body, "<form method=\"post\" action=\"{}\"><table>", action);
    for field in fields {
        let input = match &field.input {
            Input::Text(value) => format!(
                "<input type=\"text\" name=\"{}\" value=\"{}\" size=\"30\"/>",
                field.name,
                escape(value)
            ),
            Input::Checkbox(checked) => format!(
                "<input type=\"checkbox\" name=\"{}\" value=\"Open\"{}/>",
                field.name,
                if *checked { " checked=\"checked\"" } else { "" }
            ),
            Input::Select(options, selected) => {
                let mut select = format!("<select name=\"{}\">", field.name);
                for (value, label) in options {
                    let _ = write!(
                        select,
                        "<option value=\"{}\"{}>{}</option>",
                        escape(value),
                        if value == selected { " selected=\"selected\"" } else { "" },
                        escape(label)
                    );
                }
                select.push_str("</select>");
                select
            }
        };
        let error = field
            .error
            .as_deref()
            .map(|e| format!(" <strong class=\"wrong\">{}</strong>", escape(e)))
            .unwrap_or_default();
        let _ = writeln!(
            body,
            "<tr><th><label for=\"{}\">{}</label></th><td>{}{}</td></tr>",
            field.name,
            escape(field.label),
            input,
            error
        );
    }
    let _ = writeln!(
        body,
        "</table><button type=\"submit\">{}</button></form>",
        escape(submit)
    );
    page(title, &body)
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn render_status(status: &SessionStatus) -> String {
    let mut body = String::from("<h2>Camera</h2>\n<table>\n");
    match &status.camera {
        Some(cam) => {
            let rows = [
                ("Model", cam.model.clone()),
                ("Sensor", cam.sensor.clone()),
                ("Interface", opt(cam.interface.as_deref())),
                (
                    "Sensor size",
                    format!("{} x {}", cam.geometry.max_img_cols, cam.geometry.max_img_rows),
                ),
                ("CCD temperature (C)", format!("{:.2}", cam.temperatures.ccd_c)),
                (
                    "Heatsink temperature (C)",
                    format!("{:.2}", cam.temperatures.heatsink_c),
                ),
                ("Cooler status", format!("{:?}", cam.cooling.status)),
                ("Cooler set-point (C)", format!("{:.2}", cam.cooling.set_point_c)),
                ("Cooler drive (%)", format!("{:.2}", cam.cooling.drive_percent)),
                ("Cooler backoff (C)", format!("{:.2}", cam.cooling.backoff_point_c)),
                ("Fan mode", cam.cooling.fan_mode.label().to_string()),
            ];
            for (label, value) in rows {
                let _ = writeln!(body, "<tr><th>{}</th><td>{}</td></tr>", label, escape(&value));
            }
        }
        None => {
            let _ = writeln!(
                body,
                "<tr><td>Camera unavailable: {}</td></tr>",
                escape(status.camera_error.as_deref().unwrap_or("unknown"))
            );
        }
    }
    body.push_str("</table>\n<h2>Focuser</h2>\n<table>\n");
    let foc = &status.focuser;
    if foc.attached {
        let rows = [
            ("Device", opt(foc.device_path.as_deref())),
            ("Position", opt(foc.position)),
            ("Lower limit", opt(foc.lower_limit)),
            ("Upper limit", opt(foc.upper_limit)),
            (
                "Temperature (C)",
                opt(foc.temperature_c.map(|t| format!("{:.2}", t))),
            ),
        ];
        for (label, value) in rows {
            let _ = writeln!(body, "<tr><th>{}</th><td>{}</td></tr>", label, escape(&value));
        }
    } else {
        body.push_str("<tr><td>No focuser attached</td></tr>\n");
    }
    body.push_str("</table>\n");
    page("BCAM status", &body)
}

// =============================================================================
// Status
// =============================================================================

async fn status_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let status = state.session.status().await;
    Html(render_status(&status))
}

async fn status_json(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.session.status().await)
}

// =============================================================================
// Expose
// =============================================================================

/// Exposure form fields. The shutter checkbox is absent when unchecked.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExposeForm {
    /// Exposure time in seconds.
    pub exptime: String,
    /// Column binning.
    pub xbin: String,
    /// Row binning.
    pub ybin: String,
    /// Present when the shutter should open.
    pub shutter: Option<String>,
}

fn expose_fields(form: &ExposeForm, errors: [Option<String>; 3]) -> Vec<Field> {
    let [exptime_err, xbin_err, ybin_err] = errors;
    vec![
        Field::text("exptime", "Exposure Time (s):", form.exptime.clone()).with_error(exptime_err),
        Field::text("xbin", "X binning:", form.xbin.clone()).with_error(xbin_err),
        Field::text("ybin", "Y binning:", form.ybin.clone()).with_error(ybin_err),
        Field {
            name: "shutter",
            label: "Open shutter:",
            input: Input::Checkbox(form.shutter.is_some()),
            error: None,
        },
    ]
}

async fn expose_form(State(state): State<Arc<AppState>>) -> Html<String> {
    let d = &state.exposure_defaults;
    let form = ExposeForm {
        exptime: format!("{:?}", d.exposure_seconds),
        xbin: d.x_bin.to_string(),
        ybin: d.y_bin.to_string(),
        shutter: d.shutter_open.then(|| "Open".to_string()),
    };
    Html(render_form(
        "Expose",
        "/expose",
        "Expose",
        &expose_fields(&form, [None, None, None]),
        None,
    ))
}

async fn expose_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ExposeForm>,
) -> Result<Response, HttpError> {
    let exptime = validation::parse_number_between(&form.exptime, 0.0..=MAX_EXPOSURE_SECONDS);
    let xbin = validation::parse_positive_int(&form.xbin);
    let ybin = validation::parse_positive_int(&form.ybin);

    let (exptime, xbin, ybin) = match (exptime, xbin, ybin) {
        (Ok(e), Ok(x), Ok(y)) => (e, x, y),
        (e, x, y) => {
            let fields = expose_fields(&form, [e.err(), x.err(), y.err()]);
            let html = render_form("Expose", "/expose", "Expose", &fields, None);
            return Ok((StatusCode::BAD_REQUEST, Html(html)).into_response());
        }
    };

    let request = RoiRequest::new(exptime, form.shutter.is_some()).with_binning(xbin, ybin);
    let exposure = state.session.expose(&request).await?;
    info!(
        image_type = exposure.image_type.as_str(),
        rows = exposure.frame.rows,
        cols = exposure.frame.cols,
        "Serving exposure"
    );
    let body = exposure.to_fits().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/fits"),
            (header::CONTENT_DISPOSITION, "attachment; filename=bcam.fits"),
        ],
        body,
    )
        .into_response())
}

// =============================================================================
// Cooling
// =============================================================================

/// Cooling form fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CoolingForm {
    /// Fan mode code 0-3.
    pub fanmode: String,
    /// Backoff point in °C.
    pub backoff: String,
    /// Set point in °C.
    pub setpoint: String,
}

fn cooling_fields(form: &CoolingForm, errors: [Option<String>; 3]) -> Vec<Field> {
    let [fan_err, backoff_err, setpoint_err] = errors;
    let options = FanMode::ALL
        .iter()
        .map(|m| (m.code().to_string(), m.label().to_string()))
        .collect();
    vec![
        Field {
            name: "fanmode",
            label: "Fan Mode",
            input: Input::Select(options, form.fanmode.clone()),
            error: fan_err,
        },
        Field::text("backoff", "Cooler Backoff Temp (C):", form.backoff.clone())
            .with_error(backoff_err),
        Field::text("setpoint", "Cooler Set-Point (C):", form.setpoint.clone())
            .with_error(setpoint_err),
    ]
}

async fn cooling_form(State(state): State<Arc<AppState>>) -> Result<Html<String>, HttpError> {
    let cooling = state.session.camera().lock().await.status().await?.cooling;
    let form = CoolingForm {
        fanmode: cooling.fan_mode.code().to_string(),
        backoff: format!("{:.2}", cooling.backoff_point_c),
        setpoint: format!("{:.2}", cooling.set_point_c),
    };
    Ok(Html(render_form(
        "Cooling",
        "/cooling",
        "Configure Cooling",
        &cooling_fields(&form, [None, None, None]),
        None,
    )))
}

async fn cooling_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CoolingForm>,
) -> Result<Response, HttpError> {
    let fan = validation::parse_int_in_range(&form.fanmode, 0..=3)
        .and_then(|code| FanMode::from_code(code).ok_or_else(|| "Unknown fan mode".to_string()));
    let backoff = validation::parse_number_at_least(&form.backoff, 1.0);
    let setpoint = validation::parse_number_at_least(&form.setpoint, -40.0);

    let settings = match (fan, backoff, setpoint) {
        (Ok(fan_mode), Ok(backoff_point_c), Ok(set_point_c)) => CoolingSettings {
            fan_mode,
            backoff_point_c,
            set_point_c,
        },
        (f, b, s) => {
            let fields = cooling_fields(&form, [f.err(), b.err(), s.err()]);
            let html = render_form("Cooling", "/cooling", "Configure Cooling", &fields, None);
            return Ok((StatusCode::BAD_REQUEST, Html(html)).into_response());
        }
    };

    state
        .session
        .camera()
        .lock()
        .await
        .configure_cooling(settings)
        .await?;
    let fields = cooling_fields(&form, [None, None, None]);
    Ok(Html(render_form(
        "Cooling",
        "/cooling",
        "Configure Cooling",
        &fields,
        Some("Cooling configured"),
    ))
    .into_response())
}

// =============================================================================
// Focus
// =============================================================================

/// Focus form fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FocusForm {
    /// Absolute target position.
    pub focus: String,
}

fn focus_page(value: &str, error: Option<String>, limits: (i64, i64)) -> String {
    let fields = [Field::text("focus", "BCAM Focus Position:", value).with_error(error)];
    let message = format!("Range {} to {}", limits.0, limits.1);
    render_form("Focus", "/focus", "Set Focus", &fields, Some(&message))
}

async fn focus_form(State(state): State<Arc<AppState>>) -> Result<Html<String>, HttpError> {
    let focuser = state.session.focuser().lock().await;
    let position = focuser.position().await?;
    let limits = (focuser.lower_limit()?, focuser.upper_limit().await?);
    Ok(Html(focus_page(&position.to_string(), None, limits)))
}

async fn focus_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<FocusForm>,
) -> Result<Response, HttpError> {
    let focuser = state.session.focuser().lock().await;
    let lower = focuser.lower_limit()?;
    let upper = focuser.upper_limit().await?;
    let target = match validation::parse_int_in_range(&form.focus, lower..=upper) {
        Ok(target) => target,
        Err(e) => {
            let html = focus_page(&form.focus, Some(e), (lower, upper));
            return Ok((StatusCode::BAD_REQUEST, Html(html)).into_response());
        }
    };
    focuser.goto(target, MotionMode::Async).await?;
    Ok(Redirect::to("/status").into_response())
}
