//! Custom error types for the application.
//!
//! Every hardware call ends in a [`DriverError`]. Controllers translate those
//! into the typed failures callers act on:
//!
//! - **[`OpenError`]**: device absent or busy. Non-fatal; the controller stays detached.
//! - **[`QueryError`]**: a read failed or no device is attached. Callers may retry.
//! - **[`CommandError`]**: the driver rejected a command. State is unchanged.
//! - **[`MotionError`]**: a focus move was rejected by the range check or by the driver.
//!   Range violations are detected before any motion command is sent.
//! - **[`CaptureError`]**: an exposure failed. `DeviceFault` and `ShapeMismatch` are fatal
//!   to that capture only.
//!
//! [`BcamError`] is the application-level error wrapping configuration, I/O and the
//! categories above, so binaries can use `?` throughout.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Broad classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Open/initialisation of the device failed.
    Initialization,
    /// The device did not answer or the link dropped.
    Communication,
    /// The device reported an internal fault.
    Hardware,
    /// The driver call did not finish in time.
    Timeout,
    /// The driver rejected an argument.
    InvalidParameter,
    /// The handle was already closed.
    Closed,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Closed => "closed",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Failure reported by a vendor driver call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver that produced the error (e.g. `"fli"`, `"simulated_camera"`).
    pub driver_type: String,
    /// Classification.
    pub kind: DriverErrorKind,
    /// Human readable detail.
    pub message: String,
    /// Raw return code from the vendor library, when there is one.
    pub code: Option<i64>,
}

impl DriverError {
    /// Create a driver error without a vendor return code.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Attach the vendor return code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

// =============================================================================
// Controller Errors
// =============================================================================

/// Opening a device failed. The owning controller stays detached.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OpenError {
    /// The driver open call failed.
    #[error("Can't open device at {device}: {source}")]
    Driver {
        /// Device path or address that was opened.
        device: String,
        /// Underlying driver failure.
        #[source]
        source: DriverError,
    },

    /// Discovery returned no usable device descriptor.
    #[error("No camera found during discovery")]
    NoCameraFound,

    /// The discovered model does not map to a supported camera family.
    #[error("Unsupported camera type '{0}'")]
    UnsupportedModel(String),

    /// A descriptor field could not be interpreted (e.g. a non-hex firmware revision).
    #[error("Invalid device descriptor field {field}='{value}'")]
    InvalidDescriptor {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// A status query could not be answered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// No device is attached.
    #[error("no device attached")]
    NotAttached,

    /// The driver read failed.
    #[error("error in read: {0}")]
    Driver(#[from] DriverError),
}

/// A non-motion command was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// No device is attached.
    #[error("no device attached")]
    NotAttached,

    /// The driver rejected the command.
    #[error("error in command: {0}")]
    Driver(#[from] DriverError),
}

/// A focus move was rejected or did not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    /// No focuser is attached.
    #[error("no device attached")]
    NotAttached,

    /// The resulting position would leave the travel range. No command was issued.
    #[error("Attempted motion to position {target} is out of range ({lower},{upper})")]
    OutOfRange {
        /// Requested absolute position.
        target: i64,
        /// Lower travel limit.
        lower: i64,
        /// Upper travel limit.
        upper: i64,
    },

    /// Reading the current position or limits failed before the move.
    #[error("motion pre-check failed: {0}")]
    Query(#[from] QueryError),

    /// The driver rejected the step command.
    #[error("error in command: {0}")]
    Driver(#[from] DriverError),

    /// The focuser still reported outstanding steps when the motion timeout expired.
    #[error("motion did not complete within {elapsed:?} ({remaining} steps remaining)")]
    Timeout {
        /// Time spent waiting.
        elapsed: Duration,
        /// Steps still outstanding at the last poll.
        remaining: i64,
    },
}

/// A capture failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// No camera is connected.
    #[error("no camera connected")]
    NotConnected,

    /// The request itself is malformed (negative exposure, zero binning).
    #[error("invalid capture request: {0}")]
    InvalidRequest(String),

    /// An exposure is already running on the camera.
    #[error("camera is busy with another exposure")]
    Busy,

    /// A driver call failed while programming or reading the camera.
    #[error("camera driver error: {0}")]
    Driver(#[from] DriverError),

    /// The camera reported an error status mid-exposure.
    #[error("camera reported a device fault during exposure: {0}")]
    DeviceFault(String),

    /// The driver returned a buffer that does not match the programmed ROI.
    #[error("image has {actual} samples, expected {expected}")]
    ShapeMismatch {
        /// `rows * cols` of the programmed readout.
        expected: usize,
        /// Samples actually returned.
        actual: usize,
    },

    /// The image never became ready.
    #[error("image not ready after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// Application Error
// =============================================================================

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, BcamError>;

/// Primary error type for the application.
#[derive(Error, Debug)]
pub enum BcamError {
    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or network I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A device could not be opened.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// A status query failed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A command was rejected.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A focus move failed.
    #[error(transparent)]
    Motion(#[from] MotionError),

    /// A capture failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// A FITS file could not be produced.
    #[error(transparent)]
    Fits(#[from] crate::fits::FitsError),

    /// Logging could not be initialised.
    #[error("Tracing initialisation failed: {0}")]
    Tracing(String),

    /// The requested functionality was compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for BcamError {
    fn from(err: figment::Error) -> Self {
        BcamError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display_includes_kind_and_driver() {
        let err = DriverError::new("fli", DriverErrorKind::Communication, "no response")
            .with_code(-5);
        assert_eq!(
            err.to_string(),
            "Driver 'fli' communication error: no response"
        );
        assert_eq!(err.code, Some(-5));
    }

    #[test]
    fn out_of_range_message_lists_limits() {
        let err = MotionError::OutOfRange {
            target: 7010,
            lower: 0,
            upper: 7000,
        };
        assert_eq!(
            err.to_string(),
            "Attempted motion to position 7010 is out of range (0,7000)"
        );
    }

    #[test]
    fn controller_errors_convert_to_app_error() {
        let app: BcamError = MotionError::NotAttached.into();
        assert!(matches!(app, BcamError::Motion(MotionError::NotAttached)));

        let app: BcamError = CaptureError::ShapeMismatch {
            expected: 4,
            actual: 3,
        }
        .into();
        assert_eq!(app.to_string(), "image has 3 samples, expected 4");
    }
}
