//! # BCAM
//!
//! Control library for a CCD camera paired with a stepper-motor focuser.
//!
//! The library is organized into several modules:
//!
//! - **`hardware`**: capability traits for the two devices, the
//!   [`FocuserController`](hardware::focuser::FocuserController) and
//!   [`AcquisitionController`](hardware::acquisition::AcquisitionController),
//!   camera discovery parsing, simulated devices and (with `fli_hardware`) the FLI focuser driver.
//! - **`session`**: one camera plus one focuser behind async locks, and image header assembly.
//! - **`fits`**: FITS encoding of captured frames.
//! - **`server`**: the HTTP front-end (status, expose, cooling and focus pages).
//! - **`config`**: TOML + environment configuration via `figment`.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: per-operation error enums and the application-level [`BcamError`](error::BcamError).
//! - **`limits`**: polling cadences and timeouts.
//! - **`validation`**: form and configuration value checks.

pub mod config;
pub mod error;
pub mod fits;
pub mod hardware;
pub mod limits;
pub mod logging;
pub mod server;
pub mod session;
pub mod validation;

pub use error::{AppResult, BcamError};
pub use session::Session;
