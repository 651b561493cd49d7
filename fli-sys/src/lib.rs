//! Low-level FFI bindings for the FLI `libfli` SDK.
//!
//! Every function returns `0` on success and a negated `errno` value on
//! failure. For a safe async wrapper see `bcam::hardware::fli`.
//!
//! # Features
//!
//! - `fli-sdk`: generate bindings from the installed `libfli.h` and link
//!   `libfli`. Without it, pre-generated declarations for the focuser subset
//!   are compiled in; they must not be called since nothing is linked.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(unsafe_code)]
#![allow(missing_docs)]
#![allow(clippy::all)]

#[cfg(feature = "fli-sdk")]
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

#[cfg(not(feature = "fli-sdk"))]
include!("fallback_bindings.rs");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focuser_domain_matches_sdk_value() {
        let domain: flidomain_t = FLIDOMAIN_USB | FLIDEVICE_FOCUSER;
        assert_eq!(domain, 0x302);
    }

    #[test]
    fn temperature_channels_are_distinct() {
        let internal: flichannel_t = FLI_TEMPERATURE_INTERNAL;
        assert_ne!(internal, FLI_TEMPERATURE_EXTERNAL);
    }
}
