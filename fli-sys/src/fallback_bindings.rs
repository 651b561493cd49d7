// Pre-generated from libfli.h (focuser subset) for builds without the SDK.
// Regenerate by building with `--features fli-sdk` and copying
// `$OUT_DIR/bindings.rs`.

pub type flidev_t = ::std::os::raw::c_long;
pub type flidomain_t = ::std::os::raw::c_long;
pub type flichannel_t = ::std::os::raw::c_long;

pub const FLIDOMAIN_PARALLEL_PORT: ::std::os::raw::c_long = 1;
pub const FLIDOMAIN_USB: ::std::os::raw::c_long = 2;
pub const FLIDOMAIN_SERIAL: ::std::os::raw::c_long = 3;
pub const FLIDOMAIN_INET: ::std::os::raw::c_long = 4;
pub const FLIDEVICE_CAMERA: ::std::os::raw::c_long = 256;
pub const FLIDEVICE_FILTERWHEEL: ::std::os::raw::c_long = 512;
pub const FLIDEVICE_FOCUSER: ::std::os::raw::c_long = 768;
pub const FLI_TEMPERATURE_INTERNAL: ::std::os::raw::c_long = 0;
pub const FLI_TEMPERATURE_EXTERNAL: ::std::os::raw::c_long = 1;

extern "C" {
    pub fn FLIOpen(
        dev: *mut flidev_t,
        name: *mut ::std::os::raw::c_char,
        domain: flidomain_t,
    ) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIClose(dev: flidev_t) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIGetModel(
        dev: flidev_t,
        model: *mut ::std::os::raw::c_char,
        len: usize,
    ) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIGetStepperPosition(
        dev: flidev_t,
        position: *mut ::std::os::raw::c_long,
    ) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIGetFocuserExtent(
        dev: flidev_t,
        extent: *mut ::std::os::raw::c_long,
    ) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIGetStepsRemaining(
        dev: flidev_t,
        steps: *mut ::std::os::raw::c_long,
    ) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIReadTemperature(
        dev: flidev_t,
        channel: flichannel_t,
        temperature: *mut f64,
    ) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIHomeFocuser(dev: flidev_t) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIStepMotor(dev: flidev_t, steps: ::std::os::raw::c_long) -> ::std::os::raw::c_long;
}
extern "C" {
    pub fn FLIStepMotorAsync(
        dev: flidev_t,
        steps: ::std::os::raw::c_long,
    ) -> ::std::os::raw::c_long;
}
