//! Build script for fli-sys.
//!
//! With the `fli-sdk` feature the bindings are generated from the installed
//! `libfli.h` with bindgen and the library is located with pkg-config.
//! Without it, the checked-in `src/fallback_bindings.rs` is used and nothing
//! is linked.

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=FLI_INCLUDE_DIR");
    println!("cargo:rerun-if-env-changed=FLI_LIB_DIR");

    #[cfg(feature = "fli-sdk")]
    {
        generate_bindings();
        link_library();
    }
}

#[cfg(feature = "fli-sdk")]
fn include_dir() -> String {
    if let Ok(dir) = std::env::var("FLI_INCLUDE_DIR") {
        return dir;
    }
    if let Ok(lib) = pkg_config::Config::new()
        .cargo_metadata(false)
        .probe("libfli")
    {
        if let Some(path) = lib.include_paths.first() {
            return path.to_string_lossy().to_string();
        }
    }
    for path in ["/usr/local/include", "/usr/include"] {
        if std::path::Path::new(path).join("libfli.h").exists() {
            return path.to_string();
        }
    }
    "/usr/local/include".to_string()
}

#[cfg(feature = "fli-sdk")]
fn link_library() {
    if let Ok(lib_dir) = std::env::var("FLI_LIB_DIR") {
        println!("cargo:rustc-link-search=native={lib_dir}");
        println!("cargo:rustc-link-lib=fli");
        return;
    }

    // Try pkg-config first
    if pkg_config::probe_library("libfli").is_ok() {
        return;
    }

    println!("cargo:rustc-link-lib=fli");
    for path in ["/usr/local/lib", "/usr/lib", "/usr/lib/x86_64-linux-gnu"] {
        let dir = std::path::Path::new(path);
        if dir.join("libfli.so").exists() || dir.join("libfli.a").exists() {
            println!("cargo:rustc-link-search=native={}", path);
            break;
        }
    }
}

/// libfli spells its domain and channel constants as bare `#define`s; keep
/// them typed as `long` like the parameters they are passed to.
#[cfg(feature = "fli-sdk")]
#[derive(Debug)]
struct LongMacros;

#[cfg(feature = "fli-sdk")]
impl bindgen::callbacks::ParseCallbacks for LongMacros {
    fn int_macro(&self, name: &str, _value: i64) -> Option<bindgen::callbacks::IntKind> {
        if name.starts_with("FLI") {
            Some(bindgen::callbacks::IntKind::Custom {
                name: "::std::os::raw::c_long",
                is_signed: true,
            })
        } else {
            None
        }
    }
}

#[cfg(feature = "fli-sdk")]
fn generate_bindings() {
    use std::path::PathBuf;

    let include_dir = include_dir();
    println!("cargo:rerun-if-changed={}/libfli.h", include_dir);

    let bindings = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg(format!("-I{}", include_dir))
        .allowlist_function("FLI.*")
        .allowlist_type("fli.*_t")
        .allowlist_var("FLIDOMAIN_.*")
        .allowlist_var("FLIDEVICE_.*")
        .allowlist_var("FLI_TEMPERATURE_.*")
        .derive_debug(true)
        .derive_default(true)
        .derive_copy(true)
        .parse_callbacks(Box::new(LongMacros))
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .generate()
        .expect("Unable to generate libfli bindings");

    let out_path = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write libfli bindings");
}
