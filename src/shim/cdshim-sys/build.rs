use std::env;

#[allow(dead_code)]
#[path = "src/layout.rs"]
mod layout;

#[allow(dead_code)]
#[path = "src/abi.rs"]
mod abi;

use abi::AbiVersion;
use layout::{HeaderLayout, LayoutFlags};

fn main() {
    let flags = LayoutFlags::from_env();
    let header_layout = flags.resolve();

    if flags.shadowed() {
        println!(
            "cargo:warning=both COLLECTD_PATH and collectd-54 are set, using the source tree at {}",
            flags
                .source_root()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
    }

    let abi = match AbiVersion::resolve(|key| env::var(key).ok(), header_layout) {
        Ok(abi) => abi,
        Err(e) => {
            println!("cargo:warning={e}, assuming {}", AbiVersion::V57);
            AbiVersion::V57
        }
    };

    println!("cargo:rustc-check-cfg=cfg(collectd57)");
    println!("cargo:rustc-check-cfg=cfg(cdshim_bindgen)");
    println!("cargo:rustc-check-cfg=cfg(collectd_layout, values(\"source-tree\", \"core54\", \"packaged\"))");

    println!("cargo:rustc-cfg=collectd_layout=\"{}\"", header_layout.as_str());
    println!("cargo:rustc-env=CDSHIM_HEADER_LAYOUT={}", header_layout.as_str());
    println!("cargo:rustc-env=CDSHIM_ABI_VERSION={}", abi.as_str());
    if abi == AbiVersion::V57 {
        println!("cargo:rustc-cfg=collectd57");
    }

    // The stub replaces the daemon entirely, so there is nothing to bind to
    if cfg!(feature = "bindgen") && env::var_os("CARGO_FEATURE_STUB").is_none() {
        generate_bindings(header_layout, &flags);
    }

    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-changed=src/layout.rs");
    println!("cargo:rerun-if-changed=src/abi.rs");
    println!("cargo:rerun-if-env-changed={}", layout::ENV_COLLECTD_PATH);
    println!("cargo:rerun-if-env-changed={}", layout::ENV_COLLECTD_54);
    println!("cargo:rerun-if-env-changed={}", abi::ENV_COLLECTD_VERSION);
}

#[cfg(feature = "bindgen")]
fn generate_bindings(header_layout: HeaderLayout, flags: &LayoutFlags) {
    use std::path::PathBuf;

    let mut builder = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg("-DHAVE_CONFIG_H")
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()))
        .allowlist_function("plugin_register_.*")
        .allowlist_function("plugin_dispatch_values")
        .allowlist_function("plugin_log")
        .allowlist_function("uc_get_rate")
        .allowlist_function("meta_data_.*")
        .allowlist_var("DS_TYPE_.*")
        .allowlist_var("LOG_.*")
        .allowlist_var("OCONFIG_TYPE_.*")
        .allowlist_var("MD_TYPE_.*")
        .allowlist_type("oconfig_item_t")
        .blocklist_item("hostname_g")
        .blocklist_item("module_register");

    if let Some(define) = header_layout.define() {
        builder = builder.clang_arg(format!("-D{define}"));
    }

    for dir in header_layout.include_dirs(flags) {
        builder = builder.clang_arg(format!("-I{}", dir.display()));
    }

    let bindings = builder
        .generate()
        .expect("Unable to generate collectd bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");

    println!("cargo:rustc-cfg=cdshim_bindgen");
}

#[cfg(not(feature = "bindgen"))]
fn generate_bindings(_header_layout: HeaderLayout, _flags: &LayoutFlags) {}
