use std::env;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-env-changed=ROCM_PATH");

    // The roctracer/HSA libraries are only required when the rocm feature is
    // enabled; the rest of the crate builds and tests without a GPU stack.
    if env::var_os("CARGO_FEATURE_ROCM").is_none() {
        return;
    }

    let rocm_root = env::var("ROCM_PATH").unwrap_or_else(|_| "/opt/rocm".to_string());
    let lib_dir = format!("{}/lib", rocm_root);

    if !Path::new(&lib_dir).exists() {
        println!(
            "cargo:warning=ROCm libraries not found under {}. Set ROCM_PATH.",
            rocm_root
        );
    }

    println!("cargo:rustc-link-search=native={}", lib_dir);
    println!("cargo:rustc-link-lib=dylib=roctracer64");
    println!("cargo:rustc-link-lib=dylib=hsa-runtime64");
}
