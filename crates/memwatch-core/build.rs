//! Build script for memwatch-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (naked functions need Rust 1.88.0+)
//! - Supported platform (Linux on x86_64 or aarch64)
//!
//! ## Requirements
//!
//! - **Rust**: 1.88.0 or newer (`#[unsafe(naked)]`, `slice::as_chunks_mut`)
//! - **Linux**: x86_64 or aarch64; fault recovery edits the signal frame's
//!   machine context, whose layout is per architecture

fn main()
{
    // Check minimum Rust version
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 88, 0);

        if rustc_version < min_rust_version {
            panic!(
                "memwatch-core requires Rust {} or newer (naked functions), found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    // Cargo sets these for the target, not the host running this script
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    check_platform(&os, &arch);
}

fn check_platform(os: &str, arch: &str)
{
    if os != "linux" {
        panic!("memwatch-core requires Linux (/dev/mem and Linux signal frames), target OS is {os}");
    }

    if !matches!(arch, "x86_64" | "aarch64") {
        panic!("memwatch-core supports x86_64 and aarch64, target architecture is {arch}");
    }
}
