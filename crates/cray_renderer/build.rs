//! Build script for cray_renderer.
//!
//! Captures the short git hash of the checkout so master and workers can
//! refuse to talk to a build other than their own.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| s.len() == 8)
        .unwrap_or_else(|| "unknown0".to_string());

    println!("cargo:rustc-env=CRAY_GIT_HASH={}", hash);
}
