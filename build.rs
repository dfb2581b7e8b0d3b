use std::env;
use std::path::{Path, PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere but Windows.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Some(install) = vcpkg_install() else {
        println!(
            "cargo:warning=FFMPEG_DIR is not set. Install FFmpeg with VP8 support (vcpkg install ffmpeg[vpx]) and point FFMPEG_DIR at it."
        );
        return;
    };

    if !install.exists() {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} does not exist.",
            install.display()
        );
        return;
    }

    println!(
        "cargo:warning=Found vcpkg FFmpeg at {0}. Set FFMPEG_DIR={0} to use it explicitly.",
        install.display()
    );
    if !has_library(&install, &["vpx.lib", "vpxmd.lib", "libvpx.lib"]) {
        println!(
            "cargo:warning=No libvpx found under {}; WebM output needs the ffmpeg[vpx] vcpkg feature.",
            install.display()
        );
    }
    if !has_library(&install, &["opus.lib", "libopus.lib"]) {
        println!(
            "cargo:warning=No libopus found under {}; other audio is re-encoded with FFmpeg's experimental Opus encoder.",
            install.display()
        );
    }
}

fn vcpkg_install() -> Option<PathBuf> {
    let root = env::var_os("VCPKG_ROOT")?;
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    Some(PathBuf::from(root).join("installed").join(triplet))
}

fn has_library(install: &Path, names: &[&str]) -> bool {
    names
        .iter()
        .any(|library| install.join("lib").join(library).exists())
}
