//! Kernel clean, defconfig and compile stages.
//!
//! Everything is an out-of-tree build (`O=<out>`), so cleaning the output
//! directory never touches the source tree beyond what `mrproper` does.
//!
//! # Flow
//!
//! ```text
//! arch/<arch>/configs/<device>_defconfig
//!         ↓  make O=out ARCH=arm64 <defconfig>
//! out/.config
//!         ↓  make -jN O=out ARCH=arm64 CC=clang ...
//! out/arch/<arch>/boot/Image.gz-dtb  (+ dtbo.img)
//! ```

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::process::Cmd;
use crate::toolchain::Toolchain;

/// Image names in order of preference.
pub const IMAGE_CANDIDATES: &[&str] = &["Image.gz-dtb", "Image.gz", "Image"];

/// Optional boot artifacts packaged alongside the image.
pub const EXTRA_ARTIFACTS: &[&str] = &["dtbo.img", "dtb.img"];

/// A compiled kernel and the boot artifacts that came with it.
#[derive(Debug, Clone)]
pub struct KernelImage {
    pub image: PathBuf,
    pub extras: Vec<PathBuf>,
}

impl KernelImage {
    /// Filename of the main image (e.g. `Image.gz-dtb`).
    pub fn name(&self) -> String {
        self.image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Every file that goes into the flashable zip.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.image).chain(self.extras.iter())
    }
}

/// Remove build products: `make clean`, `make mrproper`, then the output dir.
pub fn clean(config: &BuildConfig) -> Result<()> {
    if !config.out_dir.exists() {
        println!("  Nothing to clean ({} does not exist)", config.out_dir.display());
        return Ok(());
    }

    for target in ["clean", "mrproper"] {
        println!("  make {}", target);
        Cmd::new(&config.make)
            .current_dir(&config.kernel_dir)
            .args(config.make_base_args())
            .arg(target)
            .error_msg(format!("make {} failed", target))
            .run()?;
    }

    fs::remove_dir_all(&config.out_dir)
        .with_context(|| format!("Failed to remove {}", config.out_dir.display()))?;
    println!("  Removed {}", config.out_dir.display());

    Ok(())
}

/// Apply the device defconfig to the output tree.
pub fn configure(config: &BuildConfig, toolchain: &Toolchain) -> Result<()> {
    let defconfig = config.defconfig_path();
    if !defconfig.exists() {
        bail!(
            "Defconfig not found at {}\n\
             Set --defconfig / DEFCONFIG to a file under arch/{}/configs/.",
            defconfig.display(),
            config.arch
        );
    }

    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("Failed to create {}", config.out_dir.display()))?;

    println!("  Defconfig: {}", config.defconfig);
    make(config, toolchain)
        .arg(&config.defconfig)
        .error_msg(format!("Failed to apply {}", config.defconfig))
        .run_logged(&config.build_log())?;

    if !config.dot_config().exists() {
        bail!(
            "make {} succeeded but {} was not generated",
            config.defconfig,
            config.dot_config().display()
        );
    }

    Ok(())
}

/// Start a fresh `out/build.log` so a failure upload only shows this run.
pub fn reset_log(config: &BuildConfig) -> Result<()> {
    let log = config.build_log();
    match fs::remove_file(&log) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to reset {}", log.display())),
    }
}

/// Compile the kernel. Output is echoed and appended to `out/build.log`.
pub fn compile(config: &BuildConfig, toolchain: &Toolchain) -> Result<KernelImage> {
    let log = config.build_log();

    println!("  Jobs: {}", config.jobs);
    println!("  Log:  {}", log.display());

    make(config, toolchain)
        .arg(format!("-j{}", config.jobs))
        .error_msg("Kernel compilation failed")
        .run_logged(&log)?;

    find_image(config).with_context(|| {
        format!(
            "Compilation finished but no kernel image was produced in {}",
            config.boot_dir().display()
        )
    })
}

/// Locate the compiled image, if any.
pub fn find_image(config: &BuildConfig) -> Option<KernelImage> {
    let boot = config.boot_dir();
    let image = IMAGE_CANDIDATES
        .iter()
        .map(|name| boot.join(name))
        .find(|p| p.is_file())?;
    let extras = EXTRA_ARTIFACTS
        .iter()
        .map(|name| boot.join(name))
        .filter(|p| p.is_file())
        .collect();
    Some(KernelImage { image, extras })
}

/// Kernel release string written by kbuild (e.g. `4.14.190-perf+`).
pub fn kernel_release(config: &BuildConfig) -> Option<String> {
    read_trimmed(&config.out_dir.join("include/config/kernel.release"))
}

fn read_trimmed(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let trimmed = content.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `make` preloaded with `O=`, `ARCH=`, toolchain vars and `PATH`.
fn make(config: &BuildConfig, toolchain: &Toolchain) -> Cmd {
    let cmd = Cmd::new(&config.make)
        .current_dir(&config.kernel_dir)
        .args(config.make_base_args())
        .args(toolchain.make_vars());
    match toolchain.path_env() {
        Ok(path) => cmd.env("PATH", path),
        Err(e) => {
            tracing::warn!("keeping inherited PATH: {:#}", e);
            cmd
        }
    }
}
