//! Build configuration for a device kernel.
//!
//! Values come from CLI flags with environment fallbacks (see `main.rs`);
//! this module only holds the resolved settings and the paths derived from
//! them.
//!
//! # Example
//!
//! ```rust
//! use droidkbuild::config::BuildConfig;
//!
//! let config = BuildConfig::new("/src/kernel", "lavender");
//! assert_eq!(config.defconfig, "lavender_defconfig");
//! assert!(config.out_dir.ends_with("out"));
//! ```

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Default output directory, relative to the kernel source.
pub const DEFAULT_OUT_DIR: &str = "out";
/// Default target architecture.
pub const DEFAULT_ARCH: &str = "arm64";
/// Default name used as the zip prefix.
pub const DEFAULT_KERNEL_NAME: &str = "Kernel";
/// Default AnyKernel3 template repository.
pub const DEFAULT_ANYKERNEL_REPO: &str = "https://github.com/osm0sis/AnyKernel3.git";
/// Default AnyKernel3 branch.
pub const DEFAULT_ANYKERNEL_BRANCH: &str = "master";
/// Build log filename inside the output directory.
pub const BUILD_LOG: &str = "build.log";

/// Resolved settings for one device build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Kernel source tree (contains the top-level Makefile).
    pub kernel_dir: PathBuf,
    /// Out-of-tree build directory passed as `O=`.
    pub out_dir: PathBuf,
    /// Device codename.
    pub device: String,
    /// Defconfig name under `arch/<arch>/configs/`.
    pub defconfig: String,
    pub arch: String,
    /// `make` program to run.
    pub make: String,
    pub kernel_name: String,
    /// Parallel jobs for `make -j`.
    pub jobs: usize,
    pub anykernel_repo: String,
    pub anykernel_branch: String,
    /// AnyKernel3 checkout.
    pub anykernel_dir: PathBuf,
    /// Where finished zips are placed.
    pub zip_dir: PathBuf,
}

impl BuildConfig {
    /// Defaults for `device` with sources at `kernel_dir`.
    pub fn new(kernel_dir: impl Into<PathBuf>, device: impl Into<String>) -> Self {
        let kernel_dir = kernel_dir.into();
        let device = device.into();
        Self {
            out_dir: kernel_dir.join(DEFAULT_OUT_DIR),
            defconfig: format!("{}_defconfig", device),
            arch: DEFAULT_ARCH.to_string(),
            make: "make".to_string(),
            kernel_name: DEFAULT_KERNEL_NAME.to_string(),
            jobs: default_jobs(),
            anykernel_repo: DEFAULT_ANYKERNEL_REPO.to_string(),
            anykernel_branch: DEFAULT_ANYKERNEL_BRANCH.to_string(),
            anykernel_dir: kernel_dir.join("AnyKernel3"),
            zip_dir: kernel_dir.clone(),
            device,
            kernel_dir,
        }
    }

    /// Resolve `path` against the kernel source directory when relative.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.kernel_dir.join(path)
        }
    }

    /// The generated `.config` in the output tree.
    pub fn dot_config(&self) -> PathBuf {
        self.out_dir.join(".config")
    }

    /// The defconfig source file.
    pub fn defconfig_path(&self) -> PathBuf {
        self.kernel_dir
            .join("arch")
            .join(&self.arch)
            .join("configs")
            .join(&self.defconfig)
    }

    /// Where `make` leaves the boot images.
    pub fn boot_dir(&self) -> PathBuf {
        self.out_dir.join("arch").join(&self.arch).join("boot")
    }

    pub fn build_log(&self) -> PathBuf {
        self.out_dir.join(BUILD_LOG)
    }

    /// `O=` and `ARCH=` arguments shared by every make invocation.
    pub fn make_base_args(&self) -> Vec<String> {
        vec![
            format!("O={}", self.out_dir.display()),
            format!("ARCH={}", self.arch),
        ]
    }

    /// Reject settings that can never produce a build.
    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            bail!("Device codename is empty (set --device or DEVICE)");
        }
        if self.defconfig.trim().is_empty() {
            bail!("Defconfig name is empty (set --defconfig or DEFCONFIG)");
        }
        if self.jobs == 0 {
            bail!("Job count must be at least 1");
        }
        Ok(())
    }
}

/// Host CPU count, falling back to 1.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Telegram notification settings.
#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    /// Token and chat id are both present and non-empty.
    pub fn has_credentials(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.bot_token) && filled(&self.chat_id)
    }
}

/// Parse an on/off toggle such as `ENABLE_TELEGRAM`.
pub fn parse_toggle(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!(
            "invalid toggle '{}' (expected 1/0, true/false, yes/no, on/off)",
            other
        )),
    }
}
