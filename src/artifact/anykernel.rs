//! AnyKernel3 flashable zip packaging.
//!
//! ```text
//! out/arch/arm64/boot/Image.gz-dtb (+ dtbo.img)
//!         ↓  copy into checkout root
//! AnyKernel3/            (git clone --depth=1)
//!         ↓  zip -r9 (minus .git, README, placeholders)
//! <kernel>-<device>-<YYYYMMDD-HHMM>.zip.tmp
//!         ↓  atomic move
//! <zip_dir>/<kernel>-<device>-<YYYYMMDD-HHMM>.zip
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};

use crate::build::kernel::{self, KernelImage, EXTRA_ARTIFACTS, IMAGE_CANDIDATES};
use crate::config::BuildConfig;
use crate::process::Cmd;

/// Marker file that identifies a usable AnyKernel3 checkout.
pub const ANYKERNEL_SCRIPT: &str = "anykernel.sh";

/// Patterns kept out of the zip.
const ZIP_EXCLUDES: &[&str] = &[
    ".git/*",
    ".github/*",
    "README.md",
    "*placeholder",
    "*.zip",
    "*.tmp",
];

/// Clone the AnyKernel3 template unless a checkout already exists.
pub fn ensure_anykernel(config: &BuildConfig) -> Result<()> {
    let dir = &config.anykernel_dir;
    if dir.join(ANYKERNEL_SCRIPT).exists() {
        return Ok(());
    }
    if dir.exists() {
        bail!(
            "{} exists but contains no {}.\n\
             Remove it or point --anykernel-dir at a valid checkout.",
            dir.display(),
            ANYKERNEL_SCRIPT
        );
    }

    println!(
        "  Cloning AnyKernel3 ({} @ {})",
        config.anykernel_repo, config.anykernel_branch
    );
    Cmd::new("git")
        .args(["clone", "--depth=1", "-b"])
        .arg(&config.anykernel_branch)
        .arg(&config.anykernel_repo)
        .arg_path(dir)
        .error_msg("Failed to clone AnyKernel3")
        .run()?;

    if !dir.join(ANYKERNEL_SCRIPT).exists() {
        bail!(
            "Cloned {} but it has no {}",
            config.anykernel_repo,
            ANYKERNEL_SCRIPT
        );
    }
    Ok(())
}

/// Copy the image and extras into the checkout, replacing earlier payloads.
pub fn stage(config: &BuildConfig, image: &KernelImage) -> Result<()> {
    let dir = &config.anykernel_dir;
    remove_staged_payload(dir)?;

    for file in image.files() {
        let Some(name) = file.file_name() else {
            continue;
        };
        fs::copy(file, dir.join(name))
            .with_context(|| format!("Failed to stage {} into {}", file.display(), dir.display()))?;
        println!("  Staged {}", name.to_string_lossy());
    }
    Ok(())
}

/// Fill in the `kernel.string` and `device.name1` properties of `anykernel.sh`.
pub fn patch_properties(script: &str, kernel_string: &str, device: &str) -> String {
    let mut out: Vec<String> = script
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("kernel.string=") {
                format!("kernel.string={}", kernel_string)
            } else if trimmed.starts_with("device.name1=") {
                format!("device.name1={}", device)
            } else {
                line.to_string()
            }
        })
        .collect();
    if script.ends_with('\n') {
        out.push(String::new());
    }
    out.join("\n")
}

/// Zip filename for a build finished at `when`.
pub fn zip_name<Tz: TimeZone>(kernel_name: &str, device: &str, when: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}-{}-{}.zip",
        kernel_name,
        device,
        when.format("%Y%m%d-%H%M")
    )
}

/// Package the compiled kernel into a flashable zip in `zip_dir`.
pub fn create_zip(config: &BuildConfig) -> Result<PathBuf> {
    let Some(image) = kernel::find_image(config) else {
        bail!(
            "No kernel image in {}.\n\
             Expected one of: {}. Run 'build' first.",
            config.boot_dir().display(),
            IMAGE_CANDIDATES.join(", ")
        );
    };

    ensure_anykernel(config)?;
    stage(config, &image)?;
    write_properties(config)?;

    let name = zip_name(&config.kernel_name, &config.device, &Local::now());
    let temp_name = format!("{}.tmp", name);
    let temp_zip = config.anykernel_dir.join(&temp_name);
    let _ = fs::remove_file(&temp_zip);

    let result = Cmd::new("zip")
        .current_dir(&config.anykernel_dir)
        .args(["-r9", "-q"])
        .arg(&temp_name)
        .arg(".")
        .arg("-x")
        .args(ZIP_EXCLUDES.iter().copied())
        .error_msg("Failed to create flashable zip")
        .run();
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_zip);
        return Err(e);
    }

    fs::create_dir_all(&config.zip_dir)
        .with_context(|| format!("Failed to create {}", config.zip_dir.display()))?;
    let final_zip = config.zip_dir.join(&name);
    atomic_move(&temp_zip, &final_zip)?;

    Ok(final_zip)
}

/// Reset the checkout, drop earlier zips for this device, and package again.
pub fn repack(config: &BuildConfig) -> Result<PathBuf> {
    let dir = &config.anykernel_dir;
    if dir.join(".git").exists() {
        println!("  Resetting AnyKernel3 checkout");
        Cmd::new("git")
            .current_dir(dir)
            .args(["checkout", "--", "."])
            .error_msg("Failed to reset AnyKernel3 checkout")
            .run()?;
        Cmd::new("git")
            .current_dir(dir)
            .args(["clean", "-fdxq"])
            .error_msg("Failed to clean AnyKernel3 checkout")
            .run()?;
    } else if dir.exists() {
        remove_staged_payload(dir)?;
    }

    for old in previous_zips(config) {
        fs::remove_file(&old).with_context(|| format!("Failed to remove {}", old.display()))?;
        println!("  Removed {}", old.display());
    }

    create_zip(config)
}

/// Most recent zip produced for this kernel/device.
pub fn latest_zip(config: &BuildConfig) -> Option<PathBuf> {
    previous_zips(config).into_iter().max_by_key(|p| {
        fs::metadata(p)
            .and_then(|m| m.modified())
            .ok()
    })
}

/// Zips in `zip_dir` named exactly like [`zip_name`] output for this kernel/device.
fn previous_zips(config: &BuildConfig) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(&config.zip_dir) else {
        return Vec::new();
    };
    let mut zips: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| is_device_zip(n, &config.kernel_name, &config.device))
        })
        .collect();
    zips.sort();
    zips
}

/// `<kernel>-<device>-YYYYMMDD-HHMM.zip`, nothing more. Keeps `ginkgo` from
/// matching `ginkgo-pro` zips.
fn is_device_zip(name: &str, kernel_name: &str, device: &str) -> bool {
    let Some(stamp) = name
        .strip_prefix(kernel_name)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_prefix(device))
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".zip"))
    else {
        return false;
    };
    let bytes = stamp.as_bytes();
    bytes.len() == 13
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn write_properties(config: &BuildConfig) -> Result<()> {
    let script = config.anykernel_dir.join(ANYKERNEL_SCRIPT);
    let content = fs::read_to_string(&script)
        .with_context(|| format!("Failed to read {}", script.display()))?;
    let kernel_string = match kernel::kernel_release(config) {
        Some(release) => format!("{} {} ({})", config.kernel_name, config.device, release),
        None => format!("{} {}", config.kernel_name, config.device),
    };
    let patched = patch_properties(&content, &kernel_string, &config.device);
    if patched != content {
        fs::write(&script, patched)
            .with_context(|| format!("Failed to write {}", script.display()))?;
    }
    Ok(())
}

fn remove_staged_payload(dir: &Path) -> Result<()> {
    for name in IMAGE_CANDIDATES.iter().chain(EXTRA_ARTIFACTS.iter()) {
        let path = dir.join(name);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale {}", path.display()))?;
        }
    }
    Ok(())
}

/// Rename, falling back to copy + delete across filesystems.
fn atomic_move(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to move {} -> {}", from.display(), to.display()))?;
    fs::remove_file(from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn config_with_image(root: &Path) -> BuildConfig {
        let mut config = BuildConfig::new(root, "ginkgo");
        config.kernel_name = "Storm".to_string();
        fs::create_dir_all(config.boot_dir()).unwrap();
        fs::write(config.boot_dir().join("Image.gz-dtb"), "kernel").unwrap();
        fs::write(config.boot_dir().join("dtbo.img"), "dtbo").unwrap();
        fs::create_dir_all(&config.anykernel_dir).unwrap();
        fs::write(
            config.anykernel_dir.join(ANYKERNEL_SCRIPT),
            "properties() { '\nkernel.string=ExampleKernel by osm0sis\ndevice.name1=maguro\n'; }\n",
        )
        .unwrap();
        config
    }

    #[test]
    fn test_zip_name() {
        let when = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 0).unwrap();
        assert_eq!(
            zip_name("Storm", "ginkgo", &when),
            "Storm-ginkgo-20240309-0705.zip"
        );
    }

    #[test]
    fn test_patch_properties() {
        let script = "kernel.string=Example\ndo.devicecheck=1\ndevice.name1=maguro\n";
        let patched = patch_properties(script, "Storm ginkgo", "ginkgo");
        assert_eq!(
            patched,
            "kernel.string=Storm ginkgo\ndo.devicecheck=1\ndevice.name1=ginkgo\n"
        );
    }

    #[test]
    fn test_stage_replaces_old_payload() {
        let dir = tempdir().unwrap();
        let config = config_with_image(dir.path());
        fs::write(config.anykernel_dir.join("Image"), "stale").unwrap();

        let image = kernel::find_image(&config).unwrap();
        stage(&config, &image).unwrap();

        assert!(!config.anykernel_dir.join("Image").exists());
        assert_eq!(
            fs::read_to_string(config.anykernel_dir.join("Image.gz-dtb")).unwrap(),
            "kernel"
        );
        assert!(config.anykernel_dir.join("dtbo.img").exists());
    }

    #[test]
    fn test_create_zip_without_image_fails() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        let err = create_zip(&config).unwrap_err();
        assert!(err.to_string().contains("No kernel image"));
    }

    #[test]
    fn test_ensure_anykernel_rejects_foreign_dir() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        fs::create_dir_all(&config.anykernel_dir).unwrap();
        assert!(ensure_anykernel(&config).is_err());
    }

    #[test]
    fn test_create_zip_end_to_end() {
        if !crate::process::exists("zip") {
            eprintln!("Skipping zip test (zip not installed)");
            return;
        }
        let dir = tempdir().unwrap();
        let mut config = config_with_image(dir.path());
        config.zip_dir = dir.path().join("dist");

        let zip = create_zip(&config).unwrap();
        assert!(zip.exists());
        assert!(zip.starts_with(&config.zip_dir));
        assert_eq!(latest_zip(&config).as_deref(), Some(zip.as_path()));

        let script = fs::read_to_string(config.anykernel_dir.join(ANYKERNEL_SCRIPT)).unwrap();
        assert!(script.contains("device.name1=ginkgo"));
        assert!(script.contains("kernel.string=Storm ginkgo"));
    }

    #[test]
    fn test_repack_removes_previous_zips() {
        if !crate::process::exists("zip") {
            eprintln!("Skipping repack test (zip not installed)");
            return;
        }
        let dir = tempdir().unwrap();
        let mut config = config_with_image(dir.path());
        config.zip_dir = dir.path().join("dist");
        fs::create_dir_all(&config.zip_dir).unwrap();
        let old = config.zip_dir.join("Storm-ginkgo-19990101-0000.zip");
        let other = config.zip_dir.join("Storm-lavender-19990101-0000.zip");
        fs::write(&old, "old").unwrap();
        let sibling = config.zip_dir.join("Storm-ginkgo-pro-19990101-0000.zip");
        fs::write(&other, "other device").unwrap();
        fs::write(&sibling, "sibling device").unwrap();

        let zip = repack(&config).unwrap();
        assert!(zip.exists());
        assert!(!old.exists());
        assert!(other.exists());
        assert!(sibling.exists());
    }

    #[test]
    fn test_is_device_zip() {
        assert!(is_device_zip("Storm-ginkgo-20240101-0000.zip", "Storm", "ginkgo"));
        assert!(!is_device_zip("Storm-ginkgo-pro-20240101-0000.zip", "Storm", "ginkgo"));
        assert!(!is_device_zip("Storm-ginkgo-2024010-0000.zip", "Storm", "ginkgo"));
        assert!(!is_device_zip("Storm-ginkgo-20240101-0000.zip.tmp", "Storm", "ginkgo"));
        assert!(!is_device_zip("Other-ginkgo-20240101-0000.zip", "Storm", "ginkgo"));
    }

    #[test]
    fn test_sibling_device_zips_are_ignored() {
        let dir = tempdir().unwrap();
        let mut config = BuildConfig::new(dir.path(), "ginkgo");
        config.kernel_name = "Storm".to_string();
        let sibling = dir.path().join("Storm-ginkgo-pro-20240101-0000.zip");
        fs::write(&sibling, "other device").unwrap();

        assert!(previous_zips(&config).is_empty());
        assert!(latest_zip(&config).is_none());

        let own = dir.path().join("Storm-ginkgo-20230101-0000.zip");
        fs::write(&own, "ours").unwrap();
        assert_eq!(previous_zips(&config), vec![own.clone()]);
        assert_eq!(latest_zip(&config), Some(own));
    }

    #[test]
    fn test_latest_zip_none() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        assert!(latest_zip(&config).is_none());
    }
}
