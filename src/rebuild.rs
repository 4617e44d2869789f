//! Rebuild detection for the kernel build.
//!
//! `make` already tracks object freshness; this only decides whether the
//! defconfig has to be re-applied and whether a packaged zip is stale.

use std::fs;
use std::path::Path;

use crate::config::BuildConfig;

/// Check if the defconfig needs to be (re)applied to the output tree.
///
/// True when `.config` is missing or the defconfig was edited after it.
pub fn config_needs_apply(config: &BuildConfig) -> bool {
    let dot_config = config.dot_config();
    if !dot_config.exists() {
        return true;
    }
    is_newer(&config.defconfig_path(), &dot_config)
}

/// Check if `zip` is missing or older than the kernel `image`.
pub fn zip_is_stale(image: &Path, zip: Option<&Path>) -> bool {
    match zip {
        Some(zip) if zip.exists() => is_newer(image, zip),
        _ => true,
    }
}

/// `a` was modified after `b`. False if either mtime can't be read.
pub fn is_newer(a: &Path, b: &Path) -> bool {
    let mtime = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (mtime(a), mtime(b)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn touch_at(path: &Path, time: SystemTime) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let file = File::create(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_missing_dot_config_needs_apply() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        assert!(config_needs_apply(&config));
    }

    #[test]
    fn test_fresh_dot_config_skips_apply() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        let now = SystemTime::now();

        touch_at(&config.defconfig_path(), now - Duration::from_secs(60));
        touch_at(&config.dot_config(), now);
        assert!(!config_needs_apply(&config));
    }

    #[test]
    fn test_edited_defconfig_needs_apply() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        let now = SystemTime::now();

        touch_at(&config.dot_config(), now - Duration::from_secs(60));
        touch_at(&config.defconfig_path(), now);
        assert!(config_needs_apply(&config));
    }

    #[test]
    fn test_zip_is_stale() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("Image.gz-dtb");
        let zip = dir.path().join("k.zip");
        let now = SystemTime::now();

        touch_at(&image, now - Duration::from_secs(60));
        assert!(zip_is_stale(&image, None));
        assert!(zip_is_stale(&image, Some(&zip)));

        touch_at(&zip, now);
        assert!(!zip_is_stale(&image, Some(&zip)));
    }

    #[test]
    fn test_is_newer_missing_files() {
        let dir = tempdir().unwrap();
        assert!(!is_newer(&dir.path().join("a"), &dir.path().join("b")));
    }
}
