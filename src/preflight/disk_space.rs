//! Disk space check for kernel builds.

use super::CheckResult;
use crate::process::Cmd;
use std::path::Path;

/// Minimum free space in bytes (4 GB).
///
/// An arm64 out-of-tree build with debug info stays well under this.
const MIN_DISK_SPACE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Check that sufficient disk space is available under `dir`.
pub fn check_disk_space(dir: &Path) -> CheckResult {
    match available_space(dir) {
        Some(available) => {
            let available_gb = available as f64 / (1024.0 * 1024.0 * 1024.0);
            let required_gb = MIN_DISK_SPACE_BYTES as f64 / (1024.0 * 1024.0 * 1024.0);

            if available >= MIN_DISK_SPACE_BYTES {
                CheckResult::pass(
                    "Disk space",
                    format!("{:.1} GB available (need {:.1} GB)", available_gb, required_gb),
                )
            } else {
                CheckResult::fail(
                    "Disk space",
                    format!(
                        "Only {:.1} GB available, need {:.1} GB",
                        available_gb, required_gb
                    ),
                    "Free up disk space or use a different --out-dir",
                )
            }
        }
        None => CheckResult::warn("Disk space", "Could not determine free space (df failed)"),
    }
}

/// Available bytes on the filesystem holding `path`.
pub fn available_space(path: &Path) -> Option<u64> {
    Cmd::new("df")
        .args(["--output=avail", "-B1"])
        .arg_path(path)
        .allow_fail()
        .run()
        .ok()
        .filter(|r| r.success())
        .and_then(|r| parse_df_avail(&r.stdout))
}

/// Skip the header line and parse the first number.
fn parse_df_avail(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .nth(1)
        .and_then(|line| line.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_disk_space_current_dir() {
        let result = check_disk_space(Path::new("."));
        // Should at least be able to check (pass, fail or warn)
        assert!(!result.name.is_empty());
    }

    #[test]
    fn test_parse_df_avail() {
        assert_eq!(parse_df_avail("   Avail\n123456789\n"), Some(123_456_789));
        assert_eq!(parse_df_avail("Avail\n"), None);
        assert_eq!(parse_df_avail(""), None);
    }

    #[test]
    fn test_min_disk_space_is_4gb() {
        assert_eq!(MIN_DISK_SPACE_BYTES, 4 * 1024 * 1024 * 1024);
    }
}
