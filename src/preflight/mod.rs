//! Preflight checks for kernel build prerequisites.
//!
//! Validates that everything a build needs is in place BEFORE `make` starts
//! a long compile.
//!
//! # Checks Performed
//!
//! - **Host tools**: make, bc, bison, flex, git, zip (curl optional)
//! - **Kernel source**: top-level Makefile and the device defconfig
//! - **Toolchain**: `CLANG_PATH` / `GCC_PATH` resolve to real compilers
//! - **Disk space**: room for the output tree
//! - **Network**: Telegram API reachable (only when notifications are on)
//!
//! # Usage
//!
//! ```rust,ignore
//! use droidkbuild::preflight::PreflightChecker;
//!
//! let checker = PreflightChecker::new(config, clang_path, gcc_path, notify);
//! let report = checker.run_all().await;
//!
//! if !report.is_ok() {
//!     report.print_summary();
//!     std::process::exit(1);
//! }
//! ```

mod disk_space;
mod host_tools;
mod network;

pub use disk_space::check_disk_space;
pub use host_tools::check_host_tools;
pub use network::check_network;

use std::path::PathBuf;

use crate::config::BuildConfig;
use crate::toolchain::Toolchain;

/// Result of a single preflight check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Passed, but with something worth pointing out
    pub warning: bool,
    /// Human-readable message
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            warning: false,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            warning: false,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create a warning check result (passes but with a note).
    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            warning: true,
            message: message.into(),
            suggestion: None,
        }
    }

    fn status(&self) -> &'static str {
        match (self.passed, self.warning) {
            (false, _) => "[FAIL]",
            (true, true) => "[WARN]",
            (true, false) => "[OK]",
        }
    }
}

/// Comprehensive preflight report.
#[derive(Debug, Default)]
pub struct PreflightReport {
    /// All check results
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Check if all preflight checks passed.
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Get all failing checks.
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    /// Get count of passing checks.
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Get total check count.
    pub fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Print a summary of the preflight checks.
    pub fn print_summary(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            println!("{} {}: {}", check.status(), check.name, check.message);
            if let Some(suggestion) = &check.suggestion {
                println!("     Suggestion: {}", suggestion);
            }
        }

        println!();
        if self.is_ok() {
            println!(
                "All preflight checks passed ({}/{})",
                self.passed_count(),
                self.total_count()
            );
        } else {
            println!(
                "Preflight checks failed: {} of {} passed",
                self.passed_count(),
                self.total_count()
            );
        }
    }
}

/// Which checks a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Compile: tools, source, defconfig, toolchain, disk.
    Build,
    /// Package only: tools needed for zipping.
    Package,
}

/// Preflight checker for a device build.
pub struct PreflightChecker {
    config: BuildConfig,
    clang_path: Option<PathBuf>,
    gcc_path: Option<PathBuf>,
    notify: bool,
}

impl PreflightChecker {
    /// Create a new preflight checker.
    pub fn new(
        config: BuildConfig,
        clang_path: Option<PathBuf>,
        gcc_path: Option<PathBuf>,
        notify: bool,
    ) -> Self {
        Self {
            config,
            clang_path,
            gcc_path,
            notify,
        }
    }

    /// Run all checks relevant to `scope`.
    pub async fn run(&self, scope: Scope) -> PreflightReport {
        let mut report = PreflightReport::default();

        match scope {
            Scope::Build => {
                report.checks.extend(check_host_tools());
                report.checks.push(self.check_kernel_source());
                report.checks.push(self.check_defconfig());
                report.checks.push(self.check_toolchain());
                report.checks.push(check_disk_space(&self.config.kernel_dir));
            }
            Scope::Package => {
                report.checks.extend(
                    check_host_tools()
                        .into_iter()
                        .filter(|c| c.name.starts_with("zip") || c.name.starts_with("git")),
                );
            }
        }

        if self.notify {
            report.checks.push(check_network().await);
        }

        report
    }

    /// Run every check (used by `status`).
    pub async fn run_all(&self) -> PreflightReport {
        self.run(Scope::Build).await
    }

    fn check_kernel_source(&self) -> CheckResult {
        let makefile = self.config.kernel_dir.join("Makefile");
        if makefile.exists() {
            CheckResult::pass(
                "Kernel source",
                format!("Found at {}", self.config.kernel_dir.display()),
            )
        } else {
            CheckResult::fail(
                "Kernel source",
                format!("No Makefile in {}", self.config.kernel_dir.display()),
                "Run from the kernel tree or pass --kernel-dir",
            )
        }
    }

    fn check_defconfig(&self) -> CheckResult {
        let defconfig = self.config.defconfig_path();
        if defconfig.exists() {
            CheckResult::pass("Defconfig", self.config.defconfig.clone())
        } else {
            CheckResult::fail(
                "Defconfig",
                format!("Not found at {}", defconfig.display()),
                "Pass --defconfig or set DEFCONFIG",
            )
        }
    }

    fn check_toolchain(&self) -> CheckResult {
        match Toolchain::resolve(self.clang_path.as_deref(), self.gcc_path.as_deref()) {
            Ok(tc) => {
                let gcc = match &tc.gcc_prefix {
                    Some(prefix) => format!("GCC {}", prefix),
                    None => "LLVM binutils".to_string(),
                };
                CheckResult::pass(
                    "Toolchain",
                    format!("clang in {} + {}", tc.clang_bin.display(), gcc),
                )
            }
            Err(e) => CheckResult::fail(
                "Toolchain",
                e.to_string().lines().next().unwrap_or("invalid").to_string(),
                "Set CLANG_PATH (and optionally GCC_PATH) to toolchain roots",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("test", "passed");
        assert!(result.passed);
        assert!(result.suggestion.is_none());
        assert_eq!(result.status(), "[OK]");
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("test", "failed", "fix it");
        assert!(!result.passed);
        assert!(result.suggestion.is_some());
        assert_eq!(result.status(), "[FAIL]");
    }

    #[test]
    fn test_check_result_warn_passes() {
        let result = CheckResult::warn("test", "meh");
        assert!(result.passed);
        assert_eq!(result.status(), "[WARN]");
    }

    #[test]
    fn test_preflight_report_is_ok() {
        let mut report = PreflightReport::default();
        assert!(report.is_ok()); // Empty is OK

        report.checks.push(CheckResult::pass("test1", "ok"));
        report.checks.push(CheckResult::warn("test2", "meh"));
        assert!(report.is_ok());

        report.checks.push(CheckResult::fail("test3", "bad", "fix"));
        assert!(!report.is_ok());
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.total_count(), 3);
    }

    #[tokio::test]
    async fn test_build_scope_flags_missing_source_and_toolchain() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        let checker = PreflightChecker::new(config, None, None, false);

        let report = checker.run(Scope::Build).await;
        let failed: Vec<&str> = report.errors().iter().map(|c| c.name.as_str()).collect();
        assert!(failed.contains(&"Kernel source"));
        assert!(failed.contains(&"Defconfig"));
        assert!(failed.contains(&"Toolchain"));
    }

    #[tokio::test]
    async fn test_build_scope_accepts_valid_tree() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        fs::write(dir.path().join("Makefile"), "").unwrap();
        fs::create_dir_all(config.defconfig_path().parent().unwrap()).unwrap();
        fs::write(config.defconfig_path(), "CONFIG_ARM64=y\n").unwrap();
        let clang = dir.path().join("clang");
        fs::create_dir_all(clang.join("bin")).unwrap();
        fs::write(clang.join("bin/clang"), "").unwrap();

        let checker = PreflightChecker::new(config, Some(clang), None, false);
        let report = checker.run(Scope::Build).await;
        for name in ["Kernel source", "Defconfig", "Toolchain"] {
            let check = report.checks.iter().find(|c| c.name == name).unwrap();
            assert!(check.passed, "{} should pass: {}", name, check.message);
        }
    }

    #[tokio::test]
    async fn test_package_scope_only_checks_packaging_tools() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::new(dir.path(), "ginkgo");
        let checker = PreflightChecker::new(config, None, None, false);

        let report = checker.run(Scope::Package).await;
        assert_eq!(report.total_count(), 2);
    }
}
