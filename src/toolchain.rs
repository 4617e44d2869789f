//! Clang / GCC cross toolchain resolution.
//!
//! Clang is mandatory. A GNU cross toolchain (`GCC_PATH`) is optional: when
//! present its binutils are used through `CROSS_COMPILE`, otherwise the LLVM
//! binutils shipped with clang take over (`LLVM=1 LLVM_IAS=1`).

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Target triple prefix clang is told about.
pub const CLANG_TRIPLE: &str = "aarch64-linux-gnu-";
/// 64-bit cross prefix used when no GCC toolchain is configured.
pub const DEFAULT_CROSS_COMPILE: &str = "aarch64-linux-gnu-";
/// 32-bit cross prefix for the compat vDSO.
pub const CROSS_COMPILE_ARM32: &str = "arm-linux-gnueabi-";

/// A resolved compiler toolchain.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// `<CLANG_PATH>/bin`
    pub clang_bin: PathBuf,
    /// `<GCC_PATH>/bin`, if configured.
    pub gcc_bin: Option<PathBuf>,
    /// Cross prefix discovered in `gcc_bin` (e.g. `aarch64-linux-android-`).
    pub gcc_prefix: Option<String>,
}

impl Toolchain {
    /// Resolve the toolchain from `CLANG_PATH` / `GCC_PATH` values.
    pub fn resolve(clang_path: Option<&Path>, gcc_path: Option<&Path>) -> Result<Self> {
        let Some(clang_path) = clang_path else {
            bail!(
                "CLANG_PATH is not set.\n\
                 Point it at a clang toolchain root (the directory containing bin/clang)."
            );
        };

        let clang_bin = clang_path.join("bin");
        if !clang_bin.join("clang").exists() {
            bail!(
                "Clang not found at {}\n\
                 Check CLANG_PATH (expected <CLANG_PATH>/bin/clang).",
                clang_bin.join("clang").display()
            );
        }

        let (gcc_bin, gcc_prefix) = match gcc_path {
            Some(gcc_path) => {
                let bin = gcc_path.join("bin");
                let prefix = find_gcc_prefix(&bin).with_context(|| {
                    format!("No aarch64 GCC found in {} (check GCC_PATH)", bin.display())
                })?;
                (Some(bin), Some(prefix))
            }
            None => (None, None),
        };

        Ok(Self {
            clang_bin,
            gcc_bin,
            gcc_prefix,
        })
    }

    /// Toolchain variables appended to every make invocation.
    pub fn make_vars(&self) -> Vec<String> {
        let mut vars = vec![
            "CC=clang".to_string(),
            format!("CLANG_TRIPLE={}", CLANG_TRIPLE),
            format!(
                "CROSS_COMPILE={}",
                self.gcc_prefix.as_deref().unwrap_or(DEFAULT_CROSS_COMPILE)
            ),
            format!("CROSS_COMPILE_ARM32={}", CROSS_COMPILE_ARM32),
        ];
        if self.gcc_prefix.is_none() {
            vars.push("LLVM=1".to_string());
            vars.push("LLVM_IAS=1".to_string());
        }
        vars
    }

    /// `PATH` with the toolchain bin dirs first.
    pub fn path_env(&self) -> Result<OsString> {
        let mut dirs = vec![self.clang_bin.clone()];
        if let Some(gcc_bin) = &self.gcc_bin {
            dirs.push(gcc_bin.clone());
        }
        if let Some(existing) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(dirs).context("Toolchain path contains an invalid character")
    }

    /// First line of `clang --version`.
    pub fn clang_version(&self) -> Option<String> {
        let result = Cmd::new(self.clang_bin.join("clang").display().to_string())
            .arg("--version")
            .allow_fail()
            .run()
            .ok()?;
        first_line(&result.stdout)
    }
}

/// Find the `<prefix>` of a `<prefix>gcc` aarch64 binary inside `bin`.
fn find_gcc_prefix(bin: &Path) -> Option<String> {
    let mut prefixes: Vec<String> = fs::read_dir(bin)
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.starts_with("aarch64-linux-") && name.ends_with("-gcc"))
        .map(|name| name.trim_end_matches("gcc").to_string())
        .collect();
    prefixes.sort();
    prefixes.into_iter().next()
}

/// Compiler banners sometimes carry a trailing URL in parentheses; keep it short.
fn first_line(text: &str) -> Option<String> {
    let line = text.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let short = match line.find(" (http") {
        Some(idx) => &line[..idx],
        None => line,
    };
    Some(short.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fake_clang(root: &Path) {
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/clang"), "").unwrap();
    }

    #[test]
    fn test_resolve_requires_clang_path() {
        let err = Toolchain::resolve(None, None).unwrap_err();
        assert!(err.to_string().contains("CLANG_PATH"));
    }

    #[test]
    fn test_resolve_missing_clang_binary() {
        let dir = tempdir().unwrap();
        assert!(Toolchain::resolve(Some(dir.path()), None).is_err());
    }

    #[test]
    fn test_clang_only_uses_llvm() {
        let dir = tempdir().unwrap();
        fake_clang(dir.path());

        let tc = Toolchain::resolve(Some(dir.path()), None).unwrap();
        let vars = tc.make_vars();
        assert!(vars.contains(&"CC=clang".to_string()));
        assert!(vars.contains(&"CROSS_COMPILE=aarch64-linux-gnu-".to_string()));
        assert!(vars.contains(&"LLVM=1".to_string()));
    }

    #[test]
    fn test_gcc_prefix_detected() {
        let dir = tempdir().unwrap();
        let clang = dir.path().join("clang");
        let gcc = dir.path().join("gcc");
        fake_clang(&clang);
        fs::create_dir_all(gcc.join("bin")).unwrap();
        fs::write(gcc.join("bin/aarch64-linux-android-gcc"), "").unwrap();
        fs::write(gcc.join("bin/aarch64-linux-android-ld"), "").unwrap();

        let tc = Toolchain::resolve(Some(&clang), Some(&gcc)).unwrap();
        assert_eq!(tc.gcc_prefix.as_deref(), Some("aarch64-linux-android-"));

        let vars = tc.make_vars();
        assert!(vars.contains(&"CROSS_COMPILE=aarch64-linux-android-".to_string()));
        assert!(!vars.contains(&"LLVM=1".to_string()));
    }

    #[test]
    fn test_gcc_path_without_gcc_fails() {
        let dir = tempdir().unwrap();
        let clang = dir.path().join("clang");
        let gcc = dir.path().join("gcc");
        fake_clang(&clang);
        fs::create_dir_all(gcc.join("bin")).unwrap();

        assert!(Toolchain::resolve(Some(&clang), Some(&gcc)).is_err());
    }

    #[test]
    fn test_path_env_prepends_toolchain() {
        let dir = tempdir().unwrap();
        fake_clang(dir.path());
        let tc = Toolchain::resolve(Some(dir.path()), None).unwrap();

        let path = tc.path_env().unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, dir.path().join("bin"));
    }

    #[test]
    fn test_first_line_strips_url() {
        let banner =
            "Android (1234) clang version 17.0.2 (https://android.googlesource.com/x)\nTarget: x";
        assert_eq!(
            first_line(banner).as_deref(),
            Some("Android (1234) clang version 17.0.2")
        );
        assert_eq!(first_line(""), None);
    }
}
