//! Host tool validation for kernel builds.
//!
//! Checks that required external tools are installed and executable.

use super::CheckResult;
use crate::process::which;

/// Required host tools with their install suggestions.
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("make", "Drive the kernel build", "sudo apt install make"),
    ("bc", "Kernel timeconst generation", "sudo apt install bc"),
    ("bison", "Kconfig parser", "sudo apt install bison"),
    ("flex", "Kconfig lexer", "sudo apt install flex"),
    ("git", "Clone AnyKernel3, read commit info", "sudo apt install git"),
    ("zip", "Create flashable zip", "sudo apt install zip"),
];

/// Tools whose absence only disables a feature.
const OPTIONAL_TOOLS: &[(&str, &str)] = &[("curl", "Telegram notifications")];

/// Check that all required host tools are installed.
pub fn check_host_tools() -> Vec<CheckResult> {
    let required = REQUIRED_TOOLS
        .iter()
        .map(|(tool, purpose, install)| check_tool(tool, purpose, install));
    let optional = OPTIONAL_TOOLS
        .iter()
        .map(|(tool, purpose)| check_optional_tool(tool, purpose));
    required.chain(optional).collect()
}

fn check_tool(tool: &str, purpose: &str, install_cmd: &str) -> CheckResult {
    match which(tool) {
        Some(path) => CheckResult::pass(
            format!("{} tool", tool),
            format!("Found at {} ({})", path, purpose),
        ),
        None => CheckResult::fail(
            format!("{} tool", tool),
            format!("Not found (needed for: {})", purpose),
            install_cmd,
        ),
    }
}

fn check_optional_tool(tool: &str, purpose: &str) -> CheckResult {
    match which(tool) {
        Some(path) => CheckResult::pass(format!("{} tool", tool), format!("Found at {}", path)),
        None => CheckResult::warn(
            format!("{} tool", tool),
            format!("Not found ({} disabled)", purpose),
        ),
    }
}
