//! Network connectivity check for Telegram notifications.

use super::CheckResult;
use crate::telegram::API_BASE;

/// Check that the Telegram Bot API is reachable.
///
/// Only a warning on failure: notifications are best-effort.
pub async fn check_network() -> CheckResult {
    let result = tokio::process::Command::new("curl")
        .args([
            "--head",           // HEAD request only
            "--silent",         // No progress output
            "--max-time", "10", // 10 second timeout
            "--output", "/dev/null",
            API_BASE,
        ])
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            CheckResult::pass("Network", format!("Telegram API reachable ({})", api_host()))
        }
        Ok(_) => CheckResult::warn(
            "Network",
            format!("Telegram API unreachable ({}), notifications may fail", api_host()),
        ),
        Err(e) => CheckResult::warn("Network", format!("Failed to check network: {}", e)),
    }
}

/// Host part of the API URL for display.
fn api_host() -> &'static str {
    API_BASE.trim_start_matches("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_host() {
        assert_eq!(api_host(), "api.telegram.org");
    }
}
