//! Telegram build notifications.
//!
//! Talks to the Bot API through `curl` so no TLS stack is linked into the
//! builder. Notification is best-effort: a missing `curl`, missing
//! credentials, or an API error is reported as a warning and the build
//! carries on.
//!
//! # Environment
//!
//! - `ENABLE_TELEGRAM`: master toggle
//! - `TELEGRAM_BOT_TOKEN`: bot token from @BotFather
//! - `TELEGRAM_CHAT_ID`: target chat / channel id

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::process;
use crate::timing::format_duration;

/// Bot API base URL.
pub const API_BASE: &str = "https://api.telegram.org";

/// Upper bound for a single API call (uploads included).
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl ApiResponse {
    /// Parse a response body and turn `ok: false` into an error.
    pub fn check(body: &str) -> Result<Self> {
        let response: ApiResponse = serde_json::from_str(body)
            .with_context(|| format!("Unexpected Telegram response: {}", body.trim()))?;
        if !response.ok {
            bail!(
                "Telegram API error {}: {}",
                response
                    .error_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                response.description.as_deref().unwrap_or("no description")
            );
        }
        Ok(response)
    }
}

/// Build notifier. Construct with [`Notifier::new`]; disabled notifiers are no-ops.
#[derive(Debug, Clone)]
pub struct Notifier {
    bot_token: String,
    chat_id: String,
    enabled: bool,
}

impl Notifier {
    /// Decide whether notifications can be sent and warn when they can't.
    pub fn new(config: &TelegramConfig) -> Self {
        Self::with_curl(config, process::exists("curl"))
    }

    fn with_curl(config: &TelegramConfig, curl_available: bool) -> Self {
        let mut enabled = config.enabled;
        if enabled && !curl_available {
            println!("[WARN] curl not found, Telegram notifications disabled");
            enabled = false;
        }
        if enabled && !config.has_credentials() {
            println!(
                "[WARN] ENABLE_TELEGRAM is set but TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID \
                 are missing, Telegram notifications disabled"
            );
            enabled = false;
        }
        Self {
            bot_token: config.bot_token.clone().unwrap_or_default(),
            chat_id: config.chat_id.clone().unwrap_or_default(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.bot_token, method)
    }

    /// Post an HTML-formatted message.
    pub async fn send_message(&self, html: &str) {
        if !self.enabled {
            return;
        }
        let args = vec![
            "--data-urlencode".to_string(),
            format!("chat_id={}", self.chat_id),
            "--data-urlencode".to_string(),
            format!("text={}", html),
            "--data-urlencode".to_string(),
            "parse_mode=HTML".to_string(),
            "--data-urlencode".to_string(),
            "disable_web_page_preview=true".to_string(),
        ];
        if let Err(e) = self.call("sendMessage", args).await {
            println!("[WARN] Telegram sendMessage failed: {:#}", e);
        }
    }

    /// Upload a file with an HTML caption.
    pub async fn send_document(&self, path: &Path, caption: &str) {
        if !self.enabled {
            return;
        }
        if !path.is_file() {
            println!("[WARN] Not uploading {} (file missing)", path.display());
            return;
        }
        // `-F` treats a leading `<` or `@` as a file reference; text fields use `--form-string`.
        let args = vec![
            "--form-string".to_string(),
            format!("chat_id={}", self.chat_id),
            "-F".to_string(),
            format!("document=@{}", path.display()),
            "--form-string".to_string(),
            format!("caption={}", caption),
            "--form-string".to_string(),
            "parse_mode=HTML".to_string(),
        ];
        println!("  Uploading {} to Telegram...", path.display());
        if let Err(e) = self.call("sendDocument", args).await {
            println!("[WARN] Telegram sendDocument failed: {:#}", e);
        }
    }

    async fn call(&self, method: &str, mut args: Vec<String>) -> Result<ApiResponse> {
        args.extend([
            "--silent".to_string(),
            "--show-error".to_string(),
            "--max-time".to_string(),
            REQUEST_TIMEOUT_SECS.to_string(),
            self.method_url(method),
        ]);

        tracing::debug!(method, "telegram request");
        let output = tokio::process::Command::new("curl")
            .args(&args)
            .output()
            .await
            .context("Failed to run curl")?;

        let body = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            method,
            status = ?output.status.code(),
            body = %body.trim(),
            "telegram response"
        );

        if !output.status.success() && body.trim().is_empty() {
            bail!(
                "curl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        ApiResponse::check(&body)
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Details shown in the "build started" message.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    pub kernel_name: String,
    pub device: String,
    pub defconfig: String,
    pub jobs: usize,
    pub compiler: Option<String>,
    pub commit: Option<String>,
    pub commit_subject: Option<String>,
    pub branch: Option<String>,
}

/// Message sent before compiling.
pub fn build_started_message(info: &BuildInfo) -> String {
    let mut msg = format!(
        "<b>{} build started</b>\n\
         <b>Device:</b> <code>{}</code>\n\
         <b>Defconfig:</b> <code>{}</code>\n\
         <b>Jobs:</b> {}",
        escape_html(&info.kernel_name),
        escape_html(&info.device),
        escape_html(&info.defconfig),
        info.jobs
    );
    if let Some(branch) = &info.branch {
        msg.push_str(&format!("\n<b>Branch:</b> <code>{}</code>", escape_html(branch)));
    }
    if let Some(commit) = &info.commit {
        msg.push_str(&format!("\n<b>Commit:</b> <code>{}</code>", escape_html(commit)));
        if let Some(subject) = &info.commit_subject {
            msg.push_str(&format!(" {}", escape_html(subject)));
        }
    }
    if let Some(compiler) = &info.compiler {
        msg.push_str(&format!("\n<b>Compiler:</b> <code>{}</code>", escape_html(compiler)));
    }
    msg
}

/// Message sent after a successful build.
pub fn build_succeeded_message(device: &str, elapsed: Duration, zip_name: Option<&str>) -> String {
    let mut msg = format!(
        "<b>Build succeeded</b> for <code>{}</code> in {}",
        escape_html(device),
        format_duration(elapsed)
    );
    if let Some(zip) = zip_name {
        msg.push_str(&format!("\n<b>Zip:</b> <code>{}</code>", escape_html(zip)));
    }
    msg
}

/// Message sent when a stage fails.
pub fn build_failed_message(device: &str, elapsed: Duration, error: &str) -> String {
    let first = error.lines().next().unwrap_or("unknown error");
    format!(
        "<b>Build failed</b> for <code>{}</code> after {}\n<code>{}</code>",
        escape_html(device),
        format_duration(elapsed),
        escape_html(first)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token: Some("123:abc".into()),
            chat_id: Some("-1001".into()),
        }
    }

    #[test]
    fn test_missing_curl_disables() {
        let notifier = Notifier::with_curl(&enabled_config(), false);
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn test_missing_credentials_disables() {
        let mut config = enabled_config();
        config.chat_id = None;
        assert!(!Notifier::with_curl(&config, true).is_enabled());
    }

    #[test]
    fn test_toggle_off_disables() {
        let mut config = enabled_config();
        config.enabled = false;
        assert!(!Notifier::with_curl(&config, true).is_enabled());
        assert!(Notifier::with_curl(&enabled_config(), true).is_enabled());
    }

    #[test]
    fn test_method_url() {
        let notifier = Notifier::with_curl(&enabled_config(), true);
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        let notifier = Notifier::with_curl(&TelegramConfig::default(), true);
        assert!(!notifier.is_enabled());
        notifier.send_message("hello").await;
        notifier
            .send_document(Path::new("/nonexistent/file.zip"), "caption")
            .await;
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("a < b && c > d"),
            "a &lt; b &amp;&amp; c &gt; d"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_api_response_ok() {
        let response = ApiResponse::check(r#"{"ok":true,"result":{"message_id":7}}"#).unwrap();
        assert!(response.ok);
    }

    #[test]
    fn test_api_response_error() {
        let err = ApiResponse::check(
            r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("Unauthorized"));
    }

    #[test]
    fn test_api_response_garbage() {
        assert!(ApiResponse::check("<html>bad gateway</html>").is_err());
    }

    #[test]
    fn test_started_message_escapes_fields() {
        let info = BuildInfo {
            kernel_name: "Storm".into(),
            device: "ginkgo".into(),
            defconfig: "vendor/ginkgo-perf_defconfig".into(),
            jobs: 8,
            compiler: Some("clang <17>".into()),
            commit: Some("abc1234".into()),
            commit_subject: Some("fix a & b".into()),
            branch: None,
        };
        let msg = build_started_message(&info);
        assert!(msg.contains("<code>ginkgo</code>"));
        assert!(msg.contains("clang &lt;17&gt;"));
        assert!(msg.contains("abc1234</code> fix a &amp; b"));
        assert!(!msg.contains("Branch"));
    }

    #[test]
    fn test_succeeded_and_failed_messages() {
        let ok = build_succeeded_message("ginkgo", Duration::from_secs(125), Some("k.zip"));
        assert!(ok.contains("2m 5s"));
        assert!(ok.contains("k.zip"));

        let failed = build_failed_message(
            "ginkgo",
            Duration::from_secs(9),
            "Kernel compilation failed\n  Command: make",
        );
        assert!(failed.contains("after 9.0s"));
        assert!(failed.contains("Kernel compilation failed"));
        assert!(!failed.contains("Command: make"));
    }
}
