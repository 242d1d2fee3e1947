use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub permits: PermitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Number of transcript turns sent as model context.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Attach the provider's web-search tool to chat requests.
    #[serde(default)]
    pub web_search: bool,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            history_limit: default_history_limit(),
            web_search: false,
            timeout_secs: default_chat_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_history_limit() -> usize {
    20
}
fn default_chat_timeout_secs() -> u64 {
    60
}
fn default_max_output_tokens() -> u32 {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct PermitsConfig {
    /// Report endpoint template; `{report_id}` is substituted per report.
    #[serde(default = "default_report_base_url")]
    pub report_base_url: String,
    /// Permit detail page template; `{permit_id}` is substituted per row.
    #[serde(default = "default_details_base_url")]
    pub details_base_url: String,
    #[serde(default = "default_monthly_report_id")]
    pub monthly_report_id: u32,
    #[serde(default = "default_weekly_report_id")]
    pub weekly_report_id: u32,
    /// Monday through Friday.
    #[serde(default = "default_weekday_report_ids")]
    pub weekday_report_ids: Vec<u32>,
    /// Project code whose sections are scanned (101 = single-family).
    #[serde(default = "default_project_code")]
    pub project_code: String,
    #[serde(default = "default_days")]
    pub default_days: u32,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PermitsConfig {
    fn default() -> Self {
        Self {
            report_base_url: default_report_base_url(),
            details_base_url: default_details_base_url(),
            monthly_report_id: default_monthly_report_id(),
            weekly_report_id: default_weekly_report_id(),
            weekday_report_ids: default_weekday_report_ids(),
            project_code: default_project_code(),
            default_days: default_days(),
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_report_base_url() -> String {
    "https://www.pprbd.org/File/Report?report={report_id}".to_string()
}
fn default_details_base_url() -> String {
    "https://www.pprbd.org/Permit/Details?permitNo={permit_id}".to_string()
}
fn default_monthly_report_id() -> u32 {
    46
}
fn default_weekly_report_id() -> u32 {
    45
}
fn default_weekday_report_ids() -> Vec<u32> {
    vec![40, 41, 42, 43, 44]
}
fn default_project_code() -> String {
    "101".to_string()
}
fn default_days() -> u32 {
    30
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// A missing file is not an error — every setting has a default, and the
/// server must come up (in degraded chat mode) with no configuration at
/// all. Recognized environment variables: `OPENAI_MODEL`,
/// `WEB_SEARCH_ENABLED`, `PORT`. The API credential is only ever read from
/// `OPENAI_API_KEY` at request time, never stored in config.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    // Validate chat
    if config.chat.history_limit < 2 {
        anyhow::bail!("chat.history_limit must be >= 2");
    }
    if config.chat.timeout_secs == 0 {
        anyhow::bail!("chat.timeout_secs must be > 0");
    }

    // Validate permits
    if config.permits.default_days == 0 {
        anyhow::bail!("permits.default_days must be >= 1");
    }
    if config.permits.timeout_secs == 0 {
        anyhow::bail!("permits.timeout_secs must be > 0");
    }
    if config.permits.weekday_report_ids.is_empty() {
        anyhow::bail!("permits.weekday_report_ids must not be empty");
    }
    if !config.permits.report_base_url.contains("{report_id}") {
        anyhow::bail!("permits.report_base_url must contain {{report_id}}");
    }

    Ok(config)
}

/// Environment variables override file settings. Unparseable values are
/// ignored rather than fatal, so a stray `PORT=abc` degrades to the
/// configured bind address.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(model) = std::env::var("OPENAI_MODEL") {
        if !model.trim().is_empty() {
            config.chat.model = model.trim().to_string();
        }
    }
    if let Ok(flag) = std::env::var("WEB_SEARCH_ENABLED") {
        config.chat.web_search = flag.trim().eq_ignore_ascii_case("true");
    }
    if let Ok(port) = std::env::var("PORT") {
        if let Ok(port) = port.trim().parse::<u16>() {
            let host = config
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "127.0.0.1".to_string());
            config.server.bind = format!("{}:{}", host, port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/pdesk.toml")).unwrap();
        assert_eq!(config.permits.default_days, 30);
        assert_eq!(config.permits.project_code, "101");
        assert_eq!(config.chat.history_limit, 20);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
[permits]
default_days = 7
project_code = "102"

[chat]
history_limit = 6
"#,
        )
        .unwrap();
        assert_eq!(config.permits.default_days, 7);
        assert_eq!(config.permits.project_code, "102");
        assert_eq!(config.chat.history_limit, 6);
        // Untouched sections keep defaults.
        assert_eq!(config.permits.monthly_report_id, 46);
        assert_eq!(config.server.bind, "127.0.0.1:5000");
    }

    #[test]
    fn rejects_zero_history_limit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pdesk.toml");
        std::fs::write(&path, "[chat]\nhistory_limit = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
