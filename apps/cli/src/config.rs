use std::{collections::HashMap, fs, path::PathBuf};

use anyhow::{anyhow, Context};
use url::Url;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the board-storage backend.
    pub server_url: String,
    /// Hostname of the gateway serving pinned files.
    pub gateway_url: String,
    /// Public URL of the web app, used for shareable board links.
    pub app_url: String,
    /// Location of the persisted session file.
    pub session_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8787".into(),
            gateway_url: "gateway.pinata.cloud".into(),
            app_url: "http://localhost:5173".into(),
            session_file: default_session_file(),
        }
    }
}

fn default_session_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".billboards")
        .join("session.json")
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("billboards.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("gateway_url") {
                settings.gateway_url = v.clone();
            }
            if let Some(v) = file_cfg.get("app_url") {
                settings.app_url = v.clone();
            }
            if let Some(v) = file_cfg.get("session_file") {
                settings.session_file = PathBuf::from(v);
            }
        }
    }

    if let Ok(v) = std::env::var("BILLBOARDS_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("BILLBOARDS_GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Ok(v) = std::env::var("BILLBOARDS_APP_URL") {
        settings.app_url = v;
    }
    if let Ok(v) = std::env::var("BILLBOARDS_SESSION_FILE") {
        settings.session_file = PathBuf::from(v);
    }

    settings
}

pub fn validate_settings(settings: &Settings) -> anyhow::Result<()> {
    for (name, value) in [
        ("server_url", &settings.server_url),
        ("app_url", &settings.app_url),
    ] {
        Url::parse(value).with_context(|| format!("{name} '{value}' is not a valid URL"))?;
    }

    // The gateway is a bare hostname: it is spliced into
    // `https://<gateway>/ipfs/<cid>` links.
    if settings.gateway_url.contains("://") {
        return Err(anyhow!(
            "gateway_url '{}' must be a hostname without a scheme",
            settings.gateway_url
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        validate_settings(&settings).expect("defaults must validate");
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("BILLBOARDS_SERVER_URL", "https://boards.example.com");
        std::env::set_var("BILLBOARDS_GATEWAY_URL", "files.example.com");

        let settings = load_settings();
        assert_eq!(settings.server_url, "https://boards.example.com");
        assert_eq!(settings.gateway_url, "files.example.com");

        std::env::remove_var("BILLBOARDS_SERVER_URL");
        std::env::remove_var("BILLBOARDS_GATEWAY_URL");
    }

    #[test]
    fn gateway_with_scheme_is_rejected() {
        let settings = Settings {
            gateway_url: "https://files.example.com".into(),
            ..Settings::default()
        };
        let err = validate_settings(&settings).expect_err("must reject");
        assert!(err.to_string().contains("without a scheme"));
    }
}
