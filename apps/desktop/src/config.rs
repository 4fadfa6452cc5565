use std::{fs, io::ErrorKind, path::Path};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub username: Option<String>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".into(),
            username: None,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    server_url: Option<String>,
    username: Option<String>,
    log_filter: Option<String>,
}

/// Defaults, then the config file, then environment overrides.
///
/// An explicit `path` must exist; the default `chat.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<FileSettings>(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            settings.apply_file(file_cfg);
        }
        Err(err) if !required && err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

impl Settings {
    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.server_url {
            self.server_url = v;
        }
        if let Some(v) = file_cfg.username {
            self.username = Some(v);
        }
        if let Some(v) = file_cfg.log_filter {
            self.log_filter = v;
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("CHAT_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = var("APP__SERVER_URL") {
            self.server_url = v;
        }

        if let Some(v) = var("CHAT_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = var("APP__USERNAME") {
            self.username = Some(v);
        }

        if let Some(v) = var("RUST_LOG") {
            self.log_filter = v;
        }
    }
}
