use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

const SETTINGS_FILE: &str = "server.toml";
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/crud.db";
/// Unprefixed variables honoured below their `APP__` forms.
const PLAIN_OVERRIDES: [&str; 2] = ["DATABASE_URL", "SERVER_BIND"];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub items_per_page: u32,
    pub json_view: bool,
    pub translations_dir: String,
    pub default_locale: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: DEFAULT_DATABASE_URL.into(),
            items_per_page: 10,
            json_view: false,
            translations_dir: "translations".into(),
            default_locale: "en".into(),
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(SETTINGS_FILE), env::vars().collect())
}

/// Defaults, then the optional TOML file, then plain overrides, then `APP__*`.
pub fn load_settings_from(
    file: &Path,
    vars: HashMap<String, String>,
) -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    let plain: HashMap<String, String> = vars
        .iter()
        .filter(|(name, _)| PLAIN_OVERRIDES.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let settings: Settings = Config::builder()
        .set_default("server_bind", defaults.server_bind)?
        .set_default("database_url", defaults.database_url)?
        .set_default("items_per_page", i64::from(defaults.items_per_page))?
        .set_default("json_view", defaults.json_view)?
        .set_default("translations_dir", defaults.translations_dir)?
        .set_default("default_locale", defaults.default_locale)?
        .add_source(
            File::from(file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::default().source(Some(plain)))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars)),
        )
        .build()
        .with_context(|| format!("failed to read settings from '{}'", file.display()))?
        .try_deserialize()
        .context("invalid settings")?;

    ensure!(settings.items_per_page > 0, "items_per_page must be at least 1");
    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_DATABASE_URL.to_string();
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    format!("sqlite://{path}")
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url).and_then(|path| path.parent().map(Path::to_path_buf))
    else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")?
        .split('?')
        .next()
        .unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
