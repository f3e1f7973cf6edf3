use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

/// Resolves validator message keys to localized templates.
///
/// A translator is handed to every validation call; there is no process-wide
/// default.
pub trait Translator: Send + Sync {
    fn locale(&self) -> &str;

    fn template(&self, message_key: &str) -> Option<&str>;
}

/// A validator failure before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    pub key: &'static str,
    pub default_template: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl ValidationMessage {
    pub fn new(key: &'static str, default_template: &'static str) -> Self {
        Self {
            key,
            default_template,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    pub fn render(&self, translator: &dyn Translator) -> String {
        let template = translator
            .template(self.key)
            .unwrap_or(self.default_template);
        self.params
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("%{name}%"), value)
            })
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read translation catalog '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("translation catalog '{path}' is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Message-key to template table for one locale, loaded from TOML.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    locale: String,
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    /// A catalog with no entries; every message falls back to its built-in
    /// English template.
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            messages: HashMap::new(),
        }
    }

    pub fn with_message(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.messages.insert(key.into(), template.into());
        self
    }

    pub fn from_toml_str(locale: impl Into<String>, raw: &str) -> Result<Self, toml::de::Error> {
        let messages = toml::from_str::<HashMap<String, String>>(raw)?;
        Ok(Self {
            locale: locale.into(),
            messages,
        })
    }

    /// Loads `<dir>/<locale>.toml`; the locale is taken from the file stem.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let locale = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_toml_str(locale, &raw).map_err(|source| CatalogError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Translator for MessageCatalog {
    fn locale(&self) -> &str {
        &self.locale
    }

    fn template(&self, message_key: &str) -> Option<&str> {
        self.messages.get(message_key).map(String::as_str)
    }
}

/// The catalogs available to a process, one of which is picked per request.
#[derive(Debug, Clone)]
pub struct CatalogSet {
    default: MessageCatalog,
    catalogs: HashMap<String, MessageCatalog>,
}

impl CatalogSet {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default: MessageCatalog::new(default_locale),
            catalogs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, catalog: MessageCatalog) {
        if catalog.locale == self.default.locale {
            self.default = catalog;
        } else {
            self.catalogs.insert(catalog.locale.clone(), catalog);
        }
    }

    /// Loads every `*.toml` file in `dir`. A missing directory is not an error.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, CatalogError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CatalogError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut loaded = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| CatalogError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let catalog = MessageCatalog::load(&path)?;
            debug!(locale = %catalog.locale, messages = catalog.len(), "loaded translation catalog");
            self.insert(catalog);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Picks the first locale of an `Accept-Language` header that has a
    /// catalog, matching either the full tag or its primary language.
    pub fn negotiate(&self, accept_language: Option<&str>) -> &MessageCatalog {
        let candidates = accept_language
            .unwrap_or_default()
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|tag| tag.trim().replace('-', "_"))
            .filter(|tag| !tag.is_empty());

        for tag in candidates {
            if let Some(catalog) = self.get(&tag) {
                return catalog;
            }
            let primary = tag.split('_').next().unwrap_or_default();
            if let Some(catalog) = self.get(primary) {
                return catalog;
            }
        }
        &self.default
    }

    fn get(&self, locale: &str) -> Option<&MessageCatalog> {
        if locale == self.default.locale {
            Some(&self.default)
        } else {
            self.catalogs.get(locale)
        }
    }

    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        locales.push(&self.default.locale);
        locales.sort_unstable();
        locales
    }
}

#[cfg(test)]
#[path = "tests/i18n_tests.rs"]
mod tests;
