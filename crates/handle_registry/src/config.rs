//! Registry configuration
//!
//! Two kinds of property are read: the site's registered handle prefix
//! (`handle.prefix`) and one dissemination base URL per resource kind
//! (`handle.<kind>.url.prefix`, e.g. `handle.item.url.prefix`). Values may come
//! from a TOML file and from `HDL_`-prefixed environment variables such as
//! `HDL_HANDLE__ITEM__URL__PREFIX`.

use crate::errors::*;
use crate::types::ResourceType;
use config::{Config, Environment, File as ConfigFile};
use std::collections::HashMap;
use std::path::Path;

pub const PREFIX_KEY: &str = "handle.prefix";

/// Key holding the dissemination base URL for `kind`
pub fn url_prefix_key(kind: ResourceType) -> String {
    format!("handle.{}.url.prefix", kind.config_name())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    prefix: Option<String>,
    url_prefixes: HashMap<ResourceType, String>,
}

impl RegistryConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: non_blank(prefix.into()),
            url_prefixes: HashMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_blank(prefix.into());
        self
    }

    pub fn with_url_prefix(mut self, kind: ResourceType, url: impl Into<String>) -> Self {
        if let Some(url) = non_blank(url.into()) {
            self.url_prefixes.insert(kind, url);
        }
        self
    }

    pub fn with_item_url_prefix(self, url: impl Into<String>) -> Self {
        self.with_url_prefix(ResourceType::Item, url)
    }

    /// Site prefix under which new handles are minted
    pub fn prefix(&self) -> Result<&str> {
        self.prefix
            .as_deref()
            .ok_or_else(|| HandleRegistryError::ConfigurationMissing {
                key: PREFIX_KEY.to_string(),
            })
    }

    /// Dissemination base URL for `kind`
    pub fn url_prefix(&self, kind: ResourceType) -> Result<&str> {
        self.url_prefixes
            .get(&kind)
            .map(String::as_str)
            .ok_or_else(|| HandleRegistryError::ConfigurationMissing {
                key: url_prefix_key(kind),
            })
    }

    /// Read registry properties out of an already built [`Config`].
    ///
    /// Absent or blank properties stay unset; they are reported when an
    /// operation needs them.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self {
            prefix: config.get_string(PREFIX_KEY).ok().and_then(non_blank),
            url_prefixes: HashMap::new(),
        };
        for kind in ResourceType::ALL {
            if let Ok(url) = config.get_string(&url_prefix_key(kind)) {
                registry = registry.with_url_prefix(kind, url);
            }
        }
        registry
    }

    /// Load from an optional TOML file, then the `HDL_` environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Configuration file {} not found", path.display());
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("HDL")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = builder.build()?;
        Ok(Self::from_config(&config))
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(source: &str) -> RegistryConfig {
        let config = Config::builder()
            .add_source(ConfigFile::from_str(source, FileFormat::Toml))
            .build()
            .unwrap();
        RegistryConfig::from_config(&config)
    }

    #[test]
    fn test_reads_prefix_and_item_url() {
        let config = from_toml(
            r#"
            [handle]
            prefix = "123456789"
            item.url.prefix = "http://example.org/handle"
            "#,
        );
        assert_eq!(config.prefix().unwrap(), "123456789");
        assert_eq!(
            config.url_prefix(ResourceType::Item).unwrap(),
            "http://example.org/handle"
        );
    }

    #[test]
    fn test_missing_properties_name_their_key() {
        let config = from_toml("[handle]\nprefix = \"  \"\n");

        let err = config.prefix().unwrap_err();
        assert!(
            matches!(err, HandleRegistryError::ConfigurationMissing { key } if key == "handle.prefix")
        );

        let err = config.url_prefix(ResourceType::Item).unwrap_err();
        assert!(
            matches!(err, HandleRegistryError::ConfigurationMissing { key } if key == "handle.item.url.prefix")
        );
    }

    #[test]
    fn test_builder_helpers() {
        let config = RegistryConfig::new("1")
            .with_item_url_prefix("http://a/")
            .with_url_prefix(ResourceType::Collection, "");
        assert_eq!(config.url_prefix(ResourceType::Item).unwrap(), "http://a/");
        assert!(config.url_prefix(ResourceType::Collection).is_err());

        let config = config.with_prefix("2");
        assert_eq!(config.prefix().unwrap(), "2");
        assert_eq!(config.url_prefix(ResourceType::Item).unwrap(), "http://a/");
    }

    #[test]
    fn test_load_rejects_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(RegistryConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("handles.toml");
        std::fs::write(&path, "[handle]\nprefix = \"987\"\n").unwrap();

        let config = RegistryConfig::load(Some(&path)).unwrap();
        assert_eq!(config.prefix().unwrap(), "987");
    }
}
