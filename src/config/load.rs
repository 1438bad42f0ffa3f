//! Layered configuration loading: defaults, an optional YAML file, then
//! `HOTSITE__`-prefixed environment variables, in that order.

use std::path::Path;

use config::{Environment, File};

use super::types::HotsiteConfig;
use super::ConfigError;

impl HotsiteConfig {
    /// Load the `dev_server`/`watch`/`http` sections of a site's config file,
    /// falling back to built-in defaults when the file doesn't exist and
    /// layering `HOTSITE__WATCH__POLL`-style environment overrides on top.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config_file = config_file.unwrap_or_else(|| Path::new("hotsite.yaml"));

        let builder = config::Config::builder()
            .add_source(File::from(config_file).required(false))
            .add_source(Environment::with_prefix("HOTSITE").separator("__"));

        let raw = builder.build()?;
        raw.try_deserialize().map_err(ConfigError::from)
    }
}
