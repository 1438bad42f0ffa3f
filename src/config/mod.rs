//! Configuration loading for the dev server.
//!
//! Only the `dev_server`, `watch`, and `http` sections of a site's config
//! file are modeled here. Full site configuration (sources, theme,
//! markdown) belongs to the rendering engine and never passes through this
//! crate.

mod load;
mod types;

pub use types::{DevServerSettings, HookSettings, HotsiteConfig, HttpSettings, ServerConfig, WatchSettings};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Deserialize(#[from] config::ConfigError),

    #[error("failed to get current working directory: {0}")]
    CwdFailure(std::io::Error),

    #[error("{0}")]
    Validation(String),
}
