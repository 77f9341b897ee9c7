pub mod config;
pub mod fields;
pub mod funnel;
pub mod init;
pub mod nonce;
pub mod serve;
pub mod user;

use anyhow::Context;
use archetype_core::config::Config;
use archetype_core::site::Site;
use std::path::Path;

/// Load `archetype.yaml` and build the site from it.
pub fn load_site(root: &Path) -> anyhow::Result<Site> {
    let config = Config::load(root).context("failed to load archetype.yaml")?;
    Site::from_config(&config).context("failed to build site from archetype.yaml")
}
