use anyhow::Context;
use archetype_core::config::Config;
use std::path::Path;

pub fn run(root: &Path, port: u16, no_open: bool) -> anyhow::Result<()> {
    // Fail before starting the runtime when the site is not initialized.
    Config::load(root).context("failed to load archetype.yaml")?;

    let rt = tokio::runtime::Runtime::new()?;
    let root_buf = root.to_path_buf();
    rt.block_on(async move { archetype_server::serve(root_buf, port, !no_open).await })
}
