use anyhow::Context;
use archetype_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let site_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "site".to_string())
    });

    println!("Initializing archetype in: {}", root.display());

    let users = paths::users_dir(root);
    io::ensure_dir(&users).with_context(|| format!("failed to create {}", users.display()))?;

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::new(&site_name)
            .save(root)
            .context("failed to write archetype.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    println!("  data:    {}", paths::DATA_DIR);
    Ok(())
}
