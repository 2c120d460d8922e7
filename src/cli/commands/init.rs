//! Init and Config commands.

use std::path::Path;

use crate::config::Settings;

/// Run init command - create configuration file.
pub fn run_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            path.display()
        );
    }

    Settings::init_config_file(path, force).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to add watch groups and handlers.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings, source: Option<&Path>) {
    match source {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: defaults (no file found)"),
    }
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(config) {
        Ok(toml_str) => println!("{toml_str}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
}
