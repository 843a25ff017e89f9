//! The `ortforge init` command.

use std::path::Path;

use anyhow::Result;

use ortforge_core::config::{OrtConfig, CONFIG_FILE_NAME};

const STARTER_LIBRARY: &str = include_str!("../../../../templates/ort-core.toml");
const LIBRARY_PATH: &str = "templates/ort-core.toml";

pub fn execute() -> Result<i32> {
    if Path::new(CONFIG_FILE_NAME).exists() {
        println!("{CONFIG_FILE_NAME} already exists, skipping.");
    } else {
        let config = format!(
            "# ortforge configuration\n# ORTFORGE_SEED and ORTFORGE_PARALLELISM override the values below.\n\n{}",
            OrtConfig::default().to_toml()?
        );
        std::fs::write(CONFIG_FILE_NAME, config)?;
        println!("Created {CONFIG_FILE_NAME}");
    }

    std::fs::create_dir_all("templates")?;
    if Path::new(LIBRARY_PATH).exists() {
        println!("{LIBRARY_PATH} already exists, skipping.");
    } else {
        std::fs::write(LIBRARY_PATH, STARTER_LIBRARY)?;
        println!("Created {LIBRARY_PATH}");
    }

    println!("\nNext steps:");
    println!("  1. Edit {CONFIG_FILE_NAME} to adjust ratios and the seed");
    println!("  2. Run: ortforge plan --count 100");
    println!("  3. Run: ortforge generate --templates templates --count 100");
    println!("  4. Run: ortforge validate --items ortforge-output");

    Ok(0)
}
