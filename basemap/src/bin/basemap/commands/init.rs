use anyhow::{Context, Result};
use clap::Args;

use crate::context::{BasemapConfig, CONFIG_DIR, ProjectContext};
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Initialize",
    commands: &[
        "basemap init                      # Create .basemap/config.toml in the current directory",
        "basemap init --force              # Overwrite an existing configuration",
    ],
}];

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,
}

pub fn handle_init(args: InitArgs, output: &OutputManager) -> Result<()> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = ProjectContext::from_root(current_dir)?;

    if ctx.is_initialized() && !args.force {
        output.warning(&format!(
            "{} already exists; use --force to overwrite it",
            ctx.config_path.display()
        ));
        return Ok(());
    }

    std::fs::create_dir_all(&ctx.basemap_dir)
        .with_context(|| format!("Failed to create {CONFIG_DIR} directory"))?;

    let config = BasemapConfig::default();
    let content = toml::to_string_pretty(&config).context("Failed to serialize default config")?;
    std::fs::write(&ctx.config_path, content).context("Failed to write config.toml")?;

    output.success("Initialized basemap");
    output.file_written(&ctx.config_path);
    output.key_value("Store", &config.store.dir);
    output.key_value("Documents", &config.output.dir);
    output.info("Run 'basemap sync <file> --url <url>' to store a first version");
    Ok(())
}
