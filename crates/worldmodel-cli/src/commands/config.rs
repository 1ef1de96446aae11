use clap::Subcommand;
use worldmodel_core::WorldConfig;

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file location
    Path,
}

pub fn run(ctx: &Context, action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Show => {
            let config = ctx.config()?;
            println!("{}", toml_string(&config)?);
        }
        ConfigAction::Path => match &ctx.config_path {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", WorldConfig::path()?.display()),
        },
    }
    Ok(())
}

fn toml_string(config: &WorldConfig) -> Result<String, Box<dyn std::error::Error>> {
    Ok(toml::to_string_pretty(config)?)
}
