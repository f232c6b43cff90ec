mod cli;
mod config;
mod media;
mod paths;
mod run;

use anyhow::{bail, Result};
use cli::{Command, ConfigAction};
use config::Settings;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    let paths = AppPaths::discover()?;

    match action {
        ConfigAction::Init { force } => run_config_init(&paths, force),
        ConfigAction::Show => {
            let settings = Settings::load_or_default(&paths.settings_file())?;
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        ConfigAction::Where => {
            println!("Distortio directories:");
            println!("  config:    {}", paths.config_dir().display());
            println!("  settings:  {}", paths.settings_file().display());
            println!("  data:      {}", paths.data_dir().display());
            println!("  captures:  {}", paths.captures_dir().display());
            Ok(())
        }
    }
}

fn run_config_init(paths: &AppPaths, force: bool) -> Result<()> {
    let path = paths.settings_file();
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    Settings::default().persist(&path)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
