mod cli;
mod paths;
mod run;

use std::path::Path;

use anyhow::{Context, Result};
use cli::{Command, ConfigAction};
use emberconfig::EmberConfig;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    let config_override = cli.config.as_deref();

    match cli.command {
        Some(Command::Export(args)) => run::export(args, config_override),
        Some(Command::Sample(args)) => run::sample(args, config_override),
        Some(Command::Config(config_cmd)) => match config_cmd.action {
            ConfigAction::Where => run_config_where(config_override),
            ConfigAction::Check { file } => {
                let path = match file {
                    Some(file) => file,
                    None => run::active_config_path(config_override)?,
                };
                run_config_check(&path)
            }
        },
        None => run::run(cli.run, config_override),
    }
}

fn run_config_where(config_override: Option<&Path>) -> Result<()> {
    let paths = AppPaths::discover()?;
    let active = run::active_config_path(config_override)?;
    println!("Configuration:");
    println!("  config dir: {}", paths.config_dir().display());
    let status = if active.exists() {
        "present"
    } else {
        "missing, using defaults"
    };
    println!("  file:       {} ({status})", active.display());
    Ok(())
}

fn run_config_check(path: &Path) -> Result<()> {
    let config = EmberConfig::load(path)
        .with_context(|| format!("config {} is invalid", path.display()))?;
    let ramp = config.ramp();
    println!("{}: ok", path.display());
    println!("  palette:  {} -> {}", ramp.start, ramp.end);
    println!("  speed:    {}", config.speed());
    match config.fps() {
        Some(fps) => println!("  fps cap:  {fps}"),
        None => println!("  fps cap:  uncapped"),
    }
    if let Some((width, height)) = config.size() {
        println!("  size:     {width}x{height}");
    }
    Ok(())
}
