use anyhow::Result;
use env_logger::Env;
use log::info;

use rs485_bus::cli::{build_cli, handle_subcommands};
use rs485_bus::Config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut cli = build_cli();
    let matches = cli.clone().get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    config.apply_matches(&matches)?;

    if matches.subcommand_name() != Some("init-config") {
        config.validate()?;
    }

    info!("🖥️  rs485-bus v{}", rs485_bus::VERSION);
    if !handle_subcommands(&matches, config).await? {
        cli.print_help()?;
        println!();
    }

    Ok(())
}
