use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use log::info;
use std::sync::Arc;

use crate::config::Config;
use crate::modbus::client::ModbusClientTrait;
use crate::modbus::protocol::{MAX_READ_QUANTITY, MAX_SLAVE_ID, MIN_SLAVE_ID};
use crate::modbus::registers::registers_to_floats;
use crate::services::{MasterService, SlaveService};
use crate::slave::LoopbackTransport;

/// Build the command line interface.
pub fn build_cli() -> Command {
    Command::new("rs485-bus")
        .version(crate::VERSION)
        .about("Modbus RTU master and simulated slaves over RS-485")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("DEVICE")
                .help("Serial device, e.g. /dev/ttyUSB0")
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .help("Baud rate")
                .global(true),
        )
        .subcommand(Command::new("master").about("Scan the bus, then poll every responding device until Ctrl+C"))
        .subcommand(
            Command::new("scan")
                .about("Probe a range of slave IDs once and list the responders")
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("ID")
                        .value_parser(value_parser!(u8).range(MIN_SLAVE_ID as i64..=MAX_SLAVE_ID as i64)),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("ID")
                        .value_parser(value_parser!(u8).range(MIN_SLAVE_ID as i64..=MAX_SLAVE_ID as i64)),
                ),
        )
        .subcommand(
            Command::new("read")
                .about("Read holding registers from one device")
                .arg(slave_arg())
                .arg(
                    Arg::new("start")
                        .long("start")
                        .value_name("ADDRESS")
                        .value_parser(value_parser!(u16))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_name("N")
                        .value_parser(value_parser!(u16).range(1..=MAX_READ_QUANTITY as i64))
                        .default_value("2"),
                ),
        )
        .subcommand(
            Command::new("write")
                .about("Write a single holding register")
                .arg(slave_arg())
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDRESS")
                        .value_parser(value_parser!(u16))
                        .required(true),
                )
                .arg(
                    Arg::new("value")
                        .long("value")
                        .value_name("VALUE")
                        .value_parser(value_parser!(u16))
                        .required(true),
                ),
        )
        .subcommand(Command::new("slave").about("Serve simulated devices on the slave port until Ctrl+C"))
        .subcommand(Command::new("simulate").about("Run master and simulated slaves in one process, no hardware"))
        .subcommand(
            Command::new("init-config")
                .about("Write a default configuration file")
                .arg(Arg::new("file").value_name("FILE").required(true)),
        )
}

fn slave_arg() -> Arg {
    Arg::new("slave")
        .short('s')
        .long("slave")
        .value_name("ID")
        .value_parser(value_parser!(u8).range(MIN_SLAVE_ID as i64..=MAX_SLAVE_ID as i64))
        .required(true)
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
    info!("🛑 Ctrl+C received, shutting down");
}

/// Dispatch the selected subcommand. Returns `false` when none was given.
pub async fn handle_subcommands(matches: &ArgMatches, mut config: Config) -> anyhow::Result<bool> {
    if let Some(init_matches) = matches.subcommand_matches("init-config") {
        let file = init_matches
            .get_one::<String>("file")
            .context("init-config requires a file")?;
        Config::default().save_to_file(file)?;
        println!("✅ Default configuration written to {}", file);
        return Ok(true);
    }

    if matches.subcommand_matches("master").is_some() {
        let service = MasterService::new(config).await?;
        service.run_until(ctrl_c()).await?;
        return Ok(true);
    }

    if let Some(scan_matches) = matches.subcommand_matches("scan") {
        let from = scan_matches.get_one::<u8>("from").copied().unwrap_or(config.master.scan_start);
        let to = scan_matches.get_one::<u8>("to").copied().unwrap_or(config.master.scan_end);
        let service = MasterService::new(config).await?;
        let found = service.scanner().scan(from..=to).await;
        if found.is_empty() {
            println!("❌ No devices answered in {}..={}", from, to);
        } else {
            println!("📡 Devices found: {:?}", found);
        }
        return Ok(true);
    }

    if let Some(read_matches) = matches.subcommand_matches("read") {
        let slave_id = *read_matches.get_one::<u8>("slave").context("missing --slave")?;
        let start = *read_matches.get_one::<u16>("start").context("missing --start")?;
        let count = *read_matches.get_one::<u16>("count").context("missing --count")?;
        let timeout = config.master.response_timeout();

        let service = MasterService::new(config).await?;
        let registers = service
            .client()
            .read_holding_registers(slave_id, start, count, timeout)
            .await?;
        println!(
            "✅ Device {}: [{}]",
            slave_id,
            registers.iter().map(|r| format!("0x{:04X}", r)).collect::<Vec<_>>().join(", ")
        );
        if let Ok(values) = registers_to_floats(&registers) {
            println!("📊 As float32: {:?}", values);
        }
        return Ok(true);
    }

    if let Some(write_matches) = matches.subcommand_matches("write") {
        let slave_id = *write_matches.get_one::<u8>("slave").context("missing --slave")?;
        let address = *write_matches.get_one::<u16>("address").context("missing --address")?;
        let value = *write_matches.get_one::<u16>("value").context("missing --value")?;
        let timeout = config.master.response_timeout();

        let service = MasterService::new(config).await?;
        service
            .client()
            .write_single_register(slave_id, address, value, timeout)
            .await?;
        println!("✅ Register {} on device {} set to {}", address, slave_id, value);
        return Ok(true);
    }

    if matches.subcommand_matches("slave").is_some() {
        if let Some(port) = matches.get_one::<String>("port") {
            config.slave.port = port.clone();
        }
        let service = SlaveService::new(&config)?;
        service.run().await?;
        return Ok(true);
    }

    if matches.subcommand_matches("simulate").is_some() {
        info!("🧪 Running master against in-process simulated devices");
        let slaves = SlaveService::new(&config)?;
        let refresher = slaves.spawn_refresh();
        let bus = Arc::new(LoopbackTransport::new(slaves.handler().clone()));

        let master = MasterService::with_transport(config, bus).await?;
        let result = master.run_until(ctrl_c()).await;
        refresher.abort();
        result?;
        return Ok(true);
    }

    Ok(false)
}
