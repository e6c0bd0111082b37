mod listen;

use std::path::PathBuf;

use clap::ArgAction;

use cand::config::{Config, Listen};
use cand::loopback::Loopback;
use cand::{util, CanDevice};

fn args() -> clap::Command {
    clap::command!().arg(
        clap::Arg::new("config")
            .short('c')
            .long("config")
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(PathBuf))
            .help("Configuration file"),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let matches = args().get_matches();
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let (lower, bus) = Loopback::new(&config.loopback, config.device.tx_mode);
    let device = CanDevice::register(lower, config.device)?;
    let _pump = util::kill_task_on_drop(tokio::spawn(bus.run(device.upper())));

    let endpoints = if config.listen.is_empty() {
        vec![Listen::Tcp {
            bind: "[::]:2342".parse()?,
        }]
    } else {
        config.listen
    };

    let listeners: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| match endpoint {
            Listen::Tcp { bind } => util::kill_task_on_drop(tokio::spawn(util::catch_error(
                "TCP listener",
                listen::tcp::listen(bind, device.clone()),
            ))),
        })
        .collect();

    futures::future::join_all(listeners).await;

    Ok(())
}
