// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use futures::future::FutureExt;
use futures::select;
use tokio::runtime;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

use cpvisor::args::build_args;
use cpvisor::config::ClusterConfig;
use cpvisor::identity::HostIdentity;
use cpvisor::orchestrator::Orchestrator;
use cpvisor::procs::{NodeContext, Scheduler};
use cpvisor::stage::BundleStager;
use cpvisor::Error;

const RUN: &str = "run";
const CHECK: &str = "check";
const CONFIG: &str = "config";
const LOG_FORMAT: &str = "log-format";
const VERBOSE: &str = "verbose";
const DEFAULT_CONFIG: &str = "/etc/cpvisor/cpvisor.toml";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
    fn config_opt(self) -> Self;
}

impl SetupClapApp for Command {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }

    fn config_opt(self) -> Self {
        self.arg(
            Arg::new(CONFIG)
                .short('c')
                .long(CONFIG)
                .value_name("FILE")
                .default_value(DEFAULT_CONFIG)
                .help("node configuration, TOML"),
        )
    }
}

fn main() -> Result<(), Error> {
    let args = Command::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new(LOG_FORMAT)
                .long(LOG_FORMAT)
                .value_parser(["pretty", "json"])
                .default_value("pretty")
                .global(true)
                .help("log output format"),
        )
        .arg(
            Arg::new(VERBOSE)
                .short('v')
                .long(VERBOSE)
                .action(ArgAction::SetTrue)
                .global(true)
                .help("debug logging"),
        )
        .subcommand(
            Command::new(RUN)
                .about("stage and run the control plane components until signaled")
                .setup_clap_app()
                .config_opt(),
        )
        .subcommand(
            Command::new(CHECK)
                .about("validate the configuration and print the flags of every component")
                .setup_clap_app()
                .config_opt(),
        )
        .get_matches();

    init_logging(&args);

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async move {
        match args.subcommand() {
            Some((RUN, args)) => run(args).await,
            Some((CHECK, args)) => check(args),
            Some((arg, _)) => Err(format!("unexpected argument: {}", arg).into()),
            None => Err("command required".into()),
        }
    })
}

fn init_logging(args: &ArgMatches) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if args.get_flag(VERBOSE) { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cpvisor={}", level)));

    let registry = tracing_subscriber::registry().with(filter);
    match args.get_one::<String>(LOG_FORMAT).map(String::as_str) {
        Some("json") => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer()).init(),
    }
}

fn load_config(args: &ArgMatches) -> Result<ClusterConfig, Error> {
    let path = args
        .get_one::<String>(CONFIG)
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);

    ClusterConfig::load_from_file(path)
}

async fn run(args: &ArgMatches) -> Result<(), Error> {
    let config = load_config(args)?;

    let context = NodeContext {
        data_dir: config.data_dir.clone(),
        identity: Arc::new(HostIdentity),
        stager: Arc::new(BundleStager::new(config.bundle_dir.clone())),
        supervisor: config.supervisor_config(),
    };

    // before anything is spawned, a signal during startup must not orphan the children
    let mut shutdown = ShutdownSignals::new()?;

    let mut orchestrator = Orchestrator::new();
    orchestrator.add(Scheduler::component(&config, context));

    orchestrator.init_all().await?;
    orchestrator.run_all().await?;
    info!("{} components running", orchestrator.len());

    shutdown.recv().await;
    info!("shutting down");

    orchestrator.stop_all().await
}

fn check(args: &ArgMatches) -> Result<(), Error> {
    let config = load_config(args)?;

    for spec in [Scheduler::spec(&config)] {
        let flags = build_args(&spec.name, &spec.mandatory_args, &spec.extra_args)?;
        println!("{}: {}", spec.name, flags.join(" "));
    }

    Ok(())
}

struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn new() -> Result<Self, Error> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for SIGINT or SIGTERM, including one that arrived since `new`
    async fn recv(&mut self) {
        select! {
            _ = self.interrupt.recv().fuse() => info!("received SIGINT"),
            _ = self.terminate.recv().fuse() => info!("received SIGTERM"),
        }
    }
}
