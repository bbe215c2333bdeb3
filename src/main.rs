mod cli;

use std::{process::ExitCode, rc::Rc};

use clap::Parser;
use fcf::{
    bus::{Bus, SharedBus},
    conf::Config,
    dispatch::Dispatcher,
    drivers::Driver,
    error::{DriverError, FcfError, StartupError},
    poller::Poller,
    registry::Registry,
    shutdown::StopToken,
    sink::{DiskSink, Sink},
    source::CallbackRef,
};
use log::{info, warn};
use nix::poll::PollTimeout;

use crate::cli::Cli;

const MESSAGE_LOG: &str = "fcf.log";

fn open_bus(config: &Config) -> Result<SharedBus, StartupError> {
    let mut bus = Bus::new(config.bus_bufsize);
    let path = config.log_dir.join(MESSAGE_LOG);
    let disk = DiskSink::new(&path).map_err(|source| StartupError::LogSink { path, source })?;
    bus.add_sink(Sink::Disk(disk));
    if config.screen_log {
        bus.add_sink(Sink::Screen);
    }
    Ok(bus.shared())
}

/// Binds the driver as the callback for `token`, then lets it open its device.
fn start_driver(registry: &mut Registry, token: &str, driver: Driver) -> Result<(), DriverError> {
    let driver = driver.shared();
    let callback: CallbackRef = driver.clone();
    registry.bind_callback(token, callback);
    let started = driver.borrow_mut().start(registry);
    started
}

fn run(cli: &Cli) -> Result<(), FcfError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(gps) = &cli.gps {
        config.set_gps_device_path(gps.clone());
    }
    if let Some(ms) = cli.timeout {
        config.poll_timeout_ms = ms;
    }
    let timeout = PollTimeout::try_from(config.poll_timeout_ms)
        .map_err(|_| StartupError::InvalidTimeout(config.poll_timeout_ms))?;

    let bus = open_bus(&config)?;
    let mut registry = Registry::new(config.capacity);
    let stop = StopToken::new();

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use fcf::signals::{SignalSource, SIGNAL_TOKEN};

        let signal_err = |source| StartupError::Device {
            token: SIGNAL_TOKEN.to_string(),
            source,
        };
        let signals = SignalSource::new(stop.clone(), Rc::clone(&bus)).map_err(signal_err)?;
        start_driver(&mut registry, SIGNAL_TOKEN, Driver::Signals(signals)).map_err(signal_err)?;
    }

    for dev in &config.device {
        let driver = Driver::from_conf(dev, Rc::clone(&bus));
        match start_driver(&mut registry, &dev.token, driver) {
            Ok(()) => {}
            Err(source) if dev.required => {
                return Err(StartupError::Device {
                    token: dev.token.clone(),
                    source,
                }
                .into());
            }
            Err(e) => warn!("{}: not started: {}", dev.token, e),
        }
    }

    info!("{}", registry.describe());

    let mut dispatcher = Dispatcher::new(Poller::new(), timeout, stop);
    dispatcher.run(&mut registry)?;

    bus.borrow_mut().flush()?;
    info!("stopped");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fcf: {}", e);
            ExitCode::FAILURE
        }
    }
}
