use std::{
    process,
    sync::{Arc, OnceLock},
};

use homesense::{
    config::Config,
    core::{
        executor::{Executor, Publisher},
        sensors::{identity::resolve_hostname, Discovery},
    },
    hardware::{i2c::LinuxI2cBuses, system_delay, w1::W1Bus},
    logger::LoggerManager,
    print_error,
};
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

/// Logs an error with its whole source chain.
fn report(context: &str, err: &dyn std::error::Error) {
    let mut message = format!("{}: {}", context, err);
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    error!("{}", message);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cfg = config();
    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting homesense version {}...", env!("CARGO_PKG_VERSION"));
    debug!("{:#?}", cfg.mqtt);

    let hostname = resolve_hostname(cfg.general.hostname.as_deref()).await;
    info!("Default sensor id: {}", hostname);

    let w1 = W1Bus::detect_default();
    match &w1 {
        Some(bus) => debug!("1-Wire bus found at {}", bus.root().display()),
        None => debug!("No 1-Wire bus on this host"),
    }
    let buses = LinuxI2cBuses::default();
    let discovery = Discovery {
        i2c: &buses,
        w1: w1.as_ref(),
        hostname: &hostname,
        w1_overrides: &cfg.w1sensors,
        bme680_addresses: &cfg.bme680sensors,
    };

    let sensors = discovery.run(system_delay).await.unwrap_or_else(|e| {
        report("Sensor discovery failed", &e);
        process::exit(1);
    });

    let publisher = homesense_mqtt::Publisher::new(cfg.mqtt.clone());
    info!("Publishing to {}", publisher.endpoint());

    let executor = Executor::new(
        sensors,
        Arc::new(publisher) as Arc<dyn Publisher>,
        cfg.general.interval(),
        cfg.mqtt.topic_format.clone(),
    )
    .unwrap_or_else(|e| {
        report("Cannot start", &e);
        process::exit(1);
    });
    info!("Sensors: {}", executor.sensor_ids().join(", "));

    tokio::select! {
        result = executor.run() => {
            if let Err(e) = result {
                report("Acquisition loop stopped", &e);
                process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
}
