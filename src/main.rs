use std::{path::PathBuf, process, sync::Arc, time::Duration};

use bmebridge::{
    config::Config,
    core::{
        executor::{Executor, Schedule},
        publisher::ReadingPublisher,
        sensor::{SensorReader, SensorSource},
    },
    logger::LoggerManager,
    print_error,
};
use bmebridge_mqtt::{MqttInstance, MqttManager};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[cfg(feature = "bme280-i2c")]
async fn open_sensor(
    config: &bmebridge::config::sensor::SensorConfig,
) -> Result<Box<dyn SensorSource>, Box<dyn std::error::Error>> {
    let source = bmebridge::core::sensor::Bme280Source::open(config).await?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "bme280-i2c"))]
async fn open_sensor(
    _config: &bmebridge::config::sensor::SensorConfig,
) -> Result<Box<dyn SensorSource>, Box<dyn std::error::Error>> {
    Err("built without the `bme280-i2c` feature, no sensor driver available".into())
}

/// Cancels `token` on SIGTERM or SIGINT.
fn spawn_signal_listener(token: CancellationToken) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
            _ = interrupt.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
        }
        token.cancel();
    });
    Ok(())
}

/// Logs a fatal error and closes the broker connection before exiting.
async fn shutdown_on_failure(instance: &MqttInstance, message: String) {
    error!("{}", message);
    instance.shutdown().await;
}

#[tokio::main]
async fn main() {
    let cfg = Config::new(std::env::args_os().nth(1).map(PathBuf::from)).unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting bmebridge version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.transport);

    let cancel = CancellationToken::new();
    if let Err(e) = spawn_signal_listener(cancel.clone()) {
        error!("Failed to install signal handlers: {}", e);
        process::exit(1);
    }

    let manager = MqttManager::from_config(cfg.transport.clone()).unwrap_or_else(|e| {
        error!("Invalid MQTT configuration: {}", e);
        process::exit(1);
    });
    let instance = match manager.build_and_start().await {
        Ok(instance) => Arc::new(instance),
        Err(e) => {
            error!("Failed to start MQTT client: {}", e);
            process::exit(1);
        }
    };

    let timeout = Duration::from_secs(cfg.transport.connection_timeout);
    tokio::select! {
        result = instance.wait_connected(timeout) => {
            if let Err(e) = result {
                shutdown_on_failure(&instance, format!("MQTT connection failed: {}", e)).await;
                process::exit(1);
            }
        }
        _ = cancel.cancelled() => {
            info!("Shutdown requested before the broker connection was established");
            instance.shutdown().await;
            return;
        }
    }
    info!(
        "Connected to MQTT broker {}:{}",
        cfg.transport.host, cfg.transport.port
    );

    let source = match open_sensor(&cfg.sensor).await {
        Ok(source) => source,
        Err(e) => {
            shutdown_on_failure(&instance, format!("Failed to open sensor: {}", e)).await;
            process::exit(1);
        }
    };

    let reader = SensorReader::new(source, cfg.sensor.clone());
    let publisher = ReadingPublisher::from_config(instance.clone(), &cfg);
    let mut executor = Executor::new(
        reader,
        publisher,
        Schedule::from_config(&cfg.publish),
        cancel.clone(),
    );

    info!("Starting measurement loop...");

    tokio::select! {
        cycles = executor.run() => {
            debug!("Measurement loop finished after {} cycles", cycles);
        }
        _ = instance.terminated() => {
            let reason = instance
                .failure()
                .unwrap_or_else(|| "connection kernel stopped".to_string());
            cancel.cancel();
            shutdown_on_failure(
                &instance,
                format!("MQTT transport failed ({}): {}", instance.state(), reason),
            )
            .await;
            process::exit(1);
        }
    }

    instance.shutdown().await;
    info!("Shutdown complete");
}
