//! Device orchestrator daemon — on-premise control plane for edge AI
//! camera devices. Loads configuration, spawns one MQTT session per
//! configured device, and serves the REST/WS API and the artifact
//! ingestion webserver until `SIGINT`.

mod bootstrap;
mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use orc_artifacts::storage_watcher::StorageSizeWatcher;
use orc_artifacts::{ArtifactState, DeviceArtifacts};
use orc_core::config::{ConfigHandle, GlobalConfiguration, OnDisk};
use orc_core::deploy_history::DeployHistory;
use orc_core::notifications::NotificationBus;
use orc_core::registry::DeviceRegistry;
use orc_core::state::AppState;
use orc_core::task_executor;

use crate::cli::Command;

fn init_tracing(verbose: bool, silent: bool) {
    let filter = if silent {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        Command::Broker(args) => {
            init_tracing(cli.verbose || args.verbose, cli.silent);
            if let Err(err) = run_broker(&cli.config_dir).await {
                tracing::error!(%err, "broker exited with an error");
                std::process::exit(1);
            }
        }
        Command::Qr(args) => {
            init_tracing(cli.verbose, cli.silent);
            let payload = orc_protocol::qr::build_qr(&orc_protocol::qr::QrFields {
                mqtt_host: args.host,
                mqtt_port: Some(args.port.unwrap_or(args.device)),
                tls_enabled: args.tls,
                ntp_server: args.ntp_server,
                ip_address: None,
                subnet_mask: None,
                gateway: None,
                dns_server: None,
                wifi_ssid: None,
                wifi_password: None,
            });
            match args.save_png {
                Some(path) => {
                    // Rendering an actual QR image is out of scope (§1
                    // non-goal); this writes the same wire-format string a
                    // reader would hand to an external QR renderer.
                    if let Err(err) = std::fs::write(&path, &payload) {
                        tracing::error!(%err, path = %path.display(), "failed to write qr payload");
                        std::process::exit(1);
                    }
                }
                None => println!("{payload}"),
            }
        }
        Command::Rpc(args) => {
            init_tracing(cli.verbose, cli.silent);
            if let Err(err) = run_rpc(args).await {
                tracing::error!(%err, "rpc call failed");
                std::process::exit(1);
            }
        }
        Command::Gui => {
            // Out of scope (§1 non-goal: desktop GUI). The REST/WS API is
            // the supported integration surface.
            eprintln!("the orc-daemon gui is not implemented; use the REST/WS API instead");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run_broker(config_dir: &std::path::Path) -> anyhow::Result<()> {
    let config_path = config_dir.join("config.toml");
    let config_str = tokio::fs::read_to_string(&config_path)
        .await
        .unwrap_or_default();
    let global_config = GlobalConfiguration::from_toml_str(&config_str)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing::info!(
        config_path = %config_path.display(),
        device_count = global_config.devices.len(),
        "configuration loaded"
    );

    let persistency = Arc::new(OnDisk::new(config_path));
    let config = ConfigHandle::new(global_config.clone(), persistency);

    let notifications = NotificationBus::new();
    let history = Arc::new(DeployHistory::new());
    let (executor, _executor_join) = task_executor::spawn(history.clone(), notifications.clone());
    let registry = DeviceRegistry::new();

    for conn in &global_config.devices {
        bootstrap::bootstrap_device(conn, notifications.clone(), &registry, &executor).await;
        tracing::info!(device_id = %conn.id, name = %conn.name, "device bootstrapped");
    }

    let app_state = AppState {
        registry,
        config,
        executor: executor.clone(),
        history,
        notifications: notifications.clone(),
    };

    let mut artifact_devices = HashMap::new();
    for conn in &global_config.devices {
        tokio::fs::create_dir_all(&conn.data_root).await.ok();
        let watcher = Arc::new(StorageSizeWatcher::new(
            conn.id,
            conn.data_root.clone(),
            conn.quota_bytes,
            conn.auto_deletion,
            notifications_sink(notifications.clone()),
        ));
        tokio::spawn(watcher.clone().run());
        artifact_devices.insert(
            conn.id,
            DeviceArtifacts {
                data_root: conn.data_root.clone(),
                grouping: Arc::new(orc_artifacts::FileGrouping::new(
                    global_config.artifacts.retention(),
                )),
                watcher,
            },
        );
    }
    let artifact_state = ArtifactState::new(
        artifact_devices,
        global_config.artifacts.preview_enabled,
        notifications_sink(notifications),
    );

    let api_addr = format!("{}:{}", global_config.webserver.host, global_config.webserver.port);
    let artifacts_addr = format!("{}:{}", global_config.artifacts.host, global_config.artifacts.port);

    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    let artifacts_listener = tokio::net::TcpListener::bind(&artifacts_addr).await?;
    tracing::info!(api_addr, artifacts_addr, "listening");

    let api_router = orc_core::routes::build_router(app_state);
    let artifacts_router = orc_artifacts::build_router(artifact_state);

    tokio::select! {
        result = axum::serve(api_listener, api_router) => {
            if let Err(err) = result {
                tracing::error!(%err, "api server exited");
            }
        }
        result = axum::serve(artifacts_listener, artifacts_router) => {
            if let Err(err) = result {
                tracing::error!(%err, "artifact server exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    executor.stop().await;

    Ok(())
}

fn notifications_sink(
    bus: NotificationBus,
) -> Arc<dyn Fn(orc_protocol::Notification) + Send + Sync> {
    Arc::new(move |n| bus.publish(n))
}

/// `rpc <instance_id> <method> <params-json>` (§6): issues one correlated
/// V2-style direct-command RPC against a device's local broker session and
/// prints the raw JSON reply. Connects directly rather than through a
/// running daemon's `DeviceRegistry` — this is an operator utility for
/// poking a device session out of band, not a client of the REST API.
async fn run_rpc(args: cli::RpcArgs) -> anyhow::Result<()> {
    use orc_mqtt::{Driver, MqttChannel, MqttConfig};
    use orc_protocol::rpc::{DirectCommandRequest, RpcParamsV2};
    use orc_protocol::topics;

    let params: serde_json::Value = serde_json::from_str(&args.params)?;
    let config = MqttConfig::default();
    let (channel, mut eventloop) = MqttChannel::connect(&config, args.instance_id);
    let (driver, _rx) = Driver::new(std::sync::Arc::new(channel), &config);

    let driver_clone = driver.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    driver_clone.on_connected();
                }
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
                    driver_clone.dispatch(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%err, "rpc event loop error");
                    return;
                }
            }
        }
    });

    let request = RpcParamsV2 {
        direct_command_request: DirectCommandRequest {
            reqid: uuid::Uuid::new_v4().to_string(),
            method: args.method,
            instance: args.instance_id.to_string(),
            params: params.to_string(),
        },
    };
    let payload = serde_json::to_vec(&request)?;

    let reply = driver
        .request_default_timeout(&topics::rpc_request_prefix(), &topics::rpc_response_prefix(), payload)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}
