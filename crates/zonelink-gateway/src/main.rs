//! `zonelink` - bridge a zone controller's serial line to the cloud hub.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use zonelink_gateway::{
    init_logging, DeviceTransport, GatewayConfig, GatewayError, GatewayResult, Supervisor,
    SupervisorConfig,
};
use zonelink_metrics::{describe_metrics, metric_defs};

#[derive(Parser, Debug)]
#[command(name = "zonelink", version, about = "Zone controller serial-to-cloud gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "zonelink.yaml")]
    config: PathBuf,

    /// Override the serial device path.
    #[arg(long)]
    serial_port: Option<String>,

    /// Override the cloud hub URL.
    #[arg(long)]
    cloud_url: Option<String>,

    /// Override the log filter (RUST_LOG still takes precedence).
    #[arg(long)]
    log_filter: Option<String>,

    /// Print the metrics the gateway records and exit.
    #[arg(long)]
    list_metrics: bool,
}

fn list_metrics() {
    for metric in metric_defs::ALL {
        println!(
            "{:<36} {:<10} {:<8} [{}] {}",
            metric.name,
            metric.kind.as_str(),
            metric.unit.as_str(),
            metric.label_keys().join(", "),
            metric.description
        );
    }
}

fn load_config(cli: &Cli) -> GatewayResult<GatewayConfig> {
    let mut config = GatewayConfig::load(&cli.config)?;
    if let Some(port) = &cli.serial_port {
        config.serial.port = port.clone();
    }
    if let Some(url) = &cli.cloud_url {
        config.cloud.url = url.clone();
    }
    if let Some(filter) = &cli.log_filter {
        config.logging.filter = filter.clone();
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "prometheus")]
fn install_exporter(config: &GatewayConfig) -> GatewayResult<()> {
    if let Some(addr) = config.metrics.prometheus_listen {
        zonelink_metrics::install_prometheus(addr)
            .map_err(|e| GatewayError::Metrics(e.to_string()))?;
        info!("prometheus exporter listening on {}", addr);
    }
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
fn install_exporter(config: &GatewayConfig) -> GatewayResult<()> {
    if config.metrics.prometheus_listen.is_some() {
        return Err(GatewayError::Metrics(
            "metrics.prometheus_listen needs the `prometheus` feature".to_string(),
        ));
    }
    Ok(())
}

fn run(cli: Cli) -> GatewayResult<()> {
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;
    install_exporter(&config)?;
    describe_metrics();

    info!(
        "serial {} -> {} as gateway {}",
        config.serial.port, config.cloud.url, config.serial_number
    );

    let supervisor = Supervisor::new(
        DeviceTransport::from_config(&config),
        SupervisorConfig::from_gateway(&config),
    );
    supervisor.shutdown_handle().install_signal_handler()?;

    supervisor.run();
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.list_metrics {
        list_metrics();
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be up yet.
            error!("{}", e);
            eprintln!("zonelink: {}", e);
            if let GatewayError::ConfigParse { source, .. } = &e {
                eprintln!("  caused by: {}", source);
            }
            ExitCode::FAILURE
        }
    }
}
