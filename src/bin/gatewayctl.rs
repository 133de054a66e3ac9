//! gatewayctl command line
//!
//! Control UPnP and NAT-PMP gateway port forwarding.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use gatewayctl::config::Config;
use gatewayctl::connectivity::{
    AddRequest, Intent, MappingController, MappingProtocol, OperationResult, RemoveRequest,
    SystemTransports, TransportProtocol, ValidationError,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};

/// Exit status when the user interrupts a command
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "gatewayctl",
    version,
    about = "Control UPnP and NAT-PMP gateway port forwarding."
)]
struct Cli {
    /// Method: UPnP or NAT-PMP (lists UPnP mappings when omitted)
    #[arg(long, value_enum)]
    method: Option<MappingProtocol>,

    /// Action: add, remove, or list mappings
    #[arg(long, value_enum)]
    action: Option<Intent>,

    /// Protocol to forward
    #[arg(long, value_enum, ignore_case = true, default_value_t = TransportProtocol::TCP)]
    protocol: TransportProtocol,

    /// External port for mapping
    #[arg(long)]
    external_port: Option<u32>,

    /// Internal port for mapping
    #[arg(long)]
    internal_port: Option<u32>,

    /// Internal IP address (UPnP only)
    #[arg(long)]
    internal_ip: Option<String>,

    /// Description for the mapping
    #[arg(long)]
    description: Option<String>,

    /// Mapping lifetime in seconds: NAT-PMP lease [default: 3600], or UPnP
    /// lease duration [default: 0, permanent]
    #[arg(long)]
    lifetime: Option<u32>,

    /// NAT-PMP gateway address (default route when omitted)
    #[arg(long)]
    gateway: Option<IpAddr>,

    /// UPnP discovery window in milliseconds
    #[arg(long)]
    discovery_ms: Option<u64>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log more (repeat for more detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    gatewayctl::init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config = load_config(&cli)?;
    debug!("Effective configuration: {:?}", config);

    let controller = MappingController::new(SystemTransports::new(config.clone()), config);

    // Dropping the command future closes any socket it holds.
    tokio::select! {
        (intent, outcome) = dispatch(&controller, &cli) => Ok(report(intent, outcome, cli.json)),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; abandoning in-flight request");
            eprintln!("Interrupted");
            Ok(EXIT_INTERRUPTED)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(gateway) = cli.gateway {
        config.natpmp_gateway = Some(gateway);
    }
    if let Some(ms) = cli.discovery_ms {
        config.discovery_window_ms = ms;
    }
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

async fn dispatch(
    controller: &MappingController<SystemTransports>,
    cli: &Cli,
) -> (Intent, Result<OperationResult, ValidationError>) {
    let Some(method) = cli.method else {
        let notice = "No method specified. Defaulting to UPnP discovery and listing.";
        if cli.json {
            eprintln!("{}", notice);
        } else {
            println!("{}", notice);
        }
        return (Intent::List, Ok(controller.list(MappingProtocol::UPnP).await));
    };

    let Some(intent) = cli.action else {
        return (
            Intent::List,
            Err(ValidationError::MissingParameter {
                method,
                intent: "command",
                parameter: "--action",
            }),
        );
    };

    let outcome = match intent {
        Intent::List => Ok(controller.list(method).await),
        Intent::Add => {
            controller
                .add(AddRequest {
                    method,
                    protocol: cli.protocol,
                    external_port: cli.external_port,
                    internal_port: cli.internal_port,
                    internal_ip: cli.internal_ip.clone(),
                    description: cli.description.clone(),
                    lease_duration: cli.lifetime,
                })
                .await
        }
        Intent::Remove => {
            controller
                .remove(RemoveRequest {
                    method,
                    protocol: cli.protocol,
                    external_port: cli.external_port,
                    internal_port: cli.internal_port,
                })
                .await
        }
    };

    (intent, outcome)
}

/// Print the outcome and return the exit status
fn report(intent: Intent, outcome: Result<OperationResult, ValidationError>, json: bool) -> u8 {
    let (code, status, message, detail) = match &outcome {
        Ok(result) => (
            result.exit_code(intent),
            result.status(),
            result.to_string(),
            result.detail(),
        ),
        Err(e) => (1, "validation_error", e.to_string(), None),
    };

    if json {
        let report = serde_json::json!({
            "status": status,
            "exit_code": code,
            "message": message,
            "detail": detail,
        });
        println!("{}", report);
    } else if code == 0 {
        println!("{}", message);
    } else {
        eprintln!("{}", message);
    }

    code
}
