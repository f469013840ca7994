use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{self, ServiceConfig, StackConfig};
use crate::ledger::PidLedger;
use crate::locator::ExecutableLocator;
use crate::probe::SocketToolProbe;
use crate::process;
use crate::status::status_of_all;
use crate::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "stackman")]
#[command(about = "Start, stop, and inspect the local dev stack", version)]
pub struct Cli {
    /// Path to stack.yaml (default: ./stack.yaml, then the user
    /// config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which services are running and on which pid.
    Status(StatusArgs),
    /// Start one service and wait for its port to come up.
    Start(ServiceArgs),
    /// Stop one service (idempotent).
    Stop(ServiceArgs),
    /// Stop then start one service.
    Restart(ServiceArgs),
    /// Start every configured service, in order.
    #[command(name = "start-all")]
    StartAll,
    /// Stop every configured service concurrently.
    #[command(name = "stop-all")]
    StopAll,
    /// Tail a service's log file.
    Logs(ServiceArgs),
}

#[derive(Parser)]
struct StatusArgs {
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Parser)]
struct ServiceArgs {
    /// Service name from stack.yaml.
    service: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let config_path = config::resolve_config_path(self.config)?;
        let stack = config::load_stack_config(&config_path)?;

        match self.command {
            Command::Status(args) => status(&stack, args.format),
            Command::Start(args) => {
                let service = find_service(&stack, &args.service)?;
                supervisor()?.start(service)?;
                println!("{} started on port {}", service.display_name, service.port);
                Ok(())
            }
            Command::Stop(args) => {
                let service = find_service(&stack, &args.service)?;
                supervisor()?.stop(service)?;
                println!("{} stopped", service.display_name);
                Ok(())
            }
            Command::Restart(args) => {
                let service = find_service(&stack, &args.service)?;
                supervisor()?.restart(service)?;
                println!(
                    "{} restarted on port {}",
                    service.display_name, service.port
                );
                Ok(())
            }
            Command::StartAll => {
                supervisor()?.start_all(&stack.services)?;
                println!("started {} services", stack.services.len());
                Ok(())
            }
            Command::StopAll => {
                supervisor()?.stop_all(&stack.services)?;
                println!("stopped {} services", stack.services.len());
                Ok(())
            }
            Command::Logs(args) => {
                let service = find_service(&stack, &args.service)?;
                process::tail_log(&service.root.join(service.log_file()))
            }
        }
    }
}

fn supervisor() -> anyhow::Result<Supervisor<SocketToolProbe>> {
    Ok(Supervisor::new(
        SocketToolProbe::new(),
        ExecutableLocator::new(),
        PidLedger::open_default()?,
    ))
}

fn find_service<'a>(stack: &'a StackConfig, name: &str) -> anyhow::Result<&'a ServiceConfig> {
    stack.find(name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown service '{name}'; configured services: {}",
            stack.service_names().join(", ")
        )
    })
}

fn status(stack: &StackConfig, format: Format) -> anyhow::Result<()> {
    let probe = SocketToolProbe::new();
    let statuses = status_of_all(&probe, &stack.services);
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
        Format::Text => {
            for status in &statuses {
                if status.running {
                    let pid = status
                        .pid
                        .map(|pid| pid.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    println!(
                        "{:<14} running  port {:<5} pid {pid}",
                        status.display_name, status.port
                    );
                } else {
                    println!(
                        "{:<14} stopped  port {:<5}",
                        status.display_name, status.port
                    );
                }
            }
        }
    }
    Ok(())
}
