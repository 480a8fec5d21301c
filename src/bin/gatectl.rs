// src/bin/gatectl.rs
//
// Command-line access to a gate controller: list boards, watch the state
// stream, and send single commands. Output is JSON, one document per line.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::broadcast;

use gatelink::{Command, GateError, GateLink, GateSettings, Notice};

const UNTIL_INTERRUPTED_SECS: u64 = 60 * 60 * 24 * 365;

#[derive(Parser)]
#[command(name = "gatectl", version, about = "Talk to a gate controller over USB serial")]
struct Cli {
    /// Settings file (defaults to <config dir>/gatelink/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial endpoint to use instead of the first compatible one
    #[arg(long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// List compatible devices
    List,
    /// Print every snapshot and notice as it arrives
    Monitor {
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Send one action command
    Send {
        #[arg(value_enum)]
        action: SendAction,
        /// How long to wait for the board's echo before printing the snapshot
        #[arg(long, default_value_t = 500)]
        wait_ms: u64,
    },
    /// Set the auto-close delay in seconds
    SetDelay {
        secs: i32,
        #[arg(long, default_value_t = 500)]
        wait_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SendAction {
    Open,
    Close,
    Stop,
    StartTest,
    StopTest,
    FactoryReset,
    ReadConfig,
}

impl From<SendAction> for Command {
    fn from(action: SendAction) -> Self {
        match action {
            SendAction::Open => Command::Open,
            SendAction::Close => Command::Close,
            SendAction::Stop => Command::Stop,
            SendAction::StartTest => Command::StartTest,
            SendAction::StopTest => Command::StopTest,
            SendAction::FactoryReset => Command::FactoryReset,
            SendAction::ReadConfig => Command::ReadConfig,
        }
    }
}

fn load_settings(cli: &Cli) -> Result<GateSettings, String> {
    let mut settings = match cli.config.clone().or_else(GateSettings::default_path) {
        Some(path) => GateSettings::load(&path)?,
        None => GateSettings::default(),
    };
    if let Some(port) = &cli.port {
        settings.preferred_port = Some(port.clone());
    }
    if let Some(dir) = &settings.log_dir {
        let label = settings.preferred_port.as_deref().unwrap_or("gatectl");
        gatelink::init_file_logging(dir, label)?;
    }
    Ok(settings)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let line = serde_json::to_string(value).map_err(|e| format!("Failed to serialize: {}", e))?;
    println!("{}", line);
    Ok(())
}

/// Connect, waiting once for a permission prompt if the platform raised one.
async fn connect(link: &GateLink, notices: &mut broadcast::Receiver<Notice>) -> Result<(), String> {
    match link.connect().await {
        Ok(_) => Ok(()),
        Err(GateError::PermissionRequired { device }) => {
            eprintln!("Waiting for permission on {}", device);
            let granted = tokio::time::timeout(Duration::from_secs(30), async {
                loop {
                    match notices.recv().await {
                        Ok(Notice::PermissionResult { granted, .. }) => return granted,
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return false,
                    }
                }
            })
            .await
            .unwrap_or(false);
            if !granted {
                return Err(GateError::PermissionDenied { device }.into());
            }
            link.connect().await.map(|_| ()).map_err(String::from)
        }
        Err(e) => Err(e.into()),
    }
}

async fn send(link: &GateLink, command: Command, wait_ms: u64) -> Result<(), String> {
    let mut notices = link.notices();
    connect(link, &mut notices).await?;
    let result = link.submit(&command).await;
    if result.is_ok() {
        let deadline = tokio::time::sleep(Duration::from_millis(wait_ms));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                notice = notices.recv() => match notice {
                    Ok(notice) => print_json(&notice)?,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        print_json(&*link.snapshot())?;
    }
    link.disconnect().await;
    result.map_err(String::from)
}

async fn monitor(link: &GateLink, seconds: Option<u64>) -> Result<(), String> {
    let mut notices = link.notices();
    let mut state = link.state();
    connect(link, &mut notices).await?;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds.unwrap_or(UNTIL_INTERRUPTED_SECS)));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            snapshot = state.next() => match snapshot {
                Some(snapshot) => print_json(&*snapshot)?,
                None => break,
            },
            notice = notices.recv() => match notice {
                Ok(notice @ Notice::ConnectionLost { .. }) => {
                    print_json(&notice)?;
                    break;
                }
                Ok(notice) => print_json(&notice)?,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    link.disconnect().await;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let settings = load_settings(&cli)?;
    let link = GateLink::serial(settings);

    match cli.command {
        Action::List => {
            for device in link.list_available_devices()? {
                print_json(&device)?;
            }
            Ok(())
        }
        Action::Monitor { seconds } => monitor(&link, seconds).await,
        Action::Send { action, wait_ms } => send(&link, action.into(), wait_ms).await,
        Action::SetDelay { secs, wait_ms } => send(&link, Command::SetDelayTime(secs), wait_ms).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("gatectl: {}", e);
            ExitCode::FAILURE
        }
    }
}
