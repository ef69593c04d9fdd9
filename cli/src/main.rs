//! Command-line entry point for the deployment agent: `serve` runs the
//! listener in the foreground, `enable`/`disable` flip the persisted
//! setting, `status` prints the current state as JSON, and `hubs`
//! inspects/revokes paired Hubs.

use anyhow::Context;
use capydeploy_core::AgentSupervisor;
use capydeploy_core::CliOverrides;
use capydeploy_core::LISTEN_PORT;
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "capydeploy-agent", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent in the foreground: advertise over DNS-SD and accept
    /// Hub connections until interrupted.
    Serve {
        /// Override the install path for this invocation only; not persisted.
        #[arg(long, value_name = "DIR")]
        install_path: Option<String>,

        /// Override the advertised agent name for this invocation only; not persisted.
        #[arg(long, value_name = "NAME")]
        agent_name: Option<String>,

        /// Override the listen port for this invocation only; not persisted.
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Persist `enabled = true` so the next `serve` (or a supervising
    /// service) starts listening.
    Enable,

    /// Persist `enabled = false`.
    Disable,

    /// Print the current status as JSON.
    Status {
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Inspect or revoke paired Hubs.
    Hubs {
        #[command(subcommand)]
        command: HubsCommand,
    },

    /// Persist a new advertised agent name, effective on the next `serve`.
    SetAgentName { name: String },

    /// Persist a new install path, effective on the next `serve`.
    SetInstallPath { path: String },

    /// Record the Steam-assigned appId for a game whose shortcut is still
    /// pending assignment.
    RegisterShortcut {
        #[arg(long, value_name = "NAME")]
        game_name: String,
        #[arg(long, value_name = "ID")]
        app_id: u64,
    },

    /// Remove an installed game's directory and its tracked shortcut.
    UninstallGame { name: String },

    /// Drain a named event slot and print its current value as JSON.
    GetEvent { name: String },
}

#[derive(Subcommand, Debug)]
enum HubsCommand {
    /// List every Hub that has completed pairing.
    List,

    /// Revoke a Hub's stored token by id; it must pair again to reconnect.
    Revoke {
        /// The `hub_id` to revoke, as reported by `hubs list`.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { install_path, agent_name, port } => {
            serve(install_path, agent_name, port).await
        }
        Command::Enable => set_enabled(true),
        Command::Disable => set_enabled(false),
        Command::Status { port } => print_status(port),
        Command::Hubs { command } => run_hubs(command),
        Command::SetAgentName { name } => set_agent_name(&name),
        Command::SetInstallPath { path } => set_install_path(&path),
        Command::RegisterShortcut { game_name, app_id } => register_shortcut(&game_name, app_id),
        Command::UninstallGame { name } => uninstall_game(&name),
        Command::GetEvent { name } => get_event(&name),
    }
}

async fn serve(
    install_path: Option<String>,
    agent_name: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let overrides = CliOverrides { install_path, agent_name };
    let mut supervisor =
        AgentSupervisor::load(overrides).context("failed to load agent settings")?;
    let port = port.unwrap_or(LISTEN_PORT);

    let listener = supervisor
        .enable(port)
        .await
        .context("failed to start the listener")?;

    supervisor.log_info(&format!("agent serving on port {port}"));

    tokio::select! {
        result = listener => {
            if let Err(error) = result {
                supervisor.log_error(&format!("listener task ended unexpectedly: {error}"));
            }
        }
        _ = tokio::signal::ctrl_c() => {
            supervisor.log_info("shutting down");
        }
    }

    supervisor.disable();
    Ok(())
}

fn set_enabled(enabled: bool) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    supervisor
        .shared()
        .settings
        .set("enabled", Value::Bool(enabled))
        .context("failed to persist enabled flag")?;
    println!("enabled = {enabled}");
    Ok(())
}

fn print_status(port: Option<u16>) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    let status = supervisor.get_status(port.unwrap_or(LISTEN_PORT));
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn set_agent_name(name: &str) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    supervisor.set_agent_name(name).context("failed to persist agent_name")?;
    println!("agent_name = {name}");
    Ok(())
}

fn set_install_path(path: &str) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    supervisor.set_install_path(path).context("failed to persist install_path")?;
    println!("install_path = {path}");
    Ok(())
}

fn register_shortcut(game_name: &str, app_id: u64) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    let registered = supervisor
        .register_shortcut(game_name, app_id)
        .context("failed to persist shortcut appId")?;
    if registered {
        println!("registered appId {app_id} for {game_name}");
    } else {
        println!("no pending shortcut for {game_name}");
    }
    Ok(())
}

fn uninstall_game(name: &str) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    let removed = supervisor.uninstall_game(name).context("failed to uninstall game")?;
    if removed {
        println!("uninstalled {name}");
    } else {
        println!("no such game: {name}");
    }
    Ok(())
}

fn get_event(name: &str) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    println!("{}", serde_json::to_string_pretty(&supervisor.get_event(name))?);
    Ok(())
}

fn run_hubs(command: HubsCommand) -> anyhow::Result<()> {
    let supervisor =
        AgentSupervisor::load(CliOverrides::default()).context("failed to load agent settings")?;
    let shared = supervisor.shared();

    match command {
        HubsCommand::List => {
            let hubs = shared.pairing.authorized_hubs();
            println!("{}", serde_json::to_string_pretty(&hubs)?);
        }
        HubsCommand::Revoke { id } => {
            let revoked = shared.pairing.revoke(&id)?;
            if revoked {
                println!("revoked {id}");
            } else {
                println!("no such hub: {id}");
            }
        }
    }
    Ok(())
}
