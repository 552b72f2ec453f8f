use clap::{Parser, Subcommand};
use colored::Colorize;
use entractl::config::ConfigManager;
use entractl::{cmd, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "entractl",
    about = "Bulk Entra ID group membership from the command line",
    version,
    long_about = "Add or remove users and devices in Entra ID security groups in bulk\n\n\
                  Accepts identifiers as arguments, from a CSV column or an interactive prompt,\n\
                  skips members that are already in the desired state and reports every outcome."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// Add, remove and list group members
    #[command(subcommand)]
    Group(GroupCommands),

    /// Send remote actions to Intune managed devices
    #[command(subcommand)]
    Device(DeviceCommands),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List all configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),
}

#[derive(Subcommand, Debug)]
enum GroupCommands {
    /// Add users or devices to a group, skipping existing members
    Add(cmd::group::MembershipArgs),

    /// Remove users or devices from a group, skipping non-members
    Remove(cmd::group::MembershipArgs),

    /// List current members of a group
    Show(cmd::group::ShowArgs),
}

#[derive(Subcommand, Debug)]
enum DeviceCommands {
    /// Trigger an Intune policy sync
    Sync(cmd::device::DeviceActionArgs),

    /// Restart devices remotely
    Reboot(cmd::device::DeviceActionArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Directive for the entractl target: `-v` wins, then `log_level` from config.toml
fn log_directive(verbose: bool) -> String {
    if verbose {
        return "entractl=debug".to_string();
    }
    let configured = ConfigManager::new()
        .and_then(|manager| manager.load_config())
        .map(|config| config.log_level)
        .unwrap_or_default();
    if configured.trim().is_empty() {
        "entractl=warn".to_string()
    } else {
        format!("entractl={}", configured.trim())
    }
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
        },
        Commands::Group(group_cmd) => match group_cmd {
            GroupCommands::Add(args) => cmd::group::add(args).await?,
            GroupCommands::Remove(args) => cmd::group::remove(args).await?,
            GroupCommands::Show(args) => cmd::group::show(args).await?,
        },
        Commands::Device(device_cmd) => match device_cmd {
            DeviceCommands::Sync(args) => cmd::device::sync(args).await?,
            DeviceCommands::Reboot(args) => cmd::device::reboot(args).await?,
        },
    }

    Ok(())
}
