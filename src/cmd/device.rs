use crate::config::ConfigManager;
use crate::error::Result;
use crate::graph::devices::{
    DeviceAction, DeviceActionOutcome, DeviceActionStatus, DeviceActionSummary, DeviceActions,
};
use crate::graph::GraphClient;
use crate::membership::input::{load_csv, require_non_empty};
use crate::membership::PrincipalKind;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DeviceActionArgs {
    /// Managed device names
    pub names: Vec<String>,

    /// CSV file with a header row
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// CSV column to read (default: DeviceName)
    #[arg(long)]
    pub column: Option<String>,

    /// Show what would be processed without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn sync(args: DeviceActionArgs) -> Result<()> {
    run_action(args, DeviceAction::Sync).await
}

pub async fn reboot(args: DeviceActionArgs) -> Result<()> {
    run_action(args, DeviceAction::Reboot).await
}

async fn run_action(args: DeviceActionArgs, action: DeviceAction) -> Result<()> {
    let config = ConfigManager::new()?;
    run_action_in(&config, args, action).await
}

async fn run_action_in(
    config: &ConfigManager,
    args: DeviceActionArgs,
    action: DeviceAction,
) -> Result<()> {
    let batch = config.load_config()?.batch;

    let mut names: Vec<String> = args
        .names
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if let Some(path) = &args.file {
        let column = args
            .column
            .as_deref()
            .unwrap_or(batch.column_for(PrincipalKind::Device));
        names.extend(load_csv(path, column)?);
    }
    let names = require_non_empty(names)?;

    if args.dry_run {
        println!("\n{}", "DRY RUN - No changes will be made".yellow().bold());
        println!("{} Would {} {} device(s):", "→".cyan(), action, names.len());
        for name in &names {
            println!("  • {}", name);
        }
        return Ok(());
    }

    let active_tenant = config.require_active_tenant()?;
    println!("→ Active tenant: {}", active_tenant.name.cyan().bold());

    // Reboots interrupt users; default to No
    let prompt = format!("Send {} to {} device(s)?", action, names.len());
    if !super::confirm_or_skip(args.yes, &prompt, action == DeviceAction::Sync)? {
        return Ok(());
    }

    let client = GraphClient::from_config(config, &active_tenant.name).await?;
    let actions = DeviceActions::new(&client);

    println!();
    let outcomes = actions
        .run_batch(&names, action, |outcome| println!("{}", render_outcome(outcome)))
        .await;

    let summary = DeviceActionSummary::from_outcomes(&outcomes);
    println!("\n{}", "─".repeat(60));
    println!("{} {}", "→".cyan().bold(), summary.line().bold());

    Ok(())
}

fn render_outcome(outcome: &DeviceActionOutcome) -> String {
    let tag = match outcome.status {
        DeviceActionStatus::Succeeded => "[Sent     ]".green(),
        DeviceActionStatus::NotFound => "[Not found]".yellow(),
        DeviceActionStatus::Failed => "[Failed   ]".red(),
    };
    let mut line = format!("  {} {}", tag, outcome.device_name);
    if let Some(id) = &outcome.device_id {
        line.push_str(&format!(" {}", id.dimmed()));
    }
    if let Some(detail) = &outcome.error_detail {
        line.push_str(&format!("\n      {}", detail.red()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(names: &[&str], dry_run: bool) -> DeviceActionArgs {
        DeviceActionArgs {
            names: names.iter().map(|n| n.to_string()).collect(),
            file: None,
            column: None,
            dry_run,
            yes: true,
        }
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_dir(dir.path()).unwrap();

        run_action_in(&config, args(&["PC-1"], true), DeviceAction::Reboot)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_live_run_requires_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_dir(dir.path()).unwrap();

        assert!(run_action_in(&config, args(&["PC-1"], false), DeviceAction::Sync)
            .await
            .is_err());
    }

    #[test]
    fn test_render_outcome_plain() {
        colored::control::set_override(false);
        let outcome = DeviceActionOutcome {
            device_name: "PC-1".into(),
            device_id: Some("m1".into()),
            status: DeviceActionStatus::NotFound,
            error_detail: None,
        };
        assert_eq!(render_outcome(&outcome), "  [Not found] PC-1 m1");
    }
}
