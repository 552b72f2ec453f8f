//! Bulk group membership commands
//!
//! `add` and `remove` feed identifiers from the command line, a CSV file or
//! an interactive prompt through the membership reconciler and print one
//! line per identifier followed by a tally. `show` lists current members.

use crate::cmd::progress;
use crate::config::{BatchConfig, ConfigManager};
use crate::error::{EntractlError, Result};
use crate::graph::directory::{filter_members, GraphDirectory};
use crate::graph::GraphClient;
use crate::membership::input::{load_csv, parse_prompt_line, require_non_empty};
use crate::membership::{
    DirectoryClient, Operation, PrincipalKind, ReconcileOutcome, ReconcileReport, ReconcileStatus,
    Reconciler,
};
use clap::{Args, ValueEnum};
use colored::{ColoredString, Colorize};
use dialoguer::{theme::ColorfulTheme, Input};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    User,
    Device,
}

impl From<KindArg> for PrincipalKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::User => PrincipalKind::User,
            KindArg::Device => PrincipalKind::Device,
        }
    }
}

#[derive(Args, Debug)]
pub struct MembershipArgs {
    /// Target group object ID
    #[arg(short, long)]
    pub group: String,

    /// Kind of member to add or remove
    #[arg(short, long, value_enum, default_value_t = KindArg::User)]
    pub kind: KindArg,

    /// Email, UPN, SamAccountName, device name or object ID (prompted if omitted)
    pub identifiers: Vec<String>,

    /// CSV file with a header row
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// CSV column to read (default: EmailAddress for users, DeviceName for devices)
    #[arg(long)]
    pub column: Option<String>,

    /// Show what would be processed without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Group object ID
    #[arg(short, long)]
    pub group: String,

    /// Kind of member to list
    #[arg(short, long, value_enum, default_value_t = KindArg::User)]
    pub kind: KindArg,

    /// Case-insensitive text to match against name, UPN, mail, employee ID or department
    #[arg(long)]
    pub filter: Option<String>,
}

pub async fn add(args: MembershipArgs) -> Result<()> {
    run_membership(args, Operation::Add).await
}

pub async fn remove(args: MembershipArgs) -> Result<()> {
    run_membership(args, Operation::Remove).await
}

/// Gather identifiers from positional args and/or CSV, prompting when neither is given
fn collect_identifiers(args: &MembershipArgs, batch: &BatchConfig) -> Result<Vec<String>> {
    let kind = PrincipalKind::from(args.kind);
    let mut identifiers: Vec<String> = args
        .identifiers
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();

    if let Some(path) = &args.file {
        let column = args.column.as_deref().unwrap_or(batch.column_for(kind));
        let from_csv = load_csv(path, column)?;
        println!(
            "{} Read {} identifier(s) from {} (column '{}')",
            "→".cyan(),
            from_csv.len(),
            path.display(),
            column
        );
        identifiers.extend(from_csv);
    }

    if identifiers.is_empty() && args.file.is_none() {
        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Enter {} identifiers (space separated)", kind))
            .allow_empty(true)
            .interact_text()?;
        identifiers = parse_prompt_line(&line);
    }

    require_non_empty(identifiers)
}

async fn run_membership(args: MembershipArgs, operation: Operation) -> Result<()> {
    let config = ConfigManager::new()?;
    run_membership_in(&config, args, operation).await
}

async fn run_membership_in(
    config: &ConfigManager,
    args: MembershipArgs,
    operation: Operation,
) -> Result<()> {
    let batch = config.load_config()?.batch;
    let kind = PrincipalKind::from(args.kind);

    let identifiers = collect_identifiers(&args, &batch)?;

    if args.dry_run {
        println!("\n{}", "DRY RUN - No changes will be made".yellow().bold());
        println!(
            "{} Would {} {} {}(s) against group {}:",
            "→".cyan(),
            operation.verb(),
            identifiers.len(),
            kind,
            args.group
        );
        for identifier in &identifiers {
            println!("  • {}", identifier);
        }
        return Ok(());
    }

    let active_tenant = config.require_active_tenant()?;
    println!("→ Active tenant: {}", active_tenant.name.cyan().bold());

    let client = GraphClient::from_config(config, &active_tenant.name).await?;
    let directory = GraphDirectory::new(&client);

    let group = directory.get_group(&args.group).await?;
    if group.is_dynamic() {
        return Err(EntractlError::InvalidInput(format!(
            "Group '{}' uses dynamic membership ({}); members cannot be edited directly",
            group.name(),
            group.membership_rule.as_deref().unwrap_or("no rule")
        )));
    }

    let prompt = match operation {
        Operation::Add => format!("Add {} {}(s) to '{}'?", identifiers.len(), kind, group.name()),
        Operation::Remove => format!(
            "Remove {} {}(s) from '{}'?",
            identifiers.len(),
            kind,
            group.name()
        ),
    };
    if !super::confirm_or_skip(args.yes, &prompt, true)? {
        return Ok(());
    }

    let report = reconcile(&directory, &group.id, kind, operation, &identifiers).await?;
    print_summary(&report);

    Ok(())
}

/// Build the index, run the batch, and print each outcome as it completes
async fn reconcile<D: DirectoryClient + ?Sized>(
    directory: &D,
    group_id: &str,
    kind: PrincipalKind,
    operation: Operation,
    identifiers: &[String],
) -> Result<ReconcileReport> {
    let reconciler = Reconciler::new(directory, group_id, kind);

    let spinner = progress::create_spinner("Loading current members...");
    let mut index = match reconciler.build_index().await {
        Ok(index) => {
            progress::finish_spinner_success(
                &spinner,
                &format!("{} current {} member(s) indexed", index.len(), kind),
            );
            index
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Failed to load group members");
            return Err(e);
        }
    };

    println!();
    reconciler
        .run_with(&mut index, operation, identifiers, |outcome| {
            println!("{}", render_outcome(outcome))
        })
        .await
}

fn status_tag(status: ReconcileStatus) -> ColoredString {
    let tag = format!("[{:<9}]", status.tag());
    match status {
        ReconcileStatus::Added | ReconcileStatus::Removed => tag.green(),
        ReconcileStatus::AlreadyMember | ReconcileStatus::NotMember => tag.cyan(),
        ReconcileStatus::NotFound => tag.yellow(),
        ReconcileStatus::Failed => tag.red(),
    }
}

/// One report line: status tag, identifier as typed, resolved attributes, error text
pub fn render_outcome(outcome: &ReconcileOutcome) -> String {
    let mut line = format!("  {} {}", status_tag(outcome.status), outcome.identifier);
    if let Some(principal) = &outcome.resolved {
        line.push_str(&format!(" → {}", principal.describe()));
    }
    if let Some(detail) = &outcome.error_detail {
        line.push_str(&format!("\n      {}", detail.red()));
    }
    line
}

fn print_summary(report: &ReconcileReport) {
    println!("\n{}", "─".repeat(60));
    println!("{} {}", "→".cyan().bold(), report.summary.line(report.operation).bold());
    if report.summary.not_found > 0 {
        println!(
            "  {} identifier(s) not found in the directory",
            report.summary.not_found.to_string().yellow()
        );
    }
}

pub async fn show(args: ShowArgs) -> Result<()> {
    let config = ConfigManager::new()?;
    let active_tenant = config.require_active_tenant()?;
    let kind = PrincipalKind::from(args.kind);

    println!("→ Active tenant: {}", active_tenant.name.cyan().bold());

    let client = GraphClient::from_config(&config, &active_tenant.name).await?;
    let directory = GraphDirectory::new(&client);
    let group = directory.get_group(&args.group).await?;

    let spinner = progress::create_spinner("Loading members...");
    let members = match directory.list_members(&group.id, kind).await {
        Ok(members) => {
            progress::finish_spinner_success(&spinner, "Members loaded");
            members
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Failed to load group members");
            return Err(e);
        }
    };
    let total = members.len();
    let shown = filter_members(members, args.filter.as_deref());

    println!("\n{} ({} members)", group.name().bold(), kind);
    println!("{}", "─".repeat(60));
    for member in &shown {
        println!("  {}  {}", member.describe(), member.id.dimmed());
    }
    println!("{}", "─".repeat(60));

    match &args.filter {
        Some(filter) => println!(
            "{} {} of {} {} member(s) match '{}'",
            "→".cyan(),
            shown.len(),
            total,
            kind,
            filter
        ),
        None => println!("{} {} {} member(s)", "→".cyan(), total, kind),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::Principal;

    #[test]
    fn test_render_outcome_plain() {
        colored::control::set_override(false);

        let outcome = ReconcileOutcome {
            identifier: "a@x.com".into(),
            resolved: Some(Principal::user("u1", "Alice", Some("a@x.com"))),
            status: ReconcileStatus::Added,
            error_detail: None,
        };
        assert_eq!(render_outcome(&outcome), "  [Added    ] a@x.com → Alice | a@x.com");

        let failed = ReconcileOutcome {
            identifier: "b@x.com".into(),
            resolved: None,
            status: ReconcileStatus::Failed,
            error_detail: Some("HTTP 403 Forbidden".into()),
        };
        let rendered = render_outcome(&failed);
        assert!(rendered.starts_with("  [Failed   ] b@x.com"));
        assert!(rendered.contains("HTTP 403 Forbidden"));
    }

    #[test]
    fn test_collect_identifiers_from_args_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("batch.csv");
        std::fs::write(&csv_path, "DeviceName\nPC-2\n\nPC-3\n").unwrap();

        let args = MembershipArgs {
            group: "g1".into(),
            kind: KindArg::Device,
            identifiers: vec!["PC-1".into(), "  ".into()],
            file: Some(csv_path),
            column: None,
            dry_run: true,
            yes: true,
        };

        let ids = collect_identifiers(&args, &BatchConfig::default()).unwrap();
        assert_eq!(ids, vec!["PC-1", "PC-2", "PC-3"]);
    }

    #[tokio::test]
    async fn test_dry_run_needs_no_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_dir(dir.path()).unwrap();
        let args = MembershipArgs {
            group: "g1".into(),
            kind: KindArg::User,
            identifiers: vec!["a@x.com".into()],
            file: None,
            column: None,
            dry_run: true,
            yes: false,
        };

        run_membership_in(&config, args, Operation::Add).await.unwrap();
        assert!(config.get_active_tenant().unwrap().is_none());
    }

    #[test]
    fn test_collect_identifiers_empty_csv_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("empty.csv");
        std::fs::write(&csv_path, "EmailAddress\n").unwrap();

        let args = MembershipArgs {
            group: "g1".into(),
            kind: KindArg::User,
            identifiers: Vec::new(),
            file: Some(csv_path),
            column: None,
            dry_run: true,
            yes: true,
        };

        assert!(matches!(
            collect_identifiers(&args, &BatchConfig::default()),
            Err(EntractlError::InvalidInput(_))
        ));
    }
}
