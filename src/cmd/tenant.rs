//! Tenant registry commands
//!
//! Every membership command runs against the active tenant, so `list` and
//! `switch` report whether its cached Graph token is still usable.

use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{EntractlError, Result};
use crate::graph::directory::is_guid;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::{ColoredString, Colorize};
use std::fmt;

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Local name used by `login` and `tenant switch`
    name: String,

    /// Directory ID (GUID) or primary domain, e.g. contoso.onmicrosoft.com
    #[arg(long)]
    tenant_id: String,

    /// Application (client) ID of the app registration
    #[arg(long)]
    client_id: String,

    /// Client secret for app-only access
    #[arg(long)]
    client_secret: Option<String>,

    /// Use the client credentials flow without storing a secret here
    #[arg(long)]
    client_credentials: bool,

    #[arg(long)]
    description: Option<String>,

    /// Replace an existing tenant with the same name
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Also print directory and client IDs
    #[arg(short, long)]
    details: bool,
}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    name: String,

    /// Skip confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

/// State of a tenant's cached Graph token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid { expires_at: DateTime<Utc> },
    Expired,
    LoggedOut,
}

impl TokenStatus {
    pub fn of(config: &ConfigManager, tenant_name: &str) -> Self {
        match config.load_token(tenant_name) {
            Ok(token) => TokenStatus::Valid {
                expires_at: token.expires_at,
            },
            Err(EntractlError::AuthError(_)) => TokenStatus::Expired,
            Err(_) => TokenStatus::LoggedOut,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid { .. })
    }

    fn label(&self, now: DateTime<Utc>) -> String {
        match self {
            TokenStatus::Valid { expires_at } => {
                let minutes = (*expires_at - now).num_minutes().max(0);
                format!("token valid for {}m", minutes)
            }
            TokenStatus::Expired => "token expired".to_string(),
            TokenStatus::LoggedOut => "not logged in".to_string(),
        }
    }

    fn colored(&self, now: DateTime<Utc>) -> ColoredString {
        let label = self.label(now);
        match self {
            TokenStatus::Valid { .. } => label.green(),
            TokenStatus::Expired => label.yellow(),
            TokenStatus::LoggedOut => label.dimmed(),
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label(Utc::now()))
    }
}

/// Reject IDs Entra would refuse at login time
fn validate_ids(tenant_id: &str, client_id: &str) -> Result<()> {
    if !is_guid(tenant_id) && !tenant_id.contains('.') {
        return Err(EntractlError::InvalidInput(format!(
            "Tenant ID '{}' is neither a GUID nor a domain",
            tenant_id
        )));
    }
    if !is_guid(client_id) {
        return Err(EntractlError::InvalidInput(format!(
            "Client ID '{}' is not a GUID",
            client_id
        )));
    }
    Ok(())
}

fn register(config: &ConfigManager, args: TenantAddArgs) -> Result<TenantConfig> {
    validate_ids(&args.tenant_id, &args.client_id)?;

    if !args.force && config.get_tenant(&args.name).is_ok() {
        return Err(EntractlError::InvalidInput(format!(
            "Tenant '{}' already exists; pass --force to replace it",
            args.name
        )));
    }

    let tenant = TenantConfig {
        auth_type: AuthType::select(args.client_credentials, args.client_secret.is_some()),
        name: args.name,
        tenant_id: args.tenant_id,
        client_id: args.client_id,
        client_secret: args.client_secret,
        description: args.description,
    };
    config.add_tenant(tenant.clone())?;
    Ok(tenant)
}

pub async fn add(args: TenantAddArgs) -> Result<()> {
    let config = ConfigManager::new()?;
    let tenant = register(&config, args)?;

    println!("{} Tenant '{}' saved ({:?})", "✓".green(), tenant.name, tenant.auth_type);
    println!(
        "{} Next: {}",
        "→".cyan(),
        format!("entractl login {}", tenant.name).bold()
    );
    Ok(())
}

pub async fn list(args: TenantListArgs) -> Result<()> {
    let config = ConfigManager::new()?;
    let tenants = config.load_tenants()?;

    if tenants.is_empty() {
        println!("{} No tenants configured", "!".yellow());
        println!(
            "{} Add one with {} or drop a {{name}}.env into {}",
            "→".cyan(),
            "entractl tenant add".bold(),
            config.config_dir().display()
        );
        return Ok(());
    }

    let active = config.load_config()?.current_tenant;
    let now = Utc::now();
    let width = tenants.iter().map(|t| t.name.len()).max().unwrap_or(0);

    for tenant in &tenants {
        let marker = if active.as_deref() == Some(tenant.name.as_str()) {
            "●".green()
        } else {
            "○".dimmed()
        };
        let status = TokenStatus::of(&config, &tenant.name);
        println!(
            "{} {:<width$}  {}",
            marker,
            tenant.name,
            status.colored(now),
            width = width
        );

        if args.details {
            println!("    directory: {}", tenant.tenant_id.dimmed());
            println!("    client:    {}", tenant.client_id.dimmed());
            if let Some(desc) = &tenant.description {
                println!("    {}", desc);
            }
        }
    }

    Ok(())
}

pub async fn switch(args: TenantSwitchArgs) -> Result<()> {
    let config = ConfigManager::new()?;
    config.set_active_tenant(&args.name)?;
    println!("{} Active tenant: {}", "✓".green(), args.name.bold());

    let status = TokenStatus::of(&config, &args.name);
    if !status.is_valid() {
        println!(
            "{} {}; run {} before changing memberships",
            "!".yellow(),
            status,
            format!("entractl login {}", args.name).bold()
        );
    }
    Ok(())
}

pub async fn remove(args: TenantRemoveArgs) -> Result<()> {
    let config = ConfigManager::new()?;
    config.get_tenant(&args.name)?;

    let prompt = format!("Remove tenant '{}' and its cached token?", args.name);
    if !super::confirm_or_skip(args.yes, &prompt, false)? {
        return Ok(());
    }

    config.remove_tenant(&args.name)?;
    println!("{} Tenant '{}' removed", "✓".green(), args.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenCache;

    const TENANT: &str = "c59151ed-4414-4426-9d3b-1b2c3d4e5f60";
    const CLIENT: &str = "0a1b2c3d-4e5f-6071-8293-a4b5c6d7e8f9";

    fn add_args(name: &str, force: bool) -> TenantAddArgs {
        TenantAddArgs {
            name: name.into(),
            tenant_id: TENANT.into(),
            client_id: CLIENT.into(),
            client_secret: None,
            client_credentials: false,
            description: None,
            force,
        }
    }

    #[test]
    fn test_validate_ids() {
        assert!(validate_ids(TENANT, CLIENT).is_ok());
        assert!(validate_ids("contoso.onmicrosoft.com", CLIENT).is_ok());
        assert!(validate_ids("contoso", CLIENT).is_err());
        assert!(validate_ids(TENANT, "my-app").is_err());
    }

    #[test]
    fn test_register_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_dir(dir.path()).unwrap();

        register(&config, add_args("contoso", false)).unwrap();
        assert!(matches!(
            register(&config, add_args("contoso", false)),
            Err(EntractlError::InvalidInput(_))
        ));

        let mut replacement = add_args("contoso", true);
        replacement.client_secret = Some("s".into());
        let tenant = register(&config, replacement).unwrap();
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);
        assert_eq!(config.load_tenants().unwrap().len(), 1);
    }

    #[test]
    fn test_token_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::with_dir(dir.path()).unwrap();
        assert_eq!(TokenStatus::of(&config, "contoso"), TokenStatus::LoggedOut);

        let token = |expires_at| TokenCache {
            access_token: "t".into(),
            refresh_token: None,
            expires_at,
            tenant_id: TENANT.into(),
        };

        config
            .save_token("contoso", &token(Utc::now() - chrono::Duration::minutes(5)))
            .unwrap();
        assert_eq!(TokenStatus::of(&config, "contoso"), TokenStatus::Expired);

        let expires_at = Utc::now() + chrono::Duration::minutes(90);
        config.save_token("contoso", &token(expires_at)).unwrap();
        let status = TokenStatus::of(&config, "contoso");
        assert!(status.is_valid());
        assert_eq!(
            status.label(expires_at - chrono::Duration::minutes(42)),
            "token valid for 42m"
        );
    }
}
