use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{EntractlError, Result};
use crate::graph::auth::{GraphAuth, REQUIRED_SCOPES};
use clap::Args;
use colored::Colorize;

/// Safely truncate a string to n characters (not bytes)
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant name; checks tenants.toml, then {name}.env in the config directory
    #[arg(index = 1)]
    name: Option<String>,

    /// Tenant name (alias for positional)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Tenant ID (Entra directory ID)
    #[arg(long)]
    tenant_id: Option<String>,

    /// Client ID (application ID)
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow instead of device code
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,

    /// Import from .env file only (don't authenticate)
    #[arg(long)]
    import_only: bool,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name
    #[arg(short, long)]
    tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long)]
    all: bool,
}

fn quick_setup_tenant(args: &LoginArgs, tenant_id: &str, client_id: &str) -> TenantConfig {
    let name = args.tenant.clone().unwrap_or_else(|| {
        tenant_id
            .split('-')
            .next()
            .unwrap_or("my-tenant")
            .to_string()
    });

    TenantConfig {
        name,
        tenant_id: tenant_id.to_string(),
        client_id: client_id.to_string(),
        client_secret: args.client_secret.clone(),
        auth_type: AuthType::select(args.client_credentials, args.client_secret.is_some()),
        description: args.description.clone(),
    }
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    let tenant_name = args.name.as_ref().or(args.tenant.as_ref());

    let tenant_config = if let Some(name) = tenant_name {
        let tenant = config_manager.get_tenant_or_env(name).map_err(|_| {
            EntractlError::ConfigError(format!(
                "Tenant '{}' not found.\n\n\
                 Either create {}/{}.env with:\n   \
                 TENANT_ID=your-tenant-id\n   \
                 CLIENT_ID=your-client-id\n   \
                 CLIENT_SECRET=optional-secret\n\n\
                 or run: entractl tenant add {} --tenant-id ID --client-id ID",
                name,
                config_manager.config_dir().display(),
                name.to_lowercase(),
                name
            ))
        })?;

        println!(
            "{} Loaded tenant: {} {}",
            "✓".green(),
            tenant.name.bold(),
            tenant.description.as_deref().unwrap_or("")
        );
        println!("  Tenant ID: {}...", truncate_chars(&tenant.tenant_id, 8));
        println!("  Client ID: {}...", truncate_chars(&tenant.client_id, 8));

        if args.import_only {
            println!(
                "\n{} Import complete. Run 'entractl login {}' to authenticate.",
                "→".cyan(),
                tenant.name
            );
            return Ok(());
        }

        tenant
    } else if let (Some(tenant_id), Some(client_id)) = (&args.tenant_id, &args.client_id) {
        let tenant = quick_setup_tenant(&args, tenant_id, client_id);
        config_manager.add_tenant(tenant.clone())?;
        println!("{} Tenant '{}' configuration saved", "✓".green(), tenant.name);
        tenant
    } else {
        return Err(EntractlError::InvalidConfig(
            "Usage:\n  \
            entractl login NAME                          # tenants.toml or NAME.env\n  \
            entractl login --tenant-id ID --client-id ID # quick setup"
                .into(),
        ));
    };

    auth.login(&tenant_config).await?;
    config_manager.set_active_tenant(&tenant_config.name)?;

    println!("\n{} Active tenant: {}", "→".cyan(), tenant_config.name.bold());
    println!(
        "{} App registration needs: {}",
        "ℹ".blue(),
        REQUIRED_SCOPES.join(", ").dimmed()
    );
    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    if args.all {
        for tenant in config_manager.load_tenants()? {
            auth.logout(&tenant.name)?;
        }
        println!("{} Logged out from all tenants", "✓".green());
    } else if let Some(tenant_name) = &args.tenant {
        auth.logout(tenant_name)?;
    } else if let Some(current) = config_manager.load_config()?.current_tenant {
        auth.logout(&current)?;
    } else {
        println!("{} No active tenant", "!".yellow());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> LoginArgs {
        LoginArgs {
            name: None,
            tenant: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            client_credentials: false,
            description: None,
            import_only: false,
        }
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("äöüßxyz", 3), "äöü");
        assert_eq!(truncate_chars("ab", 8), "ab");
    }

    #[test]
    fn test_quick_setup_names_tenant_from_id() {
        let tenant = quick_setup_tenant(&args(), "c59151ed-4414-4426", "client");
        assert_eq!(tenant.name, "c59151ed");
        assert_eq!(tenant.auth_type, AuthType::DeviceCode);
    }

    #[test]
    fn test_quick_setup_secret_implies_client_credentials() {
        let mut args = args();
        args.tenant = Some("contoso".into());
        args.client_secret = Some("s".into());
        let tenant = quick_setup_tenant(&args, "tid", "cid");
        assert_eq!(tenant.name, "contoso");
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);
    }
}
