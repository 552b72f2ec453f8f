use crate::config::{AuthType, ConfigManager, TenantConfig, TokenCache};
use crate::error::{EntractlError, Result};
use colored::Colorize;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret,
    DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields, Scope, TokenResponse, TokenUrl,
};
use std::time::Duration;
use tracing::debug;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Graph permissions the app registration needs for every command
pub const REQUIRED_SCOPES: &[&str] = &[
    "GroupMember.ReadWrite.All",
    "User.Read.All",
    "Device.Read.All",
    "DeviceManagementManagedDevices.PrivilegedOperations.All",
    "DeviceManagementManagedDevices.Read.All",
];

pub struct GraphAuth {
    config_manager: ConfigManager,
}

fn authority_url(tenant_id: &str, leaf: &str) -> String {
    format!("{}/{}/oauth2/v2.0/{}", MICROSOFT_AUTHORITY, tenant_id, leaf)
}

fn oauth_client(tenant_config: &TenantConfig, secret: Option<ClientSecret>) -> Result<BasicClient> {
    let tenant_id = &tenant_config.tenant_id;
    let auth_url = AuthUrl::new(authority_url(tenant_id, "authorize"))
        .map_err(|e| EntractlError::AuthError(format!("Invalid auth URL: {}", e)))?;
    let token_url = TokenUrl::new(authority_url(tenant_id, "token"))
        .map_err(|e| EntractlError::AuthError(format!("Invalid token URL: {}", e)))?;

    Ok(BasicClient::new(
        ClientId::new(tenant_config.client_id.clone()),
        secret,
        auth_url,
        Some(token_url),
    ))
}

fn expiry_from(expires_in: Option<Duration>) -> Result<chrono::DateTime<chrono::Utc>> {
    let lifetime = chrono::Duration::from_std(expires_in.unwrap_or(Duration::from_secs(3600)))
        .map_err(|e| EntractlError::AuthError(format!("Invalid token lifetime: {}", e)))?;
    Ok(chrono::Utc::now() + lifetime)
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Run the flow configured for the tenant and cache the token
    pub async fn login(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        match tenant_config.auth_type {
            AuthType::DeviceCode => self.login_device_code(tenant_config).await,
            AuthType::ClientCredentials => self.login_client_credentials(tenant_config).await,
        }
    }

    /// Authenticate using device code flow (interactive)
    pub async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        println!(
            "{} Starting device code authentication for tenant '{}'...",
            "→".cyan(),
            tenant_config.name
        );

        let device_auth_url =
            DeviceAuthorizationUrl::new(authority_url(&tenant_config.tenant_id, "devicecode"))
                .map_err(|e| EntractlError::AuthError(format!("Invalid device auth URL: {}", e)))?;
        let client = oauth_client(tenant_config, None)?.set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| EntractlError::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    EntractlError::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        println!("\n  Please visit: {}", details.verification_uri().as_str().bold());
        println!("  Enter code:   {}\n", details.user_code().secret().bold());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| EntractlError::AuthError(format!("Token exchange failed: {}", e)))?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: expiry_from(token.expires_in())?,
            tenant_id: tenant_config.tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        debug!(path = ?self.config_manager.token_cache_file(&tenant_config.name), "token cached");

        println!("{} Authentication successful!", "✓".green());
        Ok(token_cache)
    }

    /// Authenticate using client credentials flow (non-interactive)
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
    ) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            EntractlError::AuthError("Client secret required for client credentials flow".into())
        })?;

        println!(
            "{} Authenticating with client credentials for tenant '{}'...",
            "→".cyan(),
            tenant_config.name
        );

        let client = oauth_client(tenant_config, Some(ClientSecret::new(client_secret.clone())))?;

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                EntractlError::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: None,
            expires_at: expiry_from(token.expires_in())?,
            tenant_id: tenant_config.tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;

        println!("{} Authentication successful!", "✓".green());
        Ok(token_cache)
    }

    /// Cached access token; an expired token is reported as `TokenNotFound`
    pub async fn get_access_token(&self, tenant_name: &str) -> Result<String> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => Ok(token.access_token),
            Err(EntractlError::AuthError(_)) => Err(EntractlError::TokenNotFound),
            Err(e) => Err(e),
        }
    }

    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)?;
        println!("{} Logged out from tenant '{}'", "✓".green(), tenant_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_url() {
        assert_eq!(
            authority_url("contoso.onmicrosoft.com", "token"),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_expiry_defaults_to_one_hour() {
        let expires = expiry_from(None).unwrap();
        let remaining = expires - chrono::Utc::now();
        assert!(remaining > chrono::Duration::minutes(59));
        assert!(remaining <= chrono::Duration::minutes(60));
    }

    #[tokio::test]
    async fn test_expired_token_maps_to_token_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        manager
            .save_token(
                "contoso",
                &TokenCache {
                    access_token: "old".into(),
                    refresh_token: None,
                    expires_at: chrono::Utc::now() - chrono::Duration::hours(1),
                    tenant_id: "t".into(),
                },
            )
            .unwrap();

        let auth = GraphAuth::new(manager);
        assert!(matches!(
            auth.get_access_token("contoso").await,
            Err(EntractlError::TokenNotFound)
        ));
    }
}
