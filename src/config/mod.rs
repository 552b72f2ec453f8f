use crate::error::{EntractlError, Result};
use crate::membership::PrincipalKind;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub log_level: String,

    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub batch: BatchConfig,
}

/// CSV column overrides for bulk imports
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct BatchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_column: Option<String>,
}

impl BatchConfig {
    /// CSV header to read identifiers from for the given kind
    pub fn column_for(&self, kind: PrincipalKind) -> &str {
        let configured = match kind {
            PrincipalKind::User => self.user_column.as_deref(),
            PrincipalKind::Device => self.device_column.as_deref(),
        };
        configured.unwrap_or(kind.default_csv_column())
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
}

impl AuthType {
    /// A secret, or an explicit request, selects the app-only flow
    pub fn select(client_credentials: bool, has_secret: bool) -> Self {
        if client_credentials || has_secret {
            AuthType::ClientCredentials
        } else {
            AuthType::DeviceCode
        }
    }
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

/// Configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "entractl", "entractl").ok_or_else(|| {
            EntractlError::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir())
    }

    /// Use an explicit configuration directory, creating it if needed
    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = dir.as_ref().to_path_buf();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn token_cache_file(&self, tenant_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.token", tenant_name))
    }

    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| EntractlError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct TenantsFile {
            #[serde(default)]
            tenants: Vec<TenantConfig>,
        }

        let contents = fs::read_to_string(tenants_path)?;
        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants })
            .map_err(|e| EntractlError::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant with the same name
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| EntractlError::TenantNotFound(name.to_string()))
    }

    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        match self.load_config()?.current_tenant {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Active tenant or a config error telling the operator how to pick one
    pub fn require_active_tenant(&self) -> Result<TenantConfig> {
        self.get_active_tenant()?.ok_or_else(|| {
            EntractlError::ConfigError(
                "No active tenant. Run 'entractl login <name>' or 'entractl tenant switch <name>' first."
                    .into(),
            )
        })
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant_name.to_string());
        self.save_config(&config)
    }

    /// Remove a tenant, its token cache, and the active marker if it pointed at it
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| t.name != tenant_name);

        if tenants.len() == original_len {
            return Err(EntractlError::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        self.delete_token(tenant_name)?;

        let mut config = self.load_config()?;
        if config.current_tenant.as_deref() == Some(tenant_name) {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name), contents)?;
        Ok(())
    }

    /// Load a cached token; expired tokens are reported as `AuthError`
    pub fn load_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name);

        if !token_path.exists() {
            return Err(EntractlError::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        let token: TokenCache = serde_json::from_str(&contents)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(EntractlError::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    pub fn delete_token(&self, tenant_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(tenant_name);

        if token_path.exists() {
            fs::remove_file(token_path)?;
        }

        Ok(())
    }

    /// Load tenant credentials from `{name}.env` (or `.env`) in the config directory
    ///
    /// ```text
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=optional-secret
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let named = self.config_dir.join(format!("{}.env", name.to_lowercase()));
        let fallback = self.config_dir.join(".env");

        let path = if named.exists() {
            named
        } else if fallback.exists() {
            fallback
        } else {
            return Ok(None);
        };

        let vars = parse_env_file(&fs::read_to_string(&path)?);

        let (Some(tenant_id), Some(client_id)) = (vars.get("TENANT_ID"), vars.get("CLIENT_ID"))
        else {
            return Ok(None);
        };
        let client_secret = vars.get("CLIENT_SECRET").cloned();

        Ok(Some(TenantConfig {
            name: name.to_string(),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            auth_type: if client_secret.is_some() {
                AuthType::ClientCredentials
            } else {
                AuthType::DeviceCode
            },
            client_secret,
            description: vars.get("DESCRIPTION").cloned(),
        }))
    }

    /// Tenant from tenants.toml, else imported from an env file and saved
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        match self.load_env_file(name)? {
            Some(tenant) => {
                self.add_tenant(tenant.clone())?;
                Ok(tenant)
            }
            None => Err(EntractlError::TenantNotFound(name.to_string())),
        }
    }
}

/// Parse `KEY=VALUE` lines; keys are upper-cased, quotes stripped, `#` lines skipped
fn parse_env_file(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_uppercase(), unquoted.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "00000000-0000-0000-0000-000000000001".to_string(),
            client_id: "00000000-0000-0000-0000-000000000002".to_string(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
        }
    }

    #[test]
    fn test_tenant_add_switch_remove() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();

        manager.add_tenant(tenant("contoso")).unwrap();
        manager.add_tenant(tenant("fabrikam")).unwrap();
        manager.set_active_tenant("contoso").unwrap();
        assert_eq!(manager.require_active_tenant().unwrap().name, "contoso");

        manager.remove_tenant("contoso").unwrap();
        assert!(manager.get_active_tenant().unwrap().is_none());
        assert_eq!(manager.load_tenants().unwrap().len(), 1);
        assert!(matches!(
            manager.remove_tenant("contoso"),
            Err(EntractlError::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_add_tenant_replaces_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();

        manager.add_tenant(tenant("contoso")).unwrap();
        let mut updated = tenant("contoso");
        updated.description = Some("Production".into());
        manager.add_tenant(updated).unwrap();

        let tenants = manager.load_tenants().unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].description.as_deref(), Some("Production"));
    }

    #[test]
    fn test_expired_token_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();

        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            tenant_id: "t".into(),
        };
        manager.save_token("contoso", &token).unwrap();

        assert!(matches!(
            manager.load_token("contoso"),
            Err(EntractlError::AuthError(_))
        ));
        assert!(matches!(
            manager.load_token("missing"),
            Err(EntractlError::TokenNotFound)
        ));
    }

    #[test]
    fn test_batch_column_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        fs::write(
            manager.config_file(),
            "current_tenant = \"contoso\"\n\n[batch]\nuser_column = \"UPN\"\n",
        )
        .unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.batch.column_for(PrincipalKind::User), "UPN");
        assert_eq!(config.batch.column_for(PrincipalKind::Device), "DeviceName");
    }

    #[test]
    fn test_env_file_import() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        fs::write(
            dir.path().join("contoso.env"),
            "# Contoso\nTENANT_ID=\"tid\"\nclient_id = cid\nCLIENT_SECRET='s3cret'\n",
        )
        .unwrap();

        let tenant = manager.get_tenant_or_env("Contoso").unwrap();
        assert_eq!(tenant.tenant_id, "tid");
        assert_eq!(tenant.client_id, "cid");
        assert_eq!(tenant.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);
        // Persisted for next time
        assert!(manager.get_tenant("Contoso").is_ok());
    }
}
