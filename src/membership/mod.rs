//! Group membership reconciliation
//!
//! Resolves caller-supplied identifiers to directory principals, classifies
//! them against a point-in-time snapshot of a group's members, and applies
//! bulk add/remove operations one identifier at a time.

pub mod index;
pub mod input;
pub mod reconcile;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use index::MembershipIndex;
pub use reconcile::{
    Operation, ReconcileOutcome, ReconcileReport, ReconcileStatus, ReconcileSummary, Reconciler,
};

/// Kind of directory object a batch operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Device,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Device => "device",
        }
    }

    /// Header of the CSV column holding identifiers for this kind
    pub fn default_csv_column(&self) -> &'static str {
        match self {
            PrincipalKind::User => "EmailAddress",
            PrincipalKind::Device => "DeviceName",
        }
    }

    /// Graph type-cast segment used to list members of this kind
    pub fn odata_cast(&self) -> &'static str {
        match self {
            PrincipalKind::User => "microsoft.graph.user",
            PrincipalKind::Device => "microsoft.graph.device",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved directory object, snapshotted at resolution time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub kind: PrincipalKind,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub trust_type: Option<String>,
}

impl Principal {
    pub fn user(id: impl Into<String>, display_name: impl Into<String>, upn: Option<&str>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind: PrincipalKind::User,
            user_principal_name: upn.map(str::to_string),
            mail: None,
            employee_id: None,
            department: None,
            trust_type: None,
        }
    }

    pub fn device(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            kind: PrincipalKind::Device,
            user_principal_name: None,
            mail: None,
            employee_id: None,
            department: None,
            trust_type: None,
        }
    }

    /// Normalized index key: UPN for users, display name for devices.
    ///
    /// `None` when the attribute is missing or blank; such principals
    /// cannot be matched by identifier.
    pub fn lookup_key(&self) -> Option<String> {
        let raw = match self.kind {
            PrincipalKind::User => self.user_principal_name.as_deref(),
            PrincipalKind::Device => Some(self.display_name.as_str()),
        }?;
        let key = normalize_key(raw);
        (!key.is_empty()).then_some(key)
    }

    /// Short attribute list for report lines
    pub fn describe(&self) -> String {
        let mut parts = vec![self.display_name.clone()];
        match self.kind {
            PrincipalKind::User => {
                if let Some(upn) = &self.user_principal_name {
                    parts.push(upn.clone());
                }
                if let Some(emp) = &self.employee_id {
                    parts.push(format!("emp {}", emp));
                }
                if let Some(dept) = &self.department {
                    parts.push(dept.clone());
                }
            }
            PrincipalKind::Device => {
                if let Some(trust) = &self.trust_type {
                    parts.push(trust.clone());
                }
            }
        }
        parts.join(" | ")
    }
}

/// Lower-cased, trimmed form used for every index lookup
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Directory service the reconciler reads from and mutates
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Resolve an identifier; `Ok(None)` is a clean miss
    async fn resolve_principal(
        &self,
        identifier: &str,
        kind: PrincipalKind,
    ) -> Result<Option<Principal>>;

    async fn list_members(&self, group_id: &str, kind: PrincipalKind) -> Result<Vec<Principal>>;

    async fn add_member(&self, group_id: &str, principal_id: &str) -> Result<()>;

    async fn remove_member(&self, group_id: &str, principal_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_lookup_key_is_lowercased_upn() {
        let p = Principal::user("1", "Alice", Some("  Alice@Contoso.com "));
        assert_eq!(p.lookup_key().as_deref(), Some("alice@contoso.com"));
    }

    #[test]
    fn test_user_without_upn_has_no_key() {
        let mut p = Principal::user("1", "Guest", None);
        p.mail = Some("guest@example.com".into());
        assert_eq!(p.lookup_key(), None);
    }

    #[test]
    fn test_device_lookup_key_is_display_name() {
        let p = Principal::device("d1", "KIOSK-01");
        assert_eq!(p.lookup_key().as_deref(), Some("kiosk-01"));
        assert_eq!(Principal::device("d2", "  ").lookup_key(), None);
    }

    #[test]
    fn test_kind_csv_columns() {
        assert_eq!(PrincipalKind::User.default_csv_column(), "EmailAddress");
        assert_eq!(PrincipalKind::Device.default_csv_column(), "DeviceName");
    }
}
