//! Entra ID directory access for group membership
//!
//! Implements [`DirectoryClient`] over Microsoft Graph: principal
//! resolution, member enumeration and `$ref` add/remove.

use crate::error::{EntractlError, Result};
use crate::graph::{GraphClient, PaginatedResponse};
use crate::membership::{DirectoryClient, Principal, PrincipalKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const USER_SELECT: &str = "id,displayName,userPrincipalName,mail,employeeId,department";
const DEVICE_SELECT: &str = "id,displayName,trustType";

/// Directory object as returned by `users`, `devices` and `members` endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryObject {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    employee_id: Option<String>,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    trust_type: Option<String>,
}

impl DirectoryObject {
    fn into_principal(self, kind: PrincipalKind) -> Principal {
        Principal {
            id: self.id,
            display_name: self.display_name.unwrap_or_default(),
            kind,
            user_principal_name: self.user_principal_name,
            mail: self.mail,
            employee_id: self.employee_id,
            department: self.department,
            trust_type: self.trust_type,
        }
    }
}

/// Group header fetched before a batch starts
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub group_types: Vec<String>,
    #[serde(default)]
    pub membership_rule: Option<String>,
}

impl GroupInfo {
    pub fn is_dynamic(&self) -> bool {
        self.group_types.iter().any(|t| t == "DynamicMembership")
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Quote a value as an OData string literal (`'` doubled)
pub fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// True for hyphenated GUIDs (`8-4-4-4-12`), which resolve by object id.
///
/// Simple, braced and URN forms are left to name matching.
pub fn is_guid(identifier: &str) -> bool {
    let hyphens_at = |i: usize| identifier.as_bytes().get(i) == Some(&b'-');
    identifier.len() == 36
        && [8, 13, 18, 23].into_iter().all(hyphens_at)
        && uuid::Uuid::try_parse(identifier).is_ok()
}

/// Case-insensitive substring match over a member's display attributes
pub fn filter_members(members: Vec<Principal>, needle: Option<&str>) -> Vec<Principal> {
    let Some(needle) = needle.map(str::to_lowercase).filter(|n| !n.is_empty()) else {
        return members;
    };

    members
        .into_iter()
        .filter(|p| {
            [
                Some(p.display_name.as_str()),
                p.user_principal_name.as_deref(),
                p.mail.as_deref(),
                p.employee_id.as_deref(),
                p.department.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|v| v.to_lowercase().contains(&needle))
        })
        .collect()
}

/// [`DirectoryClient`] backed by Microsoft Graph
pub struct GraphDirectory<'a> {
    client: &'a GraphClient,
}

impl<'a> GraphDirectory<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        Self { client }
    }

    pub async fn get_group(&self, group_id: &str) -> Result<GroupInfo> {
        self.client
            .get(&format!(
                "groups/{}?$select=id,displayName,groupTypes,membershipRule",
                urlencoding::encode(group_id)
            ))
            .await
    }

    /// Fetch a single object; 404 is a clean miss
    async fn get_optional(&self, endpoint: &str, kind: PrincipalKind) -> Result<Option<Principal>> {
        match self.client.get::<DirectoryObject>(endpoint).await {
            Ok(object) => Ok(Some(object.into_principal(kind))),
            Err(EntractlError::ResourceNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// First match of an exact `$filter`; extra matches are logged and ignored
    async fn filter_first(
        &self,
        collection: &str,
        filter: &str,
        select: &str,
        kind: PrincipalKind,
        advanced: bool,
    ) -> Result<Option<Principal>> {
        let mut endpoint = format!(
            "{}?$filter={}&$select={}",
            collection,
            urlencoding::encode(filter),
            select
        );

        let page: PaginatedResponse<DirectoryObject> = if advanced {
            endpoint.push_str("&$count=true");
            self.client.get_advanced(&endpoint).await?
        } else {
            self.client.get(&endpoint).await?
        };

        if page.value.len() > 1 {
            warn!(filter, matches = page.value.len(), "ambiguous match, using first result");
        }
        Ok(page.value.into_iter().next().map(|o| o.into_principal(kind)))
    }

    async fn resolve_user(&self, identifier: &str) -> Result<Option<Principal>> {
        if is_guid(identifier) {
            return self
                .get_optional(&format!("users/{}?$select={}", identifier, USER_SELECT), PrincipalKind::User)
                .await;
        }

        if identifier.contains('@') {
            let by_upn = self
                .get_optional(
                    &format!("users/{}?$select={}", urlencoding::encode(identifier), USER_SELECT),
                    PrincipalKind::User,
                )
                .await?;
            if by_upn.is_some() {
                return Ok(by_upn);
            }
            debug!(identifier, "no UPN match, trying mail");
            return self
                .filter_first(
                    "users",
                    &format!("mail eq {}", odata_string(identifier)),
                    USER_SELECT,
                    PrincipalKind::User,
                    false,
                )
                .await;
        }

        let literal = odata_string(identifier);
        self.filter_first(
            "users",
            &format!(
                "userPrincipalName eq {} or onPremisesSamAccountName eq {}",
                literal, literal
            ),
            USER_SELECT,
            PrincipalKind::User,
            true,
        )
        .await
    }

    async fn resolve_device(&self, identifier: &str) -> Result<Option<Principal>> {
        if is_guid(identifier) {
            let by_object_id = self
                .get_optional(
                    &format!("devices/{}?$select={}", identifier, DEVICE_SELECT),
                    PrincipalKind::Device,
                )
                .await?;
            if by_object_id.is_some() {
                return Ok(by_object_id);
            }
            // Entra device ID, as shown in Intune, differs from the object id
            return self
                .filter_first(
                    "devices",
                    &format!("deviceId eq {}", odata_string(identifier)),
                    DEVICE_SELECT,
                    PrincipalKind::Device,
                    false,
                )
                .await;
        }

        self.filter_first(
            "devices",
            &format!("displayName eq {}", odata_string(identifier)),
            DEVICE_SELECT,
            PrincipalKind::Device,
            false,
        )
        .await
    }
}

#[async_trait]
impl DirectoryClient for GraphDirectory<'_> {
    async fn resolve_principal(
        &self,
        identifier: &str,
        kind: PrincipalKind,
    ) -> Result<Option<Principal>> {
        match kind {
            PrincipalKind::User => self.resolve_user(identifier).await,
            PrincipalKind::Device => self.resolve_device(identifier).await,
        }
    }

    async fn list_members(&self, group_id: &str, kind: PrincipalKind) -> Result<Vec<Principal>> {
        let select = match kind {
            PrincipalKind::User => USER_SELECT,
            PrincipalKind::Device => DEVICE_SELECT,
        };
        let objects: Vec<DirectoryObject> = self
            .client
            .get_all_pages(&format!(
                "groups/{}/members/{}?$select={}&$top=999",
                urlencoding::encode(group_id),
                kind.odata_cast(),
                select
            ))
            .await?;

        Ok(objects.into_iter().map(|o| o.into_principal(kind)).collect())
    }

    async fn add_member(&self, group_id: &str, principal_id: &str) -> Result<()> {
        let body = json!({
            "@odata.id": format!("{}/directoryObjects/{}", self.client.base_url(), principal_id)
        });
        self.client
            .post_no_content(
                &format!("groups/{}/members/$ref", urlencoding::encode(group_id)),
                &body,
            )
            .await
    }

    async fn remove_member(&self, group_id: &str, principal_id: &str) -> Result<()> {
        self.client
            .delete(&format!(
                "groups/{}/members/{}/$ref",
                urlencoding::encode(group_id),
                urlencoding::encode(principal_id)
            ))
            .await
    }
}
