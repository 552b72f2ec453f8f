use super::{normalize_key, DirectoryClient, Principal, PrincipalKind};
use crate::error::Result;
use std::collections::HashMap;
use tracing::debug;

/// Snapshot of a group's members keyed by normalized lookup key
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    members: HashMap<String, String>,
}

impl MembershipIndex {
    /// Enumerate the group once and index members of `kind`
    pub async fn build<D>(directory: &D, group_id: &str, kind: PrincipalKind) -> Result<Self>
    where
        D: DirectoryClient + ?Sized,
    {
        let members = directory.list_members(group_id, kind).await?;
        let index = Self::from_members(kind, members);
        debug!(group_id, kind = %kind, indexed = index.len(), "built membership index");
        Ok(index)
    }

    /// Index members of `kind`; others and members without a lookup key are skipped
    pub fn from_members(kind: PrincipalKind, members: impl IntoIterator<Item = Principal>) -> Self {
        let mut index = Self::default();

        for member in members {
            if member.kind != kind {
                continue;
            }
            match member.lookup_key() {
                Some(key) => {
                    index.members.insert(key, member.id);
                }
                None => debug!(id = %member.id, "member has no lookup attribute; not indexed"),
            }
        }

        index
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains_key(&normalize_key(key))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.members.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn record(&mut self, key: &str, id: &str) {
        self.members.insert(normalize_key(key), id.to_string());
    }

    pub fn forget(&mut self, key: &str) -> Option<String> {
        self.members.remove(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_members_skips_other_kinds_and_missing_keys() {
        let members = vec![
            Principal::user("u1", "A", Some("A@x.com")),
            Principal::user("u2", "No UPN", None),
            Principal::device("d1", "PC-1"),
        ];

        let index = MembershipIndex::from_members(PrincipalKind::User, members);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a@x.com"), Some("u1"));
        assert!(!index.contains("pc-1"));
    }

    #[test]
    fn test_lookups_are_case_insensitive() {
        let index = MembershipIndex::from_members(
            PrincipalKind::Device,
            vec![Principal::device("d1", "Kiosk-Lobby")],
        );
        assert!(index.contains("KIOSK-LOBBY"));
        assert!(index.contains(" kiosk-lobby "));
    }

    #[test]
    fn test_record_and_forget() {
        let mut index = MembershipIndex::from_members(PrincipalKind::User, Vec::new());
        assert!(index.is_empty());

        index.record("C@x.com", "u3");
        assert_eq!(index.get("c@x.com"), Some("u3"));

        assert_eq!(index.forget("c@X.com").as_deref(), Some("u3"));
        assert!(!index.contains("c@x.com"));
        assert_eq!(index.forget("c@x.com"), None);
    }
}
