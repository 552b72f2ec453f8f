use super::{DirectoryClient, MembershipIndex, Principal, PrincipalKind};
use crate::error::{EntractlError, Result};
use std::fmt;
use tracing::{debug, warn};

/// Desired bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
}

impl Operation {
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Remove => "remove",
        }
    }
}

/// Terminal state of one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStatus {
    Added,
    AlreadyMember,
    Removed,
    NotMember,
    NotFound,
    Failed,
}

impl ReconcileStatus {
    /// Tag printed in front of each report line
    pub fn tag(&self) -> &'static str {
        match self {
            ReconcileStatus::Added => "Added",
            ReconcileStatus::AlreadyMember => "Already",
            ReconcileStatus::Removed => "Removed",
            ReconcileStatus::NotMember => "Not mem",
            ReconcileStatus::NotFound => "Not found",
            ReconcileStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub identifier: String,
    pub resolved: Option<Principal>,
    pub status: ReconcileStatus,
    pub error_detail: Option<String>,
}

impl ReconcileOutcome {
    fn new(identifier: &str, resolved: Option<Principal>, status: ReconcileStatus) -> Self {
        Self {
            identifier: identifier.to_string(),
            resolved,
            status,
            error_detail: None,
        }
    }

    fn failed(identifier: &str, resolved: Option<Principal>, detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::new(identifier, resolved, ReconcileStatus::Failed)
        }
    }
}

/// Per-status counts over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub already_member: usize,
    pub removed: usize,
    pub not_member: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ReconcileOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.count(outcome.status);
        }
        summary
    }

    fn count(&mut self, status: ReconcileStatus) {
        let slot = match status {
            ReconcileStatus::Added => &mut self.added,
            ReconcileStatus::AlreadyMember => &mut self.already_member,
            ReconcileStatus::Removed => &mut self.removed,
            ReconcileStatus::NotMember => &mut self.not_member,
            ReconcileStatus::NotFound => &mut self.not_found,
            ReconcileStatus::Failed => &mut self.failed,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.added + self.already_member + self.removed + self.not_member + self.not_found + self.failed
    }

    /// Final tally line, e.g. `Added: 1 Already: 1 Failed: 0`
    pub fn line(&self, operation: Operation) -> String {
        match operation {
            Operation::Add => format!(
                "Added: {} Already: {} Failed: {}",
                self.added, self.already_member, self.failed
            ),
            Operation::Remove => format!(
                "Removed: {} Not mem: {} Failed: {}",
                self.removed, self.not_member, self.failed
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub operation: Operation,
    pub outcomes: Vec<ReconcileOutcome>,
    pub summary: ReconcileSummary,
}

impl ReconcileReport {
    pub fn statuses(&self) -> Vec<ReconcileStatus> {
        self.outcomes.iter().map(|o| o.status).collect()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary.line(self.operation))
    }
}

/// Bulk add/remove driver for one group
pub struct Reconciler<'a, D: DirectoryClient + ?Sized> {
    directory: &'a D,
    group_id: String,
    kind: PrincipalKind,
}

impl<'a, D: DirectoryClient + ?Sized> Reconciler<'a, D> {
    pub fn new(directory: &'a D, group_id: impl Into<String>, kind: PrincipalKind) -> Self {
        Self {
            directory,
            group_id: group_id.into(),
            kind,
        }
    }

    /// Snapshot the group's current members (the run's only list call)
    pub async fn build_index(&self) -> Result<MembershipIndex> {
        MembershipIndex::build(self.directory, &self.group_id, self.kind).await
    }

    pub async fn run(
        &self,
        index: &mut MembershipIndex,
        operation: Operation,
        identifiers: &[String],
    ) -> Result<ReconcileReport> {
        self.run_with(index, operation, identifiers, |_| {}).await
    }

    /// Process every identifier in order, calling `on_outcome` as each finishes.
    ///
    /// Fails only on an empty batch; per-identifier errors become `Failed`
    /// outcomes and the loop always runs to the end.
    pub async fn run_with<F>(
        &self,
        index: &mut MembershipIndex,
        operation: Operation,
        identifiers: &[String],
        mut on_outcome: F,
    ) -> Result<ReconcileReport>
    where
        F: FnMut(&ReconcileOutcome),
    {
        if identifiers.iter().all(|id| id.trim().is_empty()) {
            return Err(EntractlError::InvalidInput("No identifiers supplied".into()));
        }

        let mut outcomes = Vec::with_capacity(identifiers.len());

        for identifier in identifiers.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            let outcome = self.reconcile_one(index, operation, identifier).await;
            debug!(
                identifier,
                status = outcome.status.tag(),
                error = outcome.error_detail.as_deref(),
                "reconciled"
            );
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        let summary = ReconcileSummary::from_outcomes(&outcomes);
        Ok(ReconcileReport {
            operation,
            outcomes,
            summary,
        })
    }

    async fn reconcile_one(
        &self,
        index: &mut MembershipIndex,
        operation: Operation,
        identifier: &str,
    ) -> ReconcileOutcome {
        let principal = match self.directory.resolve_principal(identifier, self.kind).await {
            Ok(Some(principal)) => principal,
            Ok(None) => return ReconcileOutcome::new(identifier, None, ReconcileStatus::NotFound),
            Err(e) => {
                warn!(identifier, error = %e, "resolution failed");
                return ReconcileOutcome::failed(identifier, None, e.to_string());
            }
        };

        let Some(key) = principal.lookup_key() else {
            let detail = format!("{} has no lookup attribute to match against", principal.id);
            return ReconcileOutcome::failed(identifier, Some(principal), detail);
        };

        match operation {
            Operation::Add => {
                if index.contains(&key) {
                    return ReconcileOutcome::new(
                        identifier,
                        Some(principal),
                        ReconcileStatus::AlreadyMember,
                    );
                }
                match self.directory.add_member(&self.group_id, &principal.id).await {
                    Ok(()) => {
                        index.record(&key, &principal.id);
                        ReconcileOutcome::new(identifier, Some(principal), ReconcileStatus::Added)
                    }
                    Err(e) => ReconcileOutcome::failed(identifier, Some(principal), e.to_string()),
                }
            }
            Operation::Remove => {
                let Some(member_id) = index.get(&key).map(str::to_string) else {
                    return ReconcileOutcome::new(
                        identifier,
                        Some(principal),
                        ReconcileStatus::NotMember,
                    );
                };
                match self.directory.remove_member(&self.group_id, &member_id).await {
                    Ok(()) => {
                        index.forget(&key);
                        ReconcileOutcome::new(identifier, Some(principal), ReconcileStatus::Removed)
                    }
                    Err(e) => ReconcileOutcome::failed(identifier, Some(principal), e.to_string()),
                }
            }
        }
    }
}
