//! Intune managed device remote actions

use crate::error::Result;
use crate::graph::directory::odata_string;
use crate::graph::{GraphClient, PaginatedResponse};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::debug;

/// Remote action dispatched to a managed device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Sync,
    Reboot,
}

impl DeviceAction {
    /// Graph action segment under `managedDevices/{id}`
    pub fn endpoint_segment(&self) -> &'static str {
        match self {
            DeviceAction::Sync => "syncDevice",
            DeviceAction::Reboot => "rebootNow",
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAction::Sync => f.write_str("sync"),
            DeviceAction::Reboot => f.write_str("reboot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceActionStatus {
    Succeeded,
    NotFound,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DeviceActionOutcome {
    pub device_name: String,
    pub device_id: Option<String>,
    pub status: DeviceActionStatus,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceActionSummary {
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl DeviceActionSummary {
    pub fn from_outcomes(outcomes: &[DeviceActionOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome.status {
                DeviceActionStatus::Succeeded => summary.succeeded += 1,
                DeviceActionStatus::NotFound => summary.not_found += 1,
                DeviceActionStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn line(&self) -> String {
        format!(
            "Succeeded: {} Not found: {} Failed: {}",
            self.succeeded, self.not_found, self.failed
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDevice {
    pub id: String,
    pub device_name: String,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub last_sync_date_time: Option<String>,
}

pub struct DeviceActions<'a> {
    client: &'a GraphClient,
}

impl<'a> DeviceActions<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        Self { client }
    }

    /// Managed devices whose name matches exactly; duplicates are common for re-enrolled hardware
    pub async fn find_by_name(&self, device_name: &str) -> Result<Vec<ManagedDevice>> {
        let filter = format!("deviceName eq {}", odata_string(device_name));
        let page: PaginatedResponse<ManagedDevice> = self
            .client
            .get(&format!(
                "deviceManagement/managedDevices?$filter={}&$select=id,deviceName,operatingSystem,userPrincipalName,lastSyncDateTime",
                urlencoding::encode(&filter)
            ))
            .await?;
        Ok(page.value)
    }

    pub async fn dispatch(&self, device_id: &str, action: DeviceAction) -> Result<()> {
        self.client
            .post_no_content(
                &format!(
                    "deviceManagement/managedDevices/{}/{}",
                    urlencoding::encode(device_id),
                    action.endpoint_segment()
                ),
                &json!({}),
            )
            .await
    }

    /// Dispatch `action` to every managed device matching each name, in order.
    ///
    /// One outcome per matched device (or one `NotFound` per unmatched name);
    /// errors are recorded and the batch continues.
    pub async fn run_batch<F>(
        &self,
        device_names: &[String],
        action: DeviceAction,
        mut on_outcome: F,
    ) -> Vec<DeviceActionOutcome>
    where
        F: FnMut(&DeviceActionOutcome),
    {
        let mut outcomes = Vec::new();

        for name in device_names {
            let mut emit = |outcome: DeviceActionOutcome| {
                debug!(device = %outcome.device_name, status = ?outcome.status, "device action");
                on_outcome(&outcome);
                outcomes.push(outcome);
            };

            let devices = match self.find_by_name(name).await {
                Ok(devices) => devices,
                Err(e) => {
                    emit(DeviceActionOutcome {
                        device_name: name.clone(),
                        device_id: None,
                        status: DeviceActionStatus::Failed,
                        error_detail: Some(e.to_string()),
                    });
                    continue;
                }
            };

            if devices.is_empty() {
                emit(DeviceActionOutcome {
                    device_name: name.clone(),
                    device_id: None,
                    status: DeviceActionStatus::NotFound,
                    error_detail: None,
                });
                continue;
            }

            for device in devices {
                let result = self.dispatch(&device.id, action).await;
                emit(DeviceActionOutcome {
                    device_name: device.device_name,
                    device_id: Some(device.id),
                    status: if result.is_ok() {
                        DeviceActionStatus::Succeeded
                    } else {
                        DeviceActionStatus::Failed
                    },
                    error_detail: result.err().map(|e| e.to_string()),
                });
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_segments() {
        assert_eq!(DeviceAction::Sync.endpoint_segment(), "syncDevice");
        assert_eq!(DeviceAction::Reboot.endpoint_segment(), "rebootNow");
        assert_eq!(DeviceAction::Reboot.to_string(), "reboot");
    }

    #[test]
    fn test_summary_line() {
        let outcome = |status| DeviceActionOutcome {
            device_name: "PC".into(),
            device_id: None,
            status,
            error_detail: None,
        };
        let summary = DeviceActionSummary::from_outcomes(&[
            outcome(DeviceActionStatus::Succeeded),
            outcome(DeviceActionStatus::Succeeded),
            outcome(DeviceActionStatus::NotFound),
        ]);
        assert_eq!(summary.line(), "Succeeded: 2 Not found: 1 Failed: 0");
    }
}
