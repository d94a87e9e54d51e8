//! Parsing of `kubectl get pods -o json`.

use serde::Deserialize;

use crate::readiness::WorkloadStatus;

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodMetadata {
    name: String,
    #[serde(default)]
    deletion_timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    conditions: Vec<PodCondition>,
}

#[derive(Debug, Deserialize)]
struct PodCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl Pod {
    fn is_ready(&self) -> bool {
        self.metadata.deletion_timestamp.is_none()
            && self.status.phase.as_deref() == Some("Running")
            && self
                .status
                .conditions
                .iter()
                .any(|condition| condition.kind == "Ready" && condition.status == "True")
    }
}

/// Parses a pod listing into workload statuses, preserving order.
pub(crate) fn parse_pod_list(raw: &[u8]) -> Result<Vec<WorkloadStatus>, serde_json::Error> {
    let list: PodList = serde_json::from_slice(raw)?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| WorkloadStatus {
            ready: pod.is_ready(),
            name: pod.metadata.name,
        })
        .collect())
}
