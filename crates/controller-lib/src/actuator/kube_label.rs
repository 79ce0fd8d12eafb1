//! Node capacity labels through the Kubernetes API

use super::LabelClient;
use crate::error::{ControllerError, Result};
use crate::models::CapacityLabel;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, Patch, PatchParams};
use std::time::Duration;

/// Label key used when none is configured
pub const DEFAULT_LABEL_KEY: &str = "usage";

/// Label client that merge-patches `metadata.labels` on the `Node` object
///
/// A merge patch overwrites any existing value for the key, so repeating the
/// same label is a no-op on the cluster side.
#[derive(Clone)]
pub struct KubeLabelClient {
    api: Api<Node>,
    label_key: String,
    timeout: Duration,
}

impl KubeLabelClient {
    pub fn new(client: kube::Client, label_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api: Api::all(client),
            label_key: label_key.into(),
            timeout,
        }
    }
}

/// Merge patch body setting a single label
pub fn label_patch(key: &str, label: CapacityLabel) -> serde_json::Value {
    let mut labels = serde_json::Map::new();
    labels.insert(
        key.to_string(),
        serde_json::Value::String(label.as_str().to_string()),
    );
    serde_json::json!({ "metadata": { "labels": labels } })
}

#[async_trait]
impl LabelClient for KubeLabelClient {
    async fn set_label(&self, node_id: &str, label: CapacityLabel) -> Result<()> {
        let patch = label_patch(&self.label_key, label);
        let params = PatchParams::default();

        match tokio::time::timeout(
            self.timeout,
            self.api.patch(node_id, &params, &Patch::Merge(&patch)),
        )
        .await
        {
            Err(_) => Err(ControllerError::Timeout {
                operation: "label node".to_string(),
                node: node_id.to_string(),
                timeout: self.timeout,
            }),
            Ok(Err(source)) => Err(ControllerError::Kube {
                node: node_id.to_string(),
                source,
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }
}
