use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::Condition;

/// Declarative handle on a Pub/Sub topic. Instances are created by source
/// reconcilers; the provisioning controller owns the status.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "internal.gevents.dev",
    version = "v1alpha1",
    kind = "Topic",
    plural = "topics",
    namespaced,
    status = "TopicStatus"
)]
pub struct TopicSpec {
    /// GCP project the topic lives in.
    pub project: Option<String>,
    /// Topic identifier on the provider side.
    pub topic: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct TopicStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition<TopicConditionType>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
}

/// The provisioner may publish additional condition types; only Ready is
/// interpreted here.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum TopicConditionType {
    Ready,
    #[serde(other)]
    Unknown,
}
