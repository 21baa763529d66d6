use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::Condition;

/// Declarative handle on a Pub/Sub pull subscription delivering into a sink.
/// Same collaborator contract as Topic: we create, the provisioner reports.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "internal.gevents.dev",
    version = "v1alpha1",
    kind = "PullSubscription",
    plural = "pullsubscriptions",
    namespaced,
    status = "PullSubscriptionStatus"
)]
pub struct PullSubscriptionSpec {
    /// GCP project the subscription lives in.
    pub project: Option<String>,
    /// Name of the Topic resource this subscription consumes.
    pub topic: String,
    /// URI events are delivered to.
    pub sink: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct PullSubscriptionStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition<PullSubscriptionConditionType>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Delivery URI as resolved by the provisioner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_uri: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum PullSubscriptionConditionType {
    Ready,
    #[serde(other)]
    Unknown,
}
