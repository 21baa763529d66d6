use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::{Condition, ConditionSet, ConditionStatus, Dependents};

/// Bucket-notification event source. Owns a Topic and a PullSubscription;
/// their readiness feeds the aggregate Ready condition.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "sources.gevents.dev",
    version = "v1alpha1",
    kind = "StorageSource",
    plural = "storagesources",
    namespaced,
    status = "StorageSourceStatus"
)]
pub struct StorageSourceSpec {
    /// Bucket whose change notifications are routed into the topic.
    pub bucket: String,
    /// GCP project; falls back to the operator-wide project when omitted.
    pub project: Option<String>,
    /// URI events are delivered to.
    pub sink: String,
    /// Notification types to subscribe to; provider default when omitted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct StorageSourceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition<StorageSourceConditionType>>>,
    /// Resolved delivery URI, copied from the subscription once it is ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum StorageSourceConditionType {
    Ready,
    TopicReady,
    PullSubscriptionReady,
}

/// Sub-resources whose readiness the aggregate depends on, in reconcile
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageSourceDependent {
    Topic,
    PullSubscription,
}

impl Dependents for StorageSourceDependent {
    type Kind = StorageSourceConditionType;

    const ORDERED: &'static [Self] =
        &[Self::Topic, Self::PullSubscription];
    const READY: StorageSourceConditionType =
        StorageSourceConditionType::Ready;

    fn kind(self) -> StorageSourceConditionType {
        match self {
            Self::Topic => StorageSourceConditionType::TopicReady,
            Self::PullSubscription => {
                StorageSourceConditionType::PullSubscriptionReady
            }
        }
    }
}

impl StorageSourceStatus {
    fn condition_set(&mut self) -> ConditionSet<'_, StorageSourceDependent> {
        ConditionSet::new(self.conditions.get_or_insert_with(Vec::new))
    }

    /// Idempotent: entries already present (e.g. on a resource loaded from
    /// persisted state) are left untouched.
    pub fn initialize_conditions(&mut self) {
        self.condition_set().init();
    }

    pub fn mark_topic_ready(&mut self) {
        self.condition_set().mark_ready(StorageSourceDependent::Topic);
    }

    pub fn mark_topic_not_ready(&mut self, reason: &str, message: &str) {
        self.condition_set().mark_not_ready(
            StorageSourceDependent::Topic,
            reason,
            message,
        );
    }

    pub fn mark_topic_unknown(&mut self, reason: &str, message: &str) {
        self.condition_set().mark_unknown(
            StorageSourceDependent::Topic,
            reason,
            message,
        );
    }

    pub fn mark_pull_subscription_ready(&mut self) {
        self.condition_set()
            .mark_ready(StorageSourceDependent::PullSubscription);
    }

    pub fn mark_pull_subscription_not_ready(
        &mut self,
        reason: &str,
        message: &str,
    ) {
        self.condition_set().mark_not_ready(
            StorageSourceDependent::PullSubscription,
            reason,
            message,
        );
    }

    pub fn mark_pull_subscription_unknown(
        &mut self,
        reason: &str,
        message: &str,
    ) {
        self.condition_set().mark_unknown(
            StorageSourceDependent::PullSubscription,
            reason,
            message,
        );
    }

    pub fn is_ready(&self) -> bool {
        self.ready_condition()
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }

    pub fn ready_condition(
        &self,
    ) -> Option<&Condition<StorageSourceConditionType>> {
        self.conditions.as_ref().and_then(|cs| {
            cs.iter()
                .find(|c| c.type_ == StorageSourceConditionType::Ready)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_conditions_twice_keeps_marks() {
        let mut status = StorageSourceStatus::default();
        status.initialize_conditions();
        status.mark_topic_ready();
        status.initialize_conditions();
        let topic = status
            .conditions
            .as_ref()
            .unwrap()
            .iter()
            .find(|c| c.type_ == StorageSourceConditionType::TopicReady)
            .unwrap();
        assert_eq!(topic.status, ConditionStatus::True);
    }

    #[test]
    fn topic_failure_surfaces_regardless_of_subscription() {
        let mut status = StorageSourceStatus::default();
        status.initialize_conditions();
        status.mark_pull_subscription_ready();
        status.mark_topic_not_ready("TopicDeleted", "topic is gone");
        assert!(!status.is_ready());
        let ready = status.ready_condition().unwrap();
        assert_eq!(ready.reason.as_deref(), Some("TopicDeleted"));
        assert_eq!(ready.message.as_deref(), Some("topic is gone"));
    }

    #[test]
    fn both_dependents_ready_makes_source_ready() {
        let mut status = StorageSourceStatus::default();
        status.initialize_conditions();
        assert!(!status.is_ready());
        status.mark_topic_ready();
        status.mark_pull_subscription_ready();
        assert!(status.is_ready());
    }

    #[test]
    fn condition_serialization_shape_is_stable() {
        let mut status = StorageSourceStatus::default();
        status.initialize_conditions();
        status.mark_topic_not_ready("ReconcileFailed", "api unreachable");
        let v = serde_json::to_value(&status).unwrap();
        let topic = v["conditions"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["type"] == "TopicReady")
            .unwrap();
        assert_eq!(topic["status"], "False");
        assert_eq!(topic["reason"], "ReconcileFailed");
        assert!(topic.get("lastTransitionTime").is_some());
    }
}
