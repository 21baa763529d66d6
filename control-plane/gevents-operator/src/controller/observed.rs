use k8s_openapi::api::apps::v1::Deployment;

use crate::crd::conditions::{Condition, ConditionStatus};

/// Observed external state of one owned sub-resource, as fed into the mark
/// operations. Every observation maps to exactly one mark call.
#[derive(Clone, Debug, PartialEq)]
pub enum ChildReadiness {
    Ready,
    NotReady { reason: String, message: String },
    Unknown { reason: String, message: String },
}

/// Interpret a child's Ready condition. A missing status or condition list
/// means the provisioning controller has not looked at the child yet.
pub fn readiness_from_conditions<K: Copy + PartialEq>(
    conditions: Option<&Vec<Condition<K>>>,
    ready: K,
) -> ChildReadiness {
    let Some(cond) =
        conditions.and_then(|cs| cs.iter().find(|c| c.type_ == ready))
    else {
        return ChildReadiness::Unknown {
            reason: "PendingProvisioning".to_string(),
            message: "child has not reported a Ready condition yet"
                .to_string(),
        };
    };
    match cond.status {
        ConditionStatus::True => ChildReadiness::Ready,
        ConditionStatus::False => ChildReadiness::NotReady {
            reason: cond
                .reason
                .clone()
                .unwrap_or_else(|| "NotReady".to_string()),
            message: cond.message.clone().unwrap_or_default(),
        },
        ConditionStatus::Unknown => ChildReadiness::Unknown {
            reason: cond
                .reason
                .clone()
                .unwrap_or_else(|| "PendingProvisioning".to_string()),
            message: cond.message.clone().unwrap_or_default(),
        },
    }
}

/// Deployment readiness: at least one available replica (coarse).
pub fn deployment_available(dep: &Deployment) -> bool {
    dep.status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
        > 0
}
