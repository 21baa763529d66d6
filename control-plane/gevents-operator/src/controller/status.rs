use serde::Serialize;
use serde_json::{Value, json};
use tracing::trace;

use crate::crd::storage_source::StorageSourceStatus;

/// Merge `desired` into `current`, keeping denormalized fields a pass did not
/// recompute. Conditions are always taken from `desired`; the mark machinery
/// already preserved transition times for unchanged entries.
pub fn merge_status(
    current: Option<&StorageSourceStatus>,
    mut desired: StorageSourceStatus,
) -> StorageSourceStatus {
    if let Some(cur) = current {
        if desired.sink_uri.is_none() {
            desired.sink_uri = cur.sink_uri.clone();
        }
        if desired.project_id.is_none() {
            desired.project_id = cur.project_id.clone();
        }
        if desired.topic_id.is_none() {
            desired.topic_id = cur.topic_id.clone();
        }
        if desired.subscription_id.is_none() {
            desired.subscription_id = cur.subscription_id.clone();
        }
    }
    desired
}

/// Patch only on material change, so timestamp-only churn does not feed the
/// watch stream back into the reconciler.
pub fn should_patch_status<S: Serialize>(
    current: Option<&S>,
    desired: &S,
) -> bool {
    match current {
        None => true,
        Some(cur) => {
            let differs = normalize(cur) != normalize(desired);
            if !differs {
                trace!("status unchanged; skipping patch");
            }
            differs
        }
    }
}

fn normalize<S: Serialize>(status: &S) -> Value {
    let mut v = serde_json::to_value(status).unwrap_or_else(|_| json!({}));
    if let Value::Object(ref mut map) = v {
        if let Some(Value::Array(conds)) = map.get_mut("conditions") {
            for c in conds.iter_mut() {
                if let Some(obj) = c.as_object_mut() {
                    obj.remove("lastTransitionTime");
                }
            }
        }
    }
    v
}
