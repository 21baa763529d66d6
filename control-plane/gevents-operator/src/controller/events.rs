use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};

pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_AUTOSCALER_APPLIED: &str = "AutoscalerApplied";

pub fn build_obj_ref(
    api_version: &str,
    kind: &str,
    ns: &str,
    name: &str,
    uid: Option<&str>,
) -> ObjectReference {
    ObjectReference {
        api_version: Some(api_version.to_string()),
        kind: Some(kind.to_string()),
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        uid: uid.map(String::from),
        ..Default::default()
    }
}

pub async fn emit_event(
    recorder: &Recorder,
    obj_ref: &ObjectReference,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let _ = recorder
        .publish(
            &Event {
                type_: EventType::Normal,
                reason: reason.into(),
                note,
                action: action.into(),
                secondary: None,
            },
            obj_ref,
        )
        .await;
}
