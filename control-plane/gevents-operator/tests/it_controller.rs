// Integration tests require a running Kubernetes cluster with the gevents
// CRDs applied (see the crdgen binary). Ignored by default.

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

use gevents_operator::config::{
    FeaturesConfig, OperatorConfig, ReconcileConfig,
};
use gevents_operator::crd::pull_subscription::PullSubscription;
use gevents_operator::crd::storage_source::{
    StorageSource, StorageSourceConditionType, StorageSourceSpec,
};
use gevents_operator::crd::topic::Topic;

mod common;
use common::{ControllerGuard, cleanup, uniq, wait_until};

fn test_config() -> OperatorConfig {
    OperatorConfig {
        profile: "dev".into(),
        http_port: 0,
        project: Some("test-project".into()),
        features: FeaturesConfig {
            brokercell_autoscaling: Some(false),
        },
        reconcile: ReconcileConfig {
            requeue_secs: 1,
            backoff_base_ms: 100,
            backoff_cap_secs: 5,
        },
    }
}

async fn mark_topic_provisioned(api: &Api<Topic>, name: &str) {
    let status = json!({
        "status": {
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": "2026-01-01T00:00:00Z"
            }],
            "project_id": "test-project",
            "topic_id": format!("storage-{name}")
        }
    });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&status))
        .await
        .expect("patch topic status");
}

async fn mark_subscription_provisioned(
    api: &Api<PullSubscription>,
    name: &str,
    sink: &str,
) {
    let status = json!({
        "status": {
            "conditions": [{
                "type": "Ready",
                "status": "True",
                "lastTransitionTime": "2026-01-01T00:00:00Z"
            }],
            "subscription_id": format!("sub-{name}"),
            "sink_uri": sink
        }
    });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&status))
        .await
        .expect("patch subscription status");
}

#[test_log::test(tokio::test)]
#[ignore]
async fn source_tracks_children_through_to_ready() {
    let client = Client::try_default().await.expect("kube client");
    let ns = "default";
    let name = uniq("gevents-it-src");

    let src_api: Api<StorageSource> = Api::namespaced(client.clone(), ns);
    let topic_api: Api<Topic> = Api::namespaced(client.clone(), ns);
    let sub_api: Api<PullSubscription> = Api::namespaced(client.clone(), ns);

    let source = StorageSource::new(
        &name,
        StorageSourceSpec {
            bucket: "test-bucket".into(),
            project: None,
            sink: "http://event-display.default.svc".into(),
            event_types: vec![],
        },
    );
    src_api
        .create(&PostParams::default(), &source)
        .await
        .expect("create StorageSource");

    let client_for_ctrl = client.clone();
    let ctrl = tokio::spawn(async move {
        let _ = gevents_operator::controller::run_controllers(
            client_for_ctrl,
            test_config(),
        )
        .await;
    });
    let _guard = ControllerGuard::new(ctrl);

    // Topic child appears first; the subscription waits on topic readiness.
    let topic_api_w = topic_api.clone();
    let topic_name = name.clone();
    assert!(
        wait_until(30, move || {
            let api = topic_api_w.clone();
            let name = topic_name.clone();
            async move { api.get_opt(&name).await.unwrap_or(None).is_some() }
        })
        .await,
        "expected Topic child created by controller"
    );

    // Source must not be ready while the topic is unprovisioned.
    let src = src_api.get(&name).await.expect("get source");
    let status = src.status.clone().unwrap_or_default();
    assert!(!status.is_ready(), "source ready before topic provisioned");

    // Act as the provisioning controller.
    mark_topic_provisioned(&topic_api, &name).await;

    let sub_api_w = sub_api.clone();
    let sub_name = name.clone();
    assert!(
        wait_until(30, move || {
            let api = sub_api_w.clone();
            let name = sub_name.clone();
            async move { api.get_opt(&name).await.unwrap_or(None).is_some() }
        })
        .await,
        "expected PullSubscription child after topic became ready"
    );
    mark_subscription_provisioned(
        &sub_api,
        &name,
        "http://event-display.default.svc",
    )
    .await;

    let src_api_w = src_api.clone();
    let src_name = name.clone();
    assert!(
        wait_until(30, move || {
            let api = src_api_w.clone();
            let name = src_name.clone();
            async move {
                api.get_opt(&name)
                    .await
                    .unwrap_or(None)
                    .and_then(|s| s.status)
                    .map(|st| st.is_ready())
                    .unwrap_or(false)
            }
        })
        .await,
        "expected aggregate Ready=True once both children are ready"
    );

    let src = src_api.get(&name).await.expect("get source");
    let status = src.status.unwrap();
    assert_eq!(status.topic_id.as_deref(), Some(&*format!("storage-{name}")));
    assert_eq!(
        status.sink_uri.as_deref(),
        Some("http://event-display.default.svc")
    );
    let conds = status.conditions.as_ref().unwrap();
    assert!(conds.iter().any(|c| {
        c.type_ == StorageSourceConditionType::PullSubscriptionReady
    }));

    cleanup(ns, &name, client.clone()).await;
}

#[test_log::test(tokio::test)]
#[ignore]
async fn deletion_waits_for_children_before_releasing_finalizer() {
    let client = Client::try_default().await.expect("kube client");
    let ns = "default";
    let name = uniq("gevents-it-fin");

    let src_api: Api<StorageSource> = Api::namespaced(client.clone(), ns);
    let topic_api: Api<Topic> = Api::namespaced(client.clone(), ns);

    let source = StorageSource::new(
        &name,
        StorageSourceSpec {
            bucket: "test-bucket".into(),
            project: None,
            sink: "http://sink.default.svc".into(),
            event_types: vec![],
        },
    );
    src_api
        .create(&PostParams::default(), &source)
        .await
        .expect("create StorageSource");

    let client_for_ctrl = client.clone();
    let ctrl = tokio::spawn(async move {
        let _ = gevents_operator::controller::run_controllers(
            client_for_ctrl,
            test_config(),
        )
        .await;
    });
    let _guard = ControllerGuard::new(ctrl);

    let topic_api_w = topic_api.clone();
    let topic_name = name.clone();
    assert!(
        wait_until(30, move || {
            let api = topic_api_w.clone();
            let name = topic_name.clone();
            async move { api.get_opt(&name).await.unwrap_or(None).is_some() }
        })
        .await,
        "expected Topic child before deletion"
    );

    let src = src_api.get(&name).await.expect("get source");
    assert!(
        src.finalizers().iter().any(|f| f == "gevents.dev/finalizer"),
        "finalizer must gate deletion"
    );

    src_api
        .delete(&name, &Default::default())
        .await
        .expect("delete source");

    // The source disappears only after its children are confirmed removed.
    let src_api_w = src_api.clone();
    let src_name = name.clone();
    assert!(
        wait_until(30, move || {
            let api = src_api_w.clone();
            let name = src_name.clone();
            async move { api.get_opt(&name).await.unwrap_or(None).is_none() }
        })
        .await,
        "expected source fully deleted after child cleanup"
    );
    assert!(
        topic_api.get_opt(&name).await.expect("get topic").is_none(),
        "topic child must be gone"
    );

    cleanup(ns, &name, client.clone()).await;
}
