#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::Client;
use kube::api::Api;
use tokio::task::JoinHandle;

use gevents_operator::crd::broker_cell::BrokerCell;
use gevents_operator::crd::pull_subscription::PullSubscription;
use gevents_operator::crd::storage_source::StorageSource;
use gevents_operator::crd::topic::Topic;

// Numeric suffixes keep generated names DNS-1123 safe.
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

/// Poll `check` until it returns true or attempts run out.
pub async fn wait_until<F, Fut>(attempts: usize, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..attempts {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    false
}

/// Best-effort cleanup of a source, its children, and any brokercell
/// leftovers sharing the test name.
pub async fn cleanup(ns: &str, name: &str, client: Client) {
    let src_api: Api<StorageSource> = Api::namespaced(client.clone(), ns);
    let topic_api: Api<Topic> = Api::namespaced(client.clone(), ns);
    let sub_api: Api<PullSubscription> = Api::namespaced(client.clone(), ns);
    let cell_api: Api<BrokerCell> = Api::namespaced(client.clone(), ns);
    let dep_api: Api<Deployment> = Api::namespaced(client.clone(), ns);
    let hpa_api: Api<HorizontalPodAutoscaler> =
        Api::namespaced(client.clone(), ns);

    let _ = src_api.delete(name, &Default::default()).await;
    let _ = topic_api.delete(name, &Default::default()).await;
    let _ = sub_api.delete(name, &Default::default()).await;
    let _ = cell_api.delete(name, &Default::default()).await;
    for component in ["ingress", "fanout"] {
        let dep_name = format!("{name}-brokercell-{component}");
        let _ = hpa_api
            .delete(&format!("{dep_name}-hpa"), &Default::default())
            .await;
        let _ = dep_api.delete(&dep_name, &Default::default()).await;
    }
}

/// Aborts the spawned controller task on drop; call [`cleanup`] afterwards.
pub struct ControllerGuard {
    handle: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}
