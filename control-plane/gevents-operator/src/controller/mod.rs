use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::events::{Recorder, Reporter};
use kube::runtime::{Controller, watcher::Config};
use kube::{Api, Client, ResourceExt};
use tracing::{error, info};

use crate::config::OperatorConfig;
use crate::crd::broker_cell::BrokerCell;
use crate::crd::storage_source::StorageSource;

pub mod autoscaling;
pub mod brokercell;
pub mod events;
pub mod observed;
pub mod status;
pub mod storage_source;

pub const FINALIZER: &str = "gevents.dev/finalizer";
pub const FIELD_MANAGER: &str = "gevents-operator";

pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    /// Dependency or API hiccup; the pass is retried with backoff.
    #[error("transient dependency failure: {0}")]
    Transient(String),
    /// Needs user correction; no automatic retry.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub(crate) fn into_internal<E: std::fmt::Display>(e: E) -> ReconcileErr {
    ReconcileErr::Internal(e.to_string())
}

pub fn owner_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("gevents.dev/owner".to_string(), name.to_string());
    labels
}

/// Exponential requeue delays per object key, reset after a clean pass.
pub struct BackoffTracker {
    base: Duration,
    cap: Duration,
    attempts: Mutex<HashMap<String, u32>>,
}

impl BackoffTracker {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_delay(&self, key: &str) -> Duration {
        let mut attempts =
            self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let attempt = attempts.entry(key.to_string()).or_insert(0);
        *attempt += 1;
        let shift = (*attempt - 1).min(16);
        self.base.saturating_mul(1u32 << shift).min(self.cap)
    }

    pub fn reset(&self, key: &str) {
        let mut attempts =
            self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.remove(key);
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub recorder: Recorder,
    pub backoff: Arc<BackoffTracker>,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: OperatorConfig) -> Self {
        let recorder = Recorder::new(
            client.clone(),
            Reporter {
                controller: FIELD_MANAGER.to_string(),
                instance: None,
            },
        );
        let backoff = Arc::new(BackoffTracker::new(
            Duration::from_millis(cfg.reconcile.backoff_base_ms),
            Duration::from_secs(cfg.reconcile.backoff_cap_secs),
        ));
        Self {
            client,
            cfg,
            recorder,
            backoff,
        }
    }
}

fn error_policy<K: ResourceExt>(
    obj: Arc<K>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    match err {
        ReconcileErr::InvalidConfig(_) => Action::await_change(),
        _ => {
            let key = format!(
                "{}/{}",
                obj.namespace().unwrap_or_default(),
                obj.name_any()
            );
            Action::requeue(ctx.backoff.next_delay(&key))
        }
    }
}

/// Run the StorageSource controller and, when enabled, the BrokerCell
/// autoscaling controller, until either stream ends.
pub async fn run_controllers(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let ctx = Arc::new(ControllerContext::new(client.clone(), cfg));

    let src_api: Api<StorageSource> = Api::all(client.clone());
    let src_ctx = ctx.clone();
    let sources = Controller::new(src_api, Config::default())
        .run(storage_source::reconcile, error_policy, ctx.clone())
        .for_each(move |res| {
            let ctx = src_ctx.clone();
            async move {
                match res {
                    Ok((oref, action)) => {
                        ctx.backoff.reset(&format!(
                            "{}/{}",
                            oref.namespace.clone().unwrap_or_default(),
                            oref.name
                        ));
                        info!(?oref, "reconciled source: requeue={:?}", action);
                    }
                    Err(e) => error!(error = ?e, "source reconcile error"),
                }
            }
        });

    if !ctx.cfg.features.brokercell_autoscaling.unwrap_or(true) {
        info!("brokercell autoscaling disabled; running source controller only");
        sources.await;
        return Ok(());
    }

    let cell_api: Api<BrokerCell> = Api::all(client.clone());
    let cell_ctx = ctx.clone();
    let cells = Controller::new(cell_api, Config::default())
        .run(brokercell::reconcile, error_policy, ctx.clone())
        .for_each(move |res| {
            let ctx = cell_ctx.clone();
            async move {
                match res {
                    Ok((oref, action)) => {
                        ctx.backoff.reset(&format!(
                            "{}/{}",
                            oref.namespace.clone().unwrap_or_default(),
                            oref.name
                        ));
                        info!(?oref, "reconciled cell: requeue={:?}", action);
                    }
                    Err(e) => error!(error = ?e, "cell reconcile error"),
                }
            }
        });

    tokio::join!(sources, cells);
    Ok(())
}
