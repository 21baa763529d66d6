use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::crd::pull_subscription::{
    PullSubscription, PullSubscriptionConditionType, PullSubscriptionSpec,
};
use crate::crd::storage_source::StorageSource;
use crate::crd::topic::{Topic, TopicConditionType, TopicSpec};

use super::events::{REASON_RECONCILED, build_obj_ref, emit_event};
use super::observed::{ChildReadiness, readiness_from_conditions};
use super::status::{merge_status, should_patch_status};
use super::{
    ControllerContext, FIELD_MANAGER, FINALIZER, REASON_INVALID_SPEC,
    REASON_RECONCILE_FAILED, ReconcileErr, into_internal, owner_labels,
};

const SOURCE_API_VERSION: &str = "sources.gevents.dev/v1alpha1";
const SOURCE_KIND: &str = "StorageSource";

/// Why an ensure-child call failed, deciding retry behavior.
enum ChildError {
    Transient(String),
    Invalid(String),
}

fn classify_api_error(e: kube::Error) -> ChildError {
    match &e {
        kube::Error::Api(resp) if resp.code == 400 || resp.code == 422 => {
            ChildError::Invalid(resp.message.clone())
        }
        _ => ChildError::Transient(e.to_string()),
    }
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<StorageSource>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let src_api: Api<StorageSource> = Api::namespaced(ctx.client.clone(), &ns);

    if obj.meta().deletion_timestamp.is_some() {
        return finalize(&ctx, &src_api, &ns, &name).await;
    }
    ensure_finalizer(&src_api, &obj, &name).await?;

    let mut status = obj.status.clone().unwrap_or_default();
    status.initialize_conditions();
    status.observed_generation = obj.meta().generation;

    let mut progressing = false;
    let mut transient: Option<String> = None;
    let mut terminal: Option<String> = None;

    // Topic first; the subscription is only attempted once it reports Ready.
    let mut topic_ready = false;
    match ensure_topic(&ctx, &obj, &ns, &name).await {
        Ok(topic) => match readiness_from_conditions(
            topic.status.as_ref().and_then(|s| s.conditions.as_ref()),
            TopicConditionType::Ready,
        ) {
            ChildReadiness::Ready => {
                status.mark_topic_ready();
                if let Some(ts) = topic.status.as_ref() {
                    status.project_id = ts.project_id.clone();
                    status.topic_id = ts.topic_id.clone();
                }
                topic_ready = true;
            }
            ChildReadiness::NotReady { reason, message } => {
                status.mark_topic_not_ready(&reason, &message);
                progressing = true;
            }
            ChildReadiness::Unknown { reason, message } => {
                status.mark_topic_unknown(&reason, &message);
                progressing = true;
            }
        },
        Err(ChildError::Invalid(msg)) => {
            warn!(%msg, "topic spec rejected; awaiting user correction");
            status.mark_topic_not_ready(REASON_INVALID_SPEC, &msg);
            terminal = Some(msg);
        }
        Err(ChildError::Transient(msg)) => {
            status.mark_topic_not_ready(REASON_RECONCILE_FAILED, &msg);
            transient = Some(msg);
        }
    }

    if topic_ready {
        match ensure_pull_subscription(&ctx, &obj, &ns, &name).await {
            Ok(sub) => match readiness_from_conditions(
                sub.status.as_ref().and_then(|s| s.conditions.as_ref()),
                PullSubscriptionConditionType::Ready,
            ) {
                ChildReadiness::Ready => {
                    status.mark_pull_subscription_ready();
                    let observed_sink = sub
                        .status
                        .as_ref()
                        .and_then(|ss| ss.sink_uri.clone());
                    status.sink_uri =
                        observed_sink.or_else(|| Some(obj.spec.sink.clone()));
                    status.subscription_id = sub
                        .status
                        .as_ref()
                        .and_then(|ss| ss.subscription_id.clone());
                }
                ChildReadiness::NotReady { reason, message } => {
                    status.mark_pull_subscription_not_ready(&reason, &message);
                    progressing = true;
                }
                ChildReadiness::Unknown { reason, message } => {
                    status.mark_pull_subscription_unknown(&reason, &message);
                    progressing = true;
                }
            },
            Err(ChildError::Invalid(msg)) => {
                warn!(%msg, "subscription spec rejected; awaiting user correction");
                status
                    .mark_pull_subscription_not_ready(REASON_INVALID_SPEC, &msg);
                terminal = Some(msg);
            }
            Err(ChildError::Transient(msg)) => {
                status.mark_pull_subscription_not_ready(
                    REASON_RECONCILE_FAILED,
                    &msg,
                );
                transient = Some(msg);
            }
        }
    }

    // A deletion that raced this pass wins: divert to finalization instead
    // of writing status for an object on its way out.
    match src_api.get_opt(&name).await.map_err(into_internal)? {
        None => return Ok(Action::await_change()),
        Some(fresh) if fresh.meta().deletion_timestamp.is_some() => {
            info!("deletion observed mid-pass; switching to finalization");
            return finalize(&ctx, &src_api, &ns, &name).await;
        }
        Some(_) => {}
    }

    let merged = merge_status(obj.status.as_ref(), status);
    let ready = merged.is_ready();
    if should_patch_status(obj.status.as_ref(), &merged) {
        let patch = json!({ "status": merged });
        src_api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(into_internal)?;
        emit_event(
            &ctx.recorder,
            &build_obj_ref(
                SOURCE_API_VERSION,
                SOURCE_KIND,
                &ns,
                &name,
                obj.meta().uid.as_deref(),
            ),
            REASON_RECONCILED,
            "Reconcile",
            Some(format!("Reconciled StorageSource {} (ready={})", name, ready)),
        )
        .await;
    }

    if let Some(msg) = transient {
        return Err(ReconcileErr::Transient(msg));
    }
    if let Some(msg) = terminal {
        // Surfaced through error_policy, which waits for user correction.
        return Err(ReconcileErr::InvalidConfig(msg));
    }
    if progressing {
        return Ok(Action::requeue(Duration::from_secs(
            ctx.cfg.reconcile.requeue_secs,
        )));
    }
    // Ready: level-triggered, wait for changes.
    Ok(Action::await_change())
}

async fn ensure_finalizer(
    src_api: &Api<StorageSource>,
    obj: &StorageSource,
    name: &str,
) -> Result<(), ReconcileErr> {
    let present = obj
        .meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|x| x == FINALIZER))
        .unwrap_or(false);
    if present {
        return Ok(());
    }
    info!("adding finalizer");
    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());
    let patch = json!({"metadata": {"finalizers": finalizers}});
    src_api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(into_internal)?;
    Ok(())
}

/// Delete owned children and remove the finalizer only once both are
/// confirmed gone. While anything lingers the finalizer stays and the pass
/// requeues.
async fn finalize(
    ctx: &ControllerContext,
    src_api: &Api<StorageSource>,
    ns: &str,
    name: &str,
) -> Result<Action, ReconcileErr> {
    let topic_api: Api<Topic> = Api::namespaced(ctx.client.clone(), ns);
    let sub_api: Api<PullSubscription> =
        Api::namespaced(ctx.client.clone(), ns);

    let _ = topic_api.delete(name, &Default::default()).await;
    let _ = sub_api.delete(name, &Default::default()).await;

    let topic_gone = topic_api
        .get_opt(name)
        .await
        .map_err(into_internal)?
        .is_none();
    let sub_gone = sub_api
        .get_opt(name)
        .await
        .map_err(into_internal)?
        .is_none();
    if !(topic_gone && sub_gone) {
        info!(topic_gone, sub_gone, "children still terminating; keeping finalizer");
        return Ok(Action::requeue(Duration::from_secs(
            ctx.cfg.reconcile.requeue_secs,
        )));
    }

    let Some(obj) = src_api.get_opt(name).await.map_err(into_internal)? else {
        return Ok(Action::await_change());
    };
    if obj
        .meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|x| x == FINALIZER))
        .unwrap_or(false)
    {
        info!("children removed; releasing finalizer");
        let finalizers = obj
            .meta()
            .finalizers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != FINALIZER)
            .collect::<Vec<_>>();
        let patch = json!({"metadata": {"finalizers": finalizers}});
        src_api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(into_internal)?;
    }
    Ok(Action::await_change())
}

async fn ensure_topic(
    ctx: &ControllerContext,
    obj: &StorageSource,
    ns: &str,
    name: &str,
) -> Result<Topic, ChildError> {
    let mut desired = Topic::new(
        name,
        TopicSpec {
            project: obj
                .spec
                .project
                .clone()
                .or_else(|| ctx.cfg.project.clone()),
            topic: format!("storage-{}", name),
        },
    );
    desired.metadata.namespace = Some(ns.to_string());
    desired.metadata.labels = Some(owner_labels(name));
    desired.metadata.owner_references =
        obj.controller_owner_ref(&()).map(|o| vec![o]);

    let api: Api<Topic> = Api::namespaced(ctx.client.clone(), ns);
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    let manifest =
        serde_json::to_value(&desired).map_err(|e| ChildError::Invalid(e.to_string()))?;
    api.patch(name, &pp, &Patch::Apply(&manifest))
        .await
        .map_err(classify_api_error)
}

async fn ensure_pull_subscription(
    ctx: &ControllerContext,
    obj: &StorageSource,
    ns: &str,
    name: &str,
) -> Result<PullSubscription, ChildError> {
    let mut desired = PullSubscription::new(
        name,
        PullSubscriptionSpec {
            project: obj
                .spec
                .project
                .clone()
                .or_else(|| ctx.cfg.project.clone()),
            topic: name.to_string(),
            sink: obj.spec.sink.clone(),
        },
    );
    desired.metadata.namespace = Some(ns.to_string());
    desired.metadata.labels = Some(owner_labels(name));
    desired.metadata.owner_references =
        obj.controller_owner_ref(&()).map(|o| vec![o]);

    let api: Api<PullSubscription> = Api::namespaced(ctx.client.clone(), ns);
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    let manifest =
        serde_json::to_value(&desired).map_err(|e| ChildError::Invalid(e.to_string()))?;
    api.patch(name, &pp, &Patch::Apply(&manifest))
        .await
        .map_err(classify_api_error)
}

// Readiness translation and condition aggregation are unit tested with their
// modules; reconcile itself is exercised by the cluster-backed tests in
// tests/.
