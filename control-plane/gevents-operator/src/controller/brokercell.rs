use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::crd::broker_cell::{
    BrokerCell, BrokerCellDependent, ComponentParameters,
};

use super::autoscaling::{AutoscalingArgs, make_horizontal_pod_autoscaler};
use super::events::{REASON_AUTOSCALER_APPLIED, build_obj_ref, emit_event};
use super::observed::deployment_available;
use super::status::should_patch_status;
use super::{
    ControllerContext, FIELD_MANAGER, REASON_RECONCILE_FAILED, ReconcileErr,
    into_internal,
};

const CELL_API_VERSION: &str = "internal.gevents.dev/v1alpha1";
const CELL_KIND: &str = "BrokerCell";

pub fn component_deployment_name(
    cell: &str,
    dep: BrokerCellDependent,
) -> String {
    format!("{}-brokercell-{}", cell, dep.component())
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<BrokerCell>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let cell_api: Api<BrokerCell> = Api::namespaced(ctx.client.clone(), &ns);

    // No finalizer: autoscalers are cluster objects garbage-collected
    // through their owner references.
    if obj.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let mut status = obj.status.clone().unwrap_or_default();
    status.initialize_conditions();
    status.observed_generation = obj.meta().generation;

    let components = [
        (BrokerCellDependent::Ingress, obj.spec.components.ingress.clone()),
        (BrokerCellDependent::Fanout, obj.spec.components.fanout.clone()),
    ];

    let mut progressing = false;
    let mut transient: Option<String> = None;
    let mut terminal: Option<String> = None;
    for (dep, params) in components {
        match reconcile_component(&ctx, &obj, &ns, &name, dep, params).await {
            ComponentOutcome::Ready => status.mark_component_ready(dep),
            ComponentOutcome::Progressing { reason, message } => {
                status.mark_component_not_ready(dep, &reason, &message);
                progressing = true;
            }
            ComponentOutcome::Invalid { message } => {
                warn!(component = dep.component(), %message, "invalid autoscaling policy");
                status.mark_component_not_ready(
                    dep,
                    "InvalidAutoscaling",
                    &message,
                );
                terminal = Some(message);
            }
            ComponentOutcome::Transient { message } => {
                status.mark_component_not_ready(
                    dep,
                    REASON_RECONCILE_FAILED,
                    &message,
                );
                transient = Some(message);
            }
        }
    }

    if should_patch_status(obj.status.as_ref(), &status) {
        let ready = status.is_ready();
        let patch = json!({ "status": status });
        cell_api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(into_internal)?;
        info!(ready, "brokercell status updated");
    }

    if let Some(msg) = transient {
        return Err(ReconcileErr::Transient(msg));
    }
    if let Some(msg) = terminal {
        return Err(ReconcileErr::InvalidConfig(msg));
    }
    if progressing {
        return Ok(Action::requeue(Duration::from_secs(
            ctx.cfg.reconcile.requeue_secs,
        )));
    }
    Ok(Action::await_change())
}

enum ComponentOutcome {
    Ready,
    Progressing { reason: String, message: String },
    Invalid { message: String },
    Transient { message: String },
}

/// One component: observe its deployment, derive the autoscaler from the
/// declared policy, apply it, and fold the result into a single mark.
async fn reconcile_component(
    ctx: &ControllerContext,
    obj: &BrokerCell,
    ns: &str,
    name: &str,
    dep: BrokerCellDependent,
    params: Option<ComponentParameters>,
) -> ComponentOutcome {
    let params = params.unwrap_or_default();
    let deployment_name = component_deployment_name(name, dep);

    let dep_api: Api<Deployment> = Api::namespaced(ctx.client.clone(), ns);
    let deployment = match dep_api.get_opt(&deployment_name).await {
        Ok(Some(d)) => d,
        Ok(None) => {
            return ComponentOutcome::Progressing {
                reason: "DeploymentMissing".to_string(),
                message: format!("deployment {} not found", deployment_name),
            };
        }
        Err(e) => {
            return ComponentOutcome::Transient {
                message: e.to_string(),
            };
        }
    };

    let Some(owner) = obj.controller_owner_ref(&()) else {
        // Freshly created objects can be observed before the server fills
        // in a uid; the next pass will see it.
        return ComponentOutcome::Progressing {
            reason: "OwnerPending".to_string(),
            message: "brokercell has no uid yet".to_string(),
        };
    };
    let args = match AutoscalingArgs::from_policy(
        &params,
        owner,
        dep.component(),
    ) {
        Ok(args) => args,
        Err(e) => {
            return ComponentOutcome::Invalid {
                message: e.to_string(),
            };
        }
    };

    let hpa = make_horizontal_pod_autoscaler(&deployment_name, ns, &args);
    let hpa_name = format!("{}-hpa", deployment_name);
    let hpa_api: Api<HorizontalPodAutoscaler> =
        Api::namespaced(ctx.client.clone(), ns);
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    let manifest = match serde_json::to_value(&hpa) {
        Ok(v) => v,
        Err(e) => {
            return ComponentOutcome::Transient {
                message: e.to_string(),
            };
        }
    };
    if let Err(e) = hpa_api.patch(&hpa_name, &pp, &Patch::Apply(&manifest)).await
    {
        return ComponentOutcome::Transient {
            message: e.to_string(),
        };
    }
    emit_event(
        &ctx.recorder,
        &build_obj_ref(
            CELL_API_VERSION,
            CELL_KIND,
            ns,
            name,
            obj.meta().uid.as_deref(),
        ),
        REASON_AUTOSCALER_APPLIED,
        "Apply",
        Some(format!("Applied autoscaler {}", hpa_name)),
    )
    .await;

    if deployment_available(&deployment) {
        ComponentOutcome::Ready
    } else {
        ComponentOutcome::Progressing {
            reason: "DeploymentUnavailable".to_string(),
            message: format!(
                "deployment {} has no available replicas",
                deployment_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_deployments_follow_cell_name() {
        assert_eq!(
            component_deployment_name("cell-a", BrokerCellDependent::Ingress),
            "cell-a-brokercell-ingress"
        );
        assert_eq!(
            component_deployment_name("cell-a", BrokerCellDependent::Fanout),
            "cell-a-brokercell-fanout"
        );
    }
}
