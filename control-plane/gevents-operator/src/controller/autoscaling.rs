use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler,
    HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
    ResourceMetricSource,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    ObjectMeta, OwnerReference,
};
use tracing::warn;

use crate::crd::broker_cell::ComponentParameters;

/// Builder-input contract violations. Reported synchronously; no partial
/// autoscaler is ever produced.
#[derive(thiserror::Error, Debug)]
pub enum AutoscalingError {
    #[error("maxReplicas {max} must be >= minReplicas {min}")]
    ReplicaBounds { min: i32, max: i32 },
    #[error("minReplicas {0} must be non-negative")]
    NegativeMinReplicas(i32),
    #[error("avgCPUUtilization {0} must be a percentage in 1..=100")]
    CpuPercentage(i32),
}

/// Validated inputs for the autoscaler builder. Construct through
/// [`AutoscalingArgs::from_policy`]; `make_horizontal_pod_autoscaler` assumes
/// the bounds here already hold.
#[derive(Clone, Debug)]
pub struct AutoscalingArgs {
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub avg_cpu_utilization: Option<i32>,
    pub avg_memory_usage: Option<String>,
    /// The resource requesting the scaling config owns the autoscaler.
    pub owner: OwnerReference,
    pub component: String,
}

impl AutoscalingArgs {
    pub fn from_policy(
        policy: &ComponentParameters,
        owner: OwnerReference,
        component: &str,
    ) -> Result<Self, AutoscalingError> {
        let policy = policy.with_defaults();
        let min = policy
            .min_replicas
            .unwrap_or(ComponentParameters::DEFAULT_MIN_REPLICAS);
        let max = policy
            .max_replicas
            .unwrap_or(ComponentParameters::DEFAULT_MAX_REPLICAS);
        if min < 0 {
            return Err(AutoscalingError::NegativeMinReplicas(min));
        }
        if max < min {
            return Err(AutoscalingError::ReplicaBounds { min, max });
        }
        if let Some(cpu) = policy.avg_cpu_utilization {
            if !(1..=100).contains(&cpu) {
                return Err(AutoscalingError::CpuPercentage(cpu));
            }
        }
        Ok(Self {
            min_replicas: min,
            max_replicas: max,
            avg_cpu_utilization: policy.avg_cpu_utilization,
            avg_memory_usage: policy.avg_memory_usage,
            owner,
            component: component.to_string(),
        })
    }
}

/// Build the autoscaler for one component deployment. The deployment is
/// referenced by name only (no ownership); the autoscaler itself is owned by
/// the resource in `args.owner`.
///
/// An unparsable `avg_memory_usage` drops the memory metric instead of
/// failing the build.
pub fn make_horizontal_pod_autoscaler(
    deployment_name: &str,
    namespace: &str,
    args: &AutoscalingArgs,
) -> HorizontalPodAutoscaler {
    let mut metrics: Vec<MetricSpec> = Vec::new();
    if let Some(cpu) = args.avg_cpu_utilization {
        metrics.push(resource_metric(
            "cpu",
            MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(cpu),
                ..Default::default()
            },
        ));
    }
    if let Some(mem) = args.avg_memory_usage.as_deref() {
        if valid_memory_quantity(mem) {
            metrics.push(resource_metric(
                "memory",
                MetricTarget {
                    type_: "AverageValue".to_string(),
                    average_value: Some(Quantity(mem.to_string())),
                    ..Default::default()
                },
            ));
        } else {
            warn!(
                component = %args.component,
                quantity = %mem,
                "unparsable avgMemoryUsage; omitting memory metric"
            );
        }
    }

    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(format!("{}-hpa", deployment_name)),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![args.owner.clone()]),
            labels: Some(component_labels(&args.owner.name, &args.component)),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: deployment_name.to_string(),
            },
            min_replicas: Some(args.min_replicas),
            max_replicas: args.max_replicas,
            metrics: Some(metrics),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn component_labels(
    owner_name: &str,
    component: &str,
) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("gevents.dev/owner".to_string(), owner_name.to_string());
    labels.insert("gevents.dev/component".to_string(), component.to_string());
    labels
}

fn resource_metric(name: &str, target: MetricTarget) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: name.to_string(),
            target,
        }),
        ..Default::default()
    }
}

/// Accepts the quantity shapes Kubernetes does for memory: a plain integer
/// or a numeric prefix with a binary/decimal suffix ("128Mi", "1Gi", "2G").
fn valid_memory_quantity(qty: &str) -> bool {
    const SUFFIXES: [&str; 12] = [
        "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "k", "M", "G", "T", "P", "E",
    ];
    if let Some(suffix) = SUFFIXES.iter().find(|s| qty.ends_with(*s)) {
        let prefix = &qty[..qty.len() - suffix.len()];
        !prefix.is_empty()
            && (prefix.parse::<u64>().is_ok() || prefix.parse::<f64>().is_ok())
    } else {
        qty.parse::<u64>().is_ok()
    }
}
