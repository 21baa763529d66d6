use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::{Condition, ConditionSet, ConditionStatus, Dependents};

/// Shared ingress/fan-out component. The operator derives a
/// HorizontalPodAutoscaler per component from the declared policy; the
/// component deployments themselves are managed elsewhere.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "internal.gevents.dev",
    version = "v1alpha1",
    kind = "BrokerCell",
    plural = "brokercells",
    namespaced,
    status = "BrokerCellStatus"
)]
pub struct BrokerCellSpec {
    #[serde(default)]
    pub components: ComponentsSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ComponentsSpec {
    pub ingress: Option<ComponentParameters>,
    pub fanout: Option<ComponentParameters>,
}

/// Declarative autoscaling policy for one component. Absent fields take the
/// component defaults below.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct ComponentParameters {
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    /// Target average CPU utilization percentage.
    pub avg_cpu_utilization: Option<i32>,
    /// Target average memory usage as a resource quantity (e.g. "1000Mi").
    pub avg_memory_usage: Option<String>,
}

impl ComponentParameters {
    pub const DEFAULT_MIN_REPLICAS: i32 = 1;
    pub const DEFAULT_MAX_REPLICAS: i32 = 10;
    pub const DEFAULT_AVG_CPU_UTILIZATION: i32 = 95;

    /// Resolve absent fields to the component defaults. Memory stays unset
    /// unless declared, so the memory metric is opt-in.
    pub fn with_defaults(&self) -> Self {
        Self {
            min_replicas: Some(
                self.min_replicas.unwrap_or(Self::DEFAULT_MIN_REPLICAS),
            ),
            max_replicas: Some(
                self.max_replicas.unwrap_or(Self::DEFAULT_MAX_REPLICAS),
            ),
            avg_cpu_utilization: Some(
                self.avg_cpu_utilization
                    .unwrap_or(Self::DEFAULT_AVG_CPU_UTILIZATION),
            ),
            avg_memory_usage: self.avg_memory_usage.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
pub struct BrokerCellStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition<BrokerCellConditionType>>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum BrokerCellConditionType {
    Ready,
    IngressReady,
    FanoutReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerCellDependent {
    Ingress,
    Fanout,
}

impl BrokerCellDependent {
    /// Suffix used in deployment/HPA names and component labels.
    pub fn component(self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Fanout => "fanout",
        }
    }
}

impl Dependents for BrokerCellDependent {
    type Kind = BrokerCellConditionType;

    const ORDERED: &'static [Self] = &[Self::Ingress, Self::Fanout];
    const READY: BrokerCellConditionType = BrokerCellConditionType::Ready;

    fn kind(self) -> BrokerCellConditionType {
        match self {
            Self::Ingress => BrokerCellConditionType::IngressReady,
            Self::Fanout => BrokerCellConditionType::FanoutReady,
        }
    }
}

impl BrokerCellStatus {
    fn condition_set(&mut self) -> ConditionSet<'_, BrokerCellDependent> {
        ConditionSet::new(self.conditions.get_or_insert_with(Vec::new))
    }

    pub fn initialize_conditions(&mut self) {
        self.condition_set().init();
    }

    pub fn mark_component_ready(&mut self, dep: BrokerCellDependent) {
        self.condition_set().mark_ready(dep);
    }

    pub fn mark_component_not_ready(
        &mut self,
        dep: BrokerCellDependent,
        reason: &str,
        message: &str,
    ) {
        self.condition_set().mark_not_ready(dep, reason, message);
    }

    pub fn mark_component_unknown(
        &mut self,
        dep: BrokerCellDependent,
        reason: &str,
        message: &str,
    ) {
        self.condition_set().mark_unknown(dep, reason, message);
    }

    pub fn is_ready(&self) -> bool {
        self.conditions
            .as_ref()
            .and_then(|cs| {
                cs.iter()
                    .find(|c| c.type_ == BrokerCellConditionType::Ready)
            })
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}
