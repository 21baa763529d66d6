use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    #[envconfig(from = "GEVENTS_PROFILE", default = "dev")]
    pub profile: String,

    #[envconfig(from = "HTTP_PORT", default = "8088")]
    pub http_port: u16,

    /// GCP project used for children whose spec omits one.
    /// Env: GEVENTS_PROJECT
    #[envconfig(from = "GEVENTS_PROJECT")]
    pub project: Option<String>,

    #[envconfig(nested)]
    pub features: FeaturesConfig,

    #[envconfig(nested)]
    pub reconcile: ReconcileConfig,
}

#[derive(Envconfig, Clone, Debug, Default)]
pub struct FeaturesConfig {
    /// None means the env was not set and the profile default decides.
    /// Env: GEVENTS_FEATURES_BROKERCELL_AUTOSCALING
    #[envconfig(from = "GEVENTS_FEATURES_BROKERCELL_AUTOSCALING")]
    pub brokercell_autoscaling: Option<bool>,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ReconcileConfig {
    /// Requeue interval while a resource is progressing.
    /// Env: GEVENTS_RECONCILE_REQUEUE_SECS
    #[envconfig(from = "GEVENTS_RECONCILE_REQUEUE_SECS", default = "5")]
    pub requeue_secs: u64,

    #[envconfig(from = "GEVENTS_RECONCILE_BACKOFF_BASE_MS", default = "100")]
    pub backoff_base_ms: u64,

    #[envconfig(from = "GEVENTS_RECONCILE_BACKOFF_CAP_SECS", default = "300")]
    pub backoff_cap_secs: u64,
}

impl OperatorConfig {
    /// Resolve feature toggles the profile implies. Anything explicitly set
    /// through the environment wins over the profile.
    ///
    /// Rules:
    /// - dev:  brokercell_autoscaling=false
    /// - edge: brokercell_autoscaling=true
    /// - full: brokercell_autoscaling=true
    pub fn apply_profile_defaults(mut self) -> Self {
        let def_autoscaling = match self.profile.as_str() {
            "edge" | "full" | "prod" | "production" => true,
            _ /* dev */ => false,
        };
        if self.features.brokercell_autoscaling.is_none() {
            self.features.brokercell_autoscaling = Some(def_autoscaling);
        }
        self
    }
}
