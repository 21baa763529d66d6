use envconfig::Envconfig;
use gevents_operator::{config::OperatorConfig, init_tracing, runtime};
use kube::Client;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // Pin the rustls provider to aws-lc-rs before the kube client makes any
    // TLS connection; a process without a default provider fails at runtime.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        // A provider was already installed, which is acceptable.
        tracing::debug!(?e, "rustls CryptoProvider already set; proceeding");
    }

    let cfg = OperatorConfig::init_from_env()?.apply_profile_defaults();
    info!(?cfg, "Starting gevents operator");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
