use std::sync::Arc;

use anyhow::Context;

use keystone_api::app::{self, services};
use keystone_infra::SecurityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keystone_observability::init();

    let config = SecurityConfig::from_env().context("invalid security configuration")?;
    let bind_addr = config.bind_addr.clone();

    let services = Arc::new(services::build_in_memory_services(config));
    match services::BootstrapAdmin::from_env() {
        Some(admin) => {
            services
                .bootstrap_admin(admin)
                .context("failed to create bootstrap administrator")?;
        }
        None => tracing::warn!("no bootstrap administrator configured; admin routes are unreachable"),
    }

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
