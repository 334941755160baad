//! Coordinator process

use anyhow::Context;
use edgeproxy_control::{Dispatcher, PendingRequests, TransportPool};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::CoordinatorConfig;

/// Owns the broker and serves the coordinator endpoints
pub struct Coordinator {
    config: CoordinatorConfig,
    dispatcher: Dispatcher,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let pool = TransportPool::with_strategy(config.selection.strategy());
        let dispatcher = Dispatcher::new(pool, PendingRequests::new())
            .with_default_timeout(config.relay_timeout);

        Self { config, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Bind the configured address and serve until the process stops
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Coordinator listening on http://{}", local_addr);
        info!(
            "Agents connect to ws://{}{}/{{agent_id}}",
            local_addr,
            edgeproxy_proto::AGENT_WS_PATH_PREFIX
        );
        info!(
            "Relay timeout: {:?}, agent selection: {}",
            self.dispatcher.default_timeout(),
            self.dispatcher.pool().strategy_name()
        );
        info!(
            "Agent ping interval: {:?}, idle timeout: {:?}",
            self.config.ping_interval, self.config.idle_timeout
        );

        let router = crate::build_router(self.dispatcher, &self.config);
        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}
