//! Cached gateway connections per chain.

use std::sync::Arc;

use custodex_chain::{ChainGateway, GatewayDialer};
use custodex_types::{Chain, ChainId, Result};
use dashmap::DashMap;

/// Dials each chain's node once and reuses the connection until evicted.
pub struct GatewayPool {
    dialer: Arc<dyn GatewayDialer>,
    open: DashMap<ChainId, Arc<dyn ChainGateway>>,
}

impl GatewayPool {
    #[must_use]
    pub fn new(dialer: Arc<dyn GatewayDialer>) -> Self {
        Self {
            dialer,
            open: DashMap::new(),
        }
    }

    pub async fn get(&self, chain: &Chain) -> Result<Arc<dyn ChainGateway>> {
        // Clone out of the map; a shard guard must not live across the dial.
        if let Some(gateway) = self.open.get(&chain.id).map(|g| Arc::clone(g.value())) {
            return Ok(gateway);
        }
        let gateway = self.dialer.dial(&chain.rpc, chain.platform).await?;
        tracing::debug!(chain = %chain.id, rpc = %chain.rpc, "gateway dialed");
        self.open.insert(chain.id, Arc::clone(&gateway));
        Ok(gateway)
    }

    /// Drop the cached connection so the next [`get`](Self::get) redials.
    pub fn evict(&self, chain: ChainId) {
        self.open.remove(&chain);
    }
}
