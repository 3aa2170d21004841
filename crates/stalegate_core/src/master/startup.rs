use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use super::Master;

impl Master {
    pub(super) fn log_startup(&self) {
        info!(target: "stalegate::master", "Starting STALEGATE");
        info!(
            target: "stalegate::master",
            origin = %self.cfg.proxy_base_url(),
            cache_key_scope = %self.cfg.cache_key_scope(),
            coalesce_misses = self.cfg.coalesce_misses(),
            "Cache front configured"
        );
    }

    pub(super) fn init_semaphore(&self) -> Arc<Semaphore> {
        let max_conns = self.cfg.max_connections();
        let semaphore = Arc::new(Semaphore::new(max_conns));
        info!(
            target: "stalegate::master",
            max_conns,
            "Global connection semaphore initialized"
        );
        semaphore
    }
}
