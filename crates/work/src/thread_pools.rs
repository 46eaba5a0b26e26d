//! Registry of configured dispatch pools.

use rawork_core::{ConnectorError, WorkManagerConfig};
use std::collections::HashMap;
use tracing::{error, info};

use crate::pool::{DispatchPool, PoolStatus};

/// Owns every [`DispatchPool`] and resolves the pool a resource adapter
/// runs its work on.
#[derive(Debug)]
pub struct ThreadPoolManager {
    pools: HashMap<String, DispatchPool>,
    default_pool_id: String,
}

impl ThreadPoolManager {
    /// Create the pools listed in the configuration, plus the default pool.
    pub fn from_config(config: &WorkManagerConfig) -> Result<Self, ConnectorError> {
        let mut pools = HashMap::new();
        for pool in config.pools() {
            if pools.contains_key(&pool.id) {
                return Err(ConnectorError::DuplicatePool(pool.id));
            }
            let settings = pool.settings();
            info!(
                "thread-pool [{}]: core-pool-size {}, max-pool-size {}, keep-alive-seconds {}",
                pool.id, settings.core_pool_size, settings.max_pool_size, settings.keep_alive_seconds
            );
            pools.insert(pool.id.clone(), DispatchPool::new(pool.id, settings));
        }

        Ok(Self {
            pools,
            default_pool_id: config.default_thread_pool.clone(),
        })
    }

    /// Pool by id.
    pub fn thread_pool(&self, id: &str) -> Option<DispatchPool> {
        self.pools.get(id).cloned()
    }

    /// The default pool.
    pub fn default_thread_pool(&self) -> Option<DispatchPool> {
        self.thread_pool(&self.default_pool_id)
    }

    /// Id of the default pool.
    pub fn default_pool_id(&self) -> &str {
        &self.default_pool_id
    }

    /// Pool for a resource adapter: the named one, or the default pool when
    /// `thread_pool_id` is `None`.
    pub fn pool_for(
        &self,
        thread_pool_id: Option<&str>,
        ra_name: &str,
    ) -> Result<DispatchPool, ConnectorError> {
        match thread_pool_id {
            Some(id) => self.thread_pool(id).ok_or_else(|| {
                let err = ConnectorError::ThreadPoolNotFound {
                    pool_id: id.to_string(),
                    ra_name: ra_name.to_string(),
                };
                error!("{}", err);
                err
            }),
            None => self.default_thread_pool().ok_or_else(|| {
                let err = ConnectorError::DefaultThreadPoolNotFound {
                    ra_name: ra_name.to_string(),
                };
                error!("{}", err);
                err
            }),
        }
    }

    /// Pool ids, sorted.
    pub fn pool_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pools.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Status of every pool, sorted by id.
    pub fn statuses(&self) -> Vec<PoolStatus> {
        let mut statuses: Vec<_> = self.pools.values().map(DispatchPool::status).collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Shut every pool down.
    pub async fn shutdown(&self) {
        for pool in self.pools.values() {
            pool.shutdown().await;
        }
    }
}
