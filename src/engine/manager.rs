//! The node manager: registry of model engines, eager/lazy loading, and idle
//! eviction (§4.4). The registry lock only ever guards the `id -> record`
//! map itself; each record carries its own `tokio::sync::Mutex` so a load can
//! be driven while holding a lock across an `.await` without blocking
//! unrelated engines.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    error::GatewayError,
    models::engine::{EngineListEntry, EngineStatusResponse},
};

use super::{
    collaborator::EngineLoader,
    record::{EngineHandle, EngineRecord, EngineState},
};

type RecordLock = Arc<tokio::sync::Mutex<EngineRecord>>;

pub struct NodeManager {
    registry: RwLock<HashMap<String, RecordLock>>,
    loader: Arc<dyn EngineLoader>,
    idle_timeout: Duration,
}

impl NodeManager {
    pub fn new(loader: Arc<dyn EngineLoader>, idle_timeout: Duration) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            loader,
            idle_timeout,
        }
    }

    /// Gives the dispatcher direct access to the collaborator for
    /// `generate()` calls, which the node manager itself never drives — it
    /// only owns `load`/`unload` lifecycle (§9's cyclic-reference note).
    pub fn loader(&self) -> Arc<dyn EngineLoader> {
        Arc::clone(&self.loader)
    }

    fn record_lock(&self, id: &str) -> Option<RecordLock> {
        self.registry
            .read()
            .expect("node manager registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Inserts a new record in `Registered` state. Does not load.
    pub fn register(
        &self,
        id: String,
        model_path: String,
        load_params: Value,
        gpu_id: Option<i32>,
    ) -> Result<(), GatewayError> {
        let mut registry = self
            .registry
            .write()
            .expect("node manager registry lock poisoned");
        if registry.contains_key(&id) {
            return Err(GatewayError::Conflict(format!(
                "engine '{id}' already registered"
            )));
        }
        registry.insert(
            id.clone(),
            Arc::new(tokio::sync::Mutex::new(EngineRecord::new(
                id,
                model_path,
                load_params,
                gpu_id,
            ))),
        );
        Ok(())
    }

    /// Registers and synchronously loads. Returns `Ok(false)` (record left in
    /// `Failed`) on load failure rather than an error, so the caller can
    /// still report a 201 with the failure recorded — matching §4.4's "add".
    pub async fn add(
        &self,
        id: String,
        model_path: String,
        load_params: Value,
        gpu_id: Option<i32>,
    ) -> Result<bool, GatewayError> {
        self.register(id.clone(), model_path, load_params, gpu_id)?;
        match self.get_or_load(&id).await {
            Ok(_) => Ok(true),
            Err(GatewayError::EngineLoad(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// §4.4's `get_or_load`. Holding the record's mutex across the `.await`
    /// that performs the load is what gives concurrent callers "wait on the
    /// same completion" semantics: a second caller blocks on `.lock().await`
    /// and, once it acquires the guard, observes the already-`Loaded` state.
    pub async fn get_or_load(&self, id: &str) -> Result<EngineHandle, GatewayError> {
        let lock = self
            .record_lock(id)
            .ok_or_else(|| GatewayError::NotFound(format!("engine '{id}' not found")))?;

        let mut record = lock.lock().await;

        if record.state == EngineState::Loaded {
            record.last_used_at = Some(Instant::now());
            return Ok(record.handle.expect("loaded record missing handle"));
        }

        record.state = EngineState::Loading;
        let path = record.model_path.clone();
        let params = record.load_params.clone();
        let gpu_id = record.gpu_id;

        match self.loader.load(&path, &params, gpu_id).await {
            Ok(handle) => {
                record.state = EngineState::Loaded;
                record.handle = Some(handle);
                record.last_used_at = Some(Instant::now());
                record.failure_message = None;
                tracing::info!(engine_id = %id, "engine loaded");
                Ok(handle)
            }
            Err(err) => {
                record.state = EngineState::Failed;
                record.failure_message = Some(err.to_string());
                tracing::warn!(engine_id = %id, error = %err, "engine load failed");
                Err(GatewayError::EngineLoad(err.to_string()))
            }
        }
    }

    pub async fn status(&self, id: &str) -> Option<EngineStatusResponse> {
        let lock = self.record_lock(id)?;
        let record = lock.lock().await;
        Some(EngineStatusResponse {
            status: record.state.as_str().to_string(),
            available: true,
            message: record.failure_message.clone(),
        })
    }

    /// Transitions `Loaded|Loading -> Unloading -> gone`. Unloads the engine
    /// (if one was loaded) before the record is dropped from the registry.
    pub async fn remove(&self, id: &str) -> Result<bool, GatewayError> {
        let Some(lock) = self.record_lock(id) else {
            return Ok(false);
        };

        {
            let mut record = lock.lock().await;
            record.state = EngineState::Unloading;
            if let Some(handle) = record.handle.take() {
                self.loader.unload(handle).await;
            }
        }

        self.registry
            .write()
            .expect("node manager registry lock poisoned")
            .remove(id);
        tracing::info!(engine_id = %id, "engine removed");
        Ok(true)
    }

    /// Ordered snapshot of every registered id and its current state.
    pub async fn list(&self) -> Vec<EngineListEntry> {
        let locks: Vec<(String, RecordLock)> = {
            let registry = self
                .registry
                .read()
                .expect("node manager registry lock poisoned");
            registry.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut entries = Vec::with_capacity(locks.len());
        for (id, lock) in locks {
            let record = lock.lock().await;
            entries.push(EngineListEntry {
                id,
                status: record.state.as_str().to_string(),
            });
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    /// Spawns the periodic idle-eviction sweep onto `tracker`, stopping when
    /// `cancel` fires (part of the gateway's drain-on-shutdown sequence).
    pub fn spawn_idle_eviction(
        self: &Arc<Self>,
        tracker: &TaskTracker,
        cancel: CancellationToken,
        sweep_interval: Duration,
    ) {
        let manager = Arc::clone(self);
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => manager.sweep_idle().await,
                }
            }
        });
    }

    async fn sweep_idle(&self) {
        let locks: Vec<(String, RecordLock)> = {
            let registry = self
                .registry
                .read()
                .expect("node manager registry lock poisoned");
            registry.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let now = Instant::now();
        for (id, lock) in locks {
            let handle_to_unload = {
                let mut record = lock.lock().await;
                let idle = record.state == EngineState::Loaded
                    && record
                        .last_used_at
                        .is_some_and(|last| now.duration_since(last) >= self.idle_timeout);
                if !idle {
                    None
                } else {
                    record.state = EngineState::Unloading;
                    record.handle.take()
                }
            };

            if let Some(handle) = handle_to_unload {
                self.loader.unload(handle).await;
                let mut record = lock.lock().await;
                record.state = EngineState::Registered;
                record.last_used_at = None;
                tracing::info!(engine_id = %id, "evicted idle engine");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::test_engine::TestEngineLoader;

    fn manager() -> NodeManager {
        NodeManager::new(Arc::new(TestEngineLoader::new()), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn register_then_conflict_on_duplicate() {
        let m = manager();
        m.register("m1".into(), "path".into(), Value::Null, None)
            .unwrap();
        let err = m
            .register("m1".into(), "path".into(), Value::Null, None)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_or_load_is_lazy_until_first_use() {
        let m = manager();
        m.register("m1".into(), "path".into(), Value::Null, None)
            .unwrap();
        let status = m.status("m1").await.unwrap();
        assert_eq!(status.status, "unloaded");

        m.get_or_load("m1").await.unwrap();
        let status = m.status("m1").await.unwrap();
        assert_eq!(status.status, "loaded");
    }

    #[tokio::test]
    async fn get_or_load_missing_id_is_not_found() {
        let m = manager();
        let err = m.get_or_load("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn add_records_failure_without_erroring() {
        let m = manager();
        let ok = m
            .add(
                "bad".into(),
                String::new(),
                serde_json::json!({"fail": true}),
                None,
            )
            .await
            .unwrap();
        assert!(!ok);
        let status = m.status("bad").await.unwrap();
        assert_eq!(status.status, "failed");
        assert!(status.message.is_some());
    }

    #[tokio::test]
    async fn concurrent_get_or_load_calls_share_one_load() {
        let m = Arc::new(manager());
        m.register("m1".into(), "path".into(), Value::Null, None)
            .unwrap();

        let a = Arc::clone(&m);
        let b = Arc::clone(&m);
        let (ha, hb) = tokio::join!(
            tokio::spawn(async move { a.get_or_load("m1").await.unwrap() }),
            tokio::spawn(async move { b.get_or_load("m1").await.unwrap() }),
        );
        assert_eq!(ha.unwrap(), hb.unwrap());
    }

    #[tokio::test]
    async fn remove_unloads_and_drops_record() {
        let m = manager();
        m.register("m1".into(), "path".into(), Value::Null, None)
            .unwrap();
        m.get_or_load("m1").await.unwrap();
        assert!(m.remove("m1").await.unwrap());
        assert!(m.status("m1").await.is_none());
        assert!(!m.remove("m1").await.unwrap());
    }

    #[tokio::test]
    async fn list_is_sorted_by_id() {
        let m = manager();
        m.register("zebra".into(), "p".into(), Value::Null, None)
            .unwrap();
        m.register("alpha".into(), "p".into(), Value::Null, None)
            .unwrap();
        let list = m.list().await;
        assert_eq!(list[0].id, "alpha");
        assert_eq!(list[1].id, "zebra");
    }

    #[tokio::test]
    async fn idle_sweep_evicts_back_to_registered() {
        let m = NodeManager::new(Arc::new(TestEngineLoader::new()), Duration::from_millis(10));
        m.register("m1".into(), "path".into(), Value::Null, None)
            .unwrap();
        m.get_or_load("m1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        m.sweep_idle().await;
        let status = m.status("m1").await.unwrap();
        assert_eq!(status.status, "unloaded");
    }
}
