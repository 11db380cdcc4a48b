//! Process-wide backend instance.
//!
//! The adapter is built lazily on first use. Concurrent first callers share
//! one in-flight construction; a failed construction leaves the slot empty so
//! the next caller retries. `close` releases the adapter and empties the slot
//! so the following `get` builds a fresh one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use keystone_core::config::{BackendConfig, Settings};
use keystone_core::Result;

use crate::backend::{open_backend, SharedBackend};

/// Builds a backend on demand.
pub type BackendFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<SharedBackend>> + Send + Sync>;

type PendingBackend = Shared<BoxFuture<'static, Result<SharedBackend>>>;

enum Slot {
    Empty,
    Pending {
        generation: u64,
        future: PendingBackend,
    },
    Ready(SharedBackend),
}

pub struct BackendRegistry {
    factory: BackendFactory,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    constructions: AtomicUsize,
    /// Generations closed while still pending; their adapter is closed by
    /// the first waiter that receives it.
    abandoned: Mutex<HashSet<u64>>,
}

static GLOBAL: OnceLock<BackendRegistry> = OnceLock::new();

impl BackendRegistry {
    /// Registry that opens the adapter described by `config`.
    pub fn new(config: BackendConfig) -> Self {
        Self::with_factory(Arc::new(move || {
            let config = config.clone();
            async move { open_backend(&config).await }.boxed()
        }))
    }

    pub fn with_factory(factory: BackendFactory) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot::Empty),
            generation: AtomicU64::new(0),
            constructions: AtomicUsize::new(0),
            abandoned: Mutex::new(HashSet::new()),
        }
    }

    /// The process-wide registry, configured from `keystone.toml` and
    /// `KEYSTONE__*` on first access.
    pub fn global() -> &'static BackendRegistry {
        GLOBAL.get_or_init(|| {
            let settings = Settings::load("keystone").unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default settings");
                Settings::default()
            });
            Self::new(settings.backend)
        })
    }

    /// The shared adapter, constructing it if needed.
    pub async fn get(&self) -> Result<SharedBackend> {
        let (generation, pending) = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Ready(backend) => return Ok(Arc::clone(backend)),
                Slot::Pending { generation, future } => (*generation, future.clone()),
                Slot::Empty => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    self.constructions.fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(generation, "Constructing backend");
                    let future = (self.factory)().shared();
                    *slot = Slot::Pending {
                        generation,
                        future: future.clone(),
                    };
                    (generation, future)
                }
            }
        };

        let result = pending.await;

        let abandoned = {
            let mut slot = self.slot.lock();
            let current =
                matches!(&*slot, Slot::Pending { generation: g, .. } if *g == generation);
            if current {
                *slot = match &result {
                    Ok(backend) => Slot::Ready(Arc::clone(backend)),
                    Err(e) => {
                        tracing::warn!(error = %e, generation, "Backend construction failed");
                        Slot::Empty
                    }
                };
                return result;
            }
            self.abandoned.lock().remove(&generation)
        };

        let backend = result?;
        if abandoned {
            tracing::debug!(generation, "Closing backend built after close");
            backend.close().await?;
        }
        Ok(backend)
    }

    /// Close the cached adapter, if any. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let previous = {
            let mut slot = self.slot.lock();
            if let Slot::Pending { generation, .. } = &*slot {
                self.abandoned.lock().insert(*generation);
            }
            std::mem::replace(&mut *slot, Slot::Empty)
        };
        match previous {
            Slot::Ready(backend) => backend.close().await,
            Slot::Pending { generation, .. } => {
                tracing::debug!(generation, "Abandoned in-flight backend construction");
                Ok(())
            }
            Slot::Empty => Ok(()),
        }
    }

    /// Number of constructions started so far.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.slot.lock(), Slot::Ready(_))
    }
}
