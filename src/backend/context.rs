use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::{debug, trace, warn};

use crate::{
    backend::{Backend, BackendFactory, uri_scheme},
    mapi::MapiError,
};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContextId(u32);

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

struct Context {
    uri: String,
    backend: Arc<dyn Backend>,
    refcount: u32,
}

#[derive(Default)]
struct Contexts {
    next_id: u32,
    by_id: HashMap<ContextId, Context>,
    by_uri: HashMap<String, ContextId>,
}

/// Keeps at most one open backend per URI and closes it once the last
/// lease on it is gone.
pub struct ContextRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
    contexts: Mutex<Contexts>,
}

impl ContextRegistry {
    pub fn new(factories: impl IntoIterator<Item = Arc<dyn BackendFactory>>) -> Arc<Self> {
        let factories = factories
            .into_iter()
            .map(|factory| (factory.scheme().to_string(), factory))
            .collect();
        Arc::new(Self {
            factories,
            contexts: Mutex::default(),
        })
    }

    fn contexts(&self) -> MutexGuard<'_, Contexts> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases the context serving `uri`, opening the backend if nobody holds
    /// it yet. The backend is opened without holding the registry lock.
    pub fn acquire(self: &Arc<Self>, uri: &str) -> Result<ContextLease, MapiError> {
        if let Some(lease) = self.share(&mut self.contexts(), uri) {
            return Ok(lease);
        }

        let scheme = uri_scheme(uri).ok_or(MapiError::InvalidParameter)?;
        let factory = self.factories.get(scheme).ok_or_else(|| {
            warn!("no backend registered for scheme {scheme}");
            MapiError::NoSupport
        })?;
        let backend = factory.open(uri)?;

        let mut contexts = self.contexts();
        if let Some(lease) = self.share(&mut contexts, uri) {
            drop(contexts);
            debug!("{uri} was opened concurrently, closing duplicate backend");
            backend.close();
            return Ok(lease);
        }
        contexts.next_id += 1;
        let id = ContextId(contexts.next_id);
        contexts.by_id.insert(
            id,
            Context {
                uri: uri.to_string(),
                backend,
                refcount: 1,
            },
        );
        contexts.by_uri.insert(uri.to_string(), id);
        debug!("opened {id} for {uri}");
        Ok(ContextLease::new(id, Arc::clone(self)))
    }

    fn share(self: &Arc<Self>, contexts: &mut Contexts, uri: &str) -> Option<ContextLease> {
        let id = contexts.by_uri.get(uri).copied()?;
        let context = contexts
            .by_id
            .get_mut(&id)
            .expect("indexed context should be registered");
        context.refcount += 1;
        trace!("{id} for {uri} now has {} leases", context.refcount);
        Some(ContextLease::new(id, Arc::clone(self)))
    }

    /// Leases an already open context.
    pub fn acquire_by_id(self: &Arc<Self>, id: ContextId) -> Result<ContextLease, MapiError> {
        let mut contexts = self.contexts();
        let context = contexts.by_id.get_mut(&id).ok_or(MapiError::NotFound)?;
        context.refcount += 1;
        trace!("{id} now has {} leases", context.refcount);
        Ok(ContextLease::new(id, Arc::clone(self)))
    }

    fn release(&self, id: ContextId) {
        let closed = {
            let mut contexts = self.contexts();
            let Some(context) = contexts.by_id.get_mut(&id) else {
                warn!("releasing unknown {id}");
                return;
            };
            context.refcount -= 1;
            trace!("{id} down to {} leases", context.refcount);
            if context.refcount > 0 {
                return;
            }
            let context = contexts
                .by_id
                .remove(&id)
                .expect("context should still be registered");
            contexts.by_uri.remove(&context.uri);
            context
        };
        debug!("closing {id} for {}", closed.uri);
        closed.backend.close();
    }

    pub fn backend(&self, id: ContextId) -> Option<Arc<dyn Backend>> {
        self.contexts()
            .by_id
            .get(&id)
            .map(|context| Arc::clone(&context.backend))
    }

    pub fn lookup_uri(&self, uri: &str) -> Option<ContextId> {
        self.contexts().by_uri.get(uri).copied()
    }

    pub fn uri(&self, id: ContextId) -> Option<String> {
        self.contexts()
            .by_id
            .get(&id)
            .map(|context| context.uri.clone())
    }

    /// Number of live leases on a context, zero once it is closed.
    pub fn refcount(&self, id: ContextId) -> u32 {
        self.contexts()
            .by_id
            .get(&id)
            .map_or(0, |context| context.refcount)
    }

    pub fn len(&self) -> usize {
        self.contexts().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One counted reference to an open context. Released exactly once, either
/// through [`ContextLease::release`] or when dropped.
pub struct ContextLease {
    id: ContextId,
    registry: Arc<ContextRegistry>,
    released: bool,
}

impl ContextLease {
    fn new(id: ContextId, registry: Arc<ContextRegistry>) -> Self {
        Self {
            id,
            registry,
            released: false,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        assert!(!self.released, "released lease on {} should not be used", self.id);
        self.registry
            .backend(self.id)
            .expect("leased context should stay registered")
    }

    /// Takes another lease on the same context.
    pub fn try_clone(&self) -> Result<Self, MapiError> {
        self.registry.acquire_by_id(self.id)
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.release(self.id);
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for ContextLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLease")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
