//! The three cache tiers reachable from a pool: per-thread, per-pool and
//! process-wide.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use crate::store::ObjectStore;

/// Which tier of the cache to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One store per calling thread, owned by the pool.
    Thread,
    /// One store per pool.
    Instance,
    /// One store shared by every live pool in the process.
    Process,
}

static PROCESS_STORE: Mutex<Weak<ObjectStore>> = Mutex::new(Weak::new());

/// Process-wide store, shared while at least one holder is alive. The
/// last holder to drop it destroys its contents; the next caller starts a
/// fresh one.
pub(crate) fn shared_process_store() -> Arc<ObjectStore> {
    let mut weak = PROCESS_STORE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(store) = weak.upgrade() {
        return store;
    }
    let store = Arc::new(ObjectStore::new());
    *weak = Arc::downgrade(&store);
    store
}

struct ScopesInner {
    threads: Mutex<HashMap<ThreadId, Arc<ObjectStore>>>,
    instance: Arc<ObjectStore>,
    process: Arc<ObjectStore>,
}

/// Handle to a pool's scope triple. Cheap to clone.
///
/// Every handle keeps the process tier alive, including the ones held by
/// cloned [`JobQueue`](crate::JobQueue) handles, so the tier is released
/// once the last pool and the last such handle are gone.
#[derive(Clone)]
pub struct Scopes {
    inner: Arc<ScopesInner>,
}

impl Scopes {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ScopesInner {
                threads: Mutex::new(HashMap::new()),
                instance: Arc::new(ObjectStore::new()),
                process: shared_process_store(),
            }),
        }
    }

    /// Store of the calling thread, created on first use.
    ///
    /// Entries are kept for every thread that ever asked, workers and
    /// outside callers alike, until the pool drops. A short-lived caller
    /// can hand its store back with [`Scopes::release_thread`].
    pub fn thread(&self) -> Arc<ObjectStore> {
        let id = thread::current().id();
        let mut threads = self
            .inner
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(threads.entry(id).or_default())
    }

    /// Forget the calling thread's store. Returns it if there was one.
    pub fn release_thread(&self) -> Option<Arc<ObjectStore>> {
        let id = thread::current().id();
        self.inner
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn instance(&self) -> &ObjectStore {
        &self.inner.instance
    }

    pub fn process(&self) -> &ObjectStore {
        &self.inner.process
    }

    /// Store for `scope`, resolving the thread tier for the calling thread.
    pub fn store(&self, scope: Scope) -> Arc<ObjectStore> {
        match scope {
            Scope::Thread => self.thread(),
            Scope::Instance => Arc::clone(&self.inner.instance),
            Scope::Process => Arc::clone(&self.inner.process),
        }
    }

    /// Get the `T` instance of `scope`, default-constructing on first access.
    pub fn get<T>(&self, scope: Scope) -> Arc<T>
    where
        T: Default + Send + Sync + 'static,
    {
        self.get_or_init(scope, T::default)
    }

    /// Get the `T` instance of `scope`, building it from `ctx` on first access.
    pub fn get_with<T, C>(&self, scope: Scope, ctx: C) -> Arc<T>
    where
        T: From<C> + Send + Sync + 'static,
    {
        self.store(scope).get_with(ctx)
    }

    /// Get the `T` instance of `scope`, running `init` on first access.
    pub fn get_or_init<T, F>(&self, scope: Scope, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        self.store(scope).get_or_init(init)
    }

    /// Fallible variant of [`Scopes::get_or_init`].
    pub fn get_or_try_init<T, E, F>(&self, scope: Scope, init: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        self.store(scope).get_or_try_init(init)
    }

    /// Number of threads that have touched their thread tier.
    pub fn thread_count(&self) -> usize {
        self.inner
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether `self` and `other` share the same process tier.
    pub fn shares_process_with(&self, other: &Scopes) -> bool {
        Arc::ptr_eq(&self.inner.process, &other.inner.process)
    }
}

impl fmt::Debug for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scopes")
            .field("threads", &self.thread_count())
            .field("instance", &self.inner.instance)
            .field("process", &self.inner.process)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Marker;

    #[test]
    fn thread_tier_is_per_thread() {
        let scopes = Scopes::new();
        let here = scopes.get::<Marker>(Scope::Thread);
        let again = scopes.get::<Marker>(Scope::Thread);
        assert!(Arc::ptr_eq(&here, &again));

        let other_scopes = scopes.clone();
        let there = thread::spawn(move || other_scopes.get::<Marker>(Scope::Thread))
            .join()
            .unwrap();
        assert!(!Arc::ptr_eq(&here, &there));
        assert_eq!(scopes.thread_count(), 2);
    }

    #[test]
    fn released_thread_store_is_rebuilt() {
        let scopes = Scopes::new();
        let other_scopes = scopes.clone();
        let (first, second) = thread::spawn(move || {
            let first = other_scopes.get::<Marker>(Scope::Thread);
            assert!(other_scopes.release_thread().is_some());
            assert!(other_scopes.release_thread().is_none());
            (first, other_scopes.get::<Marker>(Scope::Thread))
        })
        .join()
        .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(scopes.thread_count(), 1);

        let here = scopes.get::<Marker>(Scope::Thread);
        assert_eq!(scopes.thread_count(), 2);
        assert!(scopes.release_thread().is_some());
        assert_eq!(scopes.thread_count(), 1);
        drop(here);
    }

    #[test]
    fn instance_tier_is_shared_across_threads() {
        let scopes = Scopes::new();
        let here = scopes.get::<Marker>(Scope::Instance);
        let other_scopes = scopes.clone();
        let there = thread::spawn(move || other_scopes.get::<Marker>(Scope::Instance))
            .join()
            .unwrap();
        assert!(Arc::ptr_eq(&here, &there));
    }

    #[test]
    fn instance_tiers_are_independent() {
        let a = Scopes::new();
        let b = Scopes::new();
        assert!(!Arc::ptr_eq(
            &a.get::<Marker>(Scope::Instance),
            &b.get::<Marker>(Scope::Instance)
        ));
    }

    #[test]
    fn get_with_builds_from_context_once() {
        struct ModelPath(String);

        impl From<&str> for ModelPath {
            fn from(path: &str) -> Self {
                ModelPath(path.to_string())
            }
        }

        let scopes = Scopes::new();
        let first = scopes.get_with::<ModelPath, _>(Scope::Instance, "models/face.bin");
        let second = scopes.get_with::<ModelPath, _>(Scope::Instance, "ignored");
        assert_eq!(second.0, "models/face.bin");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn live_scopes_share_the_process_tier() {
        #[derive(Default)]
        struct ProcessMarker;

        let a = Scopes::new();
        let b = Scopes::new();
        assert!(a.shares_process_with(&b));
        assert!(Arc::ptr_eq(
            &a.get::<ProcessMarker>(Scope::Process),
            &b.get::<ProcessMarker>(Scope::Process)
        ));
    }
}
