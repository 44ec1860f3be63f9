//! Type-keyed object store: one lazily built instance per type.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;

type Value = Arc<dyn Any + Send + Sync>;
type Slot = Arc<OnceCell<Value>>;

/// Container for objects of various types, one instance per type.
///
/// The first request for a type constructs it; every later request (from
/// any thread) gets the same `Arc`. Concurrent first requests block on the
/// slot while one of them runs the constructor, so the constructor runs at
/// most once per successful construction. If construction fails the slot
/// stays empty and the next request tries again.
///
/// Once stored, an object is never replaced or removed for the life of the
/// store. Constructors must not request the same type from the same store
/// (that deadlocks).
#[derive(Default)]
pub struct ObjectStore {
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the `T` instance, default-constructing it on first access.
    pub fn get<T>(&self) -> Arc<T>
    where
        T: Default + Send + Sync + 'static,
    {
        self.get_or_init(T::default)
    }

    /// Get the `T` instance, constructing it from `ctx` on first access.
    pub fn get_with<T, C>(&self, ctx: C) -> Arc<T>
    where
        T: From<C> + Send + Sync + 'static,
    {
        self.get_or_init(|| T::from(ctx))
    }

    /// Get the `T` instance, running `init` on first access.
    pub fn get_or_init<T, F>(&self, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let slot = self.slot::<T>();
        let value = slot.get_or_init(|| Arc::new(init()) as Value);
        downcast(value)
    }

    /// Get the `T` instance, running the fallible `init` on first access.
    /// A construction error is returned to this caller only.
    pub fn get_or_try_init<T, E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let slot = self.slot::<T>();
        let value = slot.get_or_try_init(|| init().map(|v| Arc::new(v) as Value))?;
        Ok(downcast(value))
    }

    /// The `T` instance if it has been constructed; never constructs.
    pub fn try_get<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.get())
            .map(downcast)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&TypeId::of::<T>())
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Number of constructed objects.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map lock only guards slot lookup; construction happens outside it
    // so unrelated types never wait on each other.
    fn slot<T: 'static>(&self) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(TypeId::of::<T>()).or_default())
    }
}

fn downcast<T: Send + Sync + 'static>(value: &Value) -> Arc<T> {
    match Arc::clone(value).downcast::<T>() {
        Ok(v) => v,
        Err(_) => unreachable!("slot keyed by {} holds another type", type_name::<T>()),
    }
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore").field("len", &self.len()).finish()
    }
}
