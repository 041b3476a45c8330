//! Entities that record undo steps for selected property writes.
//!
//! A [`TrackedEntity`] owns a value of some [`Properties`] type. Writes go
//! through [`TrackedEntity::set`]: value-changing writes raise a change
//! notification, and writes to a tracked property additionally become exactly
//! one undo step in the entity's history.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::history::{History, WeakHistory};
use crate::property::{Properties, PropertyAccessor, PropertyCache, PropertyResult};

/// Whether a property takes part in undo capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyFlags {
    Disable,
    Enable,
}

/// Delivers change notifications, e.g. by forwarding them to a UI thread.
///
/// The entity hands over a closure and does not wait for it to run.
pub type Dispatcher = Rc<dyn Fn(Box<dyn FnOnce()>)>;

type Listener = Rc<dyn Fn(&'static str)>;

struct EntityCore<E> {
    value: RefCell<E>,
    tracked: RefCell<HashSet<&'static str>>,
    history: WeakHistory,
    cache: PropertyCache,
    listeners: RefCell<Vec<Listener>>,
    dispatcher: RefCell<Option<Dispatcher>>,
}

/// Shared handle to an entity with opt-in undo capture.
///
/// The entity refers to its history weakly: the history's stacks hold actions
/// that refer back to the entity.
pub struct TrackedEntity<E: Properties> {
    core: Rc<EntityCore<E>>,
}

impl<E: Properties> Clone for TrackedEntity<E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<E: Properties> TrackedEntity<E> {
    /// Wrap `value`, recording into `history` and using the thread's shared
    /// property cache. No property is tracked yet.
    pub fn new(value: E, history: &History) -> Self {
        Self::with_cache(value, history, PropertyCache::shared())
    }

    /// Wrap `value` with an explicit property cache.
    pub fn with_cache(value: E, history: &History, cache: PropertyCache) -> Self {
        Self {
            core: Rc::new(EntityCore {
                value: RefCell::new(value),
                tracked: RefCell::new(HashSet::new()),
                history: history.downgrade(),
                cache,
                listeners: RefCell::new(Vec::new()),
                dispatcher: RefCell::new(None),
            }),
        }
    }

    /// Turn undo capture for property `name` on or off.
    pub fn record_property(&self, name: &str, flags: PropertyFlags) -> PropertyResult<()> {
        let info = self.core.cache.info::<E>(name)?;
        let mut tracked = self.core.tracked.borrow_mut();
        match flags {
            PropertyFlags::Enable => tracked.insert(info.name),
            PropertyFlags::Disable => tracked.remove(info.name),
        };
        Ok(())
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.core.tracked.borrow().contains(name)
    }

    /// Names of tracked properties, sorted.
    pub fn tracked_properties(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.core.tracked.borrow().iter().copied().collect();
        names.sort_unstable();
        names
    }

    /// The history this entity records into, if it is still alive.
    pub fn history(&self) -> Option<History> {
        self.core.history.upgrade()
    }

    /// Borrow the wrapped value.
    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.core.value.borrow())
    }

    /// Read property `name`.
    pub fn get<V: 'static>(&self, name: &str) -> PropertyResult<V> {
        let accessor = self.core.cache.get::<E, V>(name)?;
        accessor.get(&self.core.value.borrow())
    }

    /// Write property `name`.
    ///
    /// Returns `Ok(false)` without notifying or recording when `value` equals
    /// the current value. A tracked property's change is recorded as one
    /// action labeled with the property name.
    pub fn set<V>(&self, name: &str, value: V) -> PropertyResult<bool>
    where
        V: PartialEq + Clone + 'static,
    {
        let accessor = self.core.cache.get::<E, V>(name)?;
        let previous = accessor.get(&self.core.value.borrow())?;
        if previous == value {
            return Ok(false);
        }
        self.replay(&accessor, value.clone())?;

        if !self.is_tracked(accessor.name()) {
            return Ok(true);
        }
        let Some(history) = self.history() else {
            log::debug!(
                "`{}` changed after its history was dropped",
                accessor.name()
            );
            return Ok(true);
        };

        let (forward, backward) = (self.clone(), self.clone());
        let (forward_accessor, backward_accessor) = (Rc::clone(&accessor), Rc::clone(&accessor));
        history.record(
            move || forward.replay_logged(&forward_accessor, value.clone()),
            move || backward.replay_logged(&backward_accessor, previous.clone()),
            accessor.name(),
        );
        Ok(true)
    }

    /// Write property `name` and notify, without recording history.
    ///
    /// Actions use this to replay values they captured.
    pub fn assign<V>(&self, name: &str, value: V) -> PropertyResult<bool>
    where
        V: PartialEq + 'static,
    {
        let accessor = self.core.cache.get::<E, V>(name)?;
        self.replay(&accessor, value)
    }

    /// Subscribe to change notifications. The listener receives the property name.
    pub fn subscribe(&self, listener: impl Fn(&'static str) + 'static) {
        self.core.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Route change notifications through `dispatcher` instead of delivering
    /// them inline.
    pub fn set_dispatcher(&self, dispatcher: impl Fn(Box<dyn FnOnce()>) + 'static) {
        *self.core.dispatcher.borrow_mut() = Some(Rc::new(dispatcher));
    }

    /// Whether two handles refer to the same entity.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    fn replay<V>(&self, accessor: &PropertyAccessor<E, V>, value: V) -> PropertyResult<bool>
    where
        V: PartialEq + 'static,
    {
        {
            let mut current = self.core.value.borrow_mut();
            if accessor.can_read() && accessor.get(&current)? == value {
                return Ok(false);
            }
            accessor.set(&mut current, value)?;
        }
        log::trace!("property `{}` changed", accessor.name());
        self.notify(accessor.name());
        Ok(true)
    }

    fn replay_logged<V>(&self, accessor: &PropertyAccessor<E, V>, value: V)
    where
        V: PartialEq + 'static,
    {
        if let Err(err) = self.replay(accessor, value) {
            log::warn!("failed to replay property write: {err}");
        }
    }

    fn notify(&self, name: &'static str) {
        let listeners = self.core.listeners.borrow().clone();
        if listeners.is_empty() {
            return;
        }
        let deliver = move || {
            for listener in &listeners {
                listener(name);
            }
        };
        let dispatcher = self.core.dispatcher.borrow().clone();
        match dispatcher {
            Some(dispatch) => dispatch(Box::new(deliver)),
            None => deliver(),
        }
    }
}

impl<E: Properties + fmt::Debug> fmt::Debug for TrackedEntity<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedEntity")
            .field("value", &self.core.value.borrow())
            .field("tracked", &self.tracked_properties())
            .finish()
    }
}
