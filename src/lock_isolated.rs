use {
    crate::lock::{Guard, ReentrantLock},
    debug_fn::debug_fn,
    run_on_drop::on_drop,
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        cell::{Cell, RefCell},
        fmt::{Debug, Formatter},
        hash::{Hash, Hasher},
        rc::Rc,
        sync::Arc,
    },
};

#[cfg(test)]
mod tests;

/// A value isolated behind a re-entrant lock.
///
/// All reads and writes of the value happen while the calling thread holds the lock.
/// Cloning a `LockIsolated` produces another handle to the same lock and the same
/// value, so a mutation through one handle is visible through every other handle.
///
/// `LockIsolated<V>` is [`Send`] and [`Sync`] whenever `V: Send`. The value does not
/// need to be [`Sync`] because no two threads can observe it at the same time.
///
/// # Example
///
/// ```
/// use std::thread;
/// use isolated::LockIsolated;
///
/// let count = LockIsolated::new(0);
/// thread::scope(|scope| {
///     for _ in 0..4 {
///         scope.spawn(|| count.with_value(|count| *count += 1));
///     }
/// });
/// assert_eq!(count.value(), 4);
/// ```
pub struct LockIsolated<V> {
    shared: Arc<Shared<V>>,
}

struct Shared<V> {
    lock: ReentrantLock,
    // Only accessed through `slot`, i.e. while holding `lock`.
    value: RefCell<V>,
}

// SAFETY: - The value is only reachable through Shared::slot, which requires a guard of
//           this lock.
//         - Guards cannot leave their thread and only one thread at a time can hold
//           guards of the lock.
//         - Handing the RefCell to whichever thread holds the lock can therefore be
//           modeled as moving ownership of V between threads, which requires V: Send.
unsafe impl<V> Sync for Shared<V> where V: Send {}

assert_impl_all!(LockIsolated<i32>: Send, Sync);
assert_impl_all!(LockIsolated<Cell<i32>>: Send, Sync);
assert_not_impl_any!(LockIsolated<Rc<i32>>: Send, Sync);

impl<V> Shared<V> {
    #[inline]
    fn slot<'a>(&'a self, guard: &'a Guard<'_>) -> &'a RefCell<V> {
        assert!(
            self.lock.is_locked_by(guard),
            "guard does not guard this value",
        );
        &self.value
    }
}

impl<V> LockIsolated<V> {
    /// Isolates `value` behind a new lock.
    #[inline]
    pub fn new(value: V) -> Self {
        Self {
            shared: Arc::new(Shared {
                lock: ReentrantLock::new(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Runs `producer` once and isolates the value it produces.
    ///
    /// If `producer` fails, its error is returned and no container is created.
    ///
    /// # Example
    ///
    /// ```
    /// use isolated::LockIsolated;
    ///
    /// let port = LockIsolated::try_new(|| "8080".parse::<u16>()).unwrap();
    /// assert_eq!(port.value(), 8080);
    /// assert!(LockIsolated::try_new(|| "http".parse::<u16>()).is_err());
    /// ```
    pub fn try_new<E>(producer: impl FnOnce() -> Result<V, E>) -> Result<Self, E> {
        producer().map(Self::new)
    }

    /// Runs `operation` as a single transaction on the value.
    ///
    /// While the lock is held, the current value is cloned and `operation` receives a
    /// mutable reference to the copy. When `operation` returns, or unwinds, the copy
    /// becomes the new value and the lock is released. Whatever `operation` returns is
    /// returned unchanged, so an `Err` produced by the transaction reaches the caller
    /// after its partial writes have been stored.
    ///
    /// Use this rather than [`value`](Self::value) followed by
    /// [`set_value`](Self::set_value) whenever the new value depends on the old one.
    ///
    /// The calling thread may use this container again from inside `operation`. In that
    /// case the nested transaction sees the value as it was before the outer
    /// transaction started, and the outer transaction's copy is written back last.
    ///
    /// # Panics
    ///
    /// Panics if called from a [`read`](Self::read) selector of the same container.
    ///
    /// # Example
    ///
    /// ```
    /// use isolated::LockIsolated;
    ///
    /// let log = LockIsolated::new(Vec::new());
    /// let len = log.with_value(|log| {
    ///     log.push("started");
    ///     log.len()
    /// });
    /// assert_eq!(len, 1);
    ///
    /// let outcome: Result<(), &str> = log.with_value(|log| {
    ///     log.push("failing");
    ///     Err("disk full")
    /// });
    /// assert_eq!(outcome, Err("disk full"));
    /// assert_eq!(log.value(), ["started", "failing"]);
    /// ```
    pub fn with_value<T>(&self, operation: impl FnOnce(&mut V) -> T) -> T
    where
        V: Clone,
    {
        let guard = &self.shared.lock.lock();
        let slot = self.shared.slot(guard);
        let copy = RefCell::new(slot.borrow().clone());
        let _write_back = on_drop(|| slot.swap(&copy));
        // The RefMut is a tail temporary and is released before the write back runs.
        operation(&mut copy.borrow_mut())
    }

    /// Replaces the value.
    ///
    /// The old value is dropped while the lock is still held.
    ///
    /// # Panics
    ///
    /// Panics if called from a [`read`](Self::read) selector of the same container.
    pub fn set_value(&self, value: V) {
        let guard = &self.shared.lock.lock();
        let _old = self.shared.slot(guard).replace(value);
    }

    /// Replaces the value with the one produced by `producer`.
    ///
    /// `producer` runs while the lock is held. If it fails, the value is left unchanged
    /// and the error is returned.
    ///
    /// # Panics
    ///
    /// Panics if called from a [`read`](Self::read) selector of the same container.
    ///
    /// # Example
    ///
    /// ```
    /// use isolated::LockIsolated;
    ///
    /// let limit = LockIsolated::new(10u32);
    /// assert!(limit.try_set_value(|| "lots".parse()).is_err());
    /// assert_eq!(limit.value(), 10);
    /// limit.try_set_value(|| "20".parse()).unwrap();
    /// assert_eq!(limit.value(), 20);
    /// ```
    pub fn try_set_value<E>(&self, producer: impl FnOnce() -> Result<V, E>) -> Result<(), E> {
        let guard = &self.shared.lock.lock();
        let value = producer()?;
        let _old = self.shared.slot(guard).replace(value);
        Ok(())
    }

    /// Runs `selector` on a shared reference to the value and returns its result.
    ///
    /// This is the way to read a single field without cloning the whole value. The
    /// reference cannot escape the lock; `selector` has to return an owned result.
    ///
    /// # Panics
    ///
    /// Panics if `selector` writes to this container, directly or indirectly.
    ///
    /// # Example
    ///
    /// ```
    /// use isolated::LockIsolated;
    ///
    /// struct Stats {
    ///     hits: u64,
    ///     misses: u64,
    /// }
    ///
    /// let stats = LockIsolated::new(Stats { hits: 3, misses: 1 });
    /// assert_eq!(stats.read(|stats| stats.hits), 3);
    /// assert_eq!(stats.read(|stats| stats.hits + stats.misses), 4);
    /// ```
    pub fn read<S>(&self, selector: impl FnOnce(&V) -> S) -> S {
        let guard = &self.shared.lock.lock();
        let value = self.shared.slot(guard).borrow();
        selector(&value)
    }

    /// Returns a copy of the value.
    pub fn value(&self) -> V
    where
        V: Clone,
    {
        self.read(V::clone)
    }

    /// Returns whether both handles refer to the same container.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }
}

impl<V> Clone for LockIsolated<V> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<V> Default for LockIsolated<V>
where
    V: Default,
{
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V> From<V> for LockIsolated<V> {
    fn from(value: V) -> Self {
        Self::new(value)
    }
}

/// Compares snapshots of both values.
///
/// The result can be stale by the time it is returned if other threads mutate either
/// container. The two locks are never held at the same time.
impl<V> PartialEq for LockIsolated<V>
where
    V: PartialEq + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.value();
        other.read(|rhs| lhs == *rhs)
    }
}

impl<V> Eq for LockIsolated<V> where V: Eq + Clone {}

/// Hashes the value as it is at the time of the call.
impl<V> Hash for LockIsolated<V>
where
    V: Hash,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.read(|value| value.hash(state));
    }
}

impl<V> Debug for LockIsolated<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let shared = &*self.shared;
        f.debug_struct("LockIsolated")
            .field("lock_id", &shared.lock.addr())
            .field(
                "value",
                &debug_fn(|fmt| {
                    let Some(guard) = shared.lock.try_lock() else {
                        return fmt.write_str("<locked>");
                    };
                    match shared.slot(&guard).try_borrow() {
                        Ok(value) => Debug::fmt(&*value, fmt),
                        Err(_) => fmt.write_str("<borrowed>"),
                    }
                }),
            )
            .finish_non_exhaustive()
    }
}
