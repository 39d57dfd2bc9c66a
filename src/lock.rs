use {
    crate::execution_unit::execution_unit_id,
    opera::{PhantomNotSend, PhantomNotSync},
    parking_lot::{RawMutex, lock_api::RawMutex as RawMutexTrait},
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        cell::Cell,
        ptr,
        sync::atomic::{AtomicUsize, Ordering::Relaxed},
    },
};


/// An exclusive lock that the owning thread may acquire any number of times.
///
/// This is the lock behind [`LockIsolated`](crate::LockIsolated). It does not protect
/// any data by itself. Callers tie data to it by only touching that data while holding
/// a [`Guard`] for which [`ReentrantLock::is_locked_by`] returns true.
///
/// Acquiring the lock on a thread that does not hold it costs one uncontended mutex
/// lock. Acquiring it again on the owning thread only bumps a counter.
pub(crate) struct ReentrantLock {
    // Invariants:
    // 1. if tickets > 0, then raw_mutex is locked
    // 2. if owner != 0, then raw_mutex is locked and the execution unit with the id
    //    owner locked it
    // The current execution unit holds a ticket if tickets > 0 and owner is its id.
    raw_mutex: RawMutex,
    // Written only while raw_mutex is held.
    owner: AtomicUsize,
    // Protected by raw_mutex.
    tickets: Cell<u64>,
}

/// Proof that the current thread holds a [`ReentrantLock`].
///
/// Every guard owns one ticket of its lock. The lock is released when the last ticket
/// of the owning thread is dropped. Guards cannot leave the thread that created them.
pub(crate) struct Guard<'a> {
    lock: &'a ReentrantLock,
    _phantom_not_send: PhantomNotSend,
    _phantom_not_sync: PhantomNotSync,
}

// SAFETY: - tickets is only accessed by the execution unit recorded in owner, which
//           holds raw_mutex while doing so.
//         - owner is atomic.
unsafe impl Send for ReentrantLock {}

// SAFETY: See above.
unsafe impl Sync for ReentrantLock {}

assert_impl_all!(ReentrantLock: Send, Sync);
assert_not_impl_any!(Guard<'_>: Sync, Send);

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrantLock {
    /// Creates an unlocked lock.
    pub(crate) const fn new() -> Self {
        Self {
            raw_mutex: RawMutex::INIT,
            owner: AtomicUsize::new(0),
            tickets: Cell::new(0),
        }
    }

    /// Returns whether any thread holds this lock.
    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.raw_mutex.is_locked()
    }

    /// Returns whether `guard` was issued by this lock.
    #[inline]
    pub(crate) fn is_locked_by(&self, guard: &Guard<'_>) -> bool {
        ptr::eq(self, guard.lock)
    }

    /// Returns whether the calling thread holds this lock.
    #[inline]
    pub(crate) fn is_locked_by_current_thread(&self) -> bool {
        self.owner.load(Relaxed) == execution_unit_id()
    }

    /// Acquires this lock, blocking while another thread holds it.
    ///
    /// Returns immediately if the calling thread already holds the lock.
    #[inline]
    pub(crate) fn lock(&self) -> Guard<'_> {
        if self.is_locked_by_current_thread() {
            // SAFETY: - owner is the id of the current execution unit.
            //         - By the invariants, the current execution unit holds raw_mutex
            //           and no other execution unit can change owner.
            return unsafe { self.add_ticket() };
        }
        self.lock_slow()
    }

    #[cold]
    fn lock_slow(&self) -> Guard<'_> {
        if !self.raw_mutex.try_lock() {
            tracing::trace!(lock = ?self.addr(), "lock held by another thread; blocking");
            self.raw_mutex.lock();
        }
        // SAFETY: - We've just locked the mutex.
        unsafe { self.add_ticket_after_lock() }
    }

    /// Acquires this lock if that is possible without blocking.
    #[inline]
    pub(crate) fn try_lock(&self) -> Option<Guard<'_>> {
        if self.is_locked_by_current_thread() {
            // SAFETY: - Same as in lock.
            return Some(unsafe { self.add_ticket() });
        }
        self.raw_mutex.try_lock().then(|| {
            // SAFETY: - We've just locked the mutex.
            unsafe { self.add_ticket_after_lock() }
        })
    }

    /// # Safety
    ///
    /// - The current execution unit must just have locked raw_mutex.
    #[inline]
    unsafe fn add_ticket_after_lock(&self) -> Guard<'_> {
        // Holding raw_mutex allows us to claim ownership.
        self.owner.store(execution_unit_id(), Relaxed);
        // SAFETY: - owner is now the id of the current execution unit.
        unsafe { self.add_ticket() }
    }

    /// # Safety
    ///
    /// - owner must be the id of the current execution unit.
    #[inline]
    unsafe fn add_ticket(&self) -> Guard<'_> {
        // The current execution unit holds raw_mutex, so it may access tickets.
        let tickets = self.tickets.get();
        if tickets == u64::MAX {
            #[cold]
            fn never() -> ! {
                #[allow(clippy::empty_loop)]
                loop {}
            }
            never();
        }
        self.tickets.set(tickets + 1);
        Guard {
            lock: self,
            _phantom_not_send: Default::default(),
            _phantom_not_sync: Default::default(),
        }
    }

    /// # Safety
    ///
    /// - owner must be the id of the current execution unit.
    /// - tickets must be > 0.
    #[inline]
    unsafe fn release_ticket(&self) {
        let tickets = self.tickets.get();
        debug_assert!(tickets > 0);
        self.tickets.set(tickets - 1);
        if tickets == 1 {
            debug_assert_eq!(self.owner.load(Relaxed), execution_unit_id());
            self.owner.store(0, Relaxed);
            // SAFETY: - The last ticket is gone and the current execution unit still
            //           holds raw_mutex.
            unsafe {
                self.raw_mutex.unlock();
            }
        }
    }

    #[inline]
    pub(crate) fn addr(&self) -> *const u8 {
        let addr: *const Self = self;
        addr.cast()
    }
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: - This guard owns a ticket, so owner is the id of the current
        //           execution unit and tickets > 0.
        unsafe {
            self.lock.release_ticket();
        }
    }
}
