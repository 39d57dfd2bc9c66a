//! This crate provides three wrappers for values that have to cross thread or task
//! boundaries in code that is otherwise single-threaded by convention.
//!
//! # Motivation
//!
//! Most state in a program tends to live on one thread. Occasionally a value has to be
//! shared with a worker thread or an async task, and the compiler rejects it because
//! the type is not [`Send`] or [`Sync`], or because the value needs to be mutated from
//! several places at once. The usual escape hatches, wrapping everything in a mutex or
//! sprinkling `unsafe impl Send` over unrelated types, are either heavy or too coarse.
//!
//! The wrappers in this crate each encode one concurrency contract:
//!
//! | Type | Enforcement | Sharing |
//! |---|---|---|
//! | [`Unchecked`] | none; the caller promises the usage is race free | value semantics |
//! | [`LockIsolated`] | re-entrant exclusive lock, blocking | shared handles |
//! | [`ActorIsolated`] | single tokio task per value, suspending | shared handles |
//!
//! [`LockIsolated`] and [`ActorIsolated`] never hand out references to their value
//! outside of a transaction. Read-modify-write sequences have to go through
//! `with_value`, which runs the whole sequence as one atomic step.
//!
//! # Example
//!
//! ```
//! use std::thread;
//! use isolated::LockIsolated;
//!
//! let requests = LockIsolated::new(Vec::new());
//! thread::scope(|scope| {
//!     for id in 0..4 {
//!         let requests = requests.clone();
//!         scope.spawn(move || requests.with_value(|requests| requests.push(id)));
//!     }
//! });
//! let mut requests = requests.value();
//! requests.sort();
//! assert_eq!(requests, [0, 1, 2, 3]);
//! ```
//!
//! The lock is re-entrant, so a transaction may call back into code that uses the same
//! value without deadlocking:
//!
//! ```
//! use isolated::LockIsolated;
//!
//! let total = LockIsolated::new(10);
//! let doubled = total.with_value(|total| {
//!     *total *= 2;
//!     *total
//! });
//! let seen = total.with_value(|_| total.value());
//! assert_eq!((doubled, seen), (20, 20));
//! ```

pub use {actor_isolated::ActorIsolated, error::Error, lock_isolated::LockIsolated, unchecked::Unchecked};

pub mod actor_isolated;
mod codec;
mod error;
mod execution_unit;
mod lock;
mod lock_isolated;
mod unchecked;
