use {
    crate::LockIsolated,
    proptest::prelude::*,
    std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
        panic::{self, AssertUnwindSafe},
        sync::Barrier,
        thread,
    },
};

fn run_in_thread<T: Send>(f: impl FnOnce() -> T + Send) -> T {
    thread::scope(|s| s.spawn(|| f()).join().unwrap())
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn with_value() {
    let isolated = LockIsolated::new(1);
    let old = isolated.with_value(|value| {
        let old = *value;
        *value = 2;
        old
    });
    assert_eq!(old, 1);
    assert_eq!(isolated.value(), 2);
    assert!(!isolated.shared.lock.is_locked());
}

#[test]
fn concurrent_increments() {
    const THREADS: usize = 16;
    const ROUNDS: usize = 1000;
    let isolated = LockIsolated::new(0);
    let barrier = Barrier::new(THREADS);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..ROUNDS {
                    isolated.with_value(|value| *value += 1);
                }
            });
        }
    });
    assert_eq!(isolated.value(), THREADS * ROUNDS);
}

#[test]
fn one_increment_per_thread() {
    const THREADS: usize = 64;
    let isolated = LockIsolated::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            let isolated = isolated.clone();
            s.spawn(move || isolated.with_value(|value| *value += 1));
        }
    });
    assert_eq!(isolated.value(), THREADS);
}

#[test]
fn reentrant_with_value() {
    let isolated = LockIsolated::new(0);
    let inner = isolated.with_value(|outer| {
        *outer += 1;
        isolated.with_value(|inner| {
            assert_eq!(*inner, 0);
            *inner += 10;
            *inner
        })
    });
    assert_eq!(inner, 10);
    // The outer copy is written back after the nested one.
    assert_eq!(isolated.value(), 1);
    assert!(!isolated.shared.lock.is_locked());
}

#[test]
fn reentrant_reads_and_writes() {
    let isolated = LockIsolated::new(String::from("a"));
    isolated
        .try_set_value(|| Ok::<_, ()>(isolated.value() + "b"))
        .unwrap();
    assert_eq!(isolated.value(), "ab");
    let len = isolated.with_value(|_| isolated.read(String::len));
    assert_eq!(len, 2);
    isolated.with_value(|value| {
        isolated.set_value(String::from("ignored"));
        value.push('c');
    });
    assert_eq!(isolated.value(), "abc");
}

#[test]
fn failed_transaction() {
    let isolated = LockIsolated::new(vec![1]);
    let result: Result<(), &str> = isolated.with_value(|value| {
        value.push(2);
        Err("failed")
    });
    assert_eq!(result, Err("failed"));
    assert_eq!(isolated.value(), [1, 2]);
    assert!(!isolated.shared.lock.is_locked());
    run_in_thread(|| isolated.with_value(|value| value.push(3)));
    assert_eq!(isolated.value(), [1, 2, 3]);
}

#[test]
fn panicking_transaction() {
    let isolated = LockIsolated::new(0);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        isolated.with_value(|value| {
            *value = 5;
            if *value == 5 {
                panic!("transaction failed");
            }
        })
    }));
    assert!(result.is_err());
    assert!(!isolated.shared.lock.is_locked());
    assert_eq!(run_in_thread(|| isolated.value()), 5);
}

#[test]
fn try_new() {
    let isolated = LockIsolated::try_new(|| Ok::<_, &str>(3)).unwrap();
    assert_eq!(isolated.value(), 3);
    let mut calls = 0;
    let result = LockIsolated::<i32>::try_new(|| {
        calls += 1;
        Err("no value")
    });
    assert_eq!(result.err(), Some("no value"));
    assert_eq!(calls, 1);
}

#[test]
fn set_value() {
    let isolated = LockIsolated::new(1);
    isolated.set_value(2);
    assert_eq!(isolated.value(), 2);
    assert_eq!(isolated.try_set_value(|| Err("nope")), Err("nope"));
    assert_eq!(isolated.value(), 2);
    assert!(!isolated.shared.lock.is_locked());
    assert_eq!(isolated.try_set_value(|| Ok::<_, &str>(3)), Ok(()));
    assert_eq!(isolated.value(), 3);
}

#[test]
fn read_field() {
    #[derive(Clone)]
    struct Point {
        x: i32,
        y: i32,
    }
    let isolated = LockIsolated::new(Point { x: 1, y: 2 });
    assert_eq!(isolated.read(|point| point.x), 1);
    isolated.with_value(|point| point.y = 7);
    assert_eq!(isolated.read(|point| point.y), 7);
}

#[test]
#[should_panic(expected = "already borrowed")]
fn write_inside_read() {
    let isolated = LockIsolated::new(0);
    isolated.read(|_| isolated.set_value(1));
}

#[test]
fn clones_share_the_value() {
    let isolated = LockIsolated::new(0);
    let copy = isolated.clone();
    assert!(LockIsolated::ptr_eq(&isolated, &copy));
    copy.with_value(|value| *value = 7);
    assert_eq!(isolated.value(), 7);
    run_in_thread(|| copy.set_value(8));
    assert_eq!(isolated.value(), 8);
    assert!(!LockIsolated::ptr_eq(&isolated, &LockIsolated::new(8)));
}

#[test]
fn eq_and_hash() {
    let a = LockIsolated::new(String::from("x"));
    let b = LockIsolated::new(String::from("x"));
    assert_eq!(a, b);
    assert_eq!(a, a.clone());
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(hash_of(&a), hash_of(&String::from("x")));
    b.set_value(String::from("y"));
    assert_ne!(a, b);
}

#[test]
fn default_and_from() {
    let isolated = LockIsolated::<Vec<u8>>::default();
    assert!(isolated.value().is_empty());
    let isolated = LockIsolated::from(4);
    assert_eq!(isolated.value(), 4);
}

#[test]
fn debug() {
    let s = "hello world";
    let isolated = LockIsolated::new(s);
    assert!(format!("{isolated:?}").contains(s));
    let _guard = isolated.shared.lock.lock();
    assert!(format!("{isolated:?}").contains(s));
    let formatted = run_in_thread(|| format!("{isolated:?}"));
    assert!(!formatted.contains(s));
    assert!(formatted.contains("<locked>"));
}

#[test]
fn debug_inside_transaction() {
    let isolated = LockIsolated::new(1);
    let formatted = isolated.read(|_| format!("{isolated:?}"));
    assert!(formatted.contains('1'));
}

proptest! {
    #[test]
    fn with_value_stores_what_the_transaction_leaves(
        initial in any::<i64>(),
        next in any::<i64>(),
        output in any::<u8>(),
    ) {
        let isolated = LockIsolated::new(initial);
        let returned = isolated.with_value(|value| {
            *value = next;
            output
        });
        prop_assert_eq!(returned, output);
        prop_assert_eq!(isolated.value(), next);
    }
}
