use {
    crate::codec,
    serde::{Deserialize, Deserializer, Serialize, Serializer},
    std::{
        fmt::{Debug, Formatter},
        ops::{Deref, DerefMut},
    },
};


/// A value that is [`Send`] and [`Sync`] because its creator said so.
///
/// Wrapping a value asserts that the way the program uses it across threads is free of
/// data races, even though the compiler cannot prove it. Nothing checks this at
/// runtime. The wrapper has the same layout as `V` and behaves like `V` otherwise:
/// cloning it clones the value, comparisons and hashing forward to the value, and
/// fields of the value are reachable through [`Deref`] and [`DerefMut`].
///
/// Prefer [`LockIsolated`](crate::LockIsolated) when the value is mutated from more
/// than one thread.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use std::thread;
/// use isolated::Unchecked;
///
/// let handle = Rc::new(String::from("config"));
/// // SAFETY: This is the only reference to the Rc, so moving it to one other thread
/// //         cannot race on its reference count.
/// let handle = unsafe { Unchecked::new(handle) };
/// let len = thread::spawn(move || handle.len()).join().unwrap();
/// assert_eq!(len, 6);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Unchecked<V> {
    value: V,
}

// SAFETY: Upheld by the callers of Unchecked::new and Unchecked::deserialize_unchecked.
//         The safe constructors require V: Send + Sync.
unsafe impl<V> Send for Unchecked<V> {}

// SAFETY: See above.
unsafe impl<V> Sync for Unchecked<V> {}

impl<V> Unchecked<V> {
    /// Wraps `value`.
    ///
    /// # Safety
    ///
    /// The wrapper is `Send` and `Sync` regardless of `V`. The caller must ensure that
    /// every way the program moves or shares this wrapper between threads is free of
    /// data races and respects any thread affinity of `V`.
    #[inline]
    pub const unsafe fn new(value: V) -> Self {
        Self { value }
    }

    /// Decodes a value the way [`Deserialize`] does, for any `V`.
    ///
    /// # Safety
    ///
    /// Same as [`Unchecked::new`].
    pub unsafe fn deserialize_unchecked<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let value = codec::decode(deserializer)?;
        // SAFETY: Forwarded to the caller.
        Ok(unsafe { Self::new(value) })
    }

    /// Returns a reference to the value.
    ///
    /// This and the other accessors are associated functions so that they do not
    /// shadow methods of `V`.
    #[inline]
    pub fn get(this: &Self) -> &V {
        &this.value
    }

    #[inline]
    pub fn get_mut(this: &mut Self) -> &mut V {
        &mut this.value
    }

    #[inline]
    pub fn set(this: &mut Self, value: V) {
        this.value = value;
    }

    /// Replaces the value, returning the old one.
    #[inline]
    pub fn replace(this: &mut Self, value: V) -> V {
        std::mem::replace(&mut this.value, value)
    }

    #[inline]
    pub fn into_inner(this: Self) -> V {
        this.value
    }
}

impl<V> Deref for Unchecked<V> {
    type Target = V;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<V> DerefMut for Unchecked<V> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

impl<V> From<V> for Unchecked<V>
where
    V: Send + Sync,
{
    #[inline]
    fn from(value: V) -> Self {
        // SAFETY: V is already Send and Sync.
        unsafe { Self::new(value) }
    }
}

impl<V> Default for Unchecked<V>
where
    V: Default + Send + Sync,
{
    fn default() -> Self {
        V::default().into()
    }
}

impl<V> Debug for Unchecked<V>
where
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Unchecked").field(&self.value).finish()
    }
}

/// Encodes the bare value.
impl<V> Serialize for Unchecked<V>
where
    V: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.value.serialize(serializer)
    }
}

/// Decodes either the bare value or `{ "value": ... }`, preferring the bare form.
///
/// Use [`Unchecked::deserialize_unchecked`] when `V` is not `Send + Sync`.
impl<'de, V> Deserialize<'de> for Unchecked<V>
where
    V: Deserialize<'de> + Send + Sync,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        codec::decode::<_, V>(deserializer).map(Self::from)
    }
}
