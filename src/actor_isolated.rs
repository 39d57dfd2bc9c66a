use {
    crate::Error,
    std::{
        any::Any,
        fmt::{Debug, Formatter},
        panic::{self, AssertUnwindSafe},
    },
    tokio::{
        runtime::Handle,
        sync::{mpsc, oneshot},
    },
    tracing::{Instrument, debug, debug_span, warn},
};


/// The mailbox capacity used by [`Builder::new`].
pub const DEFAULT_CAPACITY: usize = 32;

type Job<V> = Box<dyn FnOnce(&mut V) + Send>;

type Outcome<T> = Result<T, Box<dyn Any + Send>>;

/// A value owned by a dedicated tokio task.
///
/// The task is the only place the value is ever touched. Transactions submitted through
/// [`with_value`](Self::with_value) and [`set_value`](Self::set_value) are queued in a
/// FIFO mailbox and run one at a time, each to completion, before the next one starts.
/// Submitting is a suspension point for the caller, not a thread block.
///
/// Transactions submitted one after another by the same caller run in that order.
/// Transactions of independent callers run in some order, but never interleave.
///
/// Cloning an `ActorIsolated` produces another handle to the same value. The task and
/// the value are dropped once the last handle is gone and the queued transactions have
/// run.
///
/// # Example
///
/// ```
/// use isolated::ActorIsolated;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let events = ActorIsolated::new(Vec::new()).unwrap();
/// let track = {
///     let events = events.clone();
///     move |event: &'static str| {
///         let events = events.clone();
///         async move { events.with_value(move |events| events.push(event)).await }
///     }
/// };
/// track("button tapped").await.unwrap();
/// track("settings opened").await.unwrap();
/// let events = events.value().await.unwrap();
/// assert_eq!(events, ["button tapped", "settings opened"]);
/// # });
/// ```
pub struct ActorIsolated<V> {
    mailbox: mpsc::Sender<Job<V>>,
}

/// Configures and creates an [`ActorIsolated`].
///
/// # Example
///
/// ```
/// use isolated::actor_isolated::Builder;
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let count = Builder::new()
///     .capacity(8)
///     .name("request-count")
///     .handle(runtime.handle().clone())
///     .build(0u64)
///     .unwrap();
/// runtime.block_on(async {
///     count.with_value(|count| *count += 1).await.unwrap();
///     assert_eq!(count.value().await.unwrap(), 1);
/// });
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    capacity: usize,
    handle: Option<Handle>,
    name: Option<String>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Creates a builder with a mailbox of [`DEFAULT_CAPACITY`] on the current runtime.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            handle: None,
            name: None,
        }
    }

    /// Sets how many transactions may wait in the mailbox.
    ///
    /// Submitting to a full mailbox suspends the caller until a slot frees up.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the runtime that hosts the task owning the value.
    ///
    /// Without a handle, the runtime of the calling context is used.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Sets a name that is attached to the task's tracing span.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Moves `value` into a new task and returns the first handle to it.
    pub fn build<V>(self, value: V) -> Result<ActorIsolated<V>, Error>
    where
        V: Send + 'static,
    {
        let handle = self.runtime()?;
        Ok(self.spawn(&handle, value))
    }

    /// Awaits `producer` once and moves the value it produces into a new task.
    ///
    /// The configuration is checked before `producer` is polled. If `producer` fails,
    /// its error is returned and no task is spawned.
    pub async fn try_build<V, E>(
        self,
        producer: impl Future<Output = Result<V, E>>,
    ) -> Result<ActorIsolated<V>, E>
    where
        V: Send + 'static,
        E: From<Error>,
    {
        let handle = self.runtime()?;
        let value = producer.await?;
        Ok(self.spawn(&handle, value))
    }

    fn runtime(&self) -> Result<Handle, Error> {
        if self.capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        match &self.handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| Error::NoRuntime),
        }
    }

    fn spawn<V>(self, handle: &Handle, value: V) -> ActorIsolated<V>
    where
        V: Send + 'static,
    {
        let (mailbox, jobs) = mpsc::channel(self.capacity);
        let span = debug_span!(
            "actor_isolated",
            name = self.name.as_deref().unwrap_or("<unnamed>"),
            capacity = self.capacity
        );
        handle.spawn(serve(value, jobs).instrument(span));
        ActorIsolated { mailbox }
    }
}

async fn serve<V>(mut value: V, mut jobs: mpsc::Receiver<Job<V>>) {
    debug!("worker started");
    while let Some(job) = jobs.recv().await {
        job(&mut value);
    }
    debug!("all handles dropped; worker stopped");
}

impl<V> ActorIsolated<V>
where
    V: Send + 'static,
{
    /// Moves `value` into a new task on the current tokio runtime.
    ///
    /// Fails with [`Error::NoRuntime`] outside of a runtime. Use [`Builder`] to pick the
    /// runtime or the mailbox capacity.
    pub fn new(value: V) -> Result<Self, Error> {
        Builder::new().build(value)
    }

    /// Awaits `producer` once and moves the value it produces into a new task on the
    /// current tokio runtime.
    pub async fn try_new<E>(producer: impl Future<Output = Result<V, E>>) -> Result<Self, E>
    where
        E: From<Error>,
    {
        Builder::new().try_build(producer).await
    }

    /// Runs `operation` on the value inside the owning task and returns its result.
    ///
    /// The operation has exclusive access to the value for its whole duration. Its
    /// return value, including any `Err` it produces, is handed back unchanged. If it
    /// panics, the panic resumes in the caller and the task keeps serving later
    /// transactions.
    ///
    /// Dropping the returned future before the transaction has been queued discards
    /// it. Once queued, the transaction runs even if the future is dropped.
    ///
    /// Fails with [`Error::Closed`] if the owning task no longer exists.
    pub async fn with_value<T>(
        &self,
        operation: impl FnOnce(&mut V) -> T + Send + 'static,
    ) -> Result<T, Error>
    where
        T: Send + 'static,
    {
        let (reply, outcome) = oneshot::channel::<Outcome<T>>();
        let job: Job<V> = Box::new(move |value: &mut V| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| operation(value)));
            if outcome.is_err() {
                warn!("transaction panicked");
            }
            if reply.send(outcome).is_err() {
                debug!("caller went away; discarding the transaction's result");
            }
        });
        self.mailbox.send(job).await.map_err(|_| Error::Closed)?;
        match outcome.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(Error::Closed),
        }
    }

    /// Replaces the value.
    pub async fn set_value(&self, value: V) -> Result<(), Error> {
        self.with_value(move |current| *current = value).await
    }

    /// Replaces the value with the one produced by `producer`.
    ///
    /// `producer` runs inside the owning task. If it fails, the value is left unchanged
    /// and the error is returned.
    pub async fn try_set_value<E>(
        &self,
        producer: impl FnOnce() -> Result<V, E> + Send + 'static,
    ) -> Result<(), E>
    where
        E: From<Error> + Send + 'static,
    {
        self.with_value(move |current: &mut V| -> Result<(), E> {
            *current = producer()?;
            Ok(())
        })
        .await?
    }

    /// Returns a copy of the value.
    pub async fn value(&self) -> Result<V, Error>
    where
        V: Clone,
    {
        self.with_value(|value| value.clone()).await
    }
}

impl<V> ActorIsolated<V> {
    /// Returns whether the owning task is gone.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Returns whether both handles refer to the same value.
    pub fn same_value(&self, other: &Self) -> bool {
        self.mailbox.same_channel(&other.mailbox)
    }
}

impl<V> Clone for ActorIsolated<V> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<V> Debug for ActorIsolated<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorIsolated")
            .field("closed", &self.is_closed())
            .field("capacity", &self.mailbox.max_capacity())
            .finish_non_exhaustive()
    }
}
