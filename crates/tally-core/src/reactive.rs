//! `ObservableCell<T>` — a single-slot value cell with change notifications.
//!
//! The cell starts empty and is written by exactly one owner component;
//! arbitrary observers read it with [`ObservableCell::get`] or poll it
//! through a [`Subscription`]. Two write disciplines exist:
//!
//! - **direct** ([`ObservableCell::set`]): the value is stored immediately.
//!   Observers on the same context see it at once; there is no cross-context
//!   publication protocol, so this discipline is only safe when writer and
//!   reader share a context.
//! - **posted** ([`ObservableCell::post`]): the write is queued onto the
//!   cell's owning context and becomes visible only once that context drains
//!   to it. If the owning context is never drained, the value is permanently
//!   unobserved even though the producer finished.
//!
//! # Runtime Agnostic
//!
//! The cell itself uses only std primitives (RwLock, AtomicU64) and
//! poll-based subscriptions, so it works under any async runtime or in
//! sync-only code; only `post` touches an execution context.

// Allow expect on RwLock/Mutex access - lock poisoning from panics is
// unrecoverable, so expect() is the appropriate handling pattern.
#![allow(clippy::expect_used)]

use crate::context::TaskContext;
use crate::errors::TallyError;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Inner state shared by a cell and its subscriptions.
struct CellInner<T> {
    /// The current value; `None` until first written.
    value: RwLock<Option<T>>,
    /// Version counter incremented on each write.
    version: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> CellInner<T> {
    fn store(&self, value: T) {
        {
            let mut guard = self.value.write().expect("cell lock poisoned");
            *guard = Some(value);
        }
        self.version.fetch_add(1, Ordering::Release);
    }
}

/// A single-slot observable value cell.
///
/// Cloning the cell clones a handle to the same slot; handles are cheap and
/// `Send + Sync`.
///
/// # Example
///
/// ```rust,ignore
/// use tally_core::reactive::ObservableCell;
///
/// let cell: ObservableCell<u64> = ObservableCell::new();
/// let mut sub = cell.subscribe();
///
/// assert_eq!(cell.get(), None);
/// cell.set(42);
/// assert_eq!(cell.get(), Some(42));
/// assert_eq!(sub.poll(), Some(42));
/// assert_eq!(sub.poll(), None); // no new write since
/// ```
#[derive(Clone)]
pub struct ObservableCell<T> {
    inner: Arc<CellInner<T>>,
    /// Context that processes posted writes; `None` for direct-only cells.
    owner: Option<Arc<dyn TaskContext>>,
}

impl<T: Clone + Send + Sync + 'static> ObservableCell<T> {
    /// Create an empty cell supporting the direct discipline only.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(None),
                version: AtomicU64::new(0),
            }),
            owner: None,
        }
    }

    /// Create an empty cell whose posted writes drain through `owner`.
    pub fn bound(owner: Arc<dyn TaskContext>) -> Self {
        let mut cell = Self::new();
        cell.owner = Some(owner);
        cell
    }

    /// Read the current value, if any has been written.
    pub fn get(&self) -> Option<T> {
        self.inner
            .value
            .read()
            .expect("cell lock poisoned")
            .clone()
    }

    /// The number of writes observed so far.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Direct write: store `value` immediately.
    pub fn set(&self, value: T) {
        self.inner.store(value);
    }

    /// Posted write: queue the store onto the owning context.
    ///
    /// The write only takes effect when that context processes it; until
    /// then [`get`](Self::get) keeps returning the previous state. Returns
    /// [`TallyError::Invalid`] on a cell constructed without an owner.
    pub fn post(&self, value: T) -> Result<(), TallyError> {
        let owner = self
            .owner
            .as_ref()
            .ok_or_else(|| TallyError::invalid("posted write on a cell with no owning context"))?;
        let inner = Arc::clone(&self.inner);
        owner.spawn(
            async move {
                inner.store(value);
            }
            .boxed(),
        );
        Ok(())
    }

    /// Subscribe to writes.
    ///
    /// The subscription sees every state reached after its creation that is
    /// still current when it polls; intermediate values can be skipped.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            source: Arc::clone(&self.inner),
            last_version: self.inner.version.load(Ordering::Acquire),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ObservableCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A polling-based subscription to an [`ObservableCell`].
pub struct Subscription<T> {
    source: Arc<CellInner<T>>,
    last_version: u64,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    /// Return the current value if the cell was written since the last poll.
    pub fn poll(&mut self) -> Option<T> {
        let version = self.source.version.load(Ordering::Acquire);
        if version == self.last_version {
            return None;
        }
        self.last_version = version;
        self.source
            .value
            .read()
            .expect("cell lock poisoned")
            .clone()
    }
}
