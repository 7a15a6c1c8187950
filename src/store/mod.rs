//! `Store`: the engine's only I/O boundary (spec.md §4.1).
//!
//! Stores are stateful configuration (auth, endpoint) but stateless per
//! call; concurrent calls on the same Store must be safe (spec.md §4.1,
//! §5) — the same contract the teacher's storage engine gives its
//! per-database handles, except here the backing I/O is genuinely remote
//! rather than a local Parquet file, so `get` is `async`.

pub mod retry;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::constraint::Constraint;
use crate::error::StoreResult;
use crate::object::ObjectRef;
use crate::query::Query;

pub use retry::{get_with_retry, RetryPolicy};

/// Sink a Store pushes resolved Objects into.
///
/// "Append this Object, may reject on capacity" (spec.md §4.1): once
/// `limit` objects have been pushed, further pushes are silently dropped
/// and `push` reports `false` so callers can stop early.
#[derive(Debug, Default)]
pub struct Appender {
    items: Vec<ObjectRef>,
    limit: Option<usize>,
}

impl Appender {
    pub fn new(limit: Option<usize>) -> Self {
        Appender {
            items: Vec::new(),
            limit,
        }
    }

    /// Push one Object. Returns `false` if the appender is at capacity —
    /// the object is discarded, not an error.
    pub fn push(&mut self, object: ObjectRef) -> bool {
        if let Some(limit) = self.limit {
            if self.items.len() >= limit {
                return false;
            }
        }
        self.items.push(object);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_inner(self) -> Vec<ObjectRef> {
        self.items
    }
}

/// Executes a Query against a backend, pushing results into an [`Appender`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Resolve `query` and append each resulting Object.
    ///
    /// Implementations should push into `appender` as results arrive
    /// rather than building an intermediate `Vec` when the backend
    /// streams, and should honor `cancel` by returning
    /// `Err(StoreError::Cancelled)` promptly once it is triggered.
    async fn get(
        &self,
        query: &dyn Query,
        constraint: &Constraint,
        appender: &mut Appender,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;
}
