//! The behavior trait and a closure-based implementation.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::error::BehaviorError;
use crate::hooks::definitions::{EventRecord, TransactionHandle};

/// A unit of extension logic executed at a hook point.
///
/// Implemented by compiled-in behaviors and by behaviors constructed inside
/// dynamically loaded units alike; the dispatch table does not distinguish.
#[async_trait]
pub trait Behavior: Send + Sync + std::fmt::Debug {
    /// Returns the globally unique behavior name.
    fn name(&self) -> &str;

    /// Returns a human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Returns the version string.
    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Executes the behavior.
    ///
    /// `tx` is shared by every behavior of one dispatch. Long-running work
    /// should observe `token`; the dispatcher never kills a behavior.
    async fn execute(
        &self,
        token: &CancellationToken,
        tx: &TransactionHandle,
        event: &EventRecord,
    ) -> Result<(), BehaviorError>;
}

type BehaviorFuture = BoxFuture<'static, Result<(), BehaviorError>>;
type BehaviorFn = dyn Fn(CancellationToken, TransactionHandle, EventRecord) -> BehaviorFuture + Send + Sync;

/// A closure-based behavior for quick built-ins and tests.
///
/// The closure receives owned clones of the token, transaction handle and
/// event so the returned future can be `'static`.
pub struct FnBehavior {
    /// Behavior name.
    name: String,
    /// Description.
    description: String,
    /// Version.
    version: String,
    /// Behavior function.
    handler: Arc<BehaviorFn>,
}

impl std::fmt::Debug for FnBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBehavior")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnBehavior {
    /// Creates a new closure-based behavior.
    pub fn new<F, Fut>(name: &str, handler: F) -> Self
    where
        F: Fn(CancellationToken, TransactionHandle, EventRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BehaviorError>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            description: String::new(),
            version: "0.0.0".to_string(),
            handler: Arc::new(move |token, tx, event| handler(token, tx, event).boxed()),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Wraps the behavior into an `Arc<dyn Behavior>`.
    pub fn shared(self) -> Arc<dyn Behavior> {
        Arc::new(self)
    }
}

#[async_trait]
impl Behavior for FnBehavior {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        tx: &TransactionHandle,
        event: &EventRecord,
    ) -> Result<(), BehaviorError> {
        (self.handler)(token.clone(), tx.clone(), event.clone()).await
    }
}
