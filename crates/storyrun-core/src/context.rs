//! Execution context handed to every bound action.
//!
//! The context is supplied by whoever runs a test and is passed through to
//! actions untouched. It carries application services (looked up by type)
//! and a cooperative cancellation signal. It is never resolved from text.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::value::ValueType;

/// Ambient services and cancellation for one test execution.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    cancel: CancellationToken,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("services", &self.services.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ExecutionContext {
    /// Create an empty context with a fresh cancellation token.
    pub fn new() -> Self {
        ExecutionContext::default()
    }

    /// Create a context observing an existing cancellation token.
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        ExecutionContext {
            services: HashMap::new(),
            cancel,
        }
    }

    /// The type descriptor for context parameters.
    pub fn value_type() -> ValueType {
        ValueType::Context
    }

    /// Add a service, replacing any earlier service of the same type.
    pub fn with_service<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    /// Add a service, replacing any earlier service of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
    }

    /// Borrow the service of type `T`.
    pub fn service<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|service| service.downcast_ref::<T>())
    }

    /// The cancellation token observed by this context.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Signal cancellation to every holder of this context's token.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Ledger {
        entries: Mutex<Vec<i64>>,
    }

    #[test]
    fn services_are_found_by_type() {
        let ctx = ExecutionContext::new()
            .with_service(Ledger::default())
            .with_service(String::from("eu-west"));

        ctx.service::<Ledger>().unwrap().entries.lock().unwrap().push(5);
        assert_eq!(*ctx.service::<Ledger>().unwrap().entries.lock().unwrap(), vec![5]);
        assert_eq!(ctx.service::<String>().unwrap(), "eu-west");
        assert!(ctx.service::<u32>().is_none());
    }

    #[test]
    fn clones_share_services_and_cancellation() {
        let ctx = ExecutionContext::new().with_service(Ledger::default());
        let clone = ctx.clone();
        clone.service::<Ledger>().unwrap().entries.lock().unwrap().push(1);
        assert_eq!(ctx.service::<Ledger>().unwrap().entries.lock().unwrap().len(), 1);

        assert!(!ctx.is_cancelled());
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn external_token_controls_cancellation() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::with_cancellation(token.child_token());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn context_type_is_not_a_value_type() {
        assert_eq!(ExecutionContext::value_type(), ValueType::Context);
    }
}
