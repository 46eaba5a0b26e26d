//! Execution context handling.

use parking_lot::Mutex;
use rawork_core::{ErrorCode, WorkError, WorkId};
use std::collections::HashMap;
use tracing::debug;

use crate::work::ExecutionContext;

/// Validates and applies the [`ExecutionContext`] of a unit.
pub trait ContextHandler: Send + Sync {
    /// Check the context at submission. An error rejects the unit before it
    /// is accepted.
    fn validate(&self, context: Option<&ExecutionContext>) -> Result<(), WorkError>;

    /// Establish the context right before the unit runs. An error fails the
    /// unit without running it.
    fn setup(&self, work_id: WorkId, context: Option<&ExecutionContext>) -> Result<(), WorkError>;

    /// Tear the context down after the unit ran.
    fn release(&self, work_id: WorkId, context: Option<&ExecutionContext>);
}

/// Default handler: validates imported transactions and refuses to run two
/// units in the same transaction at once.
#[derive(Debug, Default)]
pub struct TransactionContextHandler {
    active: Mutex<HashMap<String, WorkId>>,
}

impl TransactionContextHandler {
    /// Create a handler with no active transactions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions with a unit running in them.
    pub fn active_transactions(&self) -> usize {
        self.active.lock().len()
    }
}

impl ContextHandler for TransactionContextHandler {
    fn validate(&self, context: Option<&ExecutionContext>) -> Result<(), WorkError> {
        let Some(context) = context else {
            return Ok(());
        };

        if let Some(xid) = &context.xid {
            if xid.trim().is_empty() {
                return Err(WorkError::rejected(
                    ErrorCode::Undefined,
                    "execution context carries an empty xid",
                ));
            }
        }

        if context.transaction_timeout.is_some_and(|t| t.is_zero()) {
            return Err(WorkError::rejected(
                ErrorCode::Undefined,
                "transaction timeout must be positive",
            ));
        }

        Ok(())
    }

    fn setup(&self, work_id: WorkId, context: Option<&ExecutionContext>) -> Result<(), WorkError> {
        let Some(xid) = context.and_then(|c| c.xid.as_ref()) else {
            return Ok(());
        };

        let mut active = self.active.lock();
        if let Some(owner) = active.get(xid) {
            debug!("transaction {} already in use by work {}", xid, owner);
            return Err(WorkError::completed(
                ErrorCode::TxConcurrentWorkDisallowed,
                format!("transaction {} already has work running in it", xid),
            ));
        }
        active.insert(xid.clone(), work_id);
        Ok(())
    }

    fn release(&self, work_id: WorkId, context: Option<&ExecutionContext>) {
        let Some(xid) = context.and_then(|c| c.xid.as_ref()) else {
            return;
        };

        let mut active = self.active.lock();
        if active.get(xid) == Some(&work_id) {
            active.remove(xid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_accepts_missing_context() {
        let handler = TransactionContextHandler::new();
        assert!(handler.validate(None).is_ok());
        assert!(handler.validate(Some(&ExecutionContext::new())).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_transactions() {
        let handler = TransactionContextHandler::new();

        let empty_xid = ExecutionContext::new().with_xid("  ");
        let err = handler.validate(Some(&empty_xid)).unwrap_err();
        assert!(err.is_rejected());

        let zero_timeout = ExecutionContext::new()
            .with_xid("tx")
            .with_transaction_timeout(Duration::ZERO);
        assert!(handler.validate(Some(&zero_timeout)).unwrap_err().is_rejected());
    }

    #[test]
    fn test_concurrent_work_in_same_transaction_is_refused() {
        let handler = TransactionContextHandler::new();
        let context = ExecutionContext::new().with_xid("tx-42");
        let first = WorkId::new();
        let second = WorkId::new();

        handler.setup(first, Some(&context)).unwrap();
        let err = handler.setup(second, Some(&context)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TxConcurrentWorkDisallowed);
        assert!(!err.is_rejected());

        // Only the owner releases the transaction.
        handler.release(second, Some(&context));
        assert_eq!(handler.active_transactions(), 1);
        handler.release(first, Some(&context));
        assert_eq!(handler.active_transactions(), 0);

        handler.setup(second, Some(&context)).unwrap();
    }
}
