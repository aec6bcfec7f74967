//! Cooperative cancellation and step budgeting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::BridgeError;

/// Shared cancel flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. the one a UI "Stop" button toggles.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Polled by every iterator advance and by long filter loops.
#[derive(Debug)]
pub struct ExecutionGuard {
    cancel: CancelToken,
    budget: Option<u64>,
    used: u64,
}

impl Default for ExecutionGuard {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl ExecutionGuard {
    pub fn new(cancel: CancelToken, budget: Option<u64>) -> Self {
        Self { cancel, budget, used: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(CancelToken::new(), None)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Check the cancel flag only.
    pub fn poll(&self) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() {
            Err(BridgeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Account for one step. Fails once the budget is spent.
    pub fn step(&mut self) -> Result<(), BridgeError> {
        self.poll()?;
        if let Some(budget) = self.budget
            && self.used >= budget
        {
            return Err(BridgeError::BudgetExhausted(budget));
        }
        self.used += 1;
        Ok(())
    }

    pub fn budget(&self) -> Option<u64> {
        self.budget
    }

    pub fn steps_used(&self) -> u64 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_exactly_its_size() {
        let mut guard = ExecutionGuard::new(CancelToken::new(), Some(3));
        for _ in 0..3 {
            guard.step().unwrap();
        }
        assert_eq!(guard.step(), Err(BridgeError::BudgetExhausted(3)));
        assert_eq!(guard.steps_used(), 3);
    }

    #[test]
    fn cancellation_is_seen_through_clones() {
        let token = CancelToken::new();
        let mut guard = ExecutionGuard::new(token.clone(), None);
        guard.step().unwrap();
        token.cancel();
        assert_eq!(guard.poll(), Err(BridgeError::Cancelled));
        assert_eq!(guard.step(), Err(BridgeError::Cancelled));
    }
}
