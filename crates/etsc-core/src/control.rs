// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::EtscError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Caller-supplied resource limits for fit/predict calls.
///
/// Budgets are a caller policy layered on top of the algorithm: the engine
/// itself never times out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Wall-clock budget for a single operation, in milliseconds.
    pub time_budget_ms: Option<u64>,
    /// Maximum number of checkpoint evaluations per operation.
    pub max_checkpoint_evals: Option<usize>,
}

/// Cooperative cancellation token shared between caller and engine.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Unified execution context passed through fit/predict calls.
pub struct ExecutionContext<'a> {
    pub constraints: &'a Constraints,
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> ExecutionContext<'a> {
    /// Creates a context with no cancellation hook.
    pub fn new(constraints: &'a Constraints) -> Self {
        Self {
            constraints,
            cancel: None,
        }
    }

    /// Sets the optional cancellation token.
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns true when cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Returns a cancelled error when cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), EtscError> {
        if self.is_cancelled() {
            return Err(EtscError::cancelled());
        }
        Ok(())
    }

    /// Checks cancellation every `every` iterations.
    ///
    /// When `every` is zero, it is treated as one (always poll).
    pub fn check_cancelled_every(&self, iteration: usize, every: usize) -> Result<(), EtscError> {
        let every = every.max(1);
        if iteration % every != 0 {
            return Ok(());
        }
        self.check_cancelled()
    }

    /// Checks the checkpoint-evaluation budget.
    pub fn check_checkpoint_budget(&self, checkpoint_evals: usize) -> Result<(), EtscError> {
        let Some(limit) = self.constraints.max_checkpoint_evals else {
            return Ok(());
        };

        if checkpoint_evals <= limit {
            return Ok(());
        }

        Err(EtscError::resource_limit(format!(
            "constraints.max_checkpoint_evals exceeded: used={checkpoint_evals}, limit={limit}"
        )))
    }

    /// Checks the elapsed wall-clock budget.
    pub fn check_time_budget(&self, started_at: Instant) -> Result<(), EtscError> {
        let Some(limit_ms) = self.constraints.time_budget_ms else {
            return Ok(());
        };

        let elapsed_ms = started_at.elapsed().as_millis();
        if elapsed_ms <= u128::from(limit_ms) {
            return Ok(());
        }

        Err(EtscError::resource_limit(format!(
            "constraints.time_budget_ms exceeded: elapsed_ms={elapsed_ms}, limit_ms={limit_ms}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, Constraints, ExecutionContext};
    use std::time::{Duration, Instant};

    #[test]
    fn new_context_has_no_cancel_hook() {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        assert!(ctx.cancel.is_none());
        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn cancel_token_propagates_through_context() {
        let constraints = Constraints::default();
        let cancel = CancelToken::new();
        let ctx = ExecutionContext::new(&constraints).with_cancel(&cancel);

        assert!(ctx.check_cancelled().is_ok());
        cancel.cancel();
        let err = ctx
            .check_cancelled()
            .expect_err("cancelled token should return an error");
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let cancel = CancelToken::new();
        let shared = cancel.clone();
        shared.cancel();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn check_cancelled_every_polls_on_cadence() {
        let constraints = Constraints::default();
        let cancel = CancelToken::new();
        let ctx = ExecutionContext::new(&constraints).with_cancel(&cancel);
        cancel.cancel();

        assert!(ctx.check_cancelled_every(1, 4).is_ok());
        assert!(ctx.check_cancelled_every(4, 4).is_err());
        // every=0 behaves like every=1
        assert!(ctx.check_cancelled_every(3, 0).is_err());
    }

    #[test]
    fn checkpoint_budget_without_limit_always_passes() {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        assert!(ctx.check_checkpoint_budget(usize::MAX).is_ok());
    }

    #[test]
    fn checkpoint_budget_over_limit_reports_resource_limit() {
        let constraints = Constraints {
            max_checkpoint_evals: Some(10),
            ..Constraints::default()
        };
        let ctx = ExecutionContext::new(&constraints);

        assert!(ctx.check_checkpoint_budget(10).is_ok());
        let err = ctx
            .check_checkpoint_budget(11)
            .expect_err("over-budget should fail");
        assert_eq!(
            err.to_string(),
            "resource limit exceeded: constraints.max_checkpoint_evals exceeded: used=11, limit=10"
        );
    }

    #[test]
    fn time_budget_over_limit_reports_resource_limit() {
        let constraints = Constraints {
            time_budget_ms: Some(1),
            ..Constraints::default()
        };
        let ctx = ExecutionContext::new(&constraints);
        let started_at = Instant::now()
            .checked_sub(Duration::from_millis(20))
            .expect("checked_sub should produce a valid earlier instant");

        let err = ctx
            .check_time_budget(started_at)
            .expect_err("elapsed budget should fail");
        let msg = err.to_string();
        assert!(msg.contains("constraints.time_budget_ms exceeded"));
        assert!(msg.contains("limit_ms=1"));
    }

    #[test]
    fn time_budget_without_limit_always_passes() {
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        assert!(ctx.check_time_budget(Instant::now()).is_ok());
    }
}
