//! # Result Hooks
//!
//! In-process observers of the assessment pipeline. Every hook sees each
//! produced result as `(Some(result), None)` and each reported failure as
//! `(None, Some(error))`.
//!
//! Hooks are isolated from one another: a hook that returns an error or
//! panics is logged, and the remaining hooks still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use vigil_core::AssessmentResult;

use crate::error::{AssessmentError, HookError};

/// Observer of assessment results and failures.
pub trait ResultHook: Send + Sync {
    /// Called once per result or failure.
    fn on_result(
        &self,
        result: Option<&AssessmentResult>,
        error: Option<&AssessmentError>,
    ) -> Result<(), HookError>;
}

impl<F> ResultHook for F
where
    F: Fn(Option<&AssessmentResult>, Option<&AssessmentError>) -> Result<(), HookError>
        + Send
        + Sync,
{
    fn on_result(
        &self,
        result: Option<&AssessmentResult>,
        error: Option<&AssessmentError>,
    ) -> Result<(), HookError> {
        self(result, error)
    }
}

/// The registered hooks of one service instance.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn ResultHook>>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.len())
            .finish()
    }
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook.
    pub fn register(&self, hook: Arc<dyn ResultHook>) {
        self.hooks.write().push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every hook. Returns how many failed.
    ///
    /// Hooks run outside the registry lock, so a hook may register further
    /// hooks; those see the next call.
    pub fn inform(
        &self,
        result: Option<&AssessmentResult>,
        error: Option<&AssessmentError>,
    ) -> usize {
        let hooks: Vec<Arc<dyn ResultHook>> = self.hooks.read().clone();
        let mut failures = 0;
        for (index, hook) in hooks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| hook.on_result(result, error))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(hook = index, error = %e, "result hook failed");
                }
                Err(_) => {
                    failures += 1;
                    tracing::error!(hook = index, "result hook panicked");
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::ValidationError;

    fn counting(counter: Arc<AtomicUsize>) -> Arc<dyn ResultHook> {
        Arc::new(
            move |_: Option<&AssessmentResult>, _: Option<&AssessmentError>| -> Result<(), HookError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        )
    }

    #[test]
    fn failing_and_panicking_hooks_do_not_stop_siblings() {
        let registry = HookRegistry::new();
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));

        registry.register(counting(before.clone()));
        registry.register(Arc::new(
            |_: Option<&AssessmentResult>, _: Option<&AssessmentError>| -> Result<(), HookError> {
                Err(HookError("storage offline".into()))
            },
        ));
        registry.register(Arc::new(
            |_: Option<&AssessmentResult>, _: Option<&AssessmentError>| -> Result<(), HookError> {
                panic!("hook bug")
            },
        ));
        registry.register(counting(after.clone()));

        let error = AssessmentError::from(ValidationError::MissingTimestamp);
        assert_eq!(registry.inform(None, Some(&error)), 2);
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_receive_the_error() {
        let registry = HookRegistry::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.register(Arc::new(
            move |result: Option<&AssessmentResult>,
                  error: Option<&AssessmentError>|
                  -> Result<(), HookError> {
                assert!(result.is_none());
                sink.lock().push(error.map(ToString::to_string));
                Ok(())
            },
        ));
        let error = AssessmentError::from(ValidationError::MissingToolId);
        registry.inform(None, Some(&error));
        assert_eq!(
            seen.lock().as_slice(),
            &[Some("invalid evidence: tool id is missing".to_string())]
        );
    }
}
