//! Convergence driver - the get/branch/create-or-update loop

use crate::context::{Action, RunContext};
use crate::error::Result;
use crate::resource::Reconciler;
use crate::types::{Converged, Lookup};
use chrono::Utc;

/// Converge one desired resource
///
/// 1. Refuse to touch the provider if the run is already rolled back.
/// 2. Read current state.
/// 3. Create when absent, update when present.
/// 4. Record an action for any change; flip the run into rollback on error.
pub fn converge<R>(
    reconciler: &R,
    ctx: &mut RunContext,
    desired: &R::Desired,
) -> Result<Converged<R::Actual>>
where
    R: Reconciler + ?Sized,
{
    let kind = reconciler.kind();
    let name = reconciler.name(desired);
    ctx.ensure_ready(kind, name)?;

    let result = match reconciler.get(name) {
        Ok(Lookup::Found(actual)) => {
            log::info!("Updating {kind} \"{name}\"");
            reconciler.update(actual, desired)
        }
        Ok(Lookup::NotFound) => {
            log::info!("Creating {kind} \"{name}\"");
            reconciler.create(desired).map(Converged::created)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(converged) => {
            log::debug!("{kind} \"{name}\" {}", converged.outcome);
            if converged.outcome.is_change() {
                ctx.record_action(Action::reconciled(kind, name, converged.outcome, Utc::now()));
            }
            Ok(converged)
        }
        Err(e) => {
            log::warn!("Error reconciling {kind} \"{name}\": {e}");
            Err(ctx.fail(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunState;
    use crate::error::Error;
    use crate::types::{Outcome, ResourceKind};
    use std::cell::{Cell, RefCell};

    /// Mock reconciler over a single optional value
    #[derive(Default)]
    struct MockReconciler {
        current: RefCell<Option<u32>>,
        fail_get: bool,
        fail_update: bool,
        gets: Cell<usize>,
    }

    #[derive(Debug)]
    struct Desired {
        name: String,
        value: u32,
    }

    impl Reconciler for MockReconciler {
        type Desired = Desired;
        type Actual = u32;

        fn kind(&self) -> ResourceKind {
            ResourceKind::Role
        }

        fn name<'d>(&self, desired: &'d Desired) -> &'d str {
            &desired.name
        }

        fn get(&self, name: &str) -> Result<Lookup<u32>> {
            self.gets.set(self.gets.get() + 1);
            if self.fail_get {
                return Err(Error::provider(
                    "GetRole",
                    ResourceKind::Role,
                    name,
                    std::io::Error::other("denied"),
                ));
            }
            Ok((*self.current.borrow()).into())
        }

        fn create(&self, desired: &Desired) -> Result<u32> {
            *self.current.borrow_mut() = Some(desired.value);
            Ok(desired.value)
        }

        fn update(&self, actual: u32, desired: &Desired) -> Result<Converged<u32>> {
            if self.fail_update {
                return Err(Error::immutable(
                    ResourceKind::Role,
                    &desired.name,
                    "path",
                    "/",
                    "/x/",
                ));
            }
            if actual == desired.value {
                return Ok(Converged::unchanged(actual));
            }
            *self.current.borrow_mut() = Some(desired.value);
            Ok(Converged::updated(desired.value))
        }
    }

    fn desired(value: u32) -> Desired {
        Desired {
            name: "svc".into(),
            value,
        }
    }

    #[test]
    fn test_converge_creates_then_is_unchanged() {
        let reconciler = MockReconciler::default();
        let mut ctx = RunContext::new();

        let first = converge(&reconciler, &mut ctx, &desired(7)).unwrap();
        assert_eq!(first.outcome, Outcome::Created);
        assert!(ctx.action("create-role-svc").is_some());

        let second = converge(&reconciler, &mut ctx, &desired(7)).unwrap();
        assert_eq!(second.outcome, Outcome::Unchanged);
        assert_eq!(ctx.actions().count(), 1);
    }

    #[test]
    fn test_converge_updates() {
        let reconciler = MockReconciler {
            current: RefCell::new(Some(1)),
            ..Default::default()
        };
        let mut ctx = RunContext::new();
        let result = converge(&reconciler, &mut ctx, &desired(2)).unwrap();
        assert_eq!(result.outcome, Outcome::Updated);
        assert_eq!(result.resource, 2);
    }

    #[test]
    fn test_get_error_rolls_back() {
        let reconciler = MockReconciler {
            fail_get: true,
            ..Default::default()
        };
        let mut ctx = RunContext::new();
        let err = converge(&reconciler, &mut ctx, &desired(1)).unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert_eq!(ctx.state(), RunState::Rollback);
    }

    #[test]
    fn test_update_error_rolls_back() {
        let reconciler = MockReconciler {
            current: RefCell::new(Some(1)),
            fail_update: true,
            ..Default::default()
        };
        let mut ctx = RunContext::new();
        let err = converge(&reconciler, &mut ctx, &desired(2)).unwrap_err();
        assert!(matches!(err, Error::ImmutableField { .. }));
        assert_eq!(ctx.state(), RunState::Rollback);
        assert_eq!(ctx.actions().count(), 0);
    }

    #[test]
    fn test_rolled_back_context_skips_provider() {
        let reconciler = MockReconciler::default();
        let mut ctx = RunContext::new();
        ctx.rollback(&Error::invalid(ResourceKind::Function, "f", "x"));

        let err = converge(&reconciler, &mut ctx, &desired(1)).unwrap_err();
        assert!(matches!(err, Error::RolledBack { .. }));
        assert_eq!(reconciler.gets.get(), 0);
        assert!(reconciler.current.borrow().is_none());
    }
}
