//! Unit-of-work plumbing shared by the use cases
//!
//! Every mutating use case opens exactly one unit of work, runs its body
//! against it and hands the body's result to [`finish`], which commits on
//! success and rolls back on failure.

use raffle_audit::ReasonCode;
use raffle_core::domain::{AllocationError, UserId};
use raffle_core::ports::IUnitOfWork;

/// Commit `uow` if `result` is `Ok`, roll it back otherwise.
///
/// A failed commit turns a successful body into `StoreUnavailable` (or
/// `ConstraintConflict` if the store reports a uniqueness violation).
pub(crate) async fn finish<T>(
    operation: &'static str,
    uow: Box<dyn IUnitOfWork>,
    result: Result<T, AllocationError>,
) -> Result<T, AllocationError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(operation, error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Log a rejected operation at the level its reason calls for.
pub(crate) fn log_rejection(operation: &'static str, actor_id: UserId, err: &AllocationError) {
    let code = ReasonCode::from(err);
    match err {
        AllocationError::StoreUnavailable { detail } => {
            tracing::error!(
                operation,
                actor_id = %actor_id,
                code = %code,
                detail = %detail,
                "Operation failed in the store"
            );
        }
        e if e.is_conflict() => {
            tracing::warn!(
                operation,
                actor_id = %actor_id,
                code = %code,
                number = e.conflicting_number().map(|n| n.get()),
                "Operation rejected by a conflicting allocation"
            );
        }
        e => {
            tracing::info!(
                operation,
                actor_id = %actor_id,
                code = %code,
                reason = %e,
                "Operation rejected"
            );
        }
    }
}
