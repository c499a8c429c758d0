//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, SyncError};

/// Map domain/service errors to a string for CLI output, with a hint where one helps.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::SyncError(SyncError::AuthenticationFailed(_)) => format!(
            "{}\nhint: set GAZETTE_GIT_USERNAME/GAZETTE_GIT_PASSWORD or pass --ask-credentials",
            e
        ),
        ApiError::SyncError(SyncError::Diverged { .. }) => format!(
            "{}\nhint: local history cannot be fast-forwarded; resolve it with git before syncing",
            e
        ),
        ApiError::SyncError(err) if err.is_retryable() => format!("{}\n(retryable)", e),
        _ => e.to_string(),
    }
}
