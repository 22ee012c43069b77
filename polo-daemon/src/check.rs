//! The pluggable source-check capability.
//!
//! The daemon does not know what a source is. It hands each due source to a
//! [`SourceCheck`] together with the current configuration and the store, and
//! only cares whether the call succeeded.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use polo_core::{Configuration, SourceId};
use polo_store::Store;

/// What a successful check reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Number of store keys written by the check.
    pub updated: usize,
}

impl CheckOutcome {
    pub fn updated(updated: usize) -> Self {
        Self { updated }
    }
}

/// A failed source check. Failures back off the source; they never remove it.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("check of source '{source_id}' failed: {message}")]
    Failed { source_id: SourceId, message: String },

    #[error("check of source '{source_id}' timed out after {}s", .after.as_secs_f64())]
    TimedOut { source_id: SourceId, after: Duration },
}

impl CheckError {
    pub fn failed(source_id: &SourceId, message: impl Into<String>) -> Self {
        CheckError::Failed {
            source_id: source_id.clone(),
            message: message.into(),
        }
    }
}

/// Check one source and record what was found in the store.
#[async_trait]
pub trait SourceCheck: Send + Sync + 'static {
    async fn check(
        &self,
        source_id: &SourceId,
        config: &Configuration,
        store: &Store,
    ) -> Result<CheckOutcome, CheckError>;
}
