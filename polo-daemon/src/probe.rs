//! Built-in source check: fingerprint the file named by a source's `path`.
//!
//! ```yaml
//! sources:
//!   - id: hosts
//!     path: /etc/hosts
//! ```
//!
//! Each check stores `{path, fingerprint, bytes, changed}` under the source
//! id. `changed` is `true` when the fingerprint differs from the stored one.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::json;

use polo_core::{fingerprint, Configuration, SourceId};
use polo_store::Store;

use crate::check::{CheckError, CheckOutcome, SourceCheck};

pub const PATH_PARAM: &str = "path";

#[derive(Debug, Clone, Copy, Default)]
pub struct FileProbe;

#[async_trait]
impl SourceCheck for FileProbe {
    async fn check(
        &self,
        source_id: &SourceId,
        config: &Configuration,
        store: &Store,
    ) -> Result<CheckOutcome, CheckError> {
        let descriptor = config
            .source(source_id)
            .ok_or_else(|| CheckError::failed(source_id, "source is not configured"))?;
        let path = descriptor
            .param_str(PATH_PARAM)
            .map(PathBuf::from)
            .ok_or_else(|| CheckError::failed(source_id, "missing 'path' parameter"))?;

        let target = path.clone();
        let (digest, bytes) =
            tokio::task::spawn_blocking(move || fingerprint::fingerprint_file_with_len(&target))
                .await
                .map_err(|err| CheckError::failed(source_id, format!("probe join error: {err}")))?
                .map_err(|err| CheckError::failed(source_id, err.to_string()))?;

        let previous = store
            .get(&source_id.0)
            .and_then(|entry| entry.value.get("fingerprint").cloned());
        let changed = previous.as_ref().and_then(|v| v.as_str()) != Some(digest.0.as_str());
        if changed && previous.is_some() {
            tracing::info!(source = %source_id, path = %path.display(), "source content changed");
        }

        store.put(
            source_id.0.clone(),
            json!({
                "path": path.display().to_string(),
                "fingerprint": digest.0,
                "bytes": bytes,
                "changed": changed,
            }),
        );
        Ok(CheckOutcome::updated(1))
    }
}
