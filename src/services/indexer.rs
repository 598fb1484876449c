//! The indexing workflow.
//!
//! One `index` call processes one freshly uploaded project version: it checks
//! the advisory lease, builds the version metadata, schedules a purge for
//! expiring versions, aggregates the uploaded JSON documents, settles the
//! permissions and latest-pointer decisions, commits every staged write in
//! one batch, releases the lease, and closes the originating ticket.
//!
//! The lease is advisory. Its existence is checked, not atomically claimed,
//! so one-run-at-a-time per version is up to the upload pipeline. A failed
//! run leaves the lease in place for manual inspection.

use crate::errors::IndexError;
use crate::keys;
use crate::models::job::JobParams;
use crate::models::metadata::{
    ExpiryInfo, LatestPointer, PURGE_MODE, PurgeRequest, VersionMetadata,
};
use crate::services::object_store::ObjectStore;
use crate::services::tracker::Tracker;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::future::{self, BoxFuture};

/// Runs the indexing workflow against a bucket and a tracker.
pub struct Indexer<'a> {
    store: &'a dyn ObjectStore,
    tracker: &'a dyn Tracker,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a dyn ObjectStore, tracker: &'a dyn Tracker) -> Self {
        Self { store, tracker }
    }

    /// Indexes one uploaded version. `issue` is the ticket the run was
    /// started from; it is closed on success. On failure the remaining steps
    /// are skipped and the lease stays in place.
    pub async fn index(&self, job: &JobParams, issue: u64) -> Result<(), IndexError> {
        self.verify_lease(&job.project, &job.version).await?;

        let mut metadata = VersionMetadata {
            upload_time: job.timestamp,
            index_time: now_millis(),
            expiry_time: None,
            expiry_job_id: None,
        };

        let expiring = self
            .schedule_expiry(&job.project, &job.version, &mut metadata)
            .await?;

        let documents = self.aggregate(&job.project, &job.version).await?;
        let document_count = documents.len();

        let write_permissions = job.overwrite_permissions
            || !self.store.exists(&keys::permissions(&job.project)).await?;

        // An expiring version must never hold the persistent pointer. Its
        // placeholder carries the sentinel clock, so it only lands when no
        // pointer exists at all.
        let candidate = LatestPointer::new(job.version.clone(), metadata.index_time);
        let persistent_candidate = if expiring {
            LatestPointer::placeholder()
        } else {
            candidate.clone()
        };
        let latest = self
            .pointer_update(&keys::latest(&job.project), persistent_candidate)
            .await?;
        let latest_all = self
            .pointer_update(&keys::latest_all(&job.project), candidate)
            .await?;

        // Everything decided above is committed in one concurrent batch. The
        // lease is only released once the whole batch has landed.
        let mut writes: Vec<BoxFuture<'_, Result<(), IndexError>>> = Vec::new();
        writes.push(self.staged_put(
            keys::version_metadata(&job.project, &job.version),
            to_body(&metadata),
        ));
        writes.push(self.staged_put(
            keys::aggregate(&job.project, &job.version),
            to_body(&documents),
        ));
        if write_permissions {
            writes.push(
                self.staged_put(keys::permissions(&job.project), to_body(&job.permissions)),
            );
        }
        if let Some(pointer) = latest {
            writes.push(self.staged_put(keys::latest(&job.project), to_body(&pointer)));
        }
        if let Some(pointer) = latest_all {
            writes.push(self.staged_put(keys::latest_all(&job.project), to_body(&pointer)));
        }
        for result in future::join_all(writes).await {
            result?;
        }

        self.store
            .delete(&keys::lease(&job.project, &job.version))
            .await?;
        self.tracker.close_issue(issue).await?;

        tracing::info!(
            "indexed {}/{}: {} documents aggregated, issue #{} closed",
            job.project,
            job.version,
            document_count,
            issue
        );
        Ok(())
    }

    /// Fails unless the lease object for the version is present. An
    /// inaccessible bucket counts as a failed precondition, not a remote
    /// error: nothing may be written before the lease is confirmed.
    async fn verify_lease(&self, project: &str, version: &str) -> Result<(), IndexError> {
        let key = keys::lease(project, version);
        match self.store.exists(&key).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(IndexError::PreconditionFailed(format!(
                "no lease object at `{}`",
                key
            ))),
            Err(err) => Err(IndexError::PreconditionFailed(format!(
                "lease check for `{}` failed: {}",
                key, err
            ))),
        }
    }

    /// Reads the expiry declaration, if any, and opens the purge ticket for
    /// it. Returns whether the version expires; on the way it fills in the
    /// expiry fields of `metadata`.
    async fn schedule_expiry(
        &self,
        project: &str,
        version: &str,
        metadata: &mut VersionMetadata,
    ) -> Result<bool, IndexError> {
        let key = keys::expiry_info(project, version);
        let Some(body) = self.store.get(&key).await? else {
            return Ok(false);
        };
        let info: ExpiryInfo = serde_json::from_slice(&body).map_err(|err| {
            IndexError::malformed(&key, format!("not an expiry declaration: {}", err))
        })?;

        // `expires_in` comes from the bucket; an absurd value must fail the
        // run, not wrap the clock.
        let Some(delete_after) = metadata.index_time.checked_add(info.expires_in) else {
            return Err(IndexError::malformed(
                &key,
                format!("expires_in {} overflows the expiry clock", info.expires_in),
            ));
        };
        let purge = PurgeRequest {
            project: project.to_string(),
            version: version.to_string(),
            mode: PURGE_MODE.to_string(),
            delete_after,
        };
        let title = format!("Purge {} {}", project, version);
        let ticket_body = serde_json::to_string_pretty(&purge)
            .expect("purge request serialization cannot fail");
        let job_id = self.tracker.create_issue(&title, &ticket_body).await?;

        metadata.expiry_time = Some(delete_after);
        metadata.expiry_job_id = Some(job_id);
        tracing::info!(
            "{}/{} expires at {}, purge tracked by issue #{}",
            project,
            version,
            epoch_ms_to_iso(delete_after),
            job_id
        );
        Ok(true)
    }

    /// Fetches every JSON document under the version's content prefix and
    /// returns the parsed values in listing order. Objects without the JSON
    /// suffix are skipped. The fetches run concurrently.
    async fn aggregate(
        &self,
        project: &str,
        version: &str,
    ) -> Result<Vec<serde_json::Value>, IndexError> {
        let prefix = keys::content_prefix(project, version);
        let json_keys: Vec<String> = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .filter(|key| key.ends_with(keys::JSON_SUFFIX))
            .collect();

        tracing::debug!("aggregating {} documents under `{}`", json_keys.len(), prefix);

        let fetches = json_keys.iter().map(|key| async move {
            let body = self.store.get(key).await?.ok_or_else(|| {
                IndexError::RemoteCallFailed(format!(
                    "object `{}` disappeared during aggregation",
                    key
                ))
            })?;
            serde_json::from_slice::<serde_json::Value>(&body)
                .map_err(|err| IndexError::malformed(key, format!("not valid JSON: {}", err)))
        });

        let mut documents = Vec::with_capacity(json_keys.len());
        for result in future::join_all(fetches).await {
            documents.push(result?);
        }
        Ok(documents)
    }

    /// Decides whether `candidate` becomes the new pointer at `key`. An
    /// absent pointer is always taken; a present one only by a strictly newer
    /// candidate. Returns the pointer to write, `None` to leave it alone.
    async fn pointer_update(
        &self,
        key: &str,
        candidate: LatestPointer,
    ) -> Result<Option<LatestPointer>, IndexError> {
        let existing = match self.store.get(key).await? {
            Some(body) => Some(parse_pointer(key, &body)?),
            None => None,
        };

        if LatestPointer::should_replace(existing.as_ref(), &candidate) {
            tracing::debug!("pointer `{}` moves to version `{}`", key, candidate.version);
            Ok(Some(candidate))
        } else {
            tracing::debug!("pointer `{}` keeps its stored version", key);
            Ok(None)
        }
    }

    fn staged_put(&self, key: String, body: Bytes) -> BoxFuture<'_, Result<(), IndexError>> {
        Box::pin(async move {
            tracing::debug!("writing `{}` ({} bytes)", key, body.len());
            self.store.put(&key, body).await?;
            Ok(())
        })
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn parse_pointer(key: &str, body: &[u8]) -> Result<LatestPointer, IndexError> {
    serde_json::from_slice(body)
        .map_err(|err| IndexError::malformed(key, format!("not a latest pointer: {}", err)))
}

fn to_body<T: serde::Serialize>(value: &T) -> Bytes {
    Bytes::from(serde_json::to_vec(value).expect("document serialization cannot fail"))
}

/// Convert epoch milliseconds to an ISO-8601 string for log lines.
fn epoch_ms_to_iso(epoch_ms: i64) -> String {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| epoch_ms.to_string())
}
