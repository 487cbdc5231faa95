//! File-backed session store.
//!
//! Each stage owns a small set of files named after its id. Status is derived
//! from which files exist, so there is no separate index to keep in sync:
//!
//! | Files present                 | Status              |
//! |-------------------------------|---------------------|
//! | `<id>.skipped.json`           | `skipped`           |
//! | request + response            | `completed`         |
//! | request only                  | `awaiting_response` |
//! | none                          | `pending` (no record) |
//!
//! Every write goes to a temp file, is synced, then renamed into place, so a
//! write is durable before the call returns.

use super::{SessionManifest, StageRecord, StageRecords};
use crate::changeset::ChangeSet;
use crate::errors::{PipelineError, Result};
use crate::stage::{RequestPayload, ResponsePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REQUEST_SUFFIX: &str = ".request.json";
const RESPONSE_SUFFIX: &str = ".response.json";
const SKIPPED_SUFFIX: &str = ".skipped.json";
const MANIFEST_FILE: &str = "session.json";
const DETACHED_DIR: &str = "detached";

/// Envelope persisted for every request, response and skip marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
}

impl StageArtifact {
    fn new(stage: &str, payload: &str) -> Self {
        Self {
            stage: stage.to_string(),
            timestamp: Utc::now(),
            payload: payload.to_string(),
        }
    }
}

/// Where a session lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLocator {
    dir: PathBuf,
}

impl SessionLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Session directory for a working context under the review directory.
    ///
    /// `feature/login` maps to `<review_dir>/feature-login-<hash>`, where the
    /// hash is taken over the raw branch name so `feature-login` gets its own
    /// directory. A detached HEAD maps to `<review_dir>/detached`.
    pub fn for_context(review_dir: &Path, branch: Option<&str>) -> Self {
        let name = match branch {
            Some(b) if !b.trim().is_empty() => session_dir_name(b),
            _ => DETACHED_DIR.to_string(),
        };
        Self::new(review_dir.join(name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn request_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}{}", stage, REQUEST_SUFFIX))
    }

    /// Readable copy of the request for the external actor.
    pub fn request_markdown_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}.request.md", stage))
    }

    pub fn response_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}{}", stage, RESPONSE_SUFFIX))
    }

    pub fn skipped_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}{}", stage, SKIPPED_SUFFIX))
    }

    /// Where the external actor writes its raw response.
    pub fn inbox_path(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{}.output.md", stage))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }
}

/// Readable slug plus a short digest of the exact branch name.
fn session_dir_name(branch: &str) -> String {
    let digest = Sha256::digest(branch.as_bytes());
    let short: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", slugify(branch), short)
}

fn slugify(branch: &str) -> String {
    branch
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Durable key-value persistence of stage records for one session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    locator: SessionLocator,
}

impl SessionStore {
    pub fn new(locator: SessionLocator) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &SessionLocator {
        &self.locator
    }

    /// Whether anything has been persisted for this session.
    pub fn exists(&self) -> bool {
        self.locator.dir().exists()
    }

    /// Load every stage record. A missing session is an empty map.
    pub fn load_session(&self) -> Result<StageRecords> {
        let dir = self.locator.dir();
        let mut records = StageRecords::new();
        if !dir.exists() {
            return Ok(records);
        }

        let entries = fs::read_dir(dir).map_err(|e| PipelineError::store(dir, e))?;
        let mut stages: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::store(dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let stage = name
                .strip_suffix(REQUEST_SUFFIX)
                .or_else(|| name.strip_suffix(RESPONSE_SUFFIX))
                .or_else(|| name.strip_suffix(SKIPPED_SUFFIX));
            if let Some(stage) = stage
                && !stages.iter().any(|s| s == stage)
            {
                stages.push(stage.to_string());
            }
        }

        for stage in stages {
            if let Some(record) = self.load_record(&stage)? {
                records.insert(stage, record);
            }
        }

        debug!(dir = %dir.display(), stages = records.len(), "Loaded session");
        Ok(records)
    }

    /// Load one stage's record from its artifacts, `None` if it has none.
    pub fn load_record(&self, stage: &str) -> Result<Option<StageRecord>> {
        if let Some(marker) = read_artifact(&self.locator.skipped_path(stage))? {
            return Ok(Some(StageRecord::skipped(stage, marker.timestamp)));
        }

        let request = read_artifact(&self.locator.request_path(stage))?;
        let response = read_artifact(&self.locator.response_path(stage))?;

        match (request, response) {
            (Some(req), Some(resp)) => Ok(Some(
                StageRecord::awaiting(stage, RequestPayload::new(req.payload), req.timestamp)
                    .complete(ResponsePayload::new(resp.payload), resp.timestamp),
            )),
            (Some(req), None) => Ok(Some(StageRecord::awaiting(
                stage,
                RequestPayload::new(req.payload),
                req.timestamp,
            ))),
            (None, Some(_)) => {
                warn!(stage, "Ignoring response without a request");
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }

    /// Persist a request, replacing any earlier request, response or skip marker.
    pub fn save_request(&self, stage: &str, payload: &RequestPayload) -> Result<StageRecord> {
        self.ensure_dir()?;
        // Drop the old response first so the new request never pairs with it
        remove_if_exists(&self.locator.response_path(stage))?;
        remove_if_exists(&self.locator.skipped_path(stage))?;

        write_durable(
            &self.locator.request_markdown_path(stage),
            payload.as_str().as_bytes(),
        )?;
        let artifact = StageArtifact::new(stage, payload.as_str());
        write_artifact(&self.locator.request_path(stage), &artifact)?;

        info!(stage, "Saved request");
        Ok(StageRecord::awaiting(stage, payload.clone(), artifact.timestamp))
    }

    /// Persist a response and flip the stage to completed.
    pub fn save_response(&self, stage: &str, payload: &ResponsePayload) -> Result<StageRecord> {
        let Some(request) = read_artifact(&self.locator.request_path(stage))? else {
            return Err(PipelineError::Other(anyhow::anyhow!(
                "Cannot save a response for stage '{}': no request was issued",
                stage
            )));
        };

        let artifact = StageArtifact::new(stage, payload.as_str());
        write_artifact(&self.locator.response_path(stage), &artifact)?;

        info!(stage, "Saved response");
        Ok(
            StageRecord::awaiting(stage, RequestPayload::new(request.payload), request.timestamp)
                .complete(payload.clone(), artifact.timestamp),
        )
    }

    /// Persist a skip marker with empty payloads.
    pub fn mark_skipped(&self, stage: &str) -> Result<StageRecord> {
        self.ensure_dir()?;
        let artifact = StageArtifact::new(stage, "");
        write_artifact(&self.locator.skipped_path(stage), &artifact)?;
        info!(stage, "Marked stage skipped");
        Ok(StageRecord::skipped(stage, artifact.timestamp))
    }

    /// Read the raw response the external actor left in the inbox.
    ///
    /// Returns `None` when the inbox file does not exist. Content that is not
    /// UTF-8 is a malformed response, so the actor can rewrite it and retry.
    pub fn read_inbox(&self, stage: &str) -> Result<Option<ResponsePayload>> {
        let path = self.locator.inbox_path(stage);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| PipelineError::store(&path, e))?;
        let content = String::from_utf8(bytes).map_err(|_| PipelineError::MalformedResponse {
            stage: stage.to_string(),
            reason: "response is not valid UTF-8".to_string(),
        })?;
        Ok(Some(ResponsePayload::new(content)))
    }

    /// Remove every artifact of one stage, inbox included.
    pub fn discard(&self, stage: &str) -> Result<()> {
        for path in [
            self.locator.request_path(stage),
            self.locator.request_markdown_path(stage),
            self.locator.response_path(stage),
            self.locator.skipped_path(stage),
            self.locator.inbox_path(stage),
        ] {
            remove_if_exists(&path)?;
        }
        debug!(stage, "Discarded stage artifacts");
        Ok(())
    }

    /// Delete the whole session.
    pub fn wipe(&self) -> Result<()> {
        let dir = self.locator.dir();
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| PipelineError::store(dir, e))?;
            info!(dir = %dir.display(), "Wiped session");
        }
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<Option<SessionManifest>> {
        let path = self.locator.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| PipelineError::store(&path, e))?;
        let manifest = serde_json::from_str(&content)
            .map_err(|source| PipelineError::CorruptArtifact { path, source })?;
        Ok(Some(manifest))
    }

    /// Load the manifest, creating it from `change_set` on first run.
    pub fn ensure_manifest(&self, change_set: &ChangeSet) -> Result<SessionManifest> {
        if let Some(manifest) = self.load_manifest()? {
            return Ok(manifest);
        }
        self.ensure_dir()?;
        let manifest = SessionManifest::new(change_set);
        let content = serde_json::to_string_pretty(&manifest)
            .map_err(|e| PipelineError::Other(e.into()))?;
        write_durable(&self.locator.manifest_path(), content.as_bytes())?;
        info!(session = %manifest.session_id, "Started new session");
        Ok(manifest)
    }

    fn ensure_dir(&self) -> Result<()> {
        let dir = self.locator.dir();
        fs::create_dir_all(dir).map_err(|e| PipelineError::store(dir, e))
    }
}

fn read_artifact(path: &Path) -> Result<Option<StageArtifact>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| PipelineError::store(path, e))?;
    let artifact = serde_json::from_str(&content).map_err(|source| {
        PipelineError::CorruptArtifact {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(Some(artifact))
}

fn write_artifact(path: &Path, artifact: &StageArtifact) -> Result<()> {
    let content =
        serde_json::to_string_pretty(artifact).map_err(|e| PipelineError::Other(e.into()))?;
    write_durable(path, content.as_bytes())
}

/// Write to a temp file, sync, then rename into place.
fn write_durable(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&tmp_path).map_err(|e| PipelineError::store(&tmp_path, e))?;
    file.write_all(data)
        .map_err(|e| PipelineError::store(&tmp_path, e))?;
    file.sync_all()
        .map_err(|e| PipelineError::store(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| PipelineError::store(path, e))?;

    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| PipelineError::store(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::store(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StageStatus;
    use tempfile::tempdir;

    fn make_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(SessionLocator::new(dir.path().join("session")));
        (store, dir)
    }

    #[test]
    fn test_load_missing_session_is_empty() {
        let (store, _dir) = make_store();
        assert!(!store.exists());
        assert!(store.load_session().unwrap().is_empty());
    }

    #[test]
    fn test_save_request_is_awaiting() {
        let (store, _dir) = make_store();
        let record = store
            .save_request("status_analysis", &RequestPayload::new("# Status"))
            .unwrap();
        assert_eq!(record.status, StageStatus::AwaitingResponse);

        let records = store.load_session().unwrap();
        let loaded = &records["status_analysis"];
        assert_eq!(loaded.status, StageStatus::AwaitingResponse);
        assert_eq!(loaded.request.as_str(), "# Status");
        assert!(loaded.response.is_none());

        // Readable copy for the external actor
        let md = fs::read_to_string(
            store
                .locator()
                .request_markdown_path("status_analysis"),
        )
        .unwrap();
        assert_eq!(md, "# Status");
    }

    #[test]
    fn test_save_response_completes() {
        let (store, _dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        let record = store
            .save_response("a", &ResponsePayload::new("resp"))
            .unwrap();
        assert_eq!(record.status, StageStatus::Completed);

        let records = store.load_session().unwrap();
        assert_eq!(records["a"].status, StageStatus::Completed);
        assert_eq!(records["a"].response.as_ref().unwrap().as_str(), "resp");
        assert_eq!(records["a"].request.as_str(), "req");
    }

    #[test]
    fn test_save_response_without_request_fails() {
        let (store, _dir) = make_store();
        let err = store
            .save_response("a", &ResponsePayload::new("resp"))
            .unwrap_err();
        assert!(err.to_string().contains("no request"));
        assert!(store.load_session().unwrap().is_empty());
    }

    #[test]
    fn test_visible_to_new_store_instance() {
        let (store, dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        store
            .save_response("a", &ResponsePayload::new("resp"))
            .unwrap();

        // Simulates a fresh process
        let reopened = SessionStore::new(SessionLocator::new(dir.path().join("session")));
        let records = reopened.load_session().unwrap();
        assert_eq!(records["a"].status, StageStatus::Completed);
    }

    #[test]
    fn test_overwrite_request_drops_response() {
        let (store, _dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("v1"))
            .unwrap();
        store
            .save_response("a", &ResponsePayload::new("resp"))
            .unwrap();
        store
            .save_request("a", &RequestPayload::new("v2"))
            .unwrap();

        let records = store.load_session().unwrap();
        assert_eq!(records["a"].status, StageStatus::AwaitingResponse);
        assert_eq!(records["a"].request.as_str(), "v2");
    }

    #[test]
    fn test_mark_skipped() {
        let (store, _dir) = make_store();
        store.mark_skipped("accessibility_analysis").unwrap();
        let records = store.load_session().unwrap();
        let record = &records["accessibility_analysis"];
        assert_eq!(record.status, StageStatus::Skipped);
        assert!(record.request.is_blank());
        assert!(record.response.is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (store, _dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        let leftovers: Vec<_> = fs::read_dir(store.locator().dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_inbox() {
        let (store, _dir) = make_store();
        assert!(store.read_inbox("a").unwrap().is_none());
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        fs::write(store.locator().inbox_path("a"), "findings").unwrap();
        assert_eq!(store.read_inbox("a").unwrap().unwrap().as_str(), "findings");
    }

    #[test]
    fn test_discard_removes_stage_only() {
        let (store, _dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        store
            .save_request("b", &RequestPayload::new("req"))
            .unwrap();
        fs::write(store.locator().inbox_path("a"), "x").unwrap();

        store.discard("a").unwrap();
        let records = store.load_session().unwrap();
        assert!(!records.contains_key("a"));
        assert!(records.contains_key("b"));
        assert!(!store.locator().inbox_path("a").exists());
    }

    #[test]
    fn test_wipe_clears_everything() {
        let (store, _dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        store
            .save_response("a", &ResponsePayload::new("resp"))
            .unwrap();
        store
            .save_request("b", &RequestPayload::new("req"))
            .unwrap();

        store.wipe().unwrap();
        assert!(!store.exists());
        assert!(store.load_session().unwrap().is_empty());
        // Wiping twice is fine
        store.wipe().unwrap();
    }

    #[test]
    fn test_corrupt_artifact_is_reported() {
        let (store, _dir) = make_store();
        fs::create_dir_all(store.locator().dir()).unwrap();
        fs::write(store.locator().request_path("a"), "not json").unwrap();
        let err = store.load_session().unwrap_err();
        assert!(matches!(err, PipelineError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_orphan_response_is_ignored() {
        let (store, _dir) = make_store();
        fs::create_dir_all(store.locator().dir()).unwrap();
        let artifact = StageArtifact::new("a", "resp");
        fs::write(
            store.locator().response_path("a"),
            serde_json::to_string(&artifact).unwrap(),
        )
        .unwrap();
        assert!(store.load_session().unwrap().is_empty());
    }

    #[test]
    fn test_locator_slugs_branch() {
        let base = Path::new("/repo/.pr_review");
        let dir = SessionLocator::for_context(base, Some("feature/login"))
            .dir()
            .to_path_buf();
        assert_eq!(dir.parent(), Some(base));
        let name = dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("feature-login-"));
        assert_eq!(name.len(), "feature-login-".len() + 8);
        assert_eq!(
            SessionLocator::for_context(base, None).dir(),
            Path::new("/repo/.pr_review/detached")
        );
    }

    #[test]
    fn test_locator_keeps_similar_branches_apart() {
        let base = Path::new("/repo/.pr_review");
        let slash = SessionLocator::for_context(base, Some("feature/login"));
        let dash = SessionLocator::for_context(base, Some("feature-login"));
        assert_ne!(slash, dash);

        let named_detached = SessionLocator::for_context(base, Some("detached"));
        assert_ne!(named_detached, SessionLocator::for_context(base, None));

        // Stable across calls
        assert_eq!(
            slash,
            SessionLocator::for_context(base, Some("feature/login"))
        );
    }

    #[test]
    fn test_non_utf8_inbox_is_malformed() {
        let (store, _dir) = make_store();
        store
            .save_request("a", &RequestPayload::new("req"))
            .unwrap();
        fs::write(store.locator().inbox_path("a"), [0xff, 0xfe, b'a']).unwrap();

        let err = store.read_inbox("a").unwrap_err();
        assert!(err.is_recoverable());
        match err {
            PipelineError::MalformedResponse { stage, reason } => {
                assert_eq!(stage, "a");
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("Expected MalformedResponse, got {:?}", other),
        }
    }

}
