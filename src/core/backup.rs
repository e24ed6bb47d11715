//! Backup sessions for the corpus file.
//!
//! Each write-back run may snapshot the corpus into `<state>/backups/<ID>`
//! with a manifest and a DONE marker. Sessions are staged under
//! `<state>/backups/tmp/<ID>` and atomically renamed into place on finalize.

use anyhow::{Context, Result, bail};
use blake3::Hasher as Blake3;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::infra::io::write_atomic;

/// The backed-up corpus, as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusBackupMeta {
    pub original_path: PathBuf, // absolute path of the corpus
    pub file_name: String,      // name inside the session dir
    pub size_bytes: u64,
    pub checksum: String, // blake3:<hex>
}

/// Manifest describing a completed or in-progress session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub id: String,        // e.g., 2026-10-16T10-30-15Z_a9Jh5xQ2pL
    pub timestamp: String, // RFC3339 creation time
    pub operations: Vec<String>,
    pub args: Vec<String>,
    pub success: bool,
    pub last_updated: String,
    pub corpus: Option<CorpusBackupMeta>,
}

/// Lightweight index record for quick session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub id: String,
    pub timestamp: String,
    pub success: bool,
    pub original_path: Option<PathBuf>,
}

/// What `restore` put back.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub session: String,
    pub target: PathBuf,
    pub size_bytes: u64,
}

/// A single backup session; stage in tmp, then finalize.
#[derive(Debug)]
pub struct BackupSession {
    sessions_dir: PathBuf,
    session_tmp_dir: PathBuf,
    session_final_dir: PathBuf,
    manifest: SessionManifest,
    finalized: bool,
}

impl BackupSession {
    /// Start a new session under `<state>/backups/tmp/<ID>`.
    pub fn begin(state_dir: &Path, operations: Vec<String>) -> Result<Self> {
        let sessions_dir = state_dir.join("backups");
        let tmp_sessions_dir = sessions_dir.join("tmp");
        fs::create_dir_all(&tmp_sessions_dir)
            .with_context(|| format!("create tmp dir: {}", tmp_sessions_dir.display()))?;

        let id = generate_session_id();
        let session_tmp_dir = tmp_sessions_dir.join(&id);
        let session_final_dir = sessions_dir.join(&id);
        fs::create_dir_all(&session_tmp_dir)
            .with_context(|| format!("create session tmp: {}", session_tmp_dir.display()))?;

        let now = Utc::now().to_rfc3339();
        let manifest = SessionManifest {
            id,
            timestamp: now.clone(),
            operations,
            args: std::env::args().collect(),
            success: false,
            last_updated: now,
            corpus: None,
        };

        Ok(Self {
            sessions_dir,
            session_tmp_dir,
            session_final_dir,
            manifest,
            finalized: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    /// Copy the corpus file into the session.
    pub fn snapshot(&mut self, corpus_path: &Path) -> Result<()> {
        let original_path = fs::canonicalize(corpus_path)
            .with_context(|| format!("resolve corpus path: {}", corpus_path.display()))?;
        let file_name = original_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("corpus path has no file name")?;

        let backup_path = self.session_tmp_dir.join(&file_name);
        fs::copy(&original_path, &backup_path)
            .with_context(|| format!("copy corpus to backup: {}", backup_path.display()))?;

        let size_bytes = fs::metadata(&backup_path)
            .with_context(|| format!("stat backup: {}", backup_path.display()))?
            .len();
        let checksum = stream_blake3(&backup_path)?;
        debug!(session = %self.manifest.id, %checksum, size_bytes, "corpus snapshotted");

        self.manifest.corpus = Some(CorpusBackupMeta {
            original_path,
            file_name,
            size_bytes,
            checksum,
        });
        self.manifest.last_updated = Utc::now().to_rfc3339();
        Ok(())
    }

    /// Write manifest, atomically rename tmp→final, create DONE, append index.
    pub fn finalize(&mut self, success: bool) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        self.manifest.success = success;
        self.manifest.last_updated = Utc::now().to_rfc3339();

        let manifest_path = self.session_tmp_dir.join("manifest.json");
        let manifest_text =
            serde_json::to_string_pretty(&self.manifest).context("serialize manifest")?;
        write_atomic(&manifest_path, manifest_text.as_bytes())
            .with_context(|| format!("write manifest: {}", manifest_path.display()))?;

        fs::rename(&self.session_tmp_dir, &self.session_final_dir).with_context(|| {
            format!(
                "rename {} → {}",
                self.session_tmp_dir.display(),
                self.session_final_dir.display()
            )
        })?;
        let _ = sync_dir(&self.sessions_dir);

        let done_path = self.session_final_dir.join("DONE");
        fs::write(&done_path, "")
            .with_context(|| format!("create DONE: {}", done_path.display()))?;
        let _ = sync_dir(&self.session_final_dir);

        self.finalized = true;
        self.append_to_index()?;
        info!(session = %self.manifest.id, success, "backup session finalized");
        Ok(())
    }

    fn append_to_index(&self) -> Result<()> {
        let index_path = self.sessions_dir.join("index.jsonl");
        let entry = SessionIndexEntry {
            id: self.manifest.id.clone(),
            timestamp: self.manifest.timestamp.clone(),
            success: self.manifest.success,
            original_path: self.manifest.corpus.as_ref().map(|c| c.original_path.clone()),
        };
        let line = serde_json::to_string(&entry).context("serialize index entry")?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&index_path)
            .with_context(|| format!("open index: {}", index_path.display()))?;
        writeln!(f, "{line}").context("append index")?;
        f.sync_all().ok();
        Ok(())
    }
}

impl Drop for BackupSession {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = self.finalize(false); // best-effort failure finalize
        }
    }
}

/// Cross-platform directory fsync helper.
#[cfg(unix)]
fn sync_dir(p: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_p: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Sortable, filesystem-safe session ID.
fn generate_session_id() -> String {
    let ts = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let alphabet = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..10)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect();
    format!("{ts}_{suffix}")
}

fn stream_blake3(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open for hash: {}", path.display()))?;
    let mut hasher = Blake3::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Read the append-only index; ignores malformed lines.
pub fn list_sessions(state_dir: &Path) -> Result<Vec<SessionIndexEntry>> {
    let index_path = state_dir.join("backups").join("index.jsonl");
    if !index_path.exists() {
        return Ok(Vec::new());
    }

    let file =
        File::open(&index_path).with_context(|| format!("open index: {}", index_path.display()))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read index line {}", i + 1))?;
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        if let Ok(e) = serde_json::from_str::<SessionIndexEntry>(t) {
            out.push(e);
        }
    }
    Ok(out)
}

/// Load a session manifest; requires DONE to be present.
pub fn read_session_manifest(state_dir: &Path, session_id: &str) -> Result<SessionManifest> {
    let base = state_dir.join("backups").join(session_id);
    if !base.join("DONE").exists() {
        bail!("session {session_id} is incomplete (missing DONE)");
    }
    let manifest_path = base.join("manifest.json");
    let s = fs::read_to_string(&manifest_path)
        .with_context(|| format!("read manifest: {}", manifest_path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse manifest: {}", manifest_path.display()))
}

/// Newest successful session, optionally only those taken of `corpus`.
/// Index order is creation order; ids only resolve to the second.
pub fn latest_session(state_dir: &Path, corpus: Option<&Path>) -> Result<Option<SessionIndexEntry>> {
    let wanted = corpus.and_then(|p| fs::canonicalize(p).ok());
    Ok(list_sessions(state_dir)?
        .into_iter()
        .rev()
        .filter(|e| e.success)
        .find(|e| match (&wanted, &e.original_path) {
            (Some(w), Some(p)) => w == p,
            (Some(_), None) => false,
            (None, _) => true,
        }))
}

/// Put a session's corpus back, after verifying its checksum.
/// Writes to `target` when given, else to the recorded original path.
pub fn restore(state_dir: &Path, session_id: &str, target: Option<&Path>) -> Result<RestoreReport> {
    let manifest = read_session_manifest(state_dir, session_id)?;
    let meta = manifest
        .corpus
        .with_context(|| format!("session {session_id} holds no corpus snapshot"))?;

    let backup_path = state_dir
        .join("backups")
        .join(session_id)
        .join(&meta.file_name);
    let actual = stream_blake3(&backup_path)?;
    if actual != meta.checksum {
        bail!(
            "backup {} is corrupt: expected {}, found {}",
            backup_path.display(),
            meta.checksum,
            actual
        );
    }

    let bytes =
        fs::read(&backup_path).with_context(|| format!("read backup: {}", backup_path.display()))?;
    let target = target.map_or(meta.original_path, Path::to_path_buf);
    write_atomic(&target, &bytes)?;
    info!(session = session_id, target = %target.display(), "corpus restored");

    Ok(RestoreReport {
        session: session_id.to_string(),
        target,
        size_bytes: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(dir: &Path, corpus: &Path) -> String {
        let mut session = BackupSession::begin(&dir.join(".tmend"), vec!["remove-suffix _alt".into()]).unwrap();
        session.snapshot(corpus).unwrap();
        session.finalize(true).unwrap();
        session.id().to_string()
    }

    #[test]
    fn session_is_indexed_with_manifest() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("topics.ts");
        fs::write(&corpus, "[]").unwrap();

        let id = snapshot(tmp.path(), &corpus);
        let state = tmp.path().join(".tmend");
        let idx = list_sessions(&state).unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx[0].success);

        let m = read_session_manifest(&state, &id).unwrap();
        let meta = m.corpus.unwrap();
        assert_eq!(meta.size_bytes, 2);
        assert!(meta.checksum.starts_with("blake3:"));
        assert_eq!(m.operations, ["remove-suffix _alt"]);
    }

    #[test]
    fn restore_puts_back_original_bytes() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("topics.ts");
        fs::write(&corpus, "[{ id: 'a' }]").unwrap();
        let id = snapshot(tmp.path(), &corpus);
        fs::write(&corpus, "broken").unwrap();

        let state = tmp.path().join(".tmend");
        let latest = latest_session(&state, Some(&corpus)).unwrap().unwrap();
        assert_eq!(latest.id, id);

        restore(&state, &id, None).unwrap();
        assert_eq!(fs::read_to_string(&corpus).unwrap(), "[{ id: 'a' }]");
    }

    #[test]
    fn tampered_backup_is_refused() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("topics.ts");
        fs::write(&corpus, "[]").unwrap();
        let id = snapshot(tmp.path(), &corpus);

        let state = tmp.path().join(".tmend");
        fs::write(state.join("backups").join(&id).join("topics.ts"), "[1]").unwrap();
        assert!(restore(&state, &id, None).is_err());
        assert_eq!(fs::read_to_string(&corpus).unwrap(), "[]");
    }

    #[test]
    fn latest_follows_creation_order_within_one_second() {
        let tmp = TempDir::new().unwrap();
        let corpus = tmp.path().join("topics.ts");
        let state = tmp.path().join(".tmend");

        for round in 0..8 {
            fs::write(&corpus, format!("[{{ id: 'v{round}' }}]")).unwrap();
            let id = snapshot(tmp.path(), &corpus);
            let latest = latest_session(&state, Some(&corpus)).unwrap().unwrap();
            assert_eq!(latest.id, id, "round {round}");
        }

        let latest = latest_session(&state, Some(&corpus)).unwrap().unwrap();
        fs::write(&corpus, "broken").unwrap();
        restore(&state, &latest.id, None).unwrap();
        assert_eq!(fs::read_to_string(&corpus).unwrap(), "[{ id: 'v7' }]");
    }
}
