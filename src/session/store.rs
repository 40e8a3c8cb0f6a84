//! Session persistence: whole-snapshot files plus append-only log replay.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfabError, Result};

use super::{Session, SessionPatch};

/// One record of the append-only session log. Only the `metadata` block is
/// meaningful for replay; records without one contribute nothing.
#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(default)]
    metadata: Option<LogMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogMetadata {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    messages: Option<Vec<super::Message>>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    environment: Option<HashMap<String, String>>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    custom: Option<serde_json::Map<String, serde_json::Value>>,
}

/// File-backed session store.
///
/// The unit of durability is a whole-session snapshot: `save` writes the
/// full serialized session to `<dir>/<id>.json`, replacing any previous
/// file. Concurrent writers to the same id are not coordinated; the caller
/// guarantees a single active session per id.
#[derive(Debug, Clone)]
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Store rooted at the platform data directory for this project.
    pub fn new_default() -> Self {
        let base_dir = directories::ProjectDirs::from("", "", "confab")
            .map(|dirs| dirs.data_dir().join("sessions"))
            .unwrap_or_else(|| PathBuf::from(".confab/sessions"));
        Self { base_dir }
    }

    /// Snapshot path for a session id.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.json"))
    }

    /// Persist the full session snapshot, replacing any existing file.
    pub fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(session)?;
        fs::write(&path, serialized)?;
        tracing::debug!(session_id = %session.id, path = %path.display(), "session snapshot saved");
        Ok(())
    }

    /// Reconstruct a session from a snapshot file or an append-only log.
    ///
    /// `path_or_id` may be a path to a snapshot file, a session id with a
    /// stored snapshot, or a path to a JSONL log to replay. A `.json` path
    /// is always a snapshot and its parse errors surface as-is; for other
    /// paths a valid snapshot wins, otherwise the file replays as a log.
    pub fn resume(&self, path_or_id: &str) -> Result<Session> {
        let direct = Path::new(path_or_id);
        if direct.is_file() {
            if direct
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            {
                return load_snapshot(direct);
            }
            if let Ok(session) = load_snapshot(direct) {
                return Ok(session);
            }
            return replay_log(direct);
        }

        let by_id = self.path_for(path_or_id);
        if by_id.is_file() {
            return load_snapshot(&by_id);
        }

        replay_log(direct)
    }

    /// Ids of all stored snapshots.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn load_snapshot(path: &Path) -> Result<Session> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Replay an append-only log of JSON records (one per line) into a session.
///
/// Later records overwrite earlier same-named fields, except `custom`, which
/// accumulates by merge. Fails if the file is missing or empty, any line is
/// not valid JSON, or no record ever supplied a session id.
fn replay_log(path: &Path) -> Result<Session> {
    let raw = fs::read_to_string(path).map_err(|err| {
        ConfabError::LogParse(format!("cannot read log {}: {err}", path.display()))
    })?;

    let mut session_id: Option<String> = None;
    let mut session = Session::new(Some(String::new()), "");
    let mut saw_record = false;

    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        saw_record = true;

        let record: LogRecord = serde_json::from_str(line).map_err(|err| {
            ConfabError::LogParse(format!("invalid record on line {}: {err}", index + 1))
        })?;

        let Some(metadata) = record.metadata else {
            continue;
        };

        if let Some(id) = metadata.session_id {
            session_id = Some(id);
        }
        session = session.apply(SessionPatch {
            system_prompt: metadata.system_prompt,
            messages: metadata.messages,
            environment: metadata.environment,
            role: metadata.role,
            custom: metadata.custom,
        });
    }

    if !saw_record {
        return Err(ConfabError::LogParse(format!(
            "log {} is empty",
            path.display()
        )));
    }

    let Some(id) = session_id else {
        return Err(ConfabError::LogParse(
            "no record supplied a session id".into(),
        ));
    };

    session.id = id;
    Ok(session)
}
