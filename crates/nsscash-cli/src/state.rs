//! Persistent fetch state kept between runs.
//!
//! Maps each origin URL to the `Last-Modified` timestamp of the last
//! download and the SHA-512 of the last successfully serialized body.
//! The two maps update together; the file is only written after the whole
//! pipeline succeeded, with the same temp-file-plus-rename discipline as
//! a cache deploy.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::sync_dir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// `Last-Modified` per URL, as received from the origin.
    #[serde(rename = "LastModified", default)]
    pub last_modified: BTreeMap<String, DateTime<Utc>>,
    /// Lowercase hex SHA-512 of the serialized body per URL.
    #[serde(rename = "Checksum", default)]
    pub checksum: BTreeMap<String, String>,
}

/// Load the state; a missing file is an empty state.
pub fn load_state(path: &Path) -> Result<State> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(State::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("cannot read state {:?}", path));
        }
    };
    serde_json::from_slice(&raw).with_context(|| format!("invalid state file {:?}", path))
}

/// Atomically replace the state file.
pub fn write_state(path: &Path, state: &State) -> Result<()> {
    let body = serde_json::to_vec(state).context("cannot serialize state")?;

    let dir = parent_dir(path);
    let mut temp = tempfile::Builder::new()
        .prefix("tmp-state-")
        .tempfile_in(dir)
        .with_context(|| format!("cannot create temporary state file in {:?}", dir))?;
    temp.write_all(&body)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("cannot replace state {:?}", path))?;
    sync_dir(dir)?;
    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_state_is_empty() {
        let state = load_state(Path::new("/nonexistent/state.json")).unwrap();
        assert!(state.last_modified.is_empty());
        assert!(state.checksum.is_empty());
    }

    #[test]
    fn state_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = State::default();
        state.last_modified.insert(
            "https://example.com/passwd".to_string(),
            Utc.with_ymd_and_hms(2021, 3, 14, 15, 9, 26).unwrap(),
        );
        state
            .checksum
            .insert("https://example.com/passwd".to_string(), "ab".repeat(64));

        write_state(&path, &state).unwrap();
        assert_eq!(load_state(&path).unwrap(), state);
    }

    #[test]
    fn field_names_match_the_wire_format() {
        let mut state = State::default();
        state.last_modified.insert(
            "u".to_string(),
            Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
        );
        state.checksum.insert("u".to_string(), "00".to_string());
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"LastModified\""));
        assert!(json.contains("\"Checksum\""));
        assert!(json.contains("2019-01-01T00:00:00Z"));
    }

    #[test]
    fn partial_state_files_deserialize() {
        let state: State = serde_json::from_str("{}").unwrap();
        assert!(state.last_modified.is_empty());
        let state: State =
            serde_json::from_str(r#"{"LastModified": {"u": "2020-05-01T10:00:00Z"}}"#).unwrap();
        assert_eq!(state.last_modified.len(), 1);
        assert!(state.checksum.is_empty());
    }

    #[test]
    fn invalid_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"not json").unwrap();
        assert!(load_state(&path).is_err());
    }
}
