//! # nsscash-cli
//!
//! The fetch tool behind the `nsscash` binary: loads the TOML config,
//! conditionally downloads each configured file, serializes account
//! databases into binary caches and atomically replaces the files on
//! disk, tracking progress in a JSON state file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use nsscash_core::{group, passwd};

pub mod config;
pub mod deploy;
pub mod fetch;
pub mod state;

use crate::config::FileType;

/// `nsscash fetch <config>`: update all configured files, then persist
/// the state. Nothing is written when any fetch fails; the state is only
/// written after every deploy succeeded.
pub fn fetch_command(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let mut state = state::load_state(&cfg.statepath)?;
    let mut clients = fetch::HttpClients::new();

    deploy::handle_files(&cfg, &mut state, &mut clients)?;

    state::write_state(&cfg.statepath, &state)
}

/// `nsscash convert <type> <src> <dst>`: serialize a local text database
/// into a binary cache, for seeding hosts without network access.
///
/// The destination is created first when missing (deploys refuse absent
/// targets) and then replaced through the same atomic path as a fetch.
pub fn convert(file_type: FileType, src: &Path, dst: &Path) -> Result<()> {
    let raw = fs::read(src).with_context(|| format!("cannot read {:?}", src))?;
    let body = match file_type {
        FileType::Plain => raw,
        FileType::Passwd => passwd::serialize_passwds(&passwd::parse_passwds(&raw)?)?,
        FileType::Group => group::serialize_groups(&group::parse_groups(&raw)?)?,
    };

    if !dst.exists() {
        fs::File::create(dst).with_context(|| format!("cannot create {:?}", dst))?;
    }
    deploy::deploy_file(&src.to_string_lossy(), dst, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    use nsscash_core::file::{CacheFile, IndexKind};
    use nsscash_core::passwd::PasswdEntry;

    #[test]
    fn convert_passwd_produces_a_readable_cache() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("passwd");
        let dst = dir.path().join("passwd.nsscash");
        fs::write(
            &src,
            b"root:x:0:0:root:/root:/bin/bash\ndaemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n",
        )
        .unwrap();

        convert(FileType::Passwd, &src, &dst).unwrap();

        let cache = CacheFile::open(&dst).unwrap();
        assert_eq!(cache.count(), 2);
        let off = cache.record_offset(IndexKind::Orig, 0).unwrap();
        let entry = PasswdEntry::parse(cache.data(), off).unwrap();
        assert_eq!(entry.name(), b"root");

        let mode = fs::metadata(&dst).unwrap().permissions().mode();
        assert_eq!(mode & 0o222, 0);
    }

    #[test]
    fn convert_plain_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hosts");
        let dst = dir.path().join("hosts.cache");
        fs::write(&src, b"127.0.0.1 localhost\n").unwrap();

        convert(FileType::Plain, &src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"127.0.0.1 localhost\n");
    }

    #[test]
    fn convert_group_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("group");
        let dst = dir.path().join("group.nsscash");
        fs::write(&src, b"adm:x:4:syslog,ubuntu\n").unwrap();

        convert(FileType::Group, &src, &dst).unwrap();
        let cache = CacheFile::open(&dst).unwrap();
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn convert_propagates_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("passwd");
        let dst = dir.path().join("passwd.nsscash");
        fs::write(&src, b"not a passwd line\n").unwrap();

        assert!(convert(FileType::Passwd, &src, &dst).is_err());
        assert!(!dst.exists());
    }
}
