//! The fetch/deploy pipeline: all-or-nothing updates of the configured
//! files.
//!
//! Runs in two strictly ordered phases. First every file is fetched and
//! validated; any failure aborts before a single byte on disk changes.
//! Only then are the updated bodies deployed, each with an atomic
//! rename-over-temp in the target's directory. The state is written by
//! the caller after both phases, so an aborted run never records
//! progress it did not make.

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use sha2::{Digest, Sha512};

use nsscash_core::{group, passwd};

use crate::config::{Config, FileConfig, FileType};
use crate::fetch::{fetch_if_modified, HttpClients};
use crate::state::{parent_dir, State};

/// Fetch all configured files, then deploy the updated ones.
pub fn handle_files(cfg: &Config, state: &mut State, clients: &mut HttpClients) -> Result<()> {
    let mut bodies = Vec::with_capacity(cfg.files.len());
    for file in &cfg.files {
        let body = fetch_file(clients, file, state)
            .with_context(|| format!("{:?} ({})", file.url, file.file_type))?;
        bodies.push(body);
    }

    for (file, body) in cfg.files.iter().zip(&bodies) {
        // No update required
        let Some(body) = body else { continue };
        deploy_file(&file.url, &file.path, body)
            .with_context(|| format!("{:?} ({})", file.url, file.file_type))?;
    }

    Ok(())
}

/// Conditionally fetch one file and validate/serialize its body.
///
/// Returns `None` when the origin reports the file unmodified. On
/// success the state's timestamp and checksum for this URL are updated
/// together (the caller persists them only after full-pipeline success).
fn fetch_file(
    clients: &mut HttpClients,
    file: &FileConfig,
    state: &mut State,
) -> Result<Option<Vec<u8>>> {
    let mut t = state.last_modified.get(&file.url).copied();

    // A new, missing or locally modified target must not be masked by a
    // stale 304, so any checksum mismatch forces an unconditional fetch
    let on_disk = fs::read(&file.path)
        .map(|body| sha512_hex(&body))
        .unwrap_or_default();
    if state.checksum.get(&file.url).map(String::as_str) != Some(on_disk.as_str()) {
        t = None;
    }

    let (status, body, sent_ims) = fetch_if_modified(clients, file, &mut t)?;
    if status == 304 {
        if !sent_ims {
            bail!("status code 304 but did not send If-Modified-Since");
        }
        info!("{:?} -> {:?}: not modified", file.url, file.path);
        if let Some(t) = t {
            state.last_modified.insert(file.url.clone(), t);
        }
        return Ok(None);
    }
    if status != 200 {
        bail!("status code {status}");
    }
    match t {
        Some(t) => state.last_modified.insert(file.url.clone(), t),
        None => state.last_modified.remove(&file.url),
    };

    let serialized = match file.file_type {
        FileType::Plain => {
            if body.is_empty() {
                bail!("refusing to use empty response");
            }
            body
        }
        FileType::Passwd => {
            let pws = passwd::parse_passwds(&body)?;
            // Safety check: a host without users is worse than a stale one
            if pws.is_empty() {
                bail!("refusing to use empty passwd file");
            }
            passwd::serialize_passwds(&pws)?
        }
        FileType::Group => {
            let grs = group::parse_groups(&body)?;
            if grs.is_empty() {
                bail!("refusing to use empty group file");
            }
            group::serialize_groups(&grs)?
        }
    };

    state
        .checksum
        .insert(file.url.clone(), sha512_hex(&serialized));
    Ok(Some(serialized))
}

/// Atomically replace `path` with `body`.
///
/// The target must already exist: its uid, gid and mode are copied to the
/// replacement (with all write bits stripped, deterring manual edits that
/// the next update would silently discard). The body is written to a temp
/// file in the target's directory, fsynced, renamed over the target, and
/// the directory is fsynced.
pub fn deploy_file(url: &str, path: &Path, body: &[u8]) -> Result<()> {
    info!("{url:?} -> {path:?}: updating file");

    // Safety check
    if body.is_empty() {
        bail!("refusing to write empty file");
    }

    // We do not create the target because only the operator knows the
    // proper owner and permissions
    let meta = fs::metadata(path).with_context(|| format!("file.path {:?} must exist", path))?;

    let dir = parent_dir(path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("tmp-{name}-"))
        .tempfile_in(dir)
        .with_context(|| format!("cannot create temporary file in {:?}", dir))?;

    let mode = meta.permissions().mode() & 0o7777 & !0o222;
    temp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .context("chmod")?;
    let rc = unsafe { libc::fchown(temp.as_file().as_raw_fd(), meta.uid(), meta.gid()) };
    if rc != 0 {
        return Err(io::Error::last_os_error()).context("chown");
    }

    temp.write_all(body)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("cannot replace {:?}", path))?;
    sync_dir(dir)?;
    Ok(())
}

/// fsync a directory; required after rename for the entry to be durable.
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

pub(crate) fn sha512_hex(bytes: &[u8]) -> String {
    let digest = Sha512::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest {
        hex.push_str(&format!("{b:02x}"));
    }
    hex
}
