//! Configuration file parsing and validation.
//!
//! The config is TOML with a `statepath` and one `[[file]]` table per
//! cache to maintain. Unknown keys are rejected. Configured credentials
//! require the config file itself to be unreadable for group and others.

use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Type of a cached file; selects validation and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Opaque bytes, deployed verbatim.
    Plain,
    /// `/etc/passwd` format, serialized into a binary cache.
    Passwd,
    /// `/etc/group` format, serialized into a binary cache.
    Group,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Plain => "plain",
            FileType::Passwd => "passwd",
            FileType::Group => "group",
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where the JSON state lives between runs.
    pub statepath: PathBuf,
    #[serde(rename = "file", default)]
    pub files: Vec<FileConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub url: String,
    /// Deploy target; must already exist (the operator owns its mode).
    pub path: PathBuf,
    /// Optional PEM file with pinned root certificates.
    pub ca: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read config {:?}", path))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("invalid config {:?}", path))?;

    let meta = fs::metadata(path)?;
    let perms = meta.permissions().mode() & 0o777;
    let unsafe_perms = perms & 0o077 != 0; // readable by group/others

    if cfg.statepath.as_os_str().is_empty() {
        bail!("statepath must not be empty");
    }
    for (i, f) in cfg.files.iter().enumerate() {
        if f.url.is_empty() {
            bail!("file[{i}].url must not be empty");
        }
        if f.path.as_os_str().is_empty() {
            bail!("file[{i}].path must not be empty");
        }
        if (f.username.is_some() || f.password.is_some()) && unsafe_perms {
            bail!(
                "file[{i}].username/password in use and unsafe permissions {perms:03o} on {:?}",
                path
            );
        }
    }

    Ok(cfg)
}
