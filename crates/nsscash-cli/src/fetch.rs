//! Conditional HTTP download with `If-Modified-Since` support.
//!
//! Agents are pooled per CA configuration so connections are reused
//! across files within one run; files without a pinned CA share the
//! default agent with system roots.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};

use crate::config::FileConfig;

/// RFC 1123 as used in HTTP date headers, always UTC.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// HTTP agents keyed by CA path; `None` maps to the system-roots agent.
pub struct HttpClients {
    agents: HashMap<String, ureq::Agent>,
}

impl HttpClients {
    pub fn new() -> Self {
        let mut agents = HashMap::new();
        agents.insert(String::new(), ureq::AgentBuilder::new().build());
        HttpClients { agents }
    }

    fn agent(&mut self, ca: Option<&Path>) -> Result<&ureq::Agent> {
        let key = ca
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !self.agents.contains_key(&key) {
            // Only reached with a CA configured
            let agent = pinned_agent(ca.unwrap_or(Path::new("")))?;
            self.agents.insert(key.clone(), agent);
        }
        Ok(&self.agents[&key])
    }
}

impl Default for HttpClients {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an agent that trusts exactly the roots in the PEM file `ca`.
fn pinned_agent(ca: &Path) -> Result<ureq::Agent> {
    let pem = fs::read(ca).with_context(|| format!("file.ca {:?}", ca))?;

    let mut roots = rustls::RootCertStore::empty();
    let mut found = 0usize;
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.with_context(|| format!("file.ca {:?}", ca))?;
        roots
            .add(cert)
            .with_context(|| format!("file.ca {:?}", ca))?;
        found += 1;
    }
    if found == 0 {
        bail!("file.ca {:?}: no PEM cert found", ca);
    }

    let tls = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(ureq::AgentBuilder::new().tls_config(Arc::new(tls)).build())
}

/// GET `file.url`, sending `If-Modified-Since` when `last_modified` holds
/// a timestamp and Basic auth when credentials are configured.
///
/// Returns the status code, the response body and whether the conditional
/// header was sent. `last_modified` is updated in place when the response
/// carries a parseable `Last-Modified` header; the value is trusted
/// verbatim, even when it lies in the future.
pub fn fetch_if_modified(
    clients: &mut HttpClients,
    file: &FileConfig,
    last_modified: &mut Option<DateTime<Utc>>,
) -> Result<(u16, Vec<u8>, bool)> {
    let agent = clients.agent(file.ca.as_deref())?;

    let mut request = agent.get(&file.url);
    if file.username.is_some() || file.password.is_some() {
        let user = file.username.as_deref().unwrap_or("");
        let pass = file.password.as_deref().unwrap_or("");
        let token = BASE64.encode(format!("{user}:{pass}"));
        request = request.set("Authorization", &format!("Basic {token}"));
    }
    let sent_ims = last_modified.is_some();
    if let Some(t) = *last_modified {
        request = request.set("If-Modified-Since", &t.format(HTTP_DATE_FORMAT).to_string());
    }

    let response = match request.call() {
        Ok(response) => response,
        // Non-2xx statuses surface as errors; status handling is the
        // caller's concern
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(err).with_context(|| format!("GET {}", file.url)),
    };

    let status = response.status();
    let modified = response
        .header("Last-Modified")
        .and_then(parse_http_date);

    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("GET {}: cannot read body", file.url))?;

    if let Some(modified) = modified {
        *last_modified = Some(modified);
    }

    Ok((status, body, sent_ims))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
