mod metadata;

pub use metadata::{ChecksumArtifact, MetadataFetcher};

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::fs;
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

use crate::config::TlsVerify;
use crate::errors::{Error, Result};

const USER_AGENT: &str = concat!("obs-image-fetch/", env!("CARGO_PKG_VERSION"));

fn anchor_regex() -> &'static Regex {
    static ANCHOR_RE: OnceLock<Regex> = OnceLock::new();
    ANCHOR_RE.get_or_init(|| {
        Regex::new(r#"<a\s[^>]*href="([^"]+)""#).expect("invalid anchor href regex")
    })
}

/// Build the shared HTTP client honouring the TLS trust policy.
pub fn build_client(verify: &TlsVerify) -> Result<Client> {
    let builder = Client::builder().user_agent(USER_AGENT);
    let builder = match verify {
        TlsVerify::Enabled => builder,
        TlsVerify::Disabled => builder.danger_accept_invalid_certs(true),
        TlsVerify::CaBundle(path) => {
            let pem = fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::Configuration(format!("unreadable CA bundle {}: {e}", path.display()))
            })?;
            builder.add_root_certificate(cert)
        }
    };
    builder
        .build()
        .map_err(|e| Error::Configuration(format!("HTTP client setup failed: {e}")))
}

pub(crate) async fn fetch_text(client: &Client, url: &Url) -> Result<String> {
    let transport = |source| Error::Transport {
        url: url.to_string(),
        source,
    };
    client
        .get(url.as_str())
        .send()
        .await
        .map_err(transport)?
        .error_for_status()
        .map_err(transport)?
        .text()
        .await
        .map_err(transport)
}

/// Appends a trailing slash so relative joins stay inside the directory.
pub(crate) fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Fetches the directory listing published for one architecture/cloud
/// target and extracts the candidate filenames from it.
pub struct ListingClient {
    client: Client,
    base: Url,
}

impl ListingClient {
    pub fn new(client: Client, base: Url) -> Self {
        Self {
            client,
            base: directory_url(base),
        }
    }

    /// Fetch the raw filenames linked from the directory index, in listing
    /// order. Newer mirror front ends render an empty index and serve a
    /// JSON table instead, so an anchor-less page falls back to that.
    pub async fn list(&self) -> Result<Vec<String>> {
        let html = fetch_text(&self.client, &self.base).await?;
        let names = parse_anchor_names(&html);
        if !names.is_empty() {
            return Ok(names);
        }

        debug!(url = %self.base, "no anchors in index page, trying JSON table listing");
        let mut table_url = self.base.clone();
        table_url.set_query(Some("jsontable"));
        match fetch_text(&self.client, &table_url).await {
            Ok(body) => Ok(parse_json_table(&body)),
            Err(err) => {
                debug!(%err, "JSON table listing unavailable");
                Ok(Vec::new())
            }
        }
    }
}

/// Extract file names from anchor hrefs, skipping directories, parent
/// links, queries, and absolute URLs. Order is preserved as listed.
fn parse_anchor_names(html: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in anchor_regex().captures_iter(html) {
        let href = caps[1].trim();
        let href = href.strip_prefix("./").unwrap_or(href);
        if href.is_empty() || href.starts_with('?') || href.starts_with('#') {
            continue;
        }
        if href.contains("://") || href.starts_with('/') {
            continue;
        }
        if href.ends_with('/') || href.contains("..") {
            continue;
        }
        if !names.iter().any(|n| n == href) {
            names.push(href.to_string());
        }
    }
    names
}

#[derive(Deserialize)]
struct JsonTable {
    #[serde(default)]
    data: Vec<JsonTableRow>,
}

#[derive(Deserialize)]
struct JsonTableRow {
    name: String,
}

/// A table that fails to parse is an empty fallback, not an error.
fn parse_json_table(body: &str) -> Vec<String> {
    serde_json::from_str::<JsonTable>(body)
        .map(|table| table.data.into_iter().map(|row| row.name).collect())
        .unwrap_or_default()
}
