use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{directory_url, fetch_text};
use crate::errors::{Error, Result};
use crate::image::{CandidateFile, ChecksumKind, ChecksumRecord, PackageReport, StatusReport};

/// A fetched checksum sibling: the parsed record plus the raw artifact so
/// the downloader can store it next to the image.
#[derive(Debug, Clone)]
pub struct ChecksumArtifact {
    pub name: String,
    pub body: String,
    pub record: ChecksumRecord,
}

/// Retrieves the per-image sibling artifacts: checksum file, packages
/// report, and build-status report.
///
/// Siblings live at predictable names next to the image, so each fetch is a
/// single GET without re-reading the listing.
pub struct MetadataFetcher {
    client: Client,
    base: Url,
}

impl MetadataFetcher {
    pub fn new(client: Client, base: Url) -> Self {
        Self {
            client,
            base: directory_url(base),
        }
    }

    fn sibling_url(&self, name: &str) -> Result<Url> {
        self.base.join(name).map_err(|e| {
            Error::Configuration(format!("cannot build sibling URL for {name:?}: {e}"))
        })
    }

    /// Fetch and parse the checksum artifact for a candidate.
    ///
    /// The artifact is published either against the full filename
    /// (`image.qcow2.sha256`) or against the stem (`image.sha256`)
    /// depending on the build service version; both are tried in that
    /// order, for each configured checksum extension.
    pub async fn fetch_checksum(
        &self,
        candidate: &CandidateFile,
        extensions: &[String],
    ) -> Result<ChecksumArtifact> {
        for extension in extensions {
            let kind: ChecksumKind = extension.parse()?;
            let names = [
                format!("{}.{extension}", candidate.filename()),
                format!("{}.{extension}", candidate.stem()),
            ];
            for name in names {
                let url = self.sibling_url(&name)?;
                let body = match fetch_text(&self.client, &url).await {
                    Ok(body) => body,
                    Err(err) => {
                        debug!(%url, %err, "checksum artifact not available");
                        continue;
                    }
                };
                let record = ChecksumRecord::from_artifact(kind, &body).ok_or_else(|| {
                    Error::Metadata {
                        url: url.to_string(),
                        reason: "no digest token found in checksum artifact".to_string(),
                    }
                })?;
                return Ok(ChecksumArtifact { name, body, record });
            }
        }

        Err(Error::NotFound {
            pattern: format!("{}.<checksum>", candidate.filename()),
        })
    }

    /// Fetch and parse the packages report (`<stem>.packages`).
    pub async fn fetch_packages(&self, candidate: &CandidateFile) -> Result<PackageReport> {
        let url = self.sibling_url(&format!("{}.packages", candidate.stem()))?;
        debug!(%url, "fetching packages report");
        let body = fetch_text(&self.client, &url).await?;
        PackageReport::parse(&body).map_err(|err| at_url(err, &url))
    }

    /// Fetch and parse the build-status report (`<stem>.report`).
    pub async fn fetch_status(&self, candidate: &CandidateFile) -> Result<StatusReport> {
        let url = self.sibling_url(&format!("{}.report", candidate.stem()))?;
        debug!(%url, "fetching build-status report");
        let body = fetch_text(&self.client, &url).await?;
        StatusReport::parse(&body).map_err(|err| at_url(err, &url))
    }
}

fn at_url(err: Error, url: &Url) -> Error {
    match err {
        Error::Metadata { reason, .. } => Error::Metadata {
            url: url.to_string(),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::MetadataFetcher;
    use crate::config::TlsVerify;
    use crate::errors::Error;
    use crate::image::CandidateFile;
    use crate::remote::build_client;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DIGEST: &str = "a3f5b4e6c7d8091a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d5e6f708192";

    fn candidate() -> CandidateFile {
        CandidateFile::new(
            "img.x86_64-1.2.3-Build4.5.qcow2",
            "img.x86_64-1.2.3-Build4.5",
            "1.2.3",
            "4.5",
            "qcow2",
        )
    }

    fn fetcher(server: &MockServer) -> MetadataFetcher {
        let client = build_client(&TlsVerify::Enabled).unwrap();
        let base = Url::parse(&format!("{}/images/", server.uri())).unwrap();
        MetadataFetcher::new(client, base)
    }

    #[tokio::test]
    async fn checksum_against_full_filename_preferred() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/img.x86_64-1.2.3-Build4.5.qcow2.sha256"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("{DIGEST}  img.qcow2\n")),
            )
            .mount(&server)
            .await;

        let artifact = fetcher(&server)
            .fetch_checksum(&candidate(), &["sha256".to_string()])
            .await
            .unwrap();
        assert_eq!(artifact.name, "img.x86_64-1.2.3-Build4.5.qcow2.sha256");
        assert_eq!(artifact.record.value(), DIGEST);
    }

    #[tokio::test]
    async fn checksum_falls_back_to_stem_sibling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/img.x86_64-1.2.3-Build4.5.sha256"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{DIGEST}\n")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let artifact = fetcher(&server)
            .fetch_checksum(&candidate(), &["sha256".to_string()])
            .await
            .unwrap();
        assert_eq!(artifact.name, "img.x86_64-1.2.3-Build4.5.sha256");
    }

    #[tokio::test]
    async fn missing_checksum_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(&server)
            .fetch_checksum(&candidate(), &["sha256".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn packages_report_fetched_from_stem_sibling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/img.x86_64-1.2.3-Build4.5.packages"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<packages><package name="zypper" version="1.14.59" release="3.1" arch="x86_64"/></packages>"#,
            ))
            .mount(&server)
            .await;

        let report = fetcher(&server).fetch_packages(&candidate()).await.unwrap();
        assert_eq!(report.get("zypper").unwrap().version, "1.14.59");
    }

    #[tokio::test]
    async fn status_report_fetched_from_stem_sibling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/img.x86_64-1.2.3-Build4.5.report"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<status code="succeeded"/>"#),
            )
            .mount(&server)
            .await;

        let status = fetcher(&server).fetch_status(&candidate()).await.unwrap();
        assert_eq!(status.code(), "succeeded");
    }
}
