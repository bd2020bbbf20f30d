use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256, Sha512};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::errors::{Error, Result};
use crate::image::{CandidateFile, ChecksumKind};
use crate::remote::{MetadataFetcher, directory_url};

/// Digest computed incrementally while the image streams to disk, so
/// verification never re-reads the file.
enum StreamHasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl StreamHasher {
    fn new(kind: ChecksumKind) -> Self {
        match kind {
            ChecksumKind::Sha256 => StreamHasher::Sha256(Sha256::new()),
            ChecksumKind::Sha512 => StreamHasher::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamHasher::Sha256(h) => h.update(bytes),
            StreamHasher::Sha512(h) => h.update(bytes),
        }
    }

    fn finish(self) -> String {
        match self {
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamHasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Streams the selected image to local storage and verifies it against the
/// published checksum before it appears under its final name.
pub struct Downloader {
    client: Client,
    base: Url,
    progress: bool,
}

impl Downloader {
    pub fn new(client: Client, base: Url) -> Self {
        Self {
            client,
            base: directory_url(base),
            progress: true,
        }
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn progress_bar(&self, total: Option<u64>, filename: &str) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::no_length(),
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
             {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(format!("Downloading {filename}"));
        bar
    }

    /// Download the candidate image into `target_dir` and return the final
    /// path.
    ///
    /// Bytes stream to `<name>.partial` first; the file is renamed to its
    /// final name only after the digest matches the published checksum, so
    /// the destination either holds a fully verified image or nothing. Any
    /// failure removes the partial, stale ones from earlier interrupted
    /// runs included. The checksum artifact is stored next to the image.
    pub async fn download(
        &self,
        candidate: &CandidateFile,
        metadata: &MetadataFetcher,
        target_dir: &Path,
        checksum_extensions: &[String],
    ) -> Result<PathBuf> {
        fs::create_dir_all(target_dir)?;

        let artifact = metadata
            .fetch_checksum(candidate, checksum_extensions)
            .await?;

        let image_url = self.base.join(candidate.filename()).map_err(|e| {
            Error::Configuration(format!(
                "cannot build image URL for {:?}: {e}",
                candidate.filename()
            ))
        })?;
        let final_path = target_dir.join(candidate.filename());
        let partial_path = target_dir.join(format!("{}.partial", candidate.filename()));

        let computed = match self
            .transfer(&image_url, &partial_path, candidate.filename(), artifact.record.kind())
            .await
        {
            Ok(digest) => digest,
            Err(err) => {
                let _ = fs::remove_file(&partial_path);
                return Err(err);
            }
        };

        if !artifact.record.matches(&computed) {
            let _ = fs::remove_file(&partial_path);
            return Err(Error::Integrity {
                path: final_path,
                expected: artifact.record.value().to_string(),
                computed,
            });
        }

        fs::write(target_dir.join(&artifact.name), &artifact.body)?;
        fs::rename(&partial_path, &final_path)?;
        info!(path = %final_path.display(), digest = %computed, "image verified");

        Ok(final_path)
    }

    /// Stream the image to the partial path, hashing as it goes, and return
    /// the computed digest.
    async fn transfer(
        &self,
        image_url: &Url,
        partial_path: &Path,
        filename: &str,
        kind: ChecksumKind,
    ) -> Result<String> {
        debug!(url = %image_url, "starting image download");
        let transport = |source| Error::Transport {
            url: image_url.to_string(),
            source,
        };
        let response = self
            .client
            .get(image_url.as_str())
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;

        let bar = self.progress_bar(response.content_length(), filename);
        let mut hasher = StreamHasher::new(kind);
        let mut file = File::create(partial_path)?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            hasher.update(&chunk);
            file.write_all(&chunk)?;
            bar.inc(chunk.len() as u64);
        }
        file.flush()?;
        drop(file);
        bar.finish_and_clear();

        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::Downloader;
    use crate::config::TlsVerify;
    use crate::errors::Error;
    use crate::image::CandidateFile;
    use crate::remote::{MetadataFetcher, build_client};
    use sha2::{Digest, Sha256};
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE_BYTES: &[u8] = b"pretend this is a qcow2 disk image";

    fn candidate() -> CandidateFile {
        CandidateFile::new(
            "img-15.3-Build1.1.qcow2",
            "img-15.3-Build1.1",
            "15.3",
            "1.1",
            "qcow2",
        )
    }

    struct Setup {
        downloader: Downloader,
        metadata: MetadataFetcher,
    }

    fn setup(server: &MockServer) -> Setup {
        let client = build_client(&TlsVerify::Enabled).unwrap();
        let base = Url::parse(&format!("{}/images/", server.uri())).unwrap();
        Setup {
            downloader: Downloader::new(client.clone(), base.clone()).with_progress(false),
            metadata: MetadataFetcher::new(client, base),
        }
    }

    async fn serve_image(server: &MockServer, digest: &str) {
        Mock::given(method("GET"))
            .and(path("/images/img-15.3-Build1.1.qcow2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_BYTES))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/images/img-15.3-Build1.1.qcow2.sha256"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{digest}  img-15.3-Build1.1.qcow2\n")),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn verified_image_lands_at_final_path() {
        let server = MockServer::start().await;
        let digest = hex::encode(Sha256::digest(IMAGE_BYTES));
        serve_image(&server, &digest).await;

        let setup = setup(&server);
        let target = tempfile::tempdir().unwrap();
        let path = setup
            .downloader
            .download(
                &candidate(),
                &setup.metadata,
                target.path(),
                &["sha256".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), IMAGE_BYTES);
        assert!(target.path().join("img-15.3-Build1.1.qcow2.sha256").exists());
        assert!(!target.path().join("img-15.3-Build1.1.qcow2.partial").exists());
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_no_file_behind() {
        let server = MockServer::start().await;
        let wrong_digest = hex::encode(Sha256::digest(b"different bytes entirely"));
        serve_image(&server, &wrong_digest).await;

        let setup = setup(&server);
        let target = tempfile::tempdir().unwrap();
        let err = setup
            .downloader
            .download(
                &candidate(),
                &setup.metadata,
                target.path(),
                &["sha256".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }));
        assert!(!target.path().join("img-15.3-Build1.1.qcow2").exists());
        assert!(!target.path().join("img-15.3-Build1.1.qcow2.partial").exists());
    }

    #[tokio::test]
    async fn failed_transfer_removes_stale_partial_file() {
        let server = MockServer::start().await;
        let digest = hex::encode(Sha256::digest(IMAGE_BYTES));
        Mock::given(method("GET"))
            .and(path("/images/img-15.3-Build1.1.qcow2.sha256"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{digest}  img-15.3-Build1.1.qcow2\n")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/images/img-15.3-Build1.1.qcow2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let setup = setup(&server);
        let target = tempfile::tempdir().unwrap();
        let partial = target.path().join("img-15.3-Build1.1.qcow2.partial");
        std::fs::write(&partial, b"leftover from an interrupted run").unwrap();

        let err = setup
            .downloader
            .download(
                &candidate(),
                &setup.metadata,
                target.path(),
                &["sha256".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
        assert!(!partial.exists());
        assert!(!target.path().join("img-15.3-Build1.1.qcow2").exists());
    }

    #[tokio::test]
    async fn missing_checksum_artifact_fails_before_transfer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let setup = setup(&server);
        let target = tempfile::tempdir().unwrap();
        let err = setup
            .downloader
            .download(
                &candidate(),
                &setup.metadata,
                target.path(),
                &["sha256".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
    }
}
