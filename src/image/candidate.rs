use serde::Serialize;

use super::DotVersion;

/// A listing entry that matched the image pattern, with its version tokens
/// parsed out.
///
/// Candidates are only ever built from the listing fetched in the same poll
/// cycle. The poller discards them between cycles, so a stale filename is
/// never paired with a newer metadata fetch.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFile {
    filename: String,
    stem: String,
    version: String,
    release: String,
    extension: String,
}

impl CandidateFile {
    pub fn new(
        filename: impl Into<String>,
        stem: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            stem: stem.into(),
            version: version.into(),
            release: release.into(),
            extension: extension.into(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Filename without the extension; sibling metadata artifacts hang off
    /// this stem (`<stem>.packages`, `<stem>.report`).
    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Sort key for "pick the newest build": version first, release second,
    /// both compared numerically segment by segment.
    pub fn version_key(&self) -> (DotVersion, DotVersion) {
        (
            DotVersion::parse(&self.version),
            DotVersion::parse(&self.release),
        )
    }
}
