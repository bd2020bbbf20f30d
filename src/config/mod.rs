use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Download repository used when the caller does not name one.
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://provo-mirror.opensuse.org/repositories/Cloud:/Images:/Leap_15.0/images/";

pub const DEFAULT_ARCH: &str = "x86_64";

/// Upper bound on the pause between poll cycles.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(150);

/// TLS trust policy for the download server.
#[derive(Debug, Clone, Default)]
pub enum TlsVerify {
    /// Verify against the system trust store.
    #[default]
    Enabled,
    /// Accept any certificate. Intended for internal staging mirrors.
    Disabled,
    /// Verify against a caller-supplied PEM CA bundle.
    CaBundle(PathBuf),
}

/// Immutable context for one fetch pipeline.
///
/// Replaces any process-wide configuration: the caller builds one of these
/// and hands it to the engine, so concurrent pipelines with different
/// settings never interfere.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub download_url: Url,
    pub target_dir: PathBuf,
    pub verify: TlsVerify,
    pub conditions_wait_time: Duration,
    pub progress: bool,
}

impl FetchConfig {
    pub fn new(download_url: Url) -> Self {
        Self {
            download_url,
            target_dir: PathBuf::from("."),
            verify: TlsVerify::default(),
            conditions_wait_time: Duration::ZERO,
            progress: true,
        }
    }

    /// Pause between poll cycles: the wait budget, capped at
    /// [`MAX_POLL_INTERVAL`] so long budgets still re-check regularly.
    pub fn poll_interval(&self) -> Duration {
        self.conditions_wait_time.min(MAX_POLL_INTERVAL)
    }
}
