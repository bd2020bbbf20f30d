/// Default image extensions, in tie-break priority order.
pub const DEFAULT_EXTENSIONS: &[&str] = &["vhdfixed.xz", "raw.xz", "tar.gz", "qcow2"];

/// Default checksum artifact extensions.
pub const DEFAULT_CHECKSUM_EXTENSIONS: &[&str] = &["sha256"];

/// Default version-format template. Placeholders become capture groups;
/// the first captured token is the version, the second the release.
pub const DEFAULT_VERSION_FORMAT: &str = "{kiwi_version}-Build{obs_build}";

/// Immutable descriptor of the image to resolve.
///
/// Built once from caller input and shared read-only by every component;
/// nothing in the engine mutates it after construction.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    base_name: String,
    arch: Option<String>,
    profile: Option<String>,
    extensions: Vec<String>,
    checksum_extensions: Vec<String>,
    version_format: String,
    explicit_version: Option<String>,
    explicit_release: Option<String>,
}

impl ImageSpec {
    pub fn new(base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            arch: None,
            profile: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            checksum_extensions: DEFAULT_CHECKSUM_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            version_format: DEFAULT_VERSION_FORMAT.to_string(),
            explicit_version: None,
            explicit_release: None,
        }
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Replace the extension allow-list. Order sets the tie-break priority
    /// when candidates agree on (version, release).
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_checksum_extensions(mut self, extensions: Vec<String>) -> Self {
        self.checksum_extensions = extensions;
        self
    }

    pub fn with_version_format(mut self, format: impl Into<String>) -> Self {
        self.version_format = format.into();
        self
    }

    /// Pin an exact version; candidates with any other version are dropped.
    pub fn with_explicit_version(mut self, version: impl Into<String>) -> Self {
        self.explicit_version = Some(version.into());
        self
    }

    pub fn with_explicit_release(mut self, release: impl Into<String>) -> Self {
        self.explicit_release = Some(release.into());
        self
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn checksum_extensions(&self) -> &[String] {
        &self.checksum_extensions
    }

    pub fn explicit_version(&self) -> Option<&str> {
        self.explicit_version.as_deref()
    }

    pub fn explicit_release(&self) -> Option<&str> {
        self.explicit_release.as_deref()
    }

    /// Version-format template with the multibuild profile spliced in.
    ///
    /// Multibuild image names carry the profile between the version and the
    /// build token (`Name.x86_64-1.2.3-azure-Build4.5`), so the profile is
    /// inserted as literal text before the `-Build` marker. Templates
    /// without that marker are left untouched.
    pub fn effective_version_format(&self) -> String {
        match &self.profile {
            Some(profile) if self.version_format.contains("-Build") => self
                .version_format
                .replacen("-Build", &format!("-{profile}-Build"), 1),
            _ => self.version_format.clone(),
        }
    }
}
