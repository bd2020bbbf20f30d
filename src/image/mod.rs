mod candidate;
mod checksum;
mod report;
mod spec;
mod version;

pub use candidate::CandidateFile;
pub use checksum::{ChecksumKind, ChecksumRecord};
pub(crate) use report::compile_glob;
pub use report::{PackageInfo, PackageReport, StatusReport};
pub use spec::{DEFAULT_VERSION_FORMAT, ImageSpec};
pub use version::DotVersion;
