use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::image::{CandidateFile, ChecksumKind, ChecksumRecord, DotVersion, PackageReport};

/// Comparison operator for version and release conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
        }
    }

    /// Apply the operator using numeric dot-segment-wise comparison.
    pub fn holds(&self, current: &str, expected: &str) -> bool {
        let current = DotVersion::parse(current);
        let expected = DotVersion::parse(expected);
        match self {
            CompareOp::Ge => current >= expected,
            CompareOp::Le => current <= expected,
            CompareOp::Eq => current == expected,
            CompareOp::Gt => current > expected,
            CompareOp::Lt => current < expected,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            ">=" => Ok(CompareOp::Ge),
            "<=" => Ok(CompareOp::Le),
            "==" => Ok(CompareOp::Eq),
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            other => Err(Error::Configuration(format!(
                "invalid version compare expression {other:?}"
            ))),
        }
    }
}

/// A caller-declared predicate that must hold before an image counts as
/// ready. Declared once, read-only during evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Image version and/or release extracted from the resolved filename.
    ImageVersion {
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        release: Option<String>,
        op: CompareOp,
    },
    /// A package must be present in the packages report, optionally at a
    /// version/release bound.
    Package {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        release: Option<String>,
        op: CompareOp,
    },
    /// The published checksum must equal this digest.
    Checksum {
        digest: String,
        algorithm: ChecksumKind,
    },
    /// No package in the image may carry one of these licenses.
    DisallowedLicenses { licenses: Vec<String> },
    /// No package name may match one of these globs.
    DisallowedPackages { patterns: Vec<String> },
}

impl Condition {
    pub fn describe(&self) -> String {
        match self {
            Condition::ImageVersion { version, release, op } => {
                let mut parts = Vec::new();
                if let Some(v) = version {
                    parts.push(format!("version {op} {v}"));
                }
                if let Some(r) = release {
                    parts.push(format!("release {op} {r}"));
                }
                format!("image {}", parts.join(", "))
            }
            Condition::Package { name, version, release, op } => {
                let mut out = format!("package {name}");
                if let Some(v) = version {
                    out.push_str(&format!(" version {op} {v}"));
                }
                if let Some(r) = release {
                    out.push_str(&format!(" release {op} {r}"));
                }
                out
            }
            Condition::Checksum { digest, algorithm } => {
                format!("{algorithm} digest == {digest}")
            }
            Condition::DisallowedLicenses { licenses } => {
                format!("no package licensed {}", licenses.join(", "))
            }
            Condition::DisallowedPackages { patterns } => {
                format!("no package matching {}", patterns.join(", "))
            }
        }
    }
}

/// Outcome of evaluating one condition in one poll cycle. Produced fresh
/// every cycle; never cached because remote state may change.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionResult {
    pub condition: Condition,
    pub passed: bool,
    pub detail: String,
}

/// Metadata gathered for one poll cycle. `None` fields mean the fetch
/// failed or was skipped; conditions depending on them fail softly.
#[derive(Debug, Default)]
pub struct CycleMetadata {
    pub packages: Option<PackageReport>,
    pub checksum: Option<ChecksumRecord>,
}

pub fn needs_checksum(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| matches!(c, Condition::Checksum { .. }))
}

/// Evaluate every condition against the current candidate and metadata.
///
/// No short-circuiting: the caller gets a complete diagnostic set even when
/// the first condition already failed.
pub fn evaluate(
    conditions: &[Condition],
    candidate: &CandidateFile,
    metadata: &CycleMetadata,
) -> Vec<ConditionResult> {
    conditions
        .iter()
        .map(|condition| evaluate_one(condition, candidate, metadata))
        .collect()
}

fn result(condition: &Condition, passed: bool, detail: impl Into<String>) -> ConditionResult {
    ConditionResult {
        condition: condition.clone(),
        passed,
        detail: detail.into(),
    }
}

fn check_bounds(
    op: CompareOp,
    version: Option<&str>,
    release: Option<&str>,
    current_version: &str,
    current_release: &str,
) -> Vec<String> {
    let mut failures = Vec::new();
    if let Some(expected) = version {
        if !op.holds(current_version, expected) {
            failures.push(format!(
                "version condition failed: {current_version} {op} {expected}"
            ));
        }
    }
    if let Some(expected) = release {
        if !op.holds(current_release, expected) {
            failures.push(format!(
                "release condition failed: {current_release} {op} {expected}"
            ));
        }
    }
    failures
}

fn evaluate_one(
    condition: &Condition,
    candidate: &CandidateFile,
    metadata: &CycleMetadata,
) -> ConditionResult {
    match condition {
        Condition::ImageVersion { version, release, op } => {
            let failures = check_bounds(
                *op,
                version.as_deref(),
                release.as_deref(),
                candidate.version(),
                candidate.release(),
            );
            if failures.is_empty() {
                result(
                    condition,
                    true,
                    format!(
                        "image is {} release {}",
                        candidate.version(),
                        candidate.release()
                    ),
                )
            } else {
                result(condition, false, failures.join("; "))
            }
        }
        Condition::Package { name, version, release, op } => {
            let Some(report) = &metadata.packages else {
                return result(condition, false, "packages metadata unavailable");
            };
            let Some(info) = report.get(name) else {
                return result(condition, false, format!("package {name} not in image"));
            };
            let failures = check_bounds(
                *op,
                version.as_deref(),
                release.as_deref(),
                &info.version,
                &info.release,
            );
            if failures.is_empty() {
                result(
                    condition,
                    true,
                    format!("{name} is {}-{}", info.version, info.release),
                )
            } else {
                result(condition, false, failures.join("; "))
            }
        }
        Condition::DisallowedLicenses { licenses } => {
            let Some(report) = &metadata.packages else {
                return result(condition, false, "packages metadata unavailable");
            };
            let offending = report.with_licenses(licenses);
            if offending.is_empty() {
                result(condition, true, "no package carries a disallowed license")
            } else {
                result(
                    condition,
                    false,
                    format!("disallowed license on: {}", offending.names().join(", ")),
                )
            }
        }
        Condition::DisallowedPackages { patterns } => {
            let Some(report) = &metadata.packages else {
                return result(condition, false, "packages metadata unavailable");
            };
            match report.matching_names(patterns) {
                Ok(offending) if offending.is_empty() => {
                    result(condition, true, "no disallowed package in image")
                }
                Ok(offending) => result(
                    condition,
                    false,
                    format!(
                        "disallowed packages in image: {}",
                        offending.names().join(", ")
                    ),
                ),
                Err(err) => result(condition, false, err.to_string()),
            }
        }
        Condition::Checksum { digest, algorithm } => {
            let Some(record) = &metadata.checksum else {
                return result(condition, false, "checksum metadata unavailable");
            };
            if record.kind() != *algorithm {
                result(
                    condition,
                    false,
                    format!("published digest is {}, expected {algorithm}", record.kind()),
                )
            } else if record.matches(digest) {
                result(condition, true, "published digest matches")
            } else {
                result(
                    condition,
                    false,
                    format!("published digest {} != expected {digest}", record.value()),
                )
            }
        }
    }
}

fn split_op(expr: &str) -> (CompareOp, &str) {
    for token in [">=", "<=", "==", ">", "<"] {
        if let Some(rest) = expr.strip_prefix(token) {
            // Every token parses; the list above is the FromStr table.
            return (token.parse().unwrap_or(CompareOp::Ge), rest.trim());
        }
    }
    (CompareOp::Ge, expr.trim())
}

/// Parse image version/release expressions (`">=8.13.21"`, `"==1.2"`).
/// A bare value means "at least". Both expressions must agree on the
/// operator since a single condition carries one.
pub fn parse_image_condition(
    version: Option<&str>,
    release: Option<&str>,
) -> Result<Condition> {
    let parsed_version = version.map(split_op);
    let parsed_release = release.map(split_op);

    if let (Some((vop, _)), Some((rop, _))) = (parsed_version, parsed_release) {
        if vop != rop {
            return Err(Error::Configuration(format!(
                "conflicting operators in image condition: {vop} vs {rop}"
            )));
        }
    }

    let op = parsed_version
        .or(parsed_release)
        .map(|(op, _)| op)
        .ok_or_else(|| {
            Error::Configuration("image condition needs a version or release".to_string())
        })?;

    fn value(parsed: Option<(CompareOp, &str)>, what: &str) -> Result<Option<String>> {
        match parsed {
            Some((_, v)) if v.is_empty() => Err(Error::Configuration(format!(
                "empty {what} in image condition"
            ))),
            Some((_, v)) => Ok(Some(v.to_string())),
            None => Ok(None),
        }
    }

    Ok(Condition::ImageVersion {
        version: value(parsed_version, "version")?,
        release: value(parsed_release, "release")?,
        op,
    })
}

/// Parse a package condition (`"zypper"`, `"zypper>=1.14.59"`). A bare
/// name is a presence check.
pub fn parse_package_condition(expr: &str) -> Result<Condition> {
    for token in [">=", "<=", "==", ">", "<"] {
        if let Some((name, version)) = expr.split_once(token) {
            let name = name.trim();
            let version = version.trim();
            if name.is_empty() || version.is_empty() {
                return Err(Error::Configuration(format!(
                    "malformed package condition {expr:?}"
                )));
            }
            return Ok(Condition::Package {
                name: name.to_string(),
                version: Some(version.to_string()),
                release: None,
                op: token.parse()?,
            });
        }
    }

    let name = expr.trim();
    if name.is_empty() {
        return Err(Error::Configuration("empty package condition".to_string()));
    }
    Ok(Condition::Package {
        name: name.to_string(),
        version: None,
        release: None,
        op: CompareOp::Ge,
    })
}

/// Declare licenses no image package may carry. Comparison against the
/// packages report is exact.
pub fn disallowed_licenses(licenses: Vec<String>) -> Result<Condition> {
    if licenses.is_empty() || licenses.iter().any(|l| l.trim().is_empty()) {
        return Err(Error::Configuration(
            "license filter needs at least one non-empty license".to_string(),
        ));
    }
    Ok(Condition::DisallowedLicenses { licenses })
}

/// Declare name globs (`kernel-*`) no image package may match.
pub fn disallowed_packages(patterns: Vec<String>) -> Result<Condition> {
    if patterns.is_empty() || patterns.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::Configuration(
            "package filter needs at least one non-empty pattern".to_string(),
        ));
    }
    for pattern in &patterns {
        crate::image::compile_glob(pattern)?;
    }
    Ok(Condition::DisallowedPackages { patterns })
}

/// Parse a checksum condition (`"sha256:ab12..."`; a bare digest implies
/// sha256).
pub fn parse_checksum_condition(expr: &str) -> Result<Condition> {
    let (algorithm, digest) = match expr.split_once(':') {
        Some((kind, digest)) => (kind.parse::<ChecksumKind>()?, digest.trim()),
        None => (ChecksumKind::Sha256, expr.trim()),
    };

    if digest.len() != algorithm.digest_len()
        || !digest.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(Error::Configuration(format!(
            "expected a {}-character hex {algorithm} digest",
            algorithm.digest_len()
        )));
    }

    Ok(Condition::Checksum {
        digest: digest.to_ascii_lowercase(),
        algorithm,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        CompareOp, Condition, CycleMetadata, disallowed_licenses, disallowed_packages, evaluate,
        needs_checksum, parse_checksum_condition, parse_image_condition, parse_package_condition,
    };
    use crate::errors::Error;
    use crate::image::{CandidateFile, ChecksumKind, ChecksumRecord, PackageReport};

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

    fn packages() -> PackageReport {
        PackageReport::parse(
            r#"<packages>
                <package name="zypper" version="1.14.59" release="3.1" arch="x86_64"/>
            </packages>"#,
        )
        .unwrap()
    }

    fn packages_with_licenses() -> PackageReport {
        PackageReport::parse(
            r#"<packages>
                <package name="zypper" version="1.14.59" release="3.1" arch="x86_64" license="GPL-2.0-or-later"/>
                <package name="bash" version="4.4" release="1.1" arch="x86_64" license="GPL-3.0-or-later"/>
            </packages>"#,
        )
        .unwrap()
    }

    #[test]
    fn image_version_equality() {
        let condition = Condition::ImageVersion {
            version: Some("1.2.3".to_string()),
            release: None,
            op: CompareOp::Eq,
        };
        let results = evaluate(&[condition], &candidate(), &CycleMetadata::default());
        assert!(results[0].passed);
    }

    #[test]
    fn image_release_bound_failure_has_detail() {
        let condition = Condition::ImageVersion {
            version: None,
            release: Some("5.0".to_string()),
            op: CompareOp::Ge,
        };
        let results = evaluate(&[condition], &candidate(), &CycleMetadata::default());
        assert!(!results[0].passed);
        assert!(results[0].detail.contains("release condition failed"));
    }

    #[test]
    fn package_presence_and_version_bounds() {
        let metadata = CycleMetadata {
            packages: Some(packages()),
            checksum: None,
        };

        let present = parse_package_condition("zypper").unwrap();
        let new_enough = parse_package_condition("zypper>=1.14").unwrap();
        let too_new = parse_package_condition("zypper>=1.15").unwrap();
        let absent = parse_package_condition("emacs").unwrap();

        let results = evaluate(
            &[present, new_enough, too_new, absent],
            &candidate(),
            &metadata,
        );
        assert!(results[0].passed);
        assert!(results[1].passed);
        assert!(!results[2].passed);
        assert!(!results[3].passed);
        assert!(results[3].detail.contains("not in image"));
    }

    #[test]
    fn missing_packages_metadata_fails_softly() {
        let condition = parse_package_condition("zypper").unwrap();
        let results = evaluate(&[condition], &candidate(), &CycleMetadata::default());
        assert!(!results[0].passed);
        assert!(results[0].detail.contains("unavailable"));
    }

    #[test]
    fn disallowed_license_blocks_image() {
        let metadata = CycleMetadata {
            packages: Some(packages_with_licenses()),
            checksum: None,
        };

        let hit = disallowed_licenses(vec!["GPL-2.0-or-later".to_string()]).unwrap();
        let miss = disallowed_licenses(vec!["MIT".to_string()]).unwrap();
        let results = evaluate(&[hit, miss], &candidate(), &metadata);

        assert!(!results[0].passed);
        assert!(results[0].detail.contains("zypper"));
        assert!(results[1].passed);
    }

    #[test]
    fn disallowed_package_glob_blocks_image() {
        let metadata = CycleMetadata {
            packages: Some(packages_with_licenses()),
            checksum: None,
        };

        let hit = disallowed_packages(vec!["zyp*".to_string()]).unwrap();
        let miss = disallowed_packages(vec!["emacs".to_string()]).unwrap();
        let results = evaluate(&[hit, miss], &candidate(), &metadata);

        assert!(!results[0].passed);
        assert!(results[0].detail.contains("zypper"));
        assert!(results[1].passed);
    }

    #[test]
    fn package_filters_fail_softly_without_metadata() {
        let conditions = vec![
            disallowed_licenses(vec!["MIT".to_string()]).unwrap(),
            disallowed_packages(vec!["emacs".to_string()]).unwrap(),
        ];
        let results = evaluate(&conditions, &candidate(), &CycleMetadata::default());
        assert!(results.iter().all(|r| !r.passed));
        assert!(results.iter().all(|r| r.detail.contains("unavailable")));
    }

    #[test]
    fn empty_filters_are_rejected() {
        assert!(matches!(
            disallowed_licenses(Vec::new()),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            disallowed_licenses(vec![" ".to_string()]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            disallowed_packages(Vec::new()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn checksum_comparison_case_insensitive() {
        let metadata = CycleMetadata {
            packages: None,
            checksum: Some(ChecksumRecord::new(ChecksumKind::Sha256, DIGEST)),
        };
        let condition = parse_checksum_condition(&DIGEST.to_uppercase()).unwrap();
        let results = evaluate(&[condition], &candidate(), &metadata);
        assert!(results[0].passed);
    }

    #[test]
    fn single_character_digest_mismatch_fails() {
        let mut wrong = DIGEST.to_string();
        wrong.replace_range(0..1, "b");
        let metadata = CycleMetadata {
            packages: None,
            checksum: Some(ChecksumRecord::new(ChecksumKind::Sha256, DIGEST)),
        };
        let condition = parse_checksum_condition(&wrong).unwrap();
        let results = evaluate(&[condition], &candidate(), &metadata);
        assert!(!results[0].passed);
    }

    #[test]
    fn all_conditions_evaluated_without_short_circuit() {
        let conditions = vec![
            parse_image_condition(Some(">=9.9.9"), None).unwrap(),
            parse_package_condition("zypper").unwrap(),
        ];
        let metadata = CycleMetadata {
            packages: Some(packages()),
            checksum: None,
        };
        let results = evaluate(&conditions, &candidate(), &metadata);
        assert_eq!(results.len(), 2);
        assert!(!results[0].passed);
        assert!(results[1].passed);
    }

    #[test]
    fn image_condition_parsing() {
        let condition = parse_image_condition(Some("==8.13.21"), None).unwrap();
        match condition {
            Condition::ImageVersion { version, op, .. } => {
                assert_eq!(version.as_deref(), Some("8.13.21"));
                assert_eq!(op, CompareOp::Eq);
            }
            other => panic!("unexpected condition {other:?}"),
        }

        // Bare value means "at least".
        let condition = parse_image_condition(Some("8.13.21"), None).unwrap();
        assert!(matches!(
            condition,
            Condition::ImageVersion { op: CompareOp::Ge, .. }
        ));

        assert!(matches!(
            parse_image_condition(Some(">=1.0"), Some("<=2.0")),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            parse_image_condition(None, None),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn checksum_condition_parsing() {
        assert!(parse_checksum_condition(DIGEST).is_ok());
        assert!(parse_checksum_condition(&format!("sha256:{DIGEST}")).is_ok());
        assert!(parse_checksum_condition("sha256:abc").is_err());
        assert!(parse_checksum_condition("md5:abcd").is_err());
    }

    #[test]
    fn checksum_need_detection() {
        assert!(!needs_checksum(&[parse_package_condition("zypper").unwrap()]));
        assert!(needs_checksum(&[parse_checksum_condition(DIGEST).unwrap()]));
    }
}
