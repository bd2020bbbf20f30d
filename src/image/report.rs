use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::{Error, Result};

/// Compile an fnmatch-style glob (`*` and `?` wildcards) into an anchored
/// regex.
pub(crate) fn compile_glob(pattern: &str) -> Result<Regex> {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
        .map_err(|e| Error::Configuration(format!("invalid package pattern {pattern:?}: {e}")))
}

/// Per-package details from the build service's packages report.
#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub version: String,
    pub release: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

/// Mapping from package name to its details for a resolved image.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PackageReport {
    packages: HashMap<String, PackageInfo>,
}

impl PackageReport {
    /// Parse the XML packages report.
    ///
    /// Every `<package>` element is collected regardless of nesting; the
    /// report wraps them differently across build service versions.
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Metadata {
            url: String::new(),
            reason: format!("malformed packages report: {e}"),
        })?;

        let mut packages = HashMap::new();
        for node in doc
            .descendants()
            .filter(|n| n.is_element() && n.has_tag_name("package"))
        {
            let Some(name) = node.attribute("name") else {
                continue;
            };
            packages.insert(
                name.to_string(),
                PackageInfo {
                    version: node.attribute("version").unwrap_or_default().to_string(),
                    release: node.attribute("release").unwrap_or_default().to_string(),
                    arch: node.attribute("arch").unwrap_or_default().to_string(),
                    license: node.attribute("license").map(str::to_string),
                },
            );
        }

        Ok(Self { packages })
    }

    pub fn get(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Sorted package names, for stable listings and diagnostics.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Subset of packages carrying one of the given licenses. License
    /// comparison is exact; packages without a license never match.
    pub fn with_licenses(&self, licenses: &[String]) -> Self {
        let packages = self
            .packages
            .iter()
            .filter(|(_, info)| {
                info.license
                    .as_deref()
                    .is_some_and(|license| licenses.iter().any(|l| l == license))
            })
            .map(|(name, info)| (name.clone(), info.clone()))
            .collect();
        Self { packages }
    }

    /// Subset of packages whose name matches any of the given globs.
    pub fn matching_names(&self, patterns: &[String]) -> Result<Self> {
        let mut globs = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            globs.push(compile_glob(pattern)?);
        }
        let packages = self
            .packages
            .iter()
            .filter(|(name, _)| globs.iter().any(|glob| glob.is_match(name)))
            .map(|(name, info)| (name.clone(), info.clone()))
            .collect();
        Ok(Self { packages })
    }
}

/// Build-status report for a resolved image.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl StatusReport {
    /// Placeholder used whenever the report is missing or unreadable;
    /// absent status is not an error by itself.
    pub fn unknown() -> Self {
        Self {
            code: "unknown".to_string(),
            details: None,
        }
    }

    /// Parse the XML status report (`<status code="..."><details>...`).
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| Error::Metadata {
            url: String::new(),
            reason: format!("malformed status report: {e}"),
        })?;

        let root = doc.root_element();
        let code = root
            .attribute("code")
            .or_else(|| {
                root.children()
                    .find(|n| n.has_tag_name("code"))
                    .and_then(|n| n.text())
            })
            .unwrap_or("unknown")
            .trim()
            .to_string();
        let details = root
            .children()
            .find(|n| n.has_tag_name("details"))
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self { code, details })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}
