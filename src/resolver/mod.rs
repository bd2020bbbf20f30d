use regex::Regex;

use crate::errors::{Error, Result};
use crate::image::{CandidateFile, ImageSpec};

/// Grammar for one version token: digits and dots, multi-digit components
/// allowed.
const TOKEN_BODY: &str = r"\d+(?:\.\d+)*";

/// Compile the spec into the filename-matching regex.
///
/// The pattern anchors on the base name, the architecture token when one is
/// declared, and the version-format template. Placeholders (`{name}`)
/// become named capture groups so groups in a caller-supplied base name
/// cannot displace the version tokens; literal template text is escaped.
/// The base name is inserted as written so callers may embed their own
/// pattern syntax.
pub(crate) fn compile_pattern(spec: &ImageSpec) -> Result<Regex> {
    let mut pattern = String::from("^");
    pattern.push_str(spec.base_name());
    if let Some(arch) = spec.arch() {
        pattern.push_str(r"\.");
        pattern.push_str(&regex::escape(arch));
    }
    pattern.push('-');
    pattern.push_str(&template_to_regex(&spec.effective_version_format())?);
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|e| Error::Configuration(format!("invalid image pattern {pattern:?}: {e}")))
}

fn template_to_regex(template: &str) -> Result<String> {
    let mut out = String::new();
    let mut rest = template;
    let mut placeholders = 0;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            return Err(Error::Configuration(format!(
                "unclosed placeholder in version format {template:?}"
            )));
        };
        if rest[open + 1..open + close].contains('{') {
            return Err(Error::Configuration(format!(
                "unclosed placeholder in version format {template:?}"
            )));
        }
        out.push_str(&regex::escape(&rest[..open]));
        match placeholders {
            0 => out.push_str(&format!("(?P<img_version>{TOKEN_BODY})")),
            1 => out.push_str(&format!("(?P<img_release>{TOKEN_BODY})")),
            _ => out.push_str(&format!("(?:{TOKEN_BODY})")),
        }
        placeholders += 1;
        rest = &rest[open + close + 1..];
    }
    out.push_str(&regex::escape(rest));

    if placeholders == 0 {
        return Err(Error::Configuration(format!(
            "version format {template:?} contains no placeholders"
        )));
    }
    Ok(out)
}

/// Match a single listing entry against the compiled pattern.
///
/// The first extension (in priority order) that strips cleanly and leaves a
/// matching stem wins. The first placeholder token is the version, the
/// second the release; single-placeholder templates get release `0`.
fn parse_entry(name: &str, pattern: &Regex, extensions: &[String]) -> Option<(usize, CandidateFile)> {
    for (priority, extension) in extensions.iter().enumerate() {
        let Some(stem) = name
            .strip_suffix(extension.as_str())
            .and_then(|s| s.strip_suffix('.'))
        else {
            continue;
        };
        let Some(caps) = pattern.captures(stem) else {
            continue;
        };
        let version = caps
            .name("img_version")
            .map(|m| m.as_str())
            .unwrap_or("0")
            .to_string();
        let release = caps
            .name("img_release")
            .map(|m| m.as_str())
            .unwrap_or("0")
            .to_string();
        return Some((
            priority,
            CandidateFile::new(name.to_string(), stem, version, release, extension.clone()),
        ));
    }
    None
}

/// Select the single best-matching candidate from a listing snapshot.
///
/// Entries that match the base name but fail version-token extraction are
/// silently excluded. With no explicit version/release pinned, the highest
/// (version, release) pair wins; ties on both fall back to the extension
/// priority order. An empty candidate set is [`Error::NotFound`], distinct
/// from any network failure.
pub fn resolve(listing: &[String], spec: &ImageSpec) -> Result<CandidateFile> {
    let pattern = compile_pattern(spec)?;

    let mut candidates: Vec<(usize, CandidateFile)> = listing
        .iter()
        .filter_map(|name| parse_entry(name, &pattern, spec.extensions()))
        .collect();

    if let Some(version) = spec.explicit_version() {
        candidates.retain(|(_, c)| c.version() == version);
    }
    if let Some(release) = spec.explicit_release() {
        candidates.retain(|(_, c)| c.release() == release);
    }

    candidates
        .into_iter()
        .max_by(|(pa, a), (pb, b)| {
            a.version_key()
                .cmp(&b.version_key())
                // Lower priority index is the preferred extension.
                .then_with(|| pb.cmp(pa))
        })
        .map(|(_, candidate)| candidate)
        .ok_or_else(|| Error::NotFound {
            pattern: pattern.as_str().to_string(),
        })
}
