use serde::Serialize;

use crate::conditions::ConditionResult;
use crate::image::{PackageInfo, PackageReport};
use crate::poller::PollOutcome;

/// Output renderer selected by the caller; decouples presentation from the
/// engine's data types.
pub trait Renderer {
    fn outcome(&self, outcome: &PollOutcome) -> String;
    fn packages(&self, report: &PackageReport) -> String;
    fn package(&self, name: &str, info: &PackageInfo) -> String;
    fn results(&self, results: &[ConditionResult]) -> String;
}

pub fn renderer_for(json: bool) -> Box<dyn Renderer> {
    if json {
        Box::new(Json)
    } else {
        Box::new(PlainText)
    }
}

/// Human-readable line output.
pub struct PlainText;

impl Renderer for PlainText {
    fn outcome(&self, outcome: &PollOutcome) -> String {
        let mut out = String::new();
        match outcome {
            PollOutcome::Satisfied {
                candidate,
                results,
                packages,
                status,
            } => {
                match candidate {
                    Some(candidate) => {
                        out.push_str(&format!("image: {}\n", candidate.filename()));
                        out.push_str(&format!(
                            "version: {} release: {}\n",
                            candidate.version(),
                            candidate.release()
                        ));
                    }
                    None => out.push_str("image: not available yet\n"),
                }
                out.push_str(&format!("build status: {}\n", status.code()));
                if let Some(packages) = packages {
                    out.push_str(&format!("packages: {}\n", packages.len()));
                }
                if !results.is_empty() {
                    out.push_str(&self.results(results));
                }
            }
            PollOutcome::TimedOut { results } => {
                out.push_str("conditions not met before the wait budget expired\n");
                out.push_str(&self.results(results));
            }
        }
        out.trim_end().to_string()
    }

    fn packages(&self, report: &PackageReport) -> String {
        let mut out = String::new();
        for name in report.names() {
            if let Some(info) = report.get(name) {
                out.push_str(&package_line(name, info));
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }

    fn package(&self, name: &str, info: &PackageInfo) -> String {
        package_line(name, info)
    }

    fn results(&self, results: &[ConditionResult]) -> String {
        let mut out = String::new();
        for result in results {
            let mark = if result.passed { "ok" } else { "failed" };
            out.push_str(&format!(
                "[{mark}] {}: {}\n",
                result.condition.describe(),
                result.detail
            ));
        }
        out
    }
}

fn package_line(name: &str, info: &PackageInfo) -> String {
    format!(
        "{name} {} {} {} {}",
        info.version,
        info.release,
        info.arch,
        info.license.as_deref().unwrap_or("unknown")
    )
}

/// Machine-readable JSON output.
pub struct Json;

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

impl Renderer for Json {
    fn outcome(&self, outcome: &PollOutcome) -> String {
        to_json(outcome)
    }

    fn packages(&self, report: &PackageReport) -> String {
        to_json(report)
    }

    fn package(&self, name: &str, info: &PackageInfo) -> String {
        to_json(&serde_json::json!({ name: info }))
    }

    fn results(&self, results: &[ConditionResult]) -> String {
        to_json(&results)
    }
}
