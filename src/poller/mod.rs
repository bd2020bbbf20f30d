use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::conditions::{self, Condition, ConditionResult, CycleMetadata};
use crate::errors::{Error, Result};
use crate::image::{CandidateFile, ChecksumKind, ImageSpec, PackageReport, StatusReport};
use crate::remote::{ListingClient, MetadataFetcher};
use crate::resolver;

/// Terminal value of a poll session.
///
/// A session that fails outright (unusable listing, malformed
/// configuration, transport failure) surfaces as an `Err` from
/// [`ConditionPoller::run`] instead of a variant here.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Every declared condition passed, or none were declared. The
    /// candidate is absent only when nothing matched the pattern yet and no
    /// conditions gate the image.
    Satisfied {
        candidate: Option<CandidateFile>,
        results: Vec<ConditionResult>,
        packages: Option<PackageReport>,
        status: StatusReport,
    },
    /// The wait budget ran out; carries the last observed results for
    /// diagnostics.
    TimedOut { results: Vec<ConditionResult> },
}

/// One resolve→fetch→evaluate pass. Everything in here is rebuilt each
/// cycle; nothing carries over to the next one.
struct Cycle {
    candidate: Option<CandidateFile>,
    results: Vec<ConditionResult>,
    packages: Option<PackageReport>,
    status: StatusReport,
}

impl Cycle {
    fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

/// Decision taken after one WAITING cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Satisfied,
    Retry,
    TimedOut,
}

fn next_transition(all_passed: bool, now: Instant, deadline: Instant) -> Transition {
    if all_passed {
        Transition::Satisfied
    } else if now >= deadline {
        Transition::TimedOut
    } else {
        Transition::Retry
    }
}

/// Drives repeated resolve→fetch→evaluate cycles until every condition
/// passes or the wait budget is exhausted.
///
/// Restartable per invocation: `run` keeps no state across calls, and a
/// cycle in flight always completes before the deadline check.
pub struct ConditionPoller<'a> {
    listing: &'a ListingClient,
    metadata: &'a MetadataFetcher,
    spec: &'a ImageSpec,
    conditions: &'a [Condition],
    budget: Duration,
    interval: Duration,
}

impl<'a> ConditionPoller<'a> {
    pub fn new(
        listing: &'a ListingClient,
        metadata: &'a MetadataFetcher,
        spec: &'a ImageSpec,
        conditions: &'a [Condition],
        budget: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            listing,
            metadata,
            spec,
            conditions,
            budget,
            interval,
        }
    }

    /// Run the poll session to a terminal state.
    ///
    /// Configuration is validated up front so a malformed template or
    /// checksum extension never enters the wait loop.
    pub async fn run(&self) -> Result<PollOutcome> {
        resolver::compile_pattern(self.spec)?;
        for extension in self.spec.checksum_extensions() {
            extension.parse::<ChecksumKind>()?;
        }

        let start = Instant::now();
        let deadline = start + self.budget;
        let mut last_results: Vec<ConditionResult> = Vec::new();

        loop {
            match self.run_cycle().await {
                Ok(cycle) => {
                    for failed in cycle.results.iter().filter(|r| !r.passed) {
                        info!(
                            condition = %failed.condition.describe(),
                            detail = %failed.detail,
                            "condition not met"
                        );
                    }
                    match next_transition(cycle.all_passed(), Instant::now(), deadline) {
                        Transition::Satisfied => {
                            return Ok(PollOutcome::Satisfied {
                                candidate: cycle.candidate,
                                results: cycle.results,
                                packages: cycle.packages,
                                status: cycle.status,
                            });
                        }
                        Transition::TimedOut => {
                            return Ok(PollOutcome::TimedOut {
                                results: cycle.results,
                            });
                        }
                        Transition::Retry => last_results = cycle.results,
                    }
                }
                // "Not found yet" is expected transient state while the
                // deadline holds; the listing may change between cycles.
                Err(Error::NotFound { pattern }) => {
                    match next_transition(false, Instant::now(), deadline) {
                        Transition::TimedOut => {
                            return Ok(PollOutcome::TimedOut {
                                results: last_results,
                            });
                        }
                        _ => warn!(%pattern, "image not published yet"),
                    }
                }
                Err(err) => return Err(err),
            }

            debug!(interval_secs = self.interval.as_secs(), "waiting for next poll cycle");
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn run_cycle(&self) -> Result<Cycle> {
        let names = self.listing.list().await?;
        let candidate = match resolver::resolve(&names, self.spec) {
            Ok(candidate) => candidate,
            // With nothing to gate on, a missing image is tolerated the
            // same way missing metadata is.
            Err(Error::NotFound { .. }) if self.conditions.is_empty() => {
                return Ok(Cycle {
                    candidate: None,
                    results: Vec::new(),
                    packages: None,
                    status: StatusReport::unknown(),
                });
            }
            Err(err) => return Err(err),
        };
        debug!(
            filename = candidate.filename(),
            version = candidate.version(),
            release = candidate.release(),
            "resolved candidate"
        );

        let packages = match self.metadata.fetch_packages(&candidate).await {
            Ok(report) => Some(report),
            Err(err) => {
                debug!(%err, "packages report unavailable");
                None
            }
        };

        let checksum = if conditions::needs_checksum(self.conditions) {
            match self
                .metadata
                .fetch_checksum(&candidate, self.spec.checksum_extensions())
                .await
            {
                Ok(artifact) => Some(artifact.record),
                Err(err) => {
                    debug!(%err, "checksum artifact unavailable");
                    None
                }
            }
        } else {
            None
        };

        let status = match self.metadata.fetch_status(&candidate).await {
            Ok(status) => status,
            Err(err) => {
                debug!(%err, "build-status report unavailable");
                StatusReport::unknown()
            }
        };

        let metadata = CycleMetadata { packages, checksum };
        let results = conditions::evaluate(self.conditions, &candidate, &metadata);

        Ok(Cycle {
            candidate: Some(candidate),
            results,
            packages: metadata.packages,
            status,
        })
    }
}
