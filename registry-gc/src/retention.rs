//! Keep-the-newest-N tag retention.
//!
//! Tags are ranked newest first by a single comparator: when both tags of a
//! comparison are strict SemVer they are ordered by version precedence,
//! otherwise by their raw bytes. The fallback is decided per comparison, so a
//! repository may freely mix release tags with names like `latest`.

use crate::domain::DeleteJob;
use crate::error::RegistryError;
use crate::registry::Registry;
use semver::Version;
use std::cmp::Ordering;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct RankedTag {
    name: String,
    version: Option<Version>,
}

impl RankedTag {
    fn new(name: String) -> Self {
        let version = Version::parse(&name).ok();
        Self { name, version }
    }
}

/// `Less` means `a` is newer than `b` and ranks before it.
fn compare(a: &RankedTag, b: &RankedTag) -> Ordering {
    match (&a.version, &b.version) {
        (Some(va), Some(vb)) => precedence(vb, va),
        _ => b.name.as_bytes().cmp(a.name.as_bytes()),
    }
}

// Build metadata does not take part in precedence.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Orders two tag names newest first. See the module docs for the rules.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    compare(&RankedTag::new(a.to_string()), &RankedTag::new(b.to_string()))
}

/// Returns `tags` ranked newest first.
pub fn rank_tags(tags: Vec<String>) -> Vec<String> {
    let ranked = tags.into_iter().map(RankedTag::new).collect();
    merge_sort(ranked, &compare)
        .into_iter()
        .map(|tag| tag.name)
        .collect()
}

/// Stable merge sort that terminates for any comparator.
///
/// Mixing SemVer and byte-wise comparisons is not transitive for every tag
/// set (`1.10.0 > 1.9.0 > 1.2x > 1.10.0`), and `slice::sort_by` may panic on
/// such orders.
fn merge_sort<T>(mut items: Vec<T>, cmp: &impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    if items.len() <= 1 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, cmp);
    let right = merge_sort(right, cmp);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => cmp(r, l) == Ordering::Less,
            _ => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    merged
}

/// What the policy did for a single repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoReport {
    pub candidates: usize,
    pub emitted: usize,
    pub vanished: usize,
    pub unresolved: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep: usize,
}

impl RetentionPolicy {
    /// `keep == 0` disables pruning.
    pub fn new(keep: usize) -> Self {
        Self { keep }
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    pub fn is_disabled(&self) -> bool {
        self.keep == 0
    }

    /// Tags ranked beyond the newest `keep`, in rank order.
    pub fn candidates(&self, tags: Vec<String>) -> Vec<String> {
        if self.is_disabled() || tags.len() <= self.keep {
            return Vec::new();
        }
        let mut ranked = rank_tags(tags);
        ranked.split_off(self.keep)
    }

    /// Evaluates `repo` and pushes a [`DeleteJob`] for each candidate as soon
    /// as its digest is resolved.
    ///
    /// A candidate whose tag has already disappeared is dropped; other
    /// resolution failures are logged and dropped. Only tag listing failures
    /// and cancellation are returned as errors.
    pub async fn emit_jobs(
        &self,
        registry: &dyn Registry,
        repo: &str,
        jobs: &mpsc::Sender<DeleteJob>,
        cancel: &CancellationToken,
    ) -> Result<RepoReport, RegistryError> {
        let mut report = RepoReport::default();
        if self.is_disabled() {
            return Ok(report);
        }

        let tags = registry.list_tags(repo, cancel).await?;
        let total = tags.len();
        let candidates = self.candidates(tags);
        report.candidates = candidates.len();
        debug!(repo, total, candidates = report.candidates, "evaluated tags");

        for tag in candidates {
            let digest = match registry.resolve_digest(repo, &tag, cancel).await {
                Ok(digest) => digest,
                Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled),
                Err(e) if e.is_not_found() => {
                    debug!(repo, tag = %tag, "tag already gone");
                    report.vanished += 1;
                    continue;
                }
                Err(e) => {
                    warn!(repo, tag = %tag, "digest: {e}");
                    report.unresolved += 1;
                    continue;
                }
            };

            let job = DeleteJob {
                repository: repo.to_string(),
                tag,
                digest,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RegistryError::Cancelled),
                sent = jobs.send(job) => {
                    if sent.is_err() {
                        return Err(RegistryError::Cancelled);
                    }
                }
            }
            report.emitted += 1;
        }
        Ok(report)
    }
}
