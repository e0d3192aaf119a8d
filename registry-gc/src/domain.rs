use oci_spec::image::Digest;
use std::fmt;

/// One manifest to delete, produced by the retention policy and consumed
/// exactly once by a pipeline worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteJob {
    pub repository: String,
    pub tag: String,
    pub digest: Digest,
}

impl fmt::Display for DeleteJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.repository, self.tag, self.digest)
    }
}

/// Counters for a single orchestration run. Reported, never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Repositories whose tags were evaluated.
    pub repositories: usize,
    /// Repositories skipped because their tags could not be listed.
    pub skipped_repositories: usize,
    /// Candidates whose tag disappeared before its digest was resolved.
    pub vanished: usize,
    /// Candidates dropped because their digest could not be resolved.
    pub unresolved: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reclaimed: bool,
}
