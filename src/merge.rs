use indexmap::IndexMap;
use log::{info, warn};

use crate::models::{BuildRecord, CommitId};

/// Collects builds from any number of sources, keeping the first build seen
/// for each commit.
///
/// Output order is first-seen order across all inputs. Builds without a
/// `commit_id` cannot be keyed and are skipped.
#[derive(Debug, Default)]
pub struct BuildMerger {
    builds: IndexMap<CommitId, BuildRecord>,
    duplicates: usize,
    skipped: usize,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub builds: Vec<BuildRecord>,
    pub duplicates: usize,
    pub skipped: usize,
}

impl BuildMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the build was kept.
    pub fn push(&mut self, build: BuildRecord) -> bool {
        let Some(commit_id) = build.commit_id.clone() else {
            warn!("Skipping build #{} without commit_id", build.number);
            self.skipped += 1;
            return false;
        };

        if self.builds.contains_key(&commit_id) {
            self.duplicates += 1;
            return false;
        }

        self.builds.insert(commit_id, build);
        true
    }

    pub fn extend<I>(&mut self, builds: I)
    where
        I: IntoIterator<Item = BuildRecord>,
    {
        for build in builds {
            self.push(build);
        }
    }

    pub fn finish(self) -> MergeOutcome {
        MergeOutcome {
            builds: self.builds.into_values().collect(),
            duplicates: self.duplicates,
            skipped: self.skipped,
        }
    }
}

impl MergeOutcome {
    pub fn log_summary(&self) {
        info!(
            "Merged {} unique builds ({} duplicates dropped)",
            self.builds.len(),
            self.duplicates
        );
        if self.skipped > 0 {
            warn!("{} builds had no commit_id and were skipped", self.skipped);
        }
    }
}

/// Merge several build collections in the order given.
pub fn merge_builds<I, S>(sources: I) -> MergeOutcome
where
    I: IntoIterator<Item = S>,
    S: IntoIterator<Item = BuildRecord>,
{
    let mut merger = BuildMerger::new();
    for source in sources {
        merger.extend(source);
    }
    let outcome = merger.finish();
    outcome.log_summary();
    outcome
}
