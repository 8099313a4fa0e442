use crate::domain::ReleaseTag;
use crate::error::Result;
use crate::git::Repository;
use crate::pipeline::BuildPipeline;
use crate::selector;
use log::info;

/// The result of building one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub tag: ReleaseTag,
}

/// Aggregate result of one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<BuildOutcome>,
}

impl RunSummary {
    pub fn built_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Select every tag that still needs building and build each in order
///
/// Fails fast: the first error from the pipeline aborts the run without
/// attempting the remaining tags, and the caller terminates the process.
/// There is no partial-success mode; the operator inspects, fixes, and
/// re-runs, relying on selection-time skipping of already-tagged versions.
pub fn run(
    source: &dyn Repository,
    package: &dyn Repository,
    pipeline: &BuildPipeline<'_>,
) -> Result<RunSummary> {
    let tags = selector::select_tags_to_build(source, package)?;

    let mut summary = RunSummary::default();
    for tag in tags {
        info!("Building version {}", tag.name);
        pipeline.build(&tag)?;
        summary.outcomes.push(BuildOutcome { tag });
    }

    if summary.is_empty() {
        info!("No new tags to be built!");
    } else {
        info!("Built {} tags successfully.", summary.built_count());
    }

    Ok(summary)
}
