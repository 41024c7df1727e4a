use crate::agents::crew::AgentTask;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the driver is in one analysis run. `Failed` is terminal and can be
/// reached from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Init,
    ResearchRun,
    SourceCollection,
    BulletExtraction,
    ReportingRun,
    SectionAssembly,
    QuarterlyResolution,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ResearchRun => "research run",
            Self::SourceCollection => "source collection",
            Self::BulletExtraction => "bullet extraction",
            Self::ReportingRun => "reporting run",
            Self::SectionAssembly => "section assembly",
            Self::QuarterlyResolution => "quarterly resolution",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How the quarterly payload of a run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuarterlyOrigin {
    /// Parsed from blocks embedded in agent output.
    Embedded,
    /// Fetched from the live data source.
    Live,
    /// Live data with embedded values laid over it.
    Merged,
    /// The agents said "no data yet" and nothing else was available.
    EmptyBlock,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    StageEntered { stage: PipelineStage },
    TaskCompleted { task: AgentTask, output_chars: usize },
    SourcesCollected { count: usize },
    QuarterlyResolved { origin: QuarterlyOrigin, quarters: usize },
    Failed { reason: String },
    Finished,
}
