//! Agent collaborators and the pipeline that sequences them.

pub mod crew;
pub mod driver;
pub mod events;
mod prompts;
pub mod search;

pub use crew::{embedded_block_instructions, AgentTask, CrewRunner, FinancialDataSource, TaskContext, TaskRequest};
pub use driver::{AnalysisOutcome, CompanyAnalyzer};
pub use events::{PipelineEvent, PipelineStage, QuarterlyOrigin};
pub use search::{FallbackSearch, SearchProvider, SEARCH_FAILED_MESSAGE};
