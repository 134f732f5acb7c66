pub mod dataset;
pub mod pipeline;
pub mod prompts;
pub mod service;
pub mod stages;
pub mod types;

pub use dataset::DatasetKind;
pub use pipeline::GenerationPipeline;
pub use service::{GenerationOptions, GenerationService, OpenAiGenerationService};
pub use stages::StageTuning;
