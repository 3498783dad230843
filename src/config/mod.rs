pub mod pipeline;

pub use pipeline::PipelineConfig;
