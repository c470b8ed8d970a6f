//! Pipeline configuration: YAML parsing, env substitution, validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{load_pipeline_config, parse_pipeline_config};
pub use types::{
    DestinationConfig, PipelineConfig, ResourceConfig, SourceConfig, StateConfig,
    TransformConfig,
};
pub use validator::validate_config;
