pub mod assembler;
pub mod builder;
pub mod capabilities;
pub mod catalog;
pub mod error;
pub mod format;
pub mod graph;
pub mod input;
pub mod lockfile;
pub mod observability;
pub mod presets;
pub mod profile;
pub mod request;
pub mod selection;
pub mod state;
pub mod step;
pub mod validation;
pub mod watermark;

pub use assembler::{Assembler, CompiledPipeline};
pub use builder::PipelineBuilder;
pub use capabilities::{AccelPolicy, HardwareCapabilities};
pub use error::PipelineError;
pub use request::TranscodeRequest;
pub use state::FrameState;
