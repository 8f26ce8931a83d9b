pub mod accumulator;
pub mod args;
pub mod executor;
pub mod registry;

pub use accumulator::{ToolCallAccumulator, ToolCallFragment};
pub use args::ensure_json_string;
pub use executor::ToolExecutor;
pub use registry::{ToolError, ToolSpec};
