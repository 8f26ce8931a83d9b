pub mod error;
pub mod observability;
pub mod protocol;
pub mod request;
pub mod session;
pub mod tool;

pub use error::ChatError;
pub use protocol::{event_stream, FrameDecoder, StreamEvent};
pub use request::{ChatTurn, GenerationRequest, Role, ToolCallRef};
pub use session::{ChatEvent, ChatSession, SessionConfig};
pub use tool::{ToolCallAccumulator, ToolCallFragment, ToolError, ToolExecutor, ToolSpec};
