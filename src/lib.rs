// DeepCourse Core Library - Platform-agnostic conversation state.
// Layered: Util -> Stream -> Session -> Backend -> Controller

pub mod backend; // Backend boundary - chat stream, titles, session persistence
pub mod controller; // Stream controller - one request lifecycle per turn
pub mod session; // Session layer - data model, keyed store
pub mod stream; // Stream layer - frames, events, thinking, reducer
pub mod util; // Utility layer - error types

// Export main types
pub use util::errors::{ChatError, ChatResult};

pub use backend::{ChatBackend, ChatTurnRequest, HttpBackendConfig, HttpChatBackend};
pub use controller::ChatController;
pub use session::{Message, PhaseInfo, Role, Session, SessionStore, DEFAULT_SESSION_TITLE};
pub use stream::{
    classify, Applied, Classified, FrameDecoder, StreamEvent, ThinkingAccumulator, TurnReducer,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CORE_NAME: &str = "DeepCourse Core";
