pub mod common;
pub mod items;
pub mod response;
pub mod session;
pub mod tools;

pub use common::{ArbitraryJson, DEFAULT_MODEL, ItemStatus, JsonSchema, Role, Voice};
pub use items::{ContentPart, Item};
pub use response::{Response, ResponseStatus, ResponseStatusDetails};
pub use session::{
    AudioConfig, InputAudioConfig, InputAudioTranscription, OutputAudioConfig, Session,
    SessionConfig, SessionKind, SessionUpdate,
};
pub use tools::{Tool, ToolChoice};
