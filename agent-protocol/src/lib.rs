//! Wire and domain types shared by every crate in the workspace: the
//! conversation `Message`, the session `Config`, the three-valued approval
//! decision, the tagged LLM response wire shapes, and the `SinkEvent`s the
//! engine emits to whichever `EventSink` is attached.
//!
//! Uses the common `#[serde(tag = "type", rename_all = "snake_case")]`
//! tagged-enum idiom throughout.

mod config;
mod message;
mod registry;
mod wire;

pub use config::ApprovalPolicy;
pub use config::Config;
pub use config::ReasoningEffort;
pub use config::ReasoningMode;
pub use config::SafeMode;
pub use message::Message;
pub use message::Role;
pub use registry::MCPServer;
pub use wire::ApprovalDecision;
pub use wire::LlmResponse;
pub use wire::PendingApproval;
pub use wire::SinkEvent;
