//! Conversational flows: the graph the visual editor saves, and a per-customer
//! executor that walks it.

mod error;
pub mod executor;
pub mod graph;
pub mod node;

pub use error::FlowError;
pub use executor::{Action, Conversation, ConversationStatus};
pub use graph::{Edge, FlowGraph, Node, Position, Viewport};
pub use node::{default_config, NodeKind};
