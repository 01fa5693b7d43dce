mod state;
mod store;

pub use state::{AgentSession, ConversationTurn};
pub use store::{SessionStore, SharedSession, lock};
