use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::Message;

/// Conversation state for one session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    /// Unique session identifier
    pub id: String,

    /// When the session was created
    pub start_time: DateTime<Utc>,

    /// Last time a task touched the session
    pub last_activity: DateTime<Utc>,

    /// Project root the session was opened against
    pub working_dir: PathBuf,

    /// User and assistant turns sent to the model, in order
    pub history: Vec<Message>,

    /// Structured record of continued conversations
    pub turns: Vec<ConversationTurn>,

    /// Free-form host data
    pub context: HashMap<String, Value>,
}

impl AgentSession {
    pub fn new(id: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            start_time: now,
            last_activity: now,
            working_dir: working_dir.into(),
            history: Vec::new(),
            turns: Vec::new(),
            context: HashMap::new(),
        }
    }

    /// Mark the session as active now
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Append a message to the history
    pub fn add_message(&mut self, message: Message) {
        self.history.push(message);
        self.touch();
    }

    pub fn record_turn(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
        self.touch();
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Whether the session has been idle longer than `max_age` at `now`
    pub fn is_idle(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_activity > max_age
    }
}

/// One exchange of a continued conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    pub agent_response: String,
    /// Always empty; tool activity is reported through the task's messages
    pub tool_results: Vec<Value>,
}

impl ConversationTurn {
    pub fn new(user_message: impl Into<String>, agent_response: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_message: user_message.into(),
            agent_response: agent_response.into(),
            tool_results: Vec::new(),
        }
    }
}
