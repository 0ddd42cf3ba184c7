//! Conversation runtime: the turn orchestrator and the scheduling layer
//! that feeds it.

pub mod batching;
pub mod compact;
pub mod extract;
pub mod idle;
pub mod reminders;
pub mod reply_chance;
pub mod session;
pub mod session_lock;
pub mod tools;
pub mod turn;

use mm_domain::ChatId;

use crate::platform::InboundEvent;

/// A timer-driven reason to consider speaking in a chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// The passive batch window closed.
    BatchFlush {
        chat_id: ChatId,
        /// Unaddressed messages collected in the window.
        count: u32,
        last_event: InboundEvent,
    },
    /// The chat has been quiet for the randomized idle delay.
    IdleWake { chat_id: ChatId },
}

impl Trigger {
    pub fn chat_id(&self) -> ChatId {
        match self {
            Trigger::BatchFlush { chat_id, .. } | Trigger::IdleWake { chat_id } => *chat_id,
        }
    }
}

/// Receives fired timers. Implemented by the chat engine.
#[async_trait::async_trait]
pub trait TriggerSink: Send + Sync {
    async fn fire(&self, trigger: Trigger);
}
