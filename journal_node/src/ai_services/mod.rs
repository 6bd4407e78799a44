// Journal analysis backed by an external text-generation model.
// Each user keeps a private, bounded conversation used as prompt context.

pub mod conversation;
pub mod inference_client;

pub use conversation::{extract_reply, Conversation, Message, Role};
pub use inference_client::{InferenceClient, InferenceConfig};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API key is not set")]
    MissingApiKey,
    #[error("error sending request: {0}")]
    Transport(String),
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("error decoding response: {0}")]
    Decode(String),
    #[error("failed to extract response from model")]
    EmptyReply,
}

/// Seam over the outbound model call
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Raw completion for `prompt`; may echo the prompt
    async fn generate(&self, prompt: &str) -> Result<String, AnalysisError>;
}

pub struct Analyzer {
    generator: Arc<dyn TextGenerator>,
    conversations: Mutex<HashMap<i64, Conversation>>,
    max_history: usize,
}

impl Analyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, max_history: usize) -> Self {
        Self {
            generator,
            conversations: Mutex::new(HashMap::new()),
            max_history,
        }
    }

    /// Analyze one entry in the context of the user's earlier entries.
    /// The entry stays in the history even when the model call fails.
    pub async fn analyze(&self, user_id: i64, content: &str) -> Result<String, AnalysisError> {
        let (prompt, prior_turns) = {
            let mut conversations = self.conversations.lock();
            let conversation = conversations
                .entry(user_id)
                .or_insert_with(|| Conversation::new(self.max_history));
            conversation.push_user(content);
            (conversation.render_prompt(), conversation.assistant_turns())
        };

        // Lock is released while the model call is in flight.
        let generated = self.generator.generate(&prompt).await?;
        let reply = extract_reply(&prompt, &generated, prior_turns).ok_or(AnalysisError::EmptyReply)?;

        if let Some(conversation) = self.conversations.lock().get_mut(&user_id) {
            conversation.push_assistant(&reply);
        }
        debug!("Analysis for user {} ready ({} chars)", user_id, reply.len());

        Ok(reply)
    }

    pub fn history_len(&self, user_id: i64) -> usize {
        self.conversations
            .lock()
            .get(&user_id)
            .map(Conversation::len)
            .unwrap_or(0)
    }

    pub fn forget(&self, user_id: i64) {
        self.conversations.lock().remove(&user_id);
    }
}
