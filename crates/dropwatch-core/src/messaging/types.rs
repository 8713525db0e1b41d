use crate::domain::ChatId;

/// One entry of the messenger's update queue, reduced to what the command
/// responder needs. Non-message updates carry neither chat nor text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: i64,
    pub chat_id: Option<ChatId>,
    pub text: Option<String>,
}

/// How a single outbound message ended up being delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Text,
    Photo,
    /// The photo send failed and the caption went out as plain text.
    TextFallback { photo_error: String },
    Failed { reason: String },
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}
