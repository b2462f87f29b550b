//! Chat transcript types.

use serde::Serialize;

use crate::db::QueryResult;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry of the transcript. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Database the turn was answered against.
    pub database: String,
}

impl ChatTurn {
    /// Creates a user turn.
    pub fn user(text: impl Into<String>, database: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text, database)
    }

    /// Creates an assistant turn with no attachments.
    pub fn assistant(text: impl Into<String>, database: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text, database)
    }

    fn new(role: TurnRole, text: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            generated_sql: None,
            result: None,
            rows_affected: None,
            error_message: None,
            database: database.into(),
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.generated_sql = Some(sql.into());
        self
    }

    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = Some(rows_affected);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Returns true if this turn reports a failure.
    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Ordered transcript of a session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn to the end of the transcript.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
