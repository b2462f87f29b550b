//! Prompt construction for SQL generation.
//!
//! Builds the two-message request: a system prompt carrying the fixed
//! MySQL instruction and the grounding schema, and a user message carrying
//! the question.

use crate::llm::types::Message;
use crate::schema::SchemaSummary;

/// System prompt template for the MySQL query generator.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a MySQL query generator. You will generate a MySQL query based on the user's request.

DATABASE SCHEMA:
{schema}

INSTRUCTIONS:
- Generate exactly one MySQL statement that can be executed directly
- Use only the tables and columns listed in the schema
- End the statement with a semicolon
- Do not include any explanations, comments or surrounding text
- Do not wrap the statement in code blocks or any other formatting

OUTPUT FORMAT:
Only the query itself and nothing else."#;

/// Builds the system prompt with the schema summary injected.
pub fn build_system_prompt(summary: &SchemaSummary) -> String {
    SYSTEM_PROMPT_TEMPLATE.replace("{schema}", summary.format_for_llm().trim_end())
}

/// Builds the user message for a natural-language request.
pub fn build_user_prompt(request: &str) -> String {
    format!("Generate a MySQL query based on the following prompt: {request}")
}

/// Builds the complete message list for a generation request.
pub fn build_messages(summary: &SchemaSummary, request: &str) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(summary)),
        Message::user(build_user_prompt(request)),
    ]
}
