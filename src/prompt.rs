use crate::assembler::CallPathContext;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "You are an algorithms assistant analyzing time complexity. \
Highlight the final complexity result by putting it in <complexity></complexity> tags \
Optional reasoning in <think>...</think> at START only, keep it brief. \
\n\
Analyze worst-case time complexity (not average or best case).\n\
The function at the end of the callpath is the primary analysis target.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// `['a', 'b']` style list, as the reasoning model has been prompted with so far.
fn format_name_list(names: &[String]) -> String {
    let quoted: Vec<String> = names
        .iter()
        .map(|n| format!("'{}'", n.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

pub fn user_prompt(call_path: &str, source: &str, excluded: &[String]) -> String {
    format!(
        "Given the following source code snippets corresponding to the call path: {call_path}\n\
         \n\
         {source}\
         \n\
         What is the complexity of calling this callpath depending on the problem size n and number of ranks p? \
         Can you highlight the final complexity result by putting it in <complexity></complexity> tags. \
         Assume the following callpaths are constant while answering that:{}",
        format_name_list(excluded)
    )
}

/// System instruction plus one user message for `ctx`.
pub fn build_messages(ctx: &CallPathContext) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(&ctx.call_path, &ctx.text, &ctx.excluded_names())),
    ]
}
