// chat.rs - Chat Command Module
// Implements /chat: a conversation with an Ollama model that remembers earlier turns.
//
// Key Features:
// - Sends the caller's history plus the new prompt to /api/chat
// - Optional streaming with incremental message edits
// - System prompt from the model and/or the configuration
// - Saves the user/assistant turn once a non-empty reply has been delivered
//
// Used by: commands/mod.rs (registration and dispatch)

use serenity::{
    builder::CreateApplicationCommand,
    client::Context,
    model::application::{
        command::CommandOptionType,
        interaction::application_command::ApplicationCommandInteraction,
    },
};

use super::{bool_option, defer, model_option, relay_generation, report_failure, required_string, system_prompt, GENERATION_FAILED};
use crate::error::{BotError, BotResult};
use crate::history::ChatMessage;
use crate::service::{ChatRequest, ChatResponse, ModelEntry, Provider, OLLAMA_CHAT};
use crate::AppState;

pub fn register<'a>(command: &'a mut CreateApplicationCommand, models: &[ModelEntry]) -> &'a mut CreateApplicationCommand {
    command
        .name("chat")
        .description("Chat with Ollama")
        .create_option(|option| {
            option
                .name("prompt")
                .description("Prompt to chat with Ollama")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| model_option(option, models, Provider::Ollama, true))
        .create_option(|option| {
            option
                .name("stream")
                .description("(Experimental) Stream response")
                .kind(CommandOptionType::Boolean)
                .required(false)
        })
}

/// Message list for one request: system prompt, earlier turns, then the new prompt
pub fn build_messages(system: Option<String>, history: Vec<ChatMessage>, prompt: &str) -> Vec<ChatMessage> {
    system
        .map(ChatMessage::system)
        .into_iter()
        .chain(history)
        .chain(std::iter::once(ChatMessage::user(prompt)))
        .collect()
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    let options = &interaction.data.options;
    let user_id = interaction.user.id;

    let prompt = required_string(options, "prompt")?;
    let model = required_string(options, "model")?;
    let stream = bool_option(options, "stream").unwrap_or(false);

    defer(ctx, interaction).await?;

    if state.config.ollama_url.is_none() {
        report_failure(ctx, interaction, &BotError::MissingServer(Provider::Ollama.display_name()), GENERATION_FAILED, false).await;
        return Ok(());
    }

    let system = system_prompt(state, &model).await;
    let history = state.history.get_user_history(user_id).await;
    let messages = build_messages(system, history, &prompt);

    log::debug!(
        "[CHAT] Sending chat request with {} messages for user {}",
        messages.len(),
        user_id
    );

    let request = ChatRequest { model, messages, stream };
    let reply = relay_generation::<ChatResponse, _>(ctx, interaction, state, OLLAMA_CHAT, &request, stream).await;

    match reply {
        Some(reply) if !reply.trim().is_empty() => {
            state
                .history
                .add_messages(user_id, vec![ChatMessage::user(prompt), ChatMessage::assistant(reply)])
                .await;
        }
        Some(_) => log::warn!("[CHAT] Empty reply for user {}, history not updated", user_id),
        None => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[test]
    fn test_build_messages_order() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let messages = build_messages(Some("be brief".into()), history, "next");

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[3].content, "next");
    }

    #[test]
    fn test_build_messages_without_system() {
        let messages = build_messages(None, Vec::new(), "only");
        assert_eq!(messages, vec![ChatMessage::user("only")]);
    }

    #[test]
    fn test_chat_request_serializes_history() {
        let request = ChatRequest {
            model: "llama3".into(),
            messages: build_messages(None, vec![ChatMessage::assistant("a")], "q"),
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "assistant");
        assert_eq!(json["messages"][1]["content"], "q");
        assert_eq!(json["stream"], true);
    }
}
