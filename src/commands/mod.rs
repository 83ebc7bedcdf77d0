// commands/mod.rs - Slash Command Registry
// Declares every slash command module, registers them with Discord and routes
// interactions to the matching handler.
//
// Key Features:
// - Global command registration with model choices fetched from the backends
// - Channel allow-list check before dispatch (except /channels)
// - Option accessors shared by the command handlers
// - Uniform failure reporting for deferred replies
//
// Used by: main.rs (ready and interaction_create)

pub mod channels;       // Allowed channel listing
pub mod chat;           // Conversational chat with per-user history
pub mod clear_history;  // Per-user history reset
pub mod generate;       // One-shot generation with attachments
pub mod help;           // Command overview
pub mod models;         // Backend model listing
pub mod ping;           // Response time check
pub mod system_message; // Configured system prompt viewer
pub mod text2img;       // Stable Diffusion image generation

use serenity::{
    builder::CreateApplicationCommandOption,
    client::Context,
    http::Http,
    model::application::{
        command::{Command, CommandOptionType},
        interaction::{
            application_command::{ApplicationCommandInteraction, CommandDataOption, CommandDataOptionValue},
            InteractionResponseType,
        },
    },
    model::channel::Attachment,
};

use serde::Serialize;

use crate::config::MAX_COMMAND_CHOICES;
use crate::error::{BotError, BotResult};
use crate::relay::batch::EMPTY_RESPONSE_NOTICE;
use crate::relay::{reply_split_message, FlushConfig, InteractionSink, Reassembler, StreamChunk};
use crate::service::{ModelEntry, Provider};
use crate::utils::parse_env_string;
use crate::AppState;

// ============================================================================
// REGISTRATION
// ============================================================================

/// Register every command globally. Model lists are fetched once so the model
/// options can offer choices.
pub async fn register_commands(http: &Http, state: &AppState) -> BotResult<usize> {
    let config = &state.config;
    let ollama_models = state
        .service
        .get_models(config.ollama_url.as_deref(), Provider::Ollama)
        .await
        .unwrap_or_default();
    let sd_models = state
        .service
        .get_models(config.stable_diffusion_url.as_deref(), Provider::StableDiffusion)
        .await
        .unwrap_or_default();

    let commands = Command::set_global_application_commands(http, |commands| {
        commands
            .create_application_command(|command| chat::register(command, &ollama_models))
            .create_application_command(|command| generate::register(command, &ollama_models, config.max_attachments))
            .create_application_command(|command| text2img::register(command, &sd_models))
            .create_application_command(models::register)
            .create_application_command(channels::register)
            .create_application_command(clear_history::register)
            .create_application_command(system_message::register)
            .create_application_command(ping::register)
            .create_application_command(help::register)
    })
    .await?;

    Ok(commands.len())
}

/// Build the `model` option: fixed choices when Discord's choice cap allows it,
/// free text otherwise
pub fn model_option<'a>(
    option: &'a mut CreateApplicationCommandOption,
    models: &[ModelEntry],
    provider: Provider,
    required: bool,
) -> &'a mut CreateApplicationCommandOption {
    option
        .name("model")
        .kind(CommandOptionType::String)
        .required(required);

    if models.len() > MAX_COMMAND_CHOICES {
        log::warn!(
            "[COMMANDS] Found {} {} models, which exceeds Discord's limit of {} choices. Using text input instead.",
            models.len(),
            provider.display_name(),
            MAX_COMMAND_CHOICES
        );
        option.description(format!(
            "Model to use (use /models {} to see available models)",
            provider.option_value()
        ));
    } else {
        option.description("Model to use");
        for model in models {
            option.add_string_choice(&model.name, &model.value);
        }
    }

    option
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Route an application command to its handler
pub async fn handle_command(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    let command_name = interaction.data.name.as_str();

    if command_name != "channels" && !state.config.is_channel_allowed(&interaction.channel_id.to_string()) {
        log::info!(
            "[COMMANDS] Refusing /{} from {} in channel {}",
            command_name,
            interaction.user.name,
            interaction.channel_id
        );
        return respond_ephemeral(ctx, interaction, "This command is not available in this channel.").await;
    }

    log::info!("[COMMANDS] /{} from {} ({})", command_name, interaction.user.name, interaction.user.id);

    match command_name {
        "chat" => chat::run(ctx, interaction, state).await,
        "generate" => generate::run(ctx, interaction, state).await,
        "text2img" => text2img::run(ctx, interaction, state).await,
        "models" => models::run(ctx, interaction, state).await,
        "channels" => channels::run(ctx, interaction, state).await,
        "clearhistory" => clear_history::run(ctx, interaction, state).await,
        "systemmessage" => system_message::run(ctx, interaction, state).await,
        "ping" => ping::run(ctx, interaction).await,
        "help" => help::run(ctx, interaction).await,
        _ => {
            log::warn!("[COMMANDS] Unknown slash command: {}", command_name);
            respond_ephemeral(ctx, interaction, &format!("Unknown slash command: {}", command_name)).await
        }
    }
}

// ============================================================================
// RESPONSE HELPERS
// ============================================================================

pub async fn defer(ctx: &Context, interaction: &ApplicationCommandInteraction) -> BotResult<()> {
    interaction
        .create_interaction_response(&ctx.http, |response| {
            response.kind(InteractionResponseType::DeferredChannelMessageWithSource)
        })
        .await?;
    Ok(())
}

pub async fn respond_ephemeral(ctx: &Context, interaction: &ApplicationCommandInteraction, content: &str) -> BotResult<()> {
    interaction
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(content).ephemeral(true))
        })
        .await?;
    Ok(())
}

pub async fn edit_reply(ctx: &Context, interaction: &ApplicationCommandInteraction, content: &str) -> BotResult<()> {
    interaction
        .edit_original_interaction_response(&ctx.http, |response| response.content(content))
        .await?;
    Ok(())
}

/// Message shown in place of a deferred reply after `error`
pub fn failure_message(error: &BotError, generic: &str) -> String {
    if error.is_configuration() {
        error.to_string()
    } else {
        generic.to_string()
    }
}

/// Report a failed command on its deferred reply. Skipped when output is already
/// visible, so partial answers stay in place.
pub async fn report_failure(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    error: &BotError,
    generic: &str,
    has_output: bool,
) {
    log::error!("[COMMANDS] /{} failed: {}", interaction.data.name, error);
    if has_output {
        return;
    }
    if let Err(e) = edit_reply(ctx, interaction, &failure_message(error, generic)).await {
        log::error!("[COMMANDS] Failed to report error for /{}: {}", interaction.data.name, e);
    }
}

// ============================================================================
// TEXT GENERATION HELPERS
// ============================================================================

pub const GENERATION_FAILED: &str = "Failed to generate response";

/// System prompt for a request: the model's own prompt first (USE_MODEL_SYSTEM),
/// then the configured one (USE_SYSTEM)
pub async fn system_prompt(state: &AppState, model: &str) -> Option<String> {
    let config = &state.config;

    let model_system = if config.use_model_system {
        state
            .service
            .get_model_info(config.ollama_url.as_deref(), model)
            .await
            .and_then(|info| info.system)
            .and_then(|system| parse_env_string(Some(system.as_str())))
    } else {
        None
    };
    let configured = if config.use_system { config.rendered_system_prompt() } else { None };

    join_system_prompts(model_system, configured)
}

pub fn join_system_prompts(model_system: Option<String>, configured: Option<String>) -> Option<String> {
    let prompts: Vec<String> = [model_system, configured]
        .into_iter()
        .flatten()
        .filter(|prompt| !prompt.trim().is_empty())
        .collect();
    if prompts.is_empty() {
        None
    } else {
        Some(prompts.join("\n"))
    }
}

/// Send a generation request to Ollama and write the answer into the deferred
/// reply, streamed or in one piece. Returns the generated text on success; failures
/// are reported on the reply and logged.
pub async fn relay_generation<C, B>(
    ctx: &Context,
    interaction: &ApplicationCommandInteraction,
    state: &AppState,
    endpoint: &str,
    body: &B,
    stream: bool,
) -> Option<String>
where
    C: StreamChunk + Send,
    B: Serialize + Sync,
{
    let config = &state.config;
    let server = config.ollama_url.as_deref();

    if !stream {
        let sink = InteractionSink::new(ctx, interaction);
        let result = async {
            let response: C = state.service.post_json(server, endpoint, Provider::Ollama, body).await?;
            let text = response.into_text().unwrap_or_default();
            reply_split_message(&sink, &text, config.max_message_length).await?;
            Ok::<_, BotError>(text)
        }
        .await;

        return match result {
            Ok(text) => Some(text),
            Err(e) => {
                report_failure(ctx, interaction, &e, GENERATION_FAILED, false).await;
                None
            }
        };
    }

    let reassembler = Reassembler::<C, _>::new(
        InteractionSink::new(ctx, interaction),
        FlushConfig {
            max_message_length: config.max_message_length,
            chunk_size: config.message_chunk_size,
        },
    );
    let result = async {
        let body_stream = state.service.post_stream(server, endpoint, Provider::Ollama, body).await?;
        let outcome = reassembler.relay(body_stream).await?;
        if !reassembler.has_output() {
            edit_reply(ctx, interaction, EMPTY_RESPONSE_NOTICE).await?;
        }
        Ok::<_, BotError>(outcome)
    }
    .await;

    match result {
        Ok(outcome) => {
            log::info!(
                "[COMMANDS] Streamed {} chars into {} message(s) with {} write(s)",
                outcome.text.chars().count(),
                outcome.messages,
                outcome.writes
            );
            if outcome.parse_errors > 0 {
                log::warn!("[COMMANDS] Skipped {} malformed stream fragment(s)", outcome.parse_errors);
            }
            Some(outcome.text)
        }
        Err(e) => {
            report_failure(ctx, interaction, &e, GENERATION_FAILED, reassembler.has_output()).await;
            None
        }
    }
}

// ============================================================================
// OPTION ACCESSORS
// ============================================================================

fn find_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a CommandDataOption> {
    options.iter().find(|option| option.name == name)
}

pub fn string_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    find_option(options, name)
        .and_then(|option| option.value.as_ref())
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

pub fn bool_option(options: &[CommandDataOption], name: &str) -> Option<bool> {
    find_option(options, name)
        .and_then(|option| option.value.as_ref())
        .and_then(|value| value.as_bool())
}

pub fn number_option(options: &[CommandDataOption], name: &str) -> Option<f64> {
    find_option(options, name)
        .and_then(|option| option.value.as_ref())
        .and_then(|value| value.as_f64())
}

pub fn attachment_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a Attachment> {
    match find_option(options, name).and_then(|option| option.resolved.as_ref()) {
        Some(CommandDataOptionValue::Attachment(attachment)) => Some(attachment),
        _ => None,
    }
}

/// A required string option. Discord enforces presence, so absence is reported as a
/// configuration mismatch between registration and handler.
pub fn required_string(options: &[CommandDataOption], name: &str) -> BotResult<String> {
    string_option(options, name).ok_or_else(|| BotError::Config(format!("missing required option '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> Vec<CommandDataOption> {
        serde_json::from_value(json!([
            { "name": "prompt", "type": 3, "value": "hello" },
            { "name": "stream", "type": 5, "value": true },
            { "name": "width", "type": 10, "value": 512 }
        ]))
        .unwrap()
    }

    #[test]
    fn test_option_accessors() {
        let options = options();
        assert_eq!(string_option(&options, "prompt").as_deref(), Some("hello"));
        assert_eq!(bool_option(&options, "stream"), Some(true));
        assert_eq!(number_option(&options, "width"), Some(512.0));
        assert_eq!(string_option(&options, "model"), None);
        assert!(attachment_option(&options, "attachment1").is_none());
    }

    #[test]
    fn test_required_string_reports_missing_option() {
        let err = required_string(&options(), "model").unwrap_err();
        assert!(err.to_string().contains("missing required option 'model'"));
    }

    #[test]
    fn test_join_system_prompts() {
        assert_eq!(
            join_system_prompts(Some("model prompt".into()), Some("configured".into())).as_deref(),
            Some("model prompt\nconfigured")
        );
        assert_eq!(join_system_prompts(None, Some("configured".into())).as_deref(), Some("configured"));
        assert_eq!(join_system_prompts(Some("  ".into()), None), None);
    }

    #[test]
    fn test_failure_message() {
        let missing = BotError::MissingServer("Ollama");
        assert_eq!(
            failure_message(&missing, "Failed to generate response"),
            "No Ollama server configured. Please update the .env configuration."
        );
        let other = BotError::Pdf("bad".into());
        assert_eq!(failure_message(&other, "Failed to generate response"), "Failed to generate response");
    }
}
