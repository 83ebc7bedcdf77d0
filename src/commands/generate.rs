// generate.rs - Generate Command Module
// Implements /generate: a one-time Ollama response that is not saved to history.
//
// Key Features:
// - Text, PDF and image attachments folded into the request
// - Optional streaming with incremental message edits
// - System prompt from the model and/or the configuration
//
// Used by: commands/mod.rs (registration and dispatch)

use serenity::{
    builder::CreateApplicationCommand,
    client::Context,
    model::application::{
        command::CommandOptionType,
        interaction::application_command::{ApplicationCommandInteraction, CommandDataOption},
    },
    model::channel::Attachment,
};

use super::{
    attachment_option, bool_option, defer, edit_reply, model_option, relay_generation, report_failure, required_string,
    system_prompt, GENERATION_FAILED,
};
use crate::attachments;
use crate::error::{BotError, BotResult};
use crate::service::{GenerateRequest, GenerateResponse, ModelEntry, Provider, OLLAMA_GENERATE};
use crate::AppState;

pub fn register<'a>(
    command: &'a mut CreateApplicationCommand,
    models: &[ModelEntry],
    max_attachments: usize,
) -> &'a mut CreateApplicationCommand {
    command
        .name("generate")
        .description("Generate a one-time response without saving history")
        .create_option(|option| {
            option
                .name("prompt")
                .description("Prompt to generate a response")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| model_option(option, models, Provider::Ollama, true));

    for i in 1..=max_attachments {
        command.create_option(|option| {
            option
                .name(attachment_name(i))
                .description(format!("Attach text file number {}", i))
                .kind(CommandOptionType::Attachment)
                .required(false)
        });
    }

    command.create_option(|option| {
        option
            .name("stream")
            .description("(Experimental) Stream response")
            .kind(CommandOptionType::Boolean)
            .required(false)
    })
}

fn attachment_name(index: usize) -> String {
    format!("attachment{}", index)
}

fn selected_attachments(options: &[CommandDataOption], max_attachments: usize) -> Vec<&Attachment> {
    (1..=max_attachments)
        .filter_map(|i| attachment_option(options, &attachment_name(i)))
        .collect()
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    defer(ctx, interaction).await?;

    let options = &interaction.data.options;
    let prompt = required_string(options, "prompt")?;
    let model = required_string(options, "model")?;
    let stream = bool_option(options, "stream").unwrap_or(false);

    if state.config.ollama_url.is_none() {
        report_failure(ctx, interaction, &BotError::MissingServer(Provider::Ollama.display_name()), GENERATION_FAILED, false).await;
        return Ok(());
    }

    let attachments = selected_attachments(options, state.config.max_attachments);
    let collected = match attachments::collect(&state.service, &attachments).await {
        Ok(collected) => collected,
        Err((kind, e)) => {
            log::error!("[GENERATE] Failed to process {}: {}", kind.label(), e);
            edit_reply(ctx, interaction, &format!("Failed to process {}. Error: {}", kind.label(), e)).await?;
            return Ok(());
        }
    };

    let system = system_prompt(state, &model).await;

    log::debug!(
        "[GENERATE] Sending generate request for user {} with {} text file(s), {} PDF file(s), and {} image(s)",
        interaction.user.id,
        collected.texts.len(),
        collected.pdfs.len(),
        collected.images.len()
    );

    let request = GenerateRequest {
        model,
        prompt: format!("{}{}", prompt, collected.prompt_suffix()),
        stream,
        system,
        images: collected.images,
    };
    relay_generation::<GenerateResponse, _>(ctx, interaction, state, OLLAMA_GENERATE, &request, stream).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attachment_option_names() {
        assert_eq!(attachment_name(1), "attachment1");
        assert_eq!(attachment_name(3), "attachment3");
    }

    #[test]
    fn test_no_attachments_selected() {
        let options: Vec<CommandDataOption> = serde_json::from_value(json!([
            { "name": "prompt", "type": 3, "value": "hello" }
        ]))
        .unwrap();
        assert!(selected_attachments(&options, 2).is_empty());
    }
}
