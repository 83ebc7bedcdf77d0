// models.rs - Models Command Module
// Implements /models: lists the models available on the Ollama or Stable Diffusion server.
//
// Key Features:
// - One embed field per model, paged at Discord's field limit
// - Extra pages chained as a follow-up, then replies
//
// Used by: commands/mod.rs (registration and dispatch)

use serenity::{
    builder::{CreateApplicationCommand, CreateEmbed},
    client::Context,
    model::application::{
        command::CommandOptionType,
        interaction::application_command::ApplicationCommandInteraction,
    },
    model::channel::Message,
};

use super::{defer, edit_reply, report_failure, required_string};
use crate::config::MAX_EMBED_FIELDS;
use crate::error::{BotError, BotResult};
use crate::service::{ModelEntry, Provider};
use crate::AppState;

const MODELS_FAILED: &str = "Failed to get models. Please check the logs for more information.";

pub fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name("models")
        .description("List available models")
        .create_option(|option| {
            option
                .name("provider")
                .description("AI provider")
                .kind(CommandOptionType::String)
                .required(true)
                .add_string_choice(Provider::Ollama.display_name(), Provider::Ollama.option_value())
                .add_string_choice(
                    Provider::StableDiffusion.display_name(),
                    Provider::StableDiffusion.option_value(),
                )
        })
}

/// One embed worth of models
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPage {
    pub title: String,
    pub description: String,
    pub fields: Vec<(String, String)>,
}

impl ModelPage {
    pub fn to_embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::default();
        embed.title(&self.title).description(&self.description);
        for (name, value) in &self.fields {
            embed.field(name, value, true);
        }
        embed
    }
}

pub fn build_pages(provider: Provider, models: &[ModelEntry]) -> Vec<ModelPage> {
    let total = models.len();

    models
        .chunks(MAX_EMBED_FIELDS)
        .enumerate()
        .map(|(page, chunk)| {
            let start = page * MAX_EMBED_FIELDS;
            let end = start + chunk.len();

            let mut title = format!("Available {} Models", provider.display_name());
            if page > 0 {
                title.push_str(&format!(" (Page {})", page + 1));
            }

            let mut description = format!("Found {} models on the server.", total);
            if total > MAX_EMBED_FIELDS {
                description.push_str(&format!(" Showing {}-{} of {}.", start + 1, end, total));
            }

            ModelPage {
                title,
                description,
                fields: chunk.iter().map(|model| (model.name.clone(), model.value.clone())).collect(),
            }
        })
        .collect()
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    defer(ctx, interaction).await?;

    let provider_value = required_string(&interaction.data.options, "provider")?;
    let provider = Provider::from_option(&provider_value)
        .ok_or_else(|| BotError::Config(format!("unknown provider '{}'", provider_value)))?;

    let server = match provider {
        Provider::Ollama => state.config.ollama_url.as_deref(),
        Provider::StableDiffusion => state.config.stable_diffusion_url.as_deref(),
    };
    if server.is_none() {
        report_failure(ctx, interaction, &BotError::MissingServer(provider.display_name()), MODELS_FAILED, false).await;
        return Ok(());
    }

    let models = match state.service.get_models(server, provider).await {
        Some(models) => models,
        None => {
            edit_reply(ctx, interaction, MODELS_FAILED).await?;
            return Ok(());
        }
    };
    if models.is_empty() {
        edit_reply(ctx, interaction, &format!("No models found on the {} server.", provider.display_name())).await?;
        return Ok(());
    }

    let pages = build_pages(provider, &models);
    log::info!(
        "[MODELS] Listing {} {} models in {} page(s)",
        models.len(),
        provider.display_name(),
        pages.len()
    );

    let summary = if pages.len() > 1 {
        format!(
            "Found {} {} models. Showing results in {} pages:",
            models.len(),
            provider.display_name(),
            pages.len()
        )
    } else {
        String::new()
    };

    let mut pages = pages.iter();
    if let Some(first) = pages.next() {
        interaction
            .edit_original_interaction_response(&ctx.http, |response| {
                response.content(&summary).add_embed(first.to_embed())
            })
            .await?;
    }

    let mut previous: Option<Message> = None;
    for page in pages {
        let message = match &previous {
            None => {
                interaction
                    .create_followup_message(&ctx.http, |followup| followup.add_embed(page.to_embed()))
                    .await?
            }
            Some(previous) => {
                previous
                    .channel_id
                    .send_message(&ctx.http, |message| message.reference_message(previous).set_embed(page.to_embed()))
                    .await?
            }
        };
        previous = Some(message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(count: usize) -> Vec<ModelEntry> {
        (1..=count)
            .map(|i| ModelEntry { name: format!("model-{}", i), value: format!("m{}", i) })
            .collect()
    }

    #[test]
    fn test_single_page() {
        let pages = build_pages(Provider::Ollama, &models(3));
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Available Ollama Models");
        assert_eq!(pages[0].description, "Found 3 models on the server.");
        assert_eq!(pages[0].fields[2], ("model-3".to_string(), "m3".to_string()));
    }

    #[test]
    fn test_pages_split_at_field_limit() {
        let pages = build_pages(Provider::StableDiffusion, &models(60));
        assert_eq!(pages.iter().map(|p| p.fields.len()).collect::<Vec<_>>(), vec![25, 25, 10]);
        assert_eq!(pages[1].title, "Available Stable Diffusion Models (Page 2)");
        assert_eq!(pages[2].description, "Found 60 models on the server. Showing 51-60 of 60.");
    }

    #[test]
    fn test_no_models_no_pages() {
        assert!(build_pages(Provider::Ollama, &[]).is_empty());
    }
}
