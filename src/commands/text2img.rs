// text2img.rs - Text to Image Command Module
// Implements /text2img against a Stable Diffusion WebUI compatible server.
//
// Key Features:
// - Model override, size, step, iteration and batch options
// - Images delivered in batches of Discord's per-message file limit
// - First batch as a follow-up to the deferred reply, later batches as replies
//
// Used by: commands/mod.rs (registration and dispatch)

use std::borrow::Cow;

use base64::{engine::general_purpose, Engine as _};
use serenity::{
    builder::CreateApplicationCommand,
    client::Context,
    model::application::{
        command::CommandOptionType,
        interaction::application_command::{ApplicationCommandInteraction, CommandDataOption},
    },
    model::channel::{AttachmentType, Message},
};

use super::{bool_option, defer, edit_reply, model_option, number_option, report_failure, required_string, string_option};
use crate::config::MAX_FILES_LENGTH;
use crate::error::{BotError, BotResult};
use crate::service::{ModelEntry, OverrideSettings, Provider, Text2ImgRequest, Text2ImgResponse, SD_TXT2IMG};
use crate::AppState;

const IMAGES_FAILED: &str = "Failed to generate images";

// name, description, min, max, default
const NUMBER_OPTIONS: [(&str, &str, f64, f64, u32); 5] = [
    ("width", "Width of the image", 128.0, 1024.0, 256),
    ("height", "Height of the image", 128.0, 1024.0, 256),
    ("steps", "Number of steps", 5.0, 20.0, 10),
    ("iterations", "Iterations", 1.0, 5.0, 1),
    ("batch_size", "Batch size", 1.0, 5.0, 1),
];

pub fn register<'a>(command: &'a mut CreateApplicationCommand, models: &[ModelEntry]) -> &'a mut CreateApplicationCommand {
    command
        .name("text2img")
        .description("Convert text to image")
        .create_option(|option| {
            option
                .name("prompt")
                .description("Text to convert")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| model_option(option, models, Provider::StableDiffusion, false));

    for (name, description, min, max, _) in NUMBER_OPTIONS {
        command.create_option(|option| {
            option
                .name(name)
                .description(description)
                .kind(CommandOptionType::Number)
                .min_number_value(min)
                .max_number_value(max)
                .required(false)
        });
    }

    command.create_option(|option| {
        option
            .name("enhance_prompt")
            .description("Enhance prompt")
            .kind(CommandOptionType::Boolean)
            .required(false)
    })
}

fn number_or_default(options: &[CommandDataOption], name: &str) -> u32 {
    let (min, max, default) = match NUMBER_OPTIONS.iter().find(|(option, ..)| *option == name) {
        Some((_, _, min, max, default)) => (*min, *max, *default),
        None => (0.0, f64::from(u32::MAX), 0),
    };

    number_option(options, name)
        .map(|value| value.round().clamp(min, max) as u32)
        .unwrap_or(default)
}

/// Build the txt2img request from the command options
pub fn build_request(options: &[CommandDataOption], prompt: String) -> Text2ImgRequest {
    let steps = number_or_default(options, "steps");
    Text2ImgRequest {
        prompt,
        width: number_or_default(options, "width"),
        height: number_or_default(options, "height"),
        steps,
        num_inference_steps: steps,
        n_iter: number_or_default(options, "iterations"),
        batch_size: number_or_default(options, "batch_size"),
        enhance_prompt: bool_option(options, "enhance_prompt").unwrap_or(false),
        override_settings: string_option(options, "model")
            .filter(|model| !model.is_empty())
            .map(|sd_model_checkpoint| OverrideSettings { sd_model_checkpoint }),
    }
}

/// Decode the base64 images, skipping any the server sent malformed
pub fn decode_images(images: &[String]) -> Vec<Vec<u8>> {
    images
        .iter()
        .enumerate()
        .filter_map(|(i, image)| match general_purpose::STANDARD.decode(image) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("[TEXT2IMG] Skipping image {} with invalid base64: {}", i + 1, e);
                None
            }
        })
        .collect()
}

/// Attachments for one message; file names continue the numbering across batches
pub fn batch_files(batch: &[Vec<u8>], batch_index: usize) -> Vec<AttachmentType<'_>> {
    batch
        .iter()
        .enumerate()
        .map(|(i, bytes)| AttachmentType::Bytes {
            data: Cow::Borrowed(bytes.as_slice()),
            filename: format!("image_{}.png", batch_index * MAX_FILES_LENGTH + i + 1),
        })
        .collect()
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    let options = &interaction.data.options;
    let prompt = required_string(options, "prompt")?;

    defer(ctx, interaction).await?;

    let server = state.config.stable_diffusion_url.as_deref();
    if server.is_none() {
        report_failure(ctx, interaction, &BotError::MissingServer(Provider::StableDiffusion.display_name()), IMAGES_FAILED, false).await;
        return Ok(());
    }

    let request = build_request(options, prompt.clone());
    log::info!(
        "[TEXT2IMG] {}x{} with {} step(s), {} iteration(s), batch size {}",
        request.width,
        request.height,
        request.steps,
        request.n_iter,
        request.batch_size
    );

    let mut has_output = false;
    let result = async {
        let response: Text2ImgResponse = state
            .service
            .post_json(server, SD_TXT2IMG, Provider::StableDiffusion, &request)
            .await?;
        let images = decode_images(&response.images);

        if images.is_empty() {
            edit_reply(ctx, interaction, "The server returned no images.").await?;
            return Ok(());
        }

        edit_reply(ctx, interaction, &format!("Here are images from prompt `{}`", prompt)).await?;
        has_output = true;

        let mut previous: Option<Message> = None;
        for (batch_index, batch) in images.chunks(MAX_FILES_LENGTH).enumerate() {
            let files = batch_files(batch, batch_index);
            let message = match &previous {
                None => {
                    interaction
                        .create_followup_message(&ctx.http, |followup| followup.add_files(files))
                        .await?
                }
                Some(previous) => {
                    previous
                        .channel_id
                        .send_message(&ctx.http, |message| message.reference_message(previous).add_files(files))
                        .await?
                }
            };
            previous = Some(message);
        }

        log::info!("[TEXT2IMG] Sent {} image(s) for user {}", images.len(), interaction.user.id);
        Ok::<_, BotError>(())
    }
    .await;

    if let Err(e) = result {
        report_failure(ctx, interaction, &e, IMAGES_FAILED, has_output).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: serde_json::Value) -> Vec<CommandDataOption> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_build_request_defaults() {
        let request = build_request(&options(json!([])), "a cat".into());
        assert_eq!((request.width, request.height), (256, 256));
        assert_eq!(request.steps, 10);
        assert_eq!(request.num_inference_steps, 10);
        assert_eq!(request.n_iter, 1);
        assert_eq!(request.batch_size, 1);
        assert!(!request.enhance_prompt);
        assert!(request.override_settings.is_none());
    }

    #[test]
    fn test_build_request_with_options() {
        let request = build_request(
            &options(json!([
                { "name": "width", "type": 10, "value": 512 },
                { "name": "steps", "type": 10, "value": 15.4 },
                { "name": "batch_size", "type": 10, "value": 9 },
                { "name": "model", "type": 3, "value": "v1-5" },
                { "name": "enhance_prompt", "type": 5, "value": true }
            ])),
            "a dog".into(),
        );
        assert_eq!(request.width, 512);
        assert_eq!(request.steps, 15);
        assert_eq!(request.num_inference_steps, 15);
        assert_eq!(request.batch_size, 5);
        assert!(request.enhance_prompt);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["override_settings"]["sd_model_checkpoint"], "v1-5");
    }

    #[test]
    fn test_decode_images_skips_invalid() {
        let images = vec!["aGVsbG8=".to_string(), "***".to_string()];
        assert_eq!(decode_images(&images), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_batches_respect_file_limit() {
        let images = vec![vec![0u8]; 23];
        let batches: Vec<&[Vec<u8>]> = images.chunks(MAX_FILES_LENGTH).collect();
        assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![10, 10, 3]);

        let names: Vec<String> = batch_files(batches[2], 2)
            .into_iter()
            .map(|file| match file {
                AttachmentType::Bytes { filename, .. } => filename,
                _ => String::new(),
            })
            .collect();
        assert_eq!(names, vec!["image_21.png", "image_22.png", "image_23.png"]);
    }
}
