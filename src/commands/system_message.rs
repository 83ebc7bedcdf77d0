// system_message.rs - System Message Command Module
// Implements /systemmessage: shows the system prompt sent with /chat and /generate.

use serenity::{
    builder::CreateApplicationCommand, client::Context,
    model::application::interaction::application_command::ApplicationCommandInteraction,
};

use super::respond_ephemeral;
use crate::config::{BotConfig, DISCORD_MAX_MESSAGE_LENGTH};
use crate::error::BotResult;
use crate::AppState;

const HEADER: &str = "System message:\n";

pub fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name("systemmessage")
        .description("Show the configured system message")
}

pub fn system_message_text(config: &BotConfig) -> String {
    if !config.use_system {
        return "The configured system message is disabled (USE_SYSTEM=false).".to_string();
    }

    match config.rendered_system_prompt() {
        Some(prompt) => {
            // Fence and header must fit alongside the prompt in one message
            let room = DISCORD_MAX_MESSAGE_LENGTH - HEADER.len() - "```\n\n```".len() - 3;
            let mut shown: String = prompt.chars().take(room).collect();
            if shown.len() < prompt.len() {
                shown.push_str("...");
            }
            format!("{}```\n{}\n```", HEADER, shown)
        }
        None => "No system message is configured.".to_string(),
    }
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    respond_ephemeral(ctx, interaction, &system_message_text(&state.config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> BotConfig {
        let mut map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        map.insert("DISCORD_TOKEN".into(), "token".into());
        BotConfig::from_map(&map).unwrap()
    }

    #[test]
    fn test_shows_configured_prompt() {
        let text = system_message_text(&config(&[("SYSTEM_PROMPT", "Be helpful")]));
        assert_eq!(text, "System message:\n```\nBe helpful\n```");
    }

    #[test]
    fn test_missing_and_disabled_prompt() {
        assert_eq!(system_message_text(&config(&[])), "No system message is configured.");
        assert!(system_message_text(&config(&[("SYSTEM_PROMPT", "x"), ("USE_SYSTEM", "false")])).contains("disabled"));
    }

    #[test]
    fn test_long_prompt_fits_one_message() {
        let long = "a".repeat(5000);
        let text = system_message_text(&config(&[("SYSTEM_PROMPT", long.as_str())]));
        assert!(text.chars().count() <= DISCORD_MAX_MESSAGE_LENGTH);
        assert!(text.ends_with("...\n```"));
    }
}
