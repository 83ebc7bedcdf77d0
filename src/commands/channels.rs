// channels.rs - Channels Command Module
// Implements /channels: tells the caller where the bot accepts commands.
// Always answered, even outside the allowed channels.

use serenity::{
    builder::CreateApplicationCommand, client::Context,
    model::application::interaction::application_command::ApplicationCommandInteraction,
};

use super::respond_ephemeral;
use crate::error::BotResult;
use crate::AppState;

pub fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name("channels")
        .description("Check channels in which the bot is active")
}

pub fn channels_message(channels: &[String]) -> String {
    if channels.is_empty() {
        return "Bot is available in all channels.".to_string();
    }

    let mentions: Vec<String> = channels.iter().map(|channel| format!("<#{}>", channel)).collect();
    format!("Bot is available in the following channels: {}", mentions.join(", "))
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    respond_ephemeral(ctx, interaction, &channels_message(&state.config.channels)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_channels() {
        assert_eq!(channels_message(&[]), "Bot is available in all channels.");
    }

    #[test]
    fn test_channel_mentions() {
        let channels = vec!["123".to_string(), "456".to_string()];
        assert_eq!(
            channels_message(&channels),
            "Bot is available in the following channels: <#123>, <#456>"
        );
    }
}
