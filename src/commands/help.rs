// help.rs - Help Command Module
// Provides help information for all slash commands

use serenity::{
    builder::CreateApplicationCommand, client::Context,
    model::application::interaction::application_command::ApplicationCommandInteraction,
};

use super::respond_ephemeral;
use crate::error::BotResult;

const HELP_TEXT: &str = r#"**🤖 Ollama Relay Bot - Command Help**

**🧠 Text Generation:**
• `/chat prompt model [stream]` - Chat with an Ollama model, remembers your earlier messages
• `/generate prompt model [attachment] [stream]` - One-time response, attach text, PDF or image files
• `/clearhistory` - Forget your /chat conversation

**🎨 Images:**
• `/text2img prompt [model] [width] [height] [steps] [iterations] [batch_size] [enhance_prompt]` - Stable Diffusion images

**📋 Information:**
• `/models provider` - List models on the Ollama or Stable Diffusion server
• `/channels` - Channels where the bot answers
• `/systemmessage` - Show the configured system message
• `/ping` - Test bot response time
• `/help` - Show this help message

**💡 Tips:**
• `stream` shows the answer while it is being written
• Long answers continue in follow-up messages"#;

pub fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command.name("help").description("Show available commands")
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction) -> BotResult<()> {
    respond_ephemeral(ctx, interaction, HELP_TEXT).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DISCORD_MAX_MESSAGE_LENGTH;

    #[test]
    fn test_help_fits_one_message() {
        assert!(HELP_TEXT.chars().count() <= DISCORD_MAX_MESSAGE_LENGTH);
        for command in ["/chat", "/generate", "/text2img", "/models", "/channels", "/clearhistory", "/systemmessage", "/ping"] {
            assert!(HELP_TEXT.contains(command), "{} missing from help", command);
        }
    }
}
