// clear_history.rs - Clear History Command Module
// Implements /clearhistory: forgets the caller's /chat conversation.

use serenity::{
    builder::CreateApplicationCommand, client::Context,
    model::application::interaction::application_command::ApplicationCommandInteraction,
};

use super::respond_ephemeral;
use crate::error::BotResult;
use crate::AppState;

pub fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name("clearhistory")
        .description("Clear your chat history with the bot")
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction, state: &AppState) -> BotResult<()> {
    let user_id = interaction.user.id;

    if !state.history.has_history(user_id).await {
        return respond_ephemeral(ctx, interaction, "You don't have any chat history to clear.").await;
    }

    state.history.clear_history(user_id).await;
    log::info!("[CLEARHISTORY] Chat history cleared for user {} ({})", user_id, interaction.user.name);

    respond_ephemeral(ctx, interaction, "Your chat history has been cleared successfully!").await
}
