// ping.rs - Ping Command Module
// Implements /ping, which measures and displays the bot's response time.
//
// Key Features:
// - Measures the round trip of the initial interaction response
// - Edits the response with the measured delay

use std::time::Instant;

use serenity::{
    builder::CreateApplicationCommand,
    client::Context,
    model::application::interaction::{application_command::ApplicationCommandInteraction, InteractionResponseType},
};

use super::edit_reply;
use crate::error::BotResult;

pub fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name("ping")
        .description("Test bot connectivity and response time")
}

pub async fn run(ctx: &Context, interaction: &ApplicationCommandInteraction) -> BotResult<()> {
    let start_time = Instant::now();

    // Send the initial response and measure the time
    interaction
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content("Pong! Calculating delay..."))
        })
        .await?;
    let elapsed = start_time.elapsed();

    if let Err(e) = edit_reply(ctx, interaction, &format!("Pong! Response time: {}ms", elapsed.as_millis())).await {
        // The initial pong is already visible
        log::warn!("[PING] Failed to update ping message with delay: {}", e);
    }

    Ok(())
}
