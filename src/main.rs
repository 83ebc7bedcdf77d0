// main.rs - Ollama Relay Bot Entry Point
// Discord bot that relays slash commands to an Ollama text server and a Stable
// Diffusion image server.
//
// Startup:
// - Logger, .env loading and typed configuration
// - Shared state (backend client, chat history) handed to the event handler
// - Global slash command registration on ready
// - Autosharded gateway connection with graceful Ctrl+C shutdown

mod attachments;
mod commands;
mod config;
mod error;
mod history;
mod relay;
mod service;
mod utils;

use std::sync::Arc;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    model::application::interaction::{Interaction, InteractionResponseType},
    model::gateway::Ready,
    model::user::OnlineStatus,
    prelude::GatewayIntents,
};
use tokio::signal;

use crate::config::{load_env_file, BotConfig};
use crate::error::BotResult;
use crate::history::HistoryService;
use crate::service::ServiceClient;

/// State shared by every command handler
pub struct AppState {
    pub config: BotConfig,
    pub service: ServiceClient,
    pub history: HistoryService,
}

impl AppState {
    pub fn new(config: BotConfig) -> BotResult<Self> {
        let service = ServiceClient::new(config.request_timeout)?;
        Ok(Self {
            config,
            service,
            history: HistoryService::new(),
        })
    }
}

// Event handler implementation
struct Handler {
    state: Arc<AppState>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        log::info!("✅ Bot connected as {}! (ID: {})", ready.user.name, ready.user.id);
        log::info!("📊 Connected to {} guilds", ready.guilds.len());

        ctx.set_presence(None, OnlineStatus::Online).await;

        match commands::register_commands(&ctx.http, &self.state).await {
            Ok(count) => log::info!("✅ Successfully reloaded {} application slash (/) commands.", count),
            Err(e) => log::error!("❌ Failed to register slash commands: {}", e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::ApplicationCommand(command) = interaction else {
            return;
        };

        if let Err(e) = commands::handle_command(&ctx, &command, &self.state).await {
            log::error!("❌ Error handling slash command '{}': {}", command.data.name, e);

            let error_message = commands::failure_message(&e, "❌ Sorry, I encountered an error processing your command.");

            // Deferred commands get their reply edited, the rest get a fresh response
            if command
                .edit_original_interaction_response(&ctx.http, |response| response.content(&error_message))
                .await
                .is_err()
            {
                let _ = command
                    .create_interaction_response(&ctx.http, |response| {
                        response
                            .kind(InteractionResponseType::ChannelMessageWithSource)
                            .interaction_response_data(|message| message.content(&error_message).ephemeral(true))
                    })
                    .await;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logger - must be done before any logging calls
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    log::info!("🚀 Ollama relay bot starting up...");

    match load_env_file() {
        Some(path) => log::info!("✅ Configuration loaded from {}", path),
        None => log::warn!("No .env file found in any expected location (., .., ../.., src/), using the process environment"),
    }

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Failed to load configuration: {}", e);
            return;
        }
    };

    if config.ollama_url.is_none() {
        log::warn!("OLLAMA is not set, text commands will report a missing server");
    }
    if config.stable_diffusion_url.is_none() {
        log::warn!("STABLE_DIFFUSION is not set, /text2img will report a missing server");
    }
    if !config.channels.is_empty() {
        log::info!("Commands limited to {} channel(s)", config.channels.len());
    }

    let token = config.discord_token.clone();
    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            log::error!("❌ Failed to initialize backend client: {}", e);
            return;
        }
    };

    // Configure bot intents
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES;

    // Create and start client
    let mut client = match Client::builder(&token, intents)
        .event_handler(Handler { state })
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("❌ Error creating Discord client: {:?}", e);
            return;
        }
    };

    let shard_manager = client.shard_manager.clone();

    log::info!("🚀 Bot is running... press Ctrl+C to stop");
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("⏹️ Stopping bot gracefully...");
            shard_manager.lock().await.shutdown_all().await;
        }
        result = client.start_autosharded() => {
            if let Err(why) = result {
                log::error!("❌ Client error: {:?}", why);
            }
        }
    }

    log::info!("👋 Bot shutdown complete");
}
