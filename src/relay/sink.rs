// sink.rs - Outbound Message Sink
// The reply relay writes through this trait so the same reassembly code can target a
// Discord interaction or a recording sink in tests.
//
// Chain shape: the deferred interaction reply comes first, then one follow-up, then
// replies that each continue the previous message.

use async_trait::async_trait;
use serenity::{
    client::Context,
    model::application::interaction::application_command::ApplicationCommandInteraction,
    model::channel::Message,
};

use crate::error::BotResult;

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// A message created by the sink that can later be edited or replied to
    type Handle: Send + Sync;

    /// Replace the content of the deferred reply
    async fn edit_reply(&self, content: &str) -> BotResult<()>;

    /// First continuation after the deferred reply
    async fn follow_up(&self, content: &str) -> BotResult<Self::Handle>;

    async fn edit(&self, handle: &mut Self::Handle, content: &str) -> BotResult<()>;

    /// Continuation that replies to an earlier chain message
    async fn reply(&self, handle: &Self::Handle, content: &str) -> BotResult<Self::Handle>;
}

/// Messages created while answering an interaction. Follow-ups belong to the
/// interaction webhook, replies are ordinary channel messages.
pub enum SentMessage {
    FollowUp(Message),
    Reply(Message),
}

impl SentMessage {
    pub fn message(&self) -> &Message {
        match self {
            SentMessage::FollowUp(message) | SentMessage::Reply(message) => message,
        }
    }
}

pub struct InteractionSink<'a> {
    ctx: &'a Context,
    interaction: &'a ApplicationCommandInteraction,
}

impl<'a> InteractionSink<'a> {
    pub fn new(ctx: &'a Context, interaction: &'a ApplicationCommandInteraction) -> Self {
        Self { ctx, interaction }
    }
}

#[async_trait]
impl<'a> MessageSink for InteractionSink<'a> {
    type Handle = SentMessage;

    async fn edit_reply(&self, content: &str) -> BotResult<()> {
        self.interaction
            .edit_original_interaction_response(&self.ctx.http, |response| response.content(content))
            .await?;
        Ok(())
    }

    async fn follow_up(&self, content: &str) -> BotResult<SentMessage> {
        let message = self
            .interaction
            .create_followup_message(&self.ctx.http, |followup| followup.content(content))
            .await?;
        Ok(SentMessage::FollowUp(message))
    }

    async fn edit(&self, handle: &mut SentMessage, content: &str) -> BotResult<()> {
        match handle {
            SentMessage::FollowUp(message) => {
                *message = self
                    .interaction
                    .edit_followup_message(&self.ctx.http, message.id, |followup| followup.content(content))
                    .await?;
            }
            SentMessage::Reply(message) => {
                message.edit(&self.ctx.http, |edit| edit.content(content)).await?;
            }
        }
        Ok(())
    }

    async fn reply(&self, handle: &SentMessage, content: &str) -> BotResult<SentMessage> {
        let message = handle.message().reply(self.ctx, content).await?;
        Ok(SentMessage::Reply(message))
    }
}
