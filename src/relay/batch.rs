// batch.rs - Single-Shot Replies
// Non-streaming counterpart of the reassembler: one complete text is split into
// Discord-sized segments and written as a reply chain.

use super::sink::MessageSink;
use crate::error::BotResult;
use crate::utils::split_text;

pub const EMPTY_RESPONSE_NOTICE: &str = "The model returned an empty response.";

/// Write `content` as deferred-reply edit, follow-up, then replies. Returns the number
/// of messages in the chain.
pub async fn reply_split_message<S: MessageSink>(sink: &S, content: &str, max_length: usize) -> BotResult<usize> {
    let mut segments = split_text(content, max_length).into_iter();

    let first = match segments.next() {
        Some(first) => first,
        None => {
            sink.edit_reply(EMPTY_RESPONSE_NOTICE).await?;
            return Ok(1);
        }
    };
    sink.edit_reply(&first).await?;

    let mut tail: Option<S::Handle> = None;
    let mut count = 1;
    for segment in segments {
        let handle = match &tail {
            None => sink.follow_up(&segment).await?,
            Some(previous) => sink.reply(previous, &segment).await?,
        };
        tail = Some(handle);
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        ops: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, op: String) -> usize {
            let mut ops = self.ops.lock().unwrap();
            ops.push(op);
            ops.len() - 1
        }
    }

    #[async_trait]
    impl MessageSink for Recorder {
        type Handle = usize;

        async fn edit_reply(&self, content: &str) -> BotResult<()> {
            self.push(format!("edit_reply:{}", content));
            Ok(())
        }

        async fn follow_up(&self, content: &str) -> BotResult<usize> {
            Ok(self.push(format!("follow_up:{}", content)))
        }

        async fn edit(&self, handle: &mut usize, content: &str) -> BotResult<()> {
            self.push(format!("edit#{}:{}", handle, content));
            Ok(())
        }

        async fn reply(&self, handle: &usize, content: &str) -> BotResult<usize> {
            Ok(self.push(format!("reply#{}:{}", handle, content)))
        }
    }

    #[tokio::test]
    async fn test_single_segment_edits_reply() {
        let sink = Recorder::default();
        let count = reply_split_message(&sink, "  short answer \n", 2000).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(*sink.ops.lock().unwrap(), vec!["edit_reply:short answer"]);
    }

    #[tokio::test]
    async fn test_segments_chain_follow_up_then_replies() {
        let sink = Recorder::default();
        let count = reply_split_message(&sink, "one two three four", 6).await.unwrap();
        assert_eq!(count, 4);
        assert_eq!(
            *sink.ops.lock().unwrap(),
            vec!["edit_reply:one", "follow_up:two", "reply#1:three", "reply#2:four"]
        );
    }

    #[tokio::test]
    async fn test_empty_content_gets_notice() {
        let sink = Recorder::default();
        reply_split_message(&sink, "   ", 2000).await.unwrap();
        assert_eq!(
            *sink.ops.lock().unwrap(),
            vec![format!("edit_reply:{}", EMPTY_RESPONSE_NOTICE)]
        );
    }
}
