// relay/mod.rs - Reply Relay
// Moves generated text from the backends into Discord messages.
//
// - decoder:     byte chunks -> UTF-8 -> JSON lines
// - reassembler: streaming replies with incremental edits and spill-over messages
// - batch:       one-shot replies split into message-sized segments
// - sink:        the message create/edit/reply abstraction and its Discord implementation

pub mod batch;
pub mod decoder;
pub mod reassembler;
pub mod sink;

pub use batch::reply_split_message;
pub use reassembler::{FlushConfig, Reassembler, ReplyOutcome, StreamChunk};
pub use sink::{InteractionSink, MessageSink};
