//! Typed facade over an invoker.

use crate::call::{Call, ChannelId, InputChannel, InputFile, Message, MessageId, Reply, Update};
use crate::error::{TransportError, TransportResult};
use crate::traits::Invoker;
use bytes::Bytes;
use std::sync::Arc;

/// Client issuing typed calls through an invoker chain.
#[derive(Clone)]
pub struct Client {
    invoker: Arc<dyn Invoker>,
}

impl Client {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    /// Resolve a channel id to a channel reference.
    pub async fn get_channel(&self, channel_id: ChannelId) -> TransportResult<InputChannel> {
        let call = Call::GetChannel { channel_id };
        match self.invoker.invoke(&call).await? {
            Reply::Channel(channel) => Ok(channel),
            other => Err(unexpected(&call, &other)),
        }
    }

    /// Save one chunk of a file being uploaded.
    pub async fn save_file_part(
        &self,
        file_id: i64,
        part: u32,
        total_parts: u32,
        bytes: Bytes,
    ) -> TransportResult<()> {
        let call = Call::SaveFilePart {
            file_id,
            part,
            total_parts,
            bytes,
        };
        match self.invoker.invoke(&call).await? {
            Reply::PartSaved => Ok(()),
            other => Err(unexpected(&call, &other)),
        }
    }

    /// Send an uploaded file as a document message.
    pub async fn send_media(
        &self,
        channel: &InputChannel,
        file: InputFile,
    ) -> TransportResult<Vec<Update>> {
        let call = Call::SendMedia {
            channel: channel.clone(),
            file,
            force_file: true,
        };
        match self.invoker.invoke(&call).await? {
            Reply::Updates(updates) => Ok(updates),
            other => Err(unexpected(&call, &other)),
        }
    }

    pub async fn get_messages(
        &self,
        channel: &InputChannel,
        ids: Vec<MessageId>,
    ) -> TransportResult<Vec<Message>> {
        let call = Call::GetMessages {
            channel: channel.clone(),
            ids,
        };
        match self.invoker.invoke(&call).await? {
            Reply::Messages(messages) => Ok(messages),
            other => Err(unexpected(&call, &other)),
        }
    }

    /// Delete messages, returning how many were removed.
    pub async fn delete_messages(
        &self,
        channel: &InputChannel,
        ids: Vec<MessageId>,
    ) -> TransportResult<u32> {
        let call = Call::DeleteMessages {
            channel: channel.clone(),
            ids,
        };
        match self.invoker.invoke(&call).await? {
            Reply::Affected(count) => Ok(count),
            other => Err(unexpected(&call, &other)),
        }
    }
}

fn unexpected(call: &Call, reply: &Reply) -> TransportError {
    TransportError::UnexpectedReply {
        call: call.name(),
        reply: reply.name(),
    }
}

/// First new channel message carried by a send's updates.
pub fn sent_message(updates: &[Update]) -> Option<&Message> {
    updates.iter().find_map(|update| match update {
        Update::NewChannelMessage(message) => Some(message),
        Update::Other(_) => None,
    })
}
