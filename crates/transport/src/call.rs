//! Transport calls and replies.
//!
//! Every remote operation is a [`Call`] value answered by a [`Reply`]. Keeping
//! calls as data lets middleware decorate a single `invoke` entry point
//! regardless of the operation.

use bytes::Bytes;

pub type ChannelId = i64;
pub type MessageId = i64;

/// Resolved reference to a channel, as required by channel-scoped calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputChannel {
    pub channel_id: ChannelId,
    pub access_hash: i64,
}

/// A file whose chunks have been saved and which can be attached to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFile {
    pub file_id: i64,
    pub parts: u32,
    pub name: String,
    pub size: u64,
}

/// Document attached to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub size: u64,
}

/// A message stored in a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// Attribution of the identity that sent the message.
    pub from: String,
    pub document: Option<Document>,
}

/// Update returned by a send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    NewChannelMessage(Message),
    Other(&'static str),
}

/// A single remote operation.
#[derive(Clone, Debug)]
pub enum Call {
    GetChannel {
        channel_id: ChannelId,
    },
    SaveFilePart {
        file_id: i64,
        part: u32,
        total_parts: u32,
        bytes: Bytes,
    },
    SendMedia {
        channel: InputChannel,
        file: InputFile,
        force_file: bool,
    },
    GetMessages {
        channel: InputChannel,
        ids: Vec<MessageId>,
    },
    DeleteMessages {
        channel: InputChannel,
        ids: Vec<MessageId>,
    },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetChannel { .. } => "get_channel",
            Self::SaveFilePart { .. } => "save_file_part",
            Self::SendMedia { .. } => "send_media",
            Self::GetMessages { .. } => "get_messages",
            Self::DeleteMessages { .. } => "delete_messages",
        }
    }
}

/// Answer to a [`Call`].
#[derive(Clone, Debug)]
pub enum Reply {
    Channel(InputChannel),
    PartSaved,
    Updates(Vec<Update>),
    Messages(Vec<Message>),
    Affected(u32),
}

impl Reply {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::PartSaved => "part_saved",
            Self::Updates(_) => "updates",
            Self::Messages(_) => "messages",
            Self::Affected(_) => "affected",
        }
    }
}
