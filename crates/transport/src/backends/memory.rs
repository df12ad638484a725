//! In-process transport backend.
//!
//! Simulates a remote message service: identities authenticate against
//! registered sessions and tokens, chunks are assembled into documents, and
//! messages live in per-channel maps. Faults can be injected per call name to
//! exercise the middleware and the orchestrator's failure paths.

use crate::call::{
    Call, ChannelId, Document, InputChannel, InputFile, Message, MessageId, Reply, Update,
};
use crate::error::{TransportError, TransportResult};
use crate::identity::Identity;
use crate::traits::{Connection, Connector, Invoker};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// In-memory transport.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    auto_provision: bool,
    sessions: DashMap<String, i64>,
    bots: DashSet<String>,
    channels: DashMap<ChannelId, Channel>,
    pending: DashMap<(String, i64), BTreeMap<u32, Bytes>>,
    faults: Mutex<Faults>,
    deletes: Mutex<Vec<(ChannelId, MessageId)>>,
    calls: DashMap<&'static str, usize>,
    open_connections: AtomicUsize,
    connections_opened: AtomicUsize,
}

struct Channel {
    access_hash: i64,
    next_id: MessageId,
    messages: BTreeMap<MessageId, (Message, Bytes)>,
}

impl Channel {
    fn new(channel_id: ChannelId) -> Self {
        Self {
            access_hash: channel_id.wrapping_mul(31).wrapping_add(7),
            next_id: 1,
            messages: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct Faults {
    flood_waits: HashMap<&'static str, VecDeque<Duration>>,
    disconnects: HashMap<&'static str, u32>,
    rpc_errors: HashMap<&'static str, VecDeque<(i32, String)>>,
    hide_messages: bool,
    fail_deletes: bool,
    zero_message_ids: bool,
}

impl MemoryState {
    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next injected failure for `call`, if any.
    fn take_fault(&self, call: &'static str) -> Option<TransportError> {
        let mut faults = self.faults();
        if let Some(wait) = faults.flood_waits.get_mut(call).and_then(VecDeque::pop_front) {
            return Some(TransportError::FloodWait(wait));
        }
        if let Some(n) = faults.disconnects.get_mut(call)
            && *n > 0
        {
            *n -= 1;
            return Some(TransportError::Disconnected(format!(
                "injected disconnect on {call}"
            )));
        }
        if let Some((code, message)) = faults.rpc_errors.get_mut(call).and_then(VecDeque::pop_front)
        {
            return Some(TransportError::Rpc { code, message });
        }
        None
    }

    fn channel_known(&self, channel_id: ChannelId) -> bool {
        if self.auto_provision {
            self.channels
                .entry(channel_id)
                .or_insert_with(|| Channel::new(channel_id));
        }
        self.channels.contains_key(&channel_id)
    }

    fn check_channel(&self, channel: &InputChannel) -> TransportResult<()> {
        match self.channels.get(&channel.channel_id) {
            Some(c) if c.access_hash == channel.access_hash => Ok(()),
            _ => Err(TransportError::Rpc {
                code: 400,
                message: "CHANNEL_INVALID".to_string(),
            }),
        }
    }
}

impl MemoryTransport {
    /// Transport that only accepts registered identities and channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that accepts any identity and creates channels on first use.
    pub fn auto_provisioning() -> Self {
        Self {
            state: Arc::new(MemoryState {
                auto_provision: true,
                ..MemoryState::default()
            }),
        }
    }

    pub fn add_user_session(&self, session: impl Into<String>, user_id: i64) {
        self.state.sessions.insert(session.into(), user_id);
    }

    pub fn add_bot(&self, token: impl Into<String>) {
        self.state.bots.insert(token.into());
    }

    pub fn add_channel(&self, channel_id: ChannelId) {
        self.state
            .channels
            .entry(channel_id)
            .or_insert_with(|| Channel::new(channel_id));
    }

    // ----- Fault injection -----

    /// Answer the next `call` with a flood wait of `wait`.
    pub fn inject_flood_wait(&self, call: &'static str, wait: Duration) {
        self.state
            .faults()
            .flood_waits
            .entry(call)
            .or_default()
            .push_back(wait);
    }

    /// Drop the connection on the next `times` calls named `call`.
    pub fn inject_disconnects(&self, call: &'static str, times: u32) {
        *self.state.faults().disconnects.entry(call).or_default() += times;
    }

    pub fn inject_rpc_error(&self, call: &'static str, code: i32, message: &str) {
        self.state
            .faults()
            .rpc_errors
            .entry(call)
            .or_default()
            .push_back((code, message.to_string()));
    }

    /// Make sent messages invisible to `get_messages`.
    pub fn set_hide_messages(&self, hide: bool) {
        self.state.faults().hide_messages = hide;
    }

    /// Reject every delete request (requests are still recorded).
    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.faults().fail_deletes = fail;
    }

    /// Confirm sends with a zero message id.
    pub fn set_zero_message_ids(&self, zero: bool) {
        self.state.faults().zero_message_ids = zero;
    }

    // ----- Inspection -----

    /// Every `(channel, message)` a delete was requested for, in order.
    pub fn delete_requests(&self) -> Vec<(ChannelId, MessageId)> {
        self.state
            .deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self, channel_id: ChannelId) -> Vec<Message> {
        self.state
            .channels
            .get(&channel_id)
            .map(|c| c.messages.values().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }

    /// Content of the document attached to a message.
    pub fn message_bytes(&self, channel_id: ChannelId, id: MessageId) -> Option<Bytes> {
        self.state
            .channels
            .get(&channel_id)
            .and_then(|c| c.messages.get(&id).map(|(_, bytes)| bytes.clone()))
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state.calls.get(call).map(|n| *n).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.calls.iter().map(|entry| *entry.value()).sum()
    }

    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::Acquire)
    }

    pub fn connections_opened(&self) -> usize {
        self.state.connections_opened.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MemoryTransport {
    async fn connect(&self, identity: &Identity) -> TransportResult<Arc<dyn Connection>> {
        let state = &self.state;
        if !state.auto_provision {
            let accepted = match identity {
                Identity::User { user_id, session } => {
                    state.sessions.get(session).is_some_and(|id| *id == *user_id)
                }
                Identity::Delegated { token } => state.bots.contains(token),
            };
            if !accepted {
                return Err(TransportError::Auth(format!(
                    "{} rejected by remote",
                    identity.key()
                )));
            }
        }

        state.open_connections.fetch_add(1, Ordering::AcqRel);
        state.connections_opened.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::new(MemoryConnection {
            state: state.clone(),
            owner: identity.key(),
            from: identity.attribution(),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryConnection {
    state: Arc<MemoryState>,
    owner: String,
    from: String,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn save_part(&self, file_id: i64, part: u32, total: u32, bytes: &Bytes) -> TransportResult<Reply> {
        if part >= total {
            return Err(rpc_invalid("FILE_PART_INVALID"));
        }
        if bytes.len() > ferry_core::MAX_CHUNK_SIZE {
            return Err(rpc_invalid("FILE_PART_TOO_BIG"));
        }
        self.state
            .pending
            .entry((self.owner.clone(), file_id))
            .or_default()
            .insert(part, bytes.clone());
        Ok(Reply::PartSaved)
    }

    fn send_media(&self, channel: &InputChannel, file: &InputFile) -> TransportResult<Reply> {
        self.state.check_channel(channel)?;

        let (_, parts) = self
            .state
            .pending
            .remove(&(self.owner.clone(), file.file_id))
            .ok_or_else(|| rpc_invalid("FILE_PARTS_INVALID"))?;
        let contiguous = parts.keys().copied().eq(0..file.parts);
        let total: u64 = parts.values().map(|b| b.len() as u64).sum();
        if !contiguous || total != file.size {
            return Err(rpc_invalid("FILE_PARTS_INVALID"));
        }
        let mut content = BytesMut::with_capacity(total as usize);
        for bytes in parts.values() {
            content.extend_from_slice(bytes);
        }

        let zero_ids = self.state.faults().zero_message_ids;
        let mut entry = self
            .state
            .channels
            .get_mut(&channel.channel_id)
            .ok_or_else(|| rpc_invalid("CHANNEL_INVALID"))?;
        let id = entry.next_id;
        entry.next_id += 1;
        let message = Message {
            id,
            channel_id: channel.channel_id,
            from: self.from.clone(),
            document: Some(Document {
                name: file.name.clone(),
                size: file.size,
            }),
        };
        entry
            .messages
            .insert(id, (message.clone(), content.freeze()));

        let confirmed = Message {
            id: if zero_ids { 0 } else { id },
            ..message
        };
        Ok(Reply::Updates(vec![
            Update::Other("message_id"),
            Update::NewChannelMessage(confirmed),
        ]))
    }

    fn get_messages(&self, channel: &InputChannel, ids: &[MessageId]) -> TransportResult<Reply> {
        self.state.check_channel(channel)?;
        if self.state.faults().hide_messages {
            return Ok(Reply::Messages(Vec::new()));
        }
        let found = self
            .state
            .channels
            .get(&channel.channel_id)
            .map(|c| {
                ids.iter()
                    .filter_map(|id| c.messages.get(id).map(|(m, _)| m.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Reply::Messages(found))
    }

    fn delete_messages(&self, channel: &InputChannel, ids: &[MessageId]) -> TransportResult<Reply> {
        self.state
            .deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(ids.iter().map(|id| (channel.channel_id, *id)));

        if self.state.faults().fail_deletes {
            return Err(TransportError::Rpc {
                code: 403,
                message: "MESSAGE_DELETE_FORBIDDEN".to_string(),
            });
        }
        self.state.check_channel(channel)?;
        let removed = self
            .state
            .channels
            .get_mut(&channel.channel_id)
            .map(|mut c| ids.iter().filter(|id| c.messages.remove(*id).is_some()).count())
            .unwrap_or(0);
        Ok(Reply::Affected(removed as u32))
    }
}

fn rpc_invalid(message: &str) -> TransportError {
    TransportError::Rpc {
        code: 400,
        message: message.to_string(),
    }
}

#[async_trait]
impl Invoker for MemoryConnection {
    async fn invoke(&self, call: &Call) -> TransportResult<Reply> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        *self.state.calls.entry(call.name()).or_default() += 1;
        if let Some(fault) = self.state.take_fault(call.name()) {
            return Err(fault);
        }

        match call {
            Call::GetChannel { channel_id } => {
                if !self.state.channel_known(*channel_id) {
                    return Err(rpc_invalid("CHANNEL_INVALID"));
                }
                let access_hash = self
                    .state
                    .channels
                    .get(channel_id)
                    .map(|c| c.access_hash)
                    .ok_or_else(|| rpc_invalid("CHANNEL_INVALID"))?;
                Ok(Reply::Channel(InputChannel {
                    channel_id: *channel_id,
                    access_hash,
                }))
            }
            Call::SaveFilePart {
                file_id,
                part,
                total_parts,
                bytes,
            } => self.save_part(*file_id, *part, *total_parts, bytes),
            Call::SendMedia { channel, file, .. } => self.send_media(channel, file),
            Call::GetMessages { channel, ids } => self.get_messages(channel, ids),
            Call::DeleteMessages { channel, ids } => self.delete_messages(channel, ids),
        }
    }
}

impl Connection for MemoryConnection {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.open_connections.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}
