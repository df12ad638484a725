//! Upload orchestration.
//!
//! One part is one request: resolve the channel and identity, transmit the
//! (optionally encrypted) byte stream as a single document message through a
//! request-scoped connection pool, verify the message exists, then record it
//! in the ledger. Once a message has been sent, any later failure triggers a
//! best-effort delete of that message so the caller never sees a part that
//! exists remotely without a ledger row.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use bytes::Bytes;
use ferry_core::{PartNo, UploadId, UploadPartOut, UploadStats};
use ferry_crypt::{ByteStream, Cipher};
use ferry_metadata::{MetadataError, UploadPartRow, UploadRepo};
use ferry_transport::{
    Client, ConnectionPool, Identity, InputChannel, MessageId, Uploader, sent_message,
};
use futures::Stream;
use std::io;
use std::time::Instant;
use time::OffsetDateTime;

/// A validated request to upload one part.
#[derive(Debug, Clone)]
pub struct PartUpload {
    pub upload_id: UploadId,
    pub part_no: PartNo,
    pub part_name: String,
    pub file_name: String,
    pub channel_id: Option<i64>,
    pub encrypted: bool,
    /// Declared plaintext length of the body.
    pub size: u64,
}

/// Upload one part and record it in the ledger.
pub async fn upload_part<S>(
    state: &AppState,
    user: &AuthenticatedUser,
    request: PartUpload,
    body: S,
) -> ApiResult<UploadPartOut>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let started = Instant::now();
    let result = transmit_and_record(state, user, &request, body).await;

    match &result {
        Ok(part) => {
            metrics::PARTS_UPLOADED.inc();
            metrics::BYTES_UPLOADED.inc_by(part.size.max(0) as u64);
            metrics::PART_UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
        }
        Err(e) => {
            if let ApiError::Transport(te) = e {
                metrics::record_transport_error(te.kind());
            }
            metrics::record_upload_failure(e.code());
            tracing::error!(
                upload_id = %request.upload_id,
                part_no = request.part_no.get(),
                user_id = user.user_id,
                error = %e,
                "part upload failed"
            );
        }
    }

    result
}

async fn transmit_and_record<S>(
    state: &AppState,
    user: &AuthenticatedUser,
    request: &PartUpload,
    body: S,
) -> ApiResult<UploadPartOut>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let config = &state.config;

    // Validation happens before any transport call.
    let master_key = match (&config.uploads.encryption_key, request.encrypted) {
        (Some(key), true) if !key.is_empty() => Some(key.as_str()),
        (_, true) => return Err(ApiError::EncryptionKeyMissing),
        (_, false) => None,
    };
    if request.size == 0 || request.size > config.server.max_part_size {
        return Err(ferry_core::Error::InvalidPartSize {
            size: request.size,
            max: config.server.max_part_size,
        }
        .into());
    }

    let channel_id = match request.channel_id {
        Some(id) => id,
        None => state
            .lookups
            .default_channel(user.user_id)
            .await?
            .ok_or_else(|| {
                ApiError::BadRequest("no channel given and no default channel set".to_string())
            })?,
    };

    let now = OffsetDateTime::now_utc();
    let cutoff = state.retention_cutoff(now);
    if let Some(existing) = state
        .metadata
        .get_part(request.upload_id.as_str(), request.part_no.get())
        .await?
        && existing.created_at > cutoff
    {
        return Err(ApiError::Conflict(format!(
            "part {} of upload {} already exists",
            request.part_no, request.upload_id
        )));
    }

    let (identity, identity_index) = resolve_identity(state, user, channel_id).await?;
    let attribution = identity.attribution();

    let pool = ConnectionPool::from_config(
        state.connector.clone(),
        identity,
        &config.transport,
        &state.middleware,
    );
    pool.authenticate().await?;
    let client = pool.default_client();
    let channel = client.get_channel(channel_id).await?;

    let (salt, stream, size): (String, ByteStream, u64) = match master_key {
        Some(key) => {
            let salt = ferry_crypt::generate_salt();
            let cipher = Cipher::new(key, &salt)?;
            let size = ferry_crypt::encrypted_size(request.size);
            (salt, cipher.encrypt(body), size)
        }
        None => (String::new(), Box::pin(body), request.size),
    };

    tracing::debug!(
        upload_id = %request.upload_id,
        part_no = request.part_no.get(),
        file_name = %request.file_name,
        channel_id,
        attribution = %attribution,
        identity_index,
        size,
        "uploading part"
    );

    let file = Uploader::new(client.clone())
        .with_threads(config.uploads.threads)
        .with_chunk_size(config.uploads.chunk_size)
        .upload(&request.part_name, size, stream)
        .await?;

    let updates = client.send_media(&channel, file).await?;
    let message_id = match sent_message(&updates).map(|message| message.id) {
        Some(id) if id != 0 => id,
        _ => {
            return Err(ApiError::UploadFailed(
                "send confirmed without a message id".to_string(),
            ));
        }
    };

    match client.get_messages(&channel, vec![message_id]).await {
        Ok(messages) if !messages.is_empty() => {}
        Ok(_) => {
            compensate(&client, &channel, message_id).await;
            return Err(ApiError::UploadFailed(format!(
                "message {message_id} not found after send"
            )));
        }
        Err(e) => {
            compensate(&client, &channel, message_id).await;
            return Err(e.into());
        }
    }

    let row = UploadPartRow {
        upload_id: request.upload_id.as_str().to_string(),
        part_no: request.part_no.get(),
        name: request.part_name.clone(),
        channel_id,
        part_id: message_id,
        size: i64::try_from(size)
            .map_err(|_| ApiError::Internal(format!("part size {size} out of range")))?,
        user_id: user.user_id,
        encrypted: request.encrypted,
        salt: (!salt.is_empty()).then_some(salt),
        created_at: OffsetDateTime::now_utc(),
    };

    if let Err(e) = state.metadata.create_part(&row, cutoff).await {
        compensate(&client, &channel, message_id).await;
        return Err(match e {
            MetadataError::AlreadyExists(what) => ApiError::Conflict(what),
            other => other.into(),
        });
    }

    tracing::debug!(
        upload_id = %request.upload_id,
        part_no = request.part_no.get(),
        part_id = message_id,
        attribution = %attribution,
        "part uploaded"
    );

    Ok(row.into_part_out())
}

/// Pick the identity that sends this part.
///
/// Delegated identities registered for the channel take turns; without any,
/// the caller's own session is used.
async fn resolve_identity(
    state: &AppState,
    user: &AuthenticatedUser,
    channel_id: i64,
) -> ApiResult<(Identity, Option<usize>)> {
    let tokens = state.lookups.bot_tokens(user.user_id, channel_id).await?;
    state.credentials.set(&tokens, channel_id);

    match state.credentials.next(channel_id) {
        Some((token, index)) => Ok((Identity::Delegated { token }, Some(index))),
        None => Ok((
            Identity::User {
                user_id: user.user_id,
                session: user.transport_session.clone(),
            },
            None,
        )),
    }
}

/// Best-effort delete of a message that will not be recorded.
async fn compensate(client: &Client, channel: &InputChannel, message_id: MessageId) {
    tracing::warn!(
        channel_id = channel.channel_id,
        message_id,
        "deleting sent message that was not recorded"
    );
    match client.delete_messages(channel, vec![message_id]).await {
        Ok(_) => metrics::record_compensating_delete("ok"),
        Err(e) => {
            metrics::record_compensating_delete("failed");
            tracing::warn!(
                channel_id = channel.channel_id,
                message_id,
                error = %e,
                "compensating delete failed"
            );
        }
    }
}

/// Non-expired parts of an upload, ordered by part number.
pub async fn list_parts(state: &AppState, upload_id: &UploadId) -> ApiResult<Vec<UploadPartOut>> {
    let cutoff = state.retention_cutoff(OffsetDateTime::now_utc());
    let rows = state.metadata.get_parts(upload_id.as_str(), cutoff).await?;
    Ok(rows.into_iter().map(UploadPartRow::into_part_out).collect())
}

/// Remove every ledger row of an upload. Remote messages are left in place.
pub async fn delete_upload(state: &AppState, upload_id: &UploadId) -> ApiResult<u64> {
    let deleted = state.metadata.delete_upload(upload_id.as_str()).await?;
    tracing::debug!(upload_id = %upload_id, deleted, "deleted upload");
    Ok(deleted)
}

/// Per-day totals for the caller over the trailing `days` days.
pub async fn upload_stats(
    state: &AppState,
    user: &AuthenticatedUser,
    days: u32,
) -> ApiResult<Vec<UploadStats>> {
    let today = OffsetDateTime::now_utc().date();
    let rows = state
        .metadata
        .upload_stats(user.user_id, days, today)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| UploadStats {
            upload_date: row.upload_date,
            total_uploaded: row.total_uploaded,
        })
        .collect())
}

trait IntoPartOut {
    fn into_part_out(self) -> UploadPartOut;
}

impl IntoPartOut for UploadPartRow {
    fn into_part_out(self) -> UploadPartOut {
        UploadPartOut {
            name: self.name,
            part_id: self.part_id,
            part_no: self.part_no,
            channel_id: self.channel_id,
            size: self.size,
            encrypted: self.encrypted,
            salt: self.salt.unwrap_or_default(),
        }
    }
}
