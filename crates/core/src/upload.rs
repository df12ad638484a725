//! Upload session identifiers and part descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::Date;

time::serde::format_description!(upload_date_format, Date, "[year]-[month]-[day]");

/// Maximum length of an upload session identifier.
const MAX_UPLOAD_ID_LEN: usize = 255;

/// Maximum length of a part name.
const MAX_PART_NAME_LEN: usize = 1024;

/// Identifier grouping all parts of one file upload.
///
/// Sessions are never stored as rows of their own; the id is the join key
/// for ledger records. Ids are chosen by the client and must be non-empty
/// and made of ASCII alphanumerics, `-`, `_` or `.`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UploadId(String);

impl UploadId {
    /// Parse and validate an upload id.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() || s.len() > MAX_UPLOAD_ID_LEN {
            return Err(crate::Error::InvalidUploadId(format!(
                "length must be between 1 and {MAX_UPLOAD_ID_LEN}"
            )));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(crate::Error::InvalidUploadId(format!(
                "unexpected character {c:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UploadId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<UploadId> for String {
    fn from(id: UploadId) -> Self {
        id.0
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordering key of a part within its session. Numbering starts at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct PartNo(i32);

impl PartNo {
    pub fn new(n: i64) -> crate::Result<Self> {
        match i32::try_from(n) {
            Ok(v) if v >= 1 => Ok(Self(v)),
            _ => Err(crate::Error::InvalidPartNo(n)),
        }
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl TryFrom<i64> for PartNo {
    type Error = crate::Error;

    fn try_from(value: i64) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<PartNo> for i32 {
    fn from(n: PartNo) -> Self {
        n.0
    }
}

impl fmt::Display for PartNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters of an "upload one part" request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    /// Name given to the transmitted message.
    pub part_name: String,
    /// Name of the file the part belongs to (observability only).
    #[serde(default)]
    pub file_name: String,
    /// Part number within the session.
    pub part_no: i64,
    /// Destination channel. Falls back to the owner's default channel.
    #[serde(default)]
    pub channel_id: Option<i64>,
    /// Encrypt the part before transmitting it.
    #[serde(default)]
    pub encrypted: bool,
}

impl UploadQuery {
    /// Validate request shape before any transport work.
    pub fn validate(&self) -> crate::Result<PartNo> {
        let name = self.part_name.trim();
        if name.is_empty() || name.len() > MAX_PART_NAME_LEN {
            return Err(crate::Error::InvalidPartName(
                "part name must be between 1 and 1024 bytes".to_string(),
            ));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(crate::Error::InvalidPartName(format!(
                "part name contains a path separator: {name}"
            )));
        }
        PartNo::new(self.part_no)
    }
}

/// Descriptor of one recorded part, as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPartOut {
    pub name: String,
    /// Transport-assigned identifier of the transmitted message.
    pub part_id: i64,
    pub part_no: i32,
    pub channel_id: i64,
    /// Transmitted byte length (ciphertext length when encrypted).
    pub size: i64,
    pub encrypted: bool,
    /// Encryption salt, empty for plaintext parts.
    pub salt: String,
}

/// All live parts of a session, ordered by part number.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UploadOut {
    pub parts: Vec<UploadPartOut>,
}

/// Bytes uploaded by one owner on one calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStats {
    #[serde(with = "upload_date_format")]
    pub upload_date: Date,
    pub total_uploaded: i64,
}
