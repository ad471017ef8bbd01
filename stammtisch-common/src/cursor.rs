//! The opaque pagination cursor.
//!
//! A cursor is the `(created_at, post id)` watermark of the last row a page
//! emitted. It travels as unpadded URL-safe base64 over a `nanos:id` payload,
//! which keeps it out of casual inspection without pretending to be
//! cryptographic. The codec knows nothing about page sizes or queries.

use crate::model::{Id, post::PostMarker};
use base64::{DecodeError, Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use std::{num::ParseIntError, str::FromStr, str::Utf8Error};
use thiserror::Error;
use time::UtcDateTime;

/// Exclusive lower bound of the next feed page in `(created_at, id)` order.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Cursor {
    pub created_at: UtcDateTime,
    pub post: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum InvalidCursorError {
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Cursor payload is not UTF-8")]
    NotUtf8(#[from] Utf8Error),
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(ParseIntError),
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(#[from] time::error::ComponentRange),
    #[error("Invalid post id: {0}")]
    InvalidPostId(ParseIntError),
}

impl Cursor {
    #[must_use]
    pub fn new(created_at: UtcDateTime, post: Id<PostMarker>) -> Self {
        Self { created_at, post }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let payload = format!(
            "{}:{}",
            self.created_at.unix_timestamp_nanos(),
            self.post.snowflake().get()
        );
        BASE64_URL_SAFE_NO_PAD.encode(payload)
    }

    pub fn decode(token: &str) -> Result<Self, InvalidCursorError> {
        token.parse()
    }
}

impl FromStr for Cursor {
    type Err = InvalidCursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = BASE64_URL_SAFE_NO_PAD.decode(s)?;
        let payload = std::str::from_utf8(&bytes)?;

        let (nanos_part, id_part) = payload
            .split_once(':')
            .ok_or(InvalidCursorError::NotEnoughParts)?;

        let nanos = i128::from_str(nanos_part).map_err(InvalidCursorError::InvalidTimestamp)?;
        let created_at = UtcDateTime::from_unix_timestamp_nanos(nanos)?;
        let post = u64::from_str(id_part)
            .map_err(InvalidCursorError::InvalidPostId)?
            .into();

        Ok(Self { created_at, post })
    }
}
