pub mod auth;
pub mod comment;
pub mod post;
pub mod user;

use crate::{
    model::{
        auth::InvalidTokenHashError,
        comment::EmptyCommentBodyError,
        post::InvalidPostKindError,
        user::{InvalidEmailError, InvalidUserHandleError},
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::NonPositiveDurationError,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

/// Errors turning raw stored values back into domain models.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserHandle(#[from] InvalidUserHandleError),
    #[error(transparent)]
    Email(#[from] InvalidEmailError),
    #[error(transparent)]
    PostKind(#[from] InvalidPostKindError),
    #[error(transparent)]
    CommentBody(#[from] EmptyCommentBodyError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidTokenHashError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct StammtischEpoch;
impl Epoch for StammtischEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type StammtischSnowflake = Snowflake<StammtischEpoch>;
pub type StammtischSnowflakeGenerator = SnowflakeGenerator<StammtischEpoch>;

#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(StammtischSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: StammtischSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> StammtischSnowflake {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<StammtischSnowflake> for Id<Marker> {
    fn from(value: StammtischSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for StammtischSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(StammtischSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}
