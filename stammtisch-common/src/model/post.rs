use crate::model::{
    Id,
    user::{UserHandle, UserMarker},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use thiserror::Error;
use time::UtcDateTime;

pub const TITLE_MAX_LEN: usize = 140;
pub const AUTHOR_LABEL_MAX_LEN: usize = 80;

/// Display label written for anonymous authors when none is supplied.
/// Applied at write time only; reads return stored labels verbatim.
pub const GUEST_AUTHOR_LABEL: &str = "Guest";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Text,
    Link,
    Photo,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown post kind: {0}")]
pub struct InvalidPostKindError(String);

impl PostKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PostKind::Text => "text",
            PostKind::Link => "link",
            PostKind::Photo => "photo",
        }
    }
}

impl Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostKind {
    type Err = InvalidPostKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(PostKind::Text),
            "link" => Ok(PostKind::Link),
            "photo" => Ok(PostKind::Photo),
            other => Err(InvalidPostKindError(other.to_owned())),
        }
    }
}

/// Who wrote a post or comment, resolved at read time.
///
/// A stored row carries either a principal reference or a free-text label,
/// never both. Display names come from here and nowhere else: a referenced
/// principal contributes their current handle, an anonymous row contributes
/// its label verbatim.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Author {
    Principal {
        id: Id<UserMarker>,
        handle: UserHandle,
    },
    Label(String),
}

impl Author {
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Author::Principal { handle, .. } => handle.get(),
            Author::Label(label) => label,
        }
    }

    #[must_use]
    pub fn reference(&self) -> Option<Id<UserMarker>> {
        match self {
            Author::Principal { id, .. } => Some(*id),
            Author::Label(_) => None,
        }
    }
}

/// A post as it exists in the store, before comment counts are attached.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StoredPost {
    pub id: Id<PostMarker>,
    pub created_at: UtcDateTime,
    pub kind: PostKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub author: Author,
}

impl StoredPost {
    #[must_use]
    pub fn into_feed_post(self, comment_count: u64) -> FeedPost {
        FeedPost {
            id: self.id,
            created_at: self.created_at,
            kind: self.kind,
            title: self.title,
            body: self.body,
            link_url: self.link_url,
            image_url: self.image_url,
            author_name: self.author.display_name().to_owned(),
            comment_count,
        }
    }
}

/// The wire view of a post in a feed page.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: Id<PostMarker>,
    pub created_at: UtcDateTime,
    #[serde(rename = "type")]
    pub kind: PostKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link_url: Option<String>,
    pub image_url: Option<String>,
    pub author_name: String,
    pub comment_count: u64,
}

/// One page of the feed, most recent first. A missing `next_cursor` means
/// the end of the feed was reached.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedPost>,
    pub next_cursor: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct CreatePost {
    #[serde(rename = "type")]
    pub kind: PostKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum InvalidPostError {
    #[error("{field} is required for {kind} posts")]
    MissingField {
        kind: PostKind,
        field: &'static str,
    },
    #[error("{field} exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
}

impl CreatePost {
    /// Per-kind payload validation: exactly the field the kind calls for has
    /// to be present and non-empty.
    pub fn validate(&self) -> Result<(), InvalidPostError> {
        let missing_field = |field| InvalidPostError::MissingField {
            kind: self.kind,
            field,
        };

        match self.kind {
            PostKind::Text if is_blank(self.body.as_deref()) => return Err(missing_field("body")),
            PostKind::Link if is_blank(self.link_url.as_deref()) => {
                return Err(missing_field("link_url"));
            }
            PostKind::Photo if is_blank(self.image_url.as_deref()) => {
                return Err(missing_field("image_url"));
            }
            PostKind::Text | PostKind::Link | PostKind::Photo => {}
        }

        if exceeds(self.title.as_deref(), TITLE_MAX_LEN) {
            return Err(InvalidPostError::FieldTooLong {
                field: "title",
                max: TITLE_MAX_LEN,
            });
        }
        if exceeds(self.author_name.as_deref(), AUTHOR_LABEL_MAX_LEN) {
            return Err(InvalidPostError::FieldTooLong {
                field: "author_name",
                max: AUTHOR_LABEL_MAX_LEN,
            });
        }

        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(str::is_empty)
}

fn exceeds(value: Option<&str>, max: usize) -> bool {
    value.is_some_and(|value| value.chars().count() > max)
}
