use crate::model::{
    Id,
    post::{Author, PostMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

/// A comment as it exists in the store.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post_id: Id<PostMarker>,
    pub created_at: UtcDateTime,
    pub body: CommentBody,
    pub author: Author,
}

impl Comment {
    #[must_use]
    pub fn into_view(self) -> CommentView {
        CommentView {
            id: self.id,
            post_id: self.post_id,
            created_at: self.created_at,
            author_name: self.author.display_name().to_owned(),
            body: self.body.into_inner(),
        }
    }
}

/// The wire view of a comment.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct CommentView {
    pub id: Id<CommentMarker>,
    pub post_id: Id<PostMarker>,
    pub created_at: UtcDateTime,
    pub body: String,
    pub author_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct CreateComment {
    pub body: CommentBody,
    #[serde(default)]
    pub author_name: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentBody(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Comment body must not be empty")]
pub struct EmptyCommentBodyError;

impl CommentBody {
    pub fn new(body: String) -> Result<Self, EmptyCommentBodyError> {
        if body.is_empty() {
            Err(EmptyCommentBodyError)
        } else {
            Ok(CommentBody(body))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for CommentBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentBody::new(inner)
            .map_err(|_| Error::invalid_value(Unexpected::Str(""), &"a non-empty comment body"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::comment::CommentBody;

    #[test]
    fn body_must_not_be_empty() {
        assert!(CommentBody::new(String::new()).is_err());
        assert!(CommentBody::new("cheers".into()).is_ok());
    }

    #[test]
    fn empty_body_rejected_at_deserialization() {
        assert!(serde_json::from_str::<CommentBody>("\"\"").is_err());
        assert_eq!(
            serde_json::from_str::<CommentBody>("\"prost\"").unwrap(),
            CommentBody::new("prost".into()).unwrap()
        );
    }
}
