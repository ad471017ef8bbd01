use crate::record::{
    CommentRecord, CredentialRecord, FeedPostRecord, SessionRecord, UserRecord, as_primitive,
};
use sqlx::PgPool;
use stammtisch_common::cursor::Cursor;
use stammtisch_common::model::{
    Id, ModelValidationError, StammtischSnowflakeGenerator,
    auth::{AccessTokenHash, PasswordDigest, Session},
    comment::{Comment, CommentBody},
    post::{Author, CreatePost, PostMarker, StoredPost},
    user::{Email, User, UserHandle, UserMarker},
};
use stammtisch_common::snowflake::{ProcessId, WorkerId};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A unique constraint was violated")]
    UniqueViolation,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

fn map_insert_error(err: sqlx::Error) -> DbError {
    let is_unique_violation = err
        .as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation);

    if is_unique_violation {
        DbError::UniqueViolation
    } else {
        DbError::Sqlx(err)
    }
}

const FEED_COLUMNS: &str = "
    posts.post_snowflake,
    posts.created_at,
    posts.kind,
    posts.title,
    posts.body,
    posts.link_url,
    posts.image_url,
    posts.author_snowflake,
    users.handle AS author_handle,
    posts.author_label
";

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<StammtischSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(StammtischSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    fn generate_snowflake(&self) -> u64 {
        self.snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()
            .get()
    }

    /// One window of the feed in `(created_at DESC, post_snowflake DESC)`
    /// order, strictly older than the cursor watermark when one is given.
    ///
    /// `limit` here is the raw row budget; callers ask for one row more than
    /// they intend to emit to learn whether another page exists.
    pub async fn fetch_feed_window(
        &self,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<StoredPost>> {
        let select = format!(
            "
            SELECT {FEED_COLUMNS}
            FROM posts.posts
            LEFT JOIN users.users ON users.user_snowflake = posts.author_snowflake
            "
        );
        let order = "
            ORDER BY posts.created_at DESC, posts.post_snowflake DESC
            LIMIT $1
        ";

        let records: Vec<FeedPostRecord> = if let Some(cursor) = cursor {
            let keyset = "
                WHERE posts.created_at < $2
                   OR (posts.created_at = $2 AND posts.post_snowflake < $3)
            ";
            sqlx::query_as(&format!("{select} {keyset} {order}"))
                .bind(limit)
                .bind(as_primitive(cursor.created_at))
                .bind(cursor.post.snowflake().get().cast_signed())
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as(&format!("{select} {order}"))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };

        let posts = records
            .into_iter()
            .map(|record| StoredPost::try_from(record).map_err(DbError::from))
            .collect::<Result<_>>()?;
        Ok(posts)
    }

    /// Comment counts for a set of posts in one grouped aggregate. Posts
    /// without comments are simply absent from the result.
    pub async fn fetch_comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<i64> = post_ids
            .iter()
            .map(|id| id.snowflake().get().cast_signed())
            .collect();

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "
            SELECT post_snowflake, COUNT(*)
            FROM posts.comments
            WHERE post_snowflake = ANY($1)
            GROUP BY post_snowflake
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, count)| (id.cast_unsigned().into(), count.cast_unsigned()))
            .collect())
    }

    pub async fn insert_post(&self, post: &CreatePost, author: &Author) -> Result<StoredPost> {
        let post_snowflake = self.generate_snowflake();
        let (author_snowflake, author_label) = author_columns(author);

        let created_at: time::PrimitiveDateTime = sqlx::query_scalar(
            "
            INSERT INTO posts.posts
                (post_snowflake, kind, title, body, link_url, image_url,
                 author_snowflake, author_label)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING created_at
            ",
        )
        .bind(post_snowflake.cast_signed())
        .bind(post.kind.as_str())
        .bind(post.title.as_deref())
        .bind(post.body.as_deref())
        .bind(post.link_url.as_deref())
        .bind(post.image_url.as_deref())
        .bind(author_snowflake)
        .bind(author_label)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredPost {
            id: post_snowflake.into(),
            created_at: created_at.as_utc(),
            kind: post.kind,
            title: post.title.clone(),
            body: post.body.clone(),
            link_url: post.link_url.clone(),
            image_url: post.image_url.clone(),
            author: author.clone(),
        })
    }

    pub async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM posts.posts WHERE post_snowflake = $1)",
        )
        .bind(post_id.snowflake().get().cast_signed())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Comments of one post, oldest first.
    pub async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records: Vec<CommentRecord> = sqlx::query_as(
            "
            SELECT
                comments.comment_snowflake,
                comments.post_snowflake,
                comments.created_at,
                comments.body,
                comments.author_snowflake,
                users.handle AS author_handle,
                comments.author_label
            FROM posts.comments
            LEFT JOIN users.users ON users.user_snowflake = comments.author_snowflake
            WHERE comments.post_snowflake = $1
            ORDER BY comments.created_at ASC, comments.comment_snowflake ASC
            ",
        )
        .bind(post_id.snowflake().get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(|record| Comment::try_from(record).map_err(DbError::from))
            .collect::<Result<_>>()?;
        Ok(comments)
    }

    pub async fn insert_comment(
        &self,
        post_id: Id<PostMarker>,
        body: &CommentBody,
        author: &Author,
    ) -> Result<Comment> {
        let comment_snowflake = self.generate_snowflake();
        let (author_snowflake, author_label) = author_columns(author);

        let created_at: time::PrimitiveDateTime = sqlx::query_scalar(
            "
            INSERT INTO posts.comments
                (comment_snowflake, post_snowflake, body, author_snowflake, author_label)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING created_at
            ",
        )
        .bind(comment_snowflake.cast_signed())
        .bind(post_id.snowflake().get().cast_signed())
        .bind(body.get())
        .bind(author_snowflake)
        .bind(author_label)
        .fetch_one(&self.pool)
        .await?;

        Ok(Comment {
            id: comment_snowflake.into(),
            post_id,
            created_at: created_at.as_utc(),
            body: body.clone(),
            author: author.clone(),
        })
    }

    pub async fn create_user(
        &self,
        handle: &UserHandle,
        email: &Email,
        digest: &PasswordDigest,
    ) -> Result<Id<UserMarker>> {
        let user_snowflake = self.generate_snowflake();

        sqlx::query(
            "
            INSERT INTO users.users
                (user_snowflake, handle, email, password_hash, password_salt)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(user_snowflake.cast_signed())
        .bind(handle.get())
        .bind(email.get())
        .bind(digest.hash.as_slice())
        .bind(digest.salt.as_slice())
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(user_snowflake.into())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record: Option<UserRecord> = sqlx::query_as(
            "SELECT user_snowflake, handle FROM users.users WHERE user_snowflake = $1",
        )
        .bind(user_id.snowflake().get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_credentials(
        &self,
        handle: &UserHandle,
    ) -> Result<Option<(User, PasswordDigest)>> {
        let record: Option<CredentialRecord> = sqlx::query_as(
            "
            SELECT user_snowflake, handle, password_hash, password_salt
            FROM users.users
            WHERE handle = $1
            ",
        )
        .bind(handle.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record
            .map(<(User, PasswordDigest)>::try_from)
            .transpose()?;
        Ok(credentials)
    }

    pub async fn insert_session(
        &self,
        user_id: Id<UserMarker>,
        token_hash: &AccessTokenHash,
        expires_after: Option<time::Duration>,
    ) -> Result<()> {
        sqlx::query(
            "
            INSERT INTO users.tokens (token_hash, user_snowflake, expires_after_seconds)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(token_hash.0.as_slice())
        .bind(user_id.snowflake().get().cast_signed())
        .bind(expires_after.map(time::Duration::whole_seconds))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_session(&self, token_hash: &AccessTokenHash) -> Result<Option<Session>> {
        let record: Option<SessionRecord> = sqlx::query_as(
            "
            SELECT user_snowflake, token_hash, created_at, expires_after_seconds
            FROM users.tokens
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let session = record.map(Session::try_from).transpose()?;
        Ok(session)
    }
}

fn author_columns(author: &Author) -> (Option<i64>, Option<&str>) {
    match author {
        Author::Principal { id, .. } => (Some(id.snowflake().get().cast_signed()), None),
        Author::Label(label) => (None, Some(label.as_str())),
    }
}
