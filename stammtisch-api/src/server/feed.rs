//! The feed pipeline: cache lookup, keyset window query, page assembly.

use crate::server::{Result, ServerError};
use async_trait::async_trait;
use stammtisch_cache::Cache;
use stammtisch_common::{
    cursor::Cursor,
    model::{
        Id,
        comment::{Comment, CommentBody, CommentView, CreateComment},
        post::{Author, CreatePost, FeedPage, FeedPost, GUEST_AUTHOR_LABEL, PostMarker, StoredPost},
        user::User,
    },
};
use stammtisch_db::client::{DbClient, DbError};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::debug;

pub const FEED_DEFAULT_LIMIT: i64 = 10;
pub const FEED_MIN_LIMIT: i64 = 1;
pub const FEED_MAX_LIMIT: i64 = 50;

/// The store-side query contract the feed pipeline runs against.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Rows in `(created_at DESC, id DESC)` order, strictly older than the
    /// cursor watermark when one is given, at most `limit` of them.
    async fn feed_window(
        &self,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<StoredPost>, DbError>;

    /// One grouped aggregate; posts without comments are absent.
    async fn comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>, DbError>;

    async fn insert_post(&self, post: &CreatePost, author: &Author) -> Result<StoredPost, DbError>;

    async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool, DbError>;

    async fn post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>, DbError>;

    async fn insert_comment(
        &self,
        post_id: Id<PostMarker>,
        body: &CommentBody,
        author: &Author,
    ) -> Result<Comment, DbError>;
}

#[async_trait]
impl FeedStore for DbClient {
    async fn feed_window(
        &self,
        limit: i64,
        cursor: Option<&Cursor>,
    ) -> Result<Vec<StoredPost>, DbError> {
        self.fetch_feed_window(limit, cursor).await
    }

    async fn comment_counts(
        &self,
        post_ids: &[Id<PostMarker>],
    ) -> Result<HashMap<Id<PostMarker>, u64>, DbError> {
        self.fetch_comment_counts(post_ids).await
    }

    async fn insert_post(&self, post: &CreatePost, author: &Author) -> Result<StoredPost, DbError> {
        DbClient::insert_post(self, post, author).await
    }

    async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool, DbError> {
        DbClient::post_exists(self, post_id).await
    }

    async fn post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>, DbError> {
        self.fetch_post_comments(post_id).await
    }

    async fn insert_comment(
        &self,
        post_id: Id<PostMarker>,
        body: &CommentBody,
        author: &Author,
    ) -> Result<Comment, DbError> {
        DbClient::insert_comment(self, post_id, body, author).await
    }
}

/// Orchestrates feed reads and writes.
///
/// Reads go cache → store → cache; writes go straight to the store and never
/// touch the cache, so a page can be up to the configured TTL stale.
pub struct FeedService {
    store: Arc<dyn FeedStore>,
    cache: Arc<dyn Cache>,
    feed_ttl: Duration,
}

impl FeedService {
    #[must_use]
    pub fn new(store: Arc<dyn FeedStore>, cache: Arc<dyn Cache>, feed_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            feed_ttl,
        }
    }

    pub async fn feed_page(
        &self,
        limit: Option<i64>,
        cursor_token: Option<&str>,
    ) -> Result<FeedPage> {
        let limit = limit
            .unwrap_or(FEED_DEFAULT_LIMIT)
            .clamp(FEED_MIN_LIMIT, FEED_MAX_LIMIT);
        let cursor = cursor_token.map(Cursor::decode).transpose()?;

        let cache_key = feed_page_key(limit, cursor_token);
        if let Some(cached) = self.cache.get(&cache_key).await {
            match serde_json::from_str::<FeedPage>(&cached) {
                Ok(page) => return Ok(page),
                Err(err) => debug!(error = %err, "Stale cache entry shape, treating as miss"),
            }
        }

        let page = self.assemble_page(limit, cursor.as_ref()).await?;

        if let Ok(json) = serde_json::to_string(&page) {
            self.cache.set(&cache_key, json, self.feed_ttl).await;
        }

        Ok(page)
    }

    async fn assemble_page(&self, limit: i64, cursor: Option<&Cursor>) -> Result<FeedPage> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let page_len = limit as usize;

        // One extra row tells us whether another page exists; it is never
        // emitted and never feeds the continuation cursor.
        let mut posts = self.store.feed_window(limit + 1, cursor).await?;
        let has_more = posts.len() > page_len;
        posts.truncate(page_len);

        let post_ids: Vec<_> = posts.iter().map(|post| post.id).collect();
        let counts = self.store.comment_counts(&post_ids).await?;

        let next_cursor = if has_more {
            posts
                .last()
                .map(|last| Cursor::new(last.created_at, last.id).encode())
        } else {
            None
        };

        let items = posts
            .into_iter()
            .map(|post| {
                let comment_count = counts.get(&post.id).copied().unwrap_or(0);
                post.into_feed_post(comment_count)
            })
            .collect();

        Ok(FeedPage { items, next_cursor })
    }

    pub async fn create_post(
        &self,
        principal: Option<&User>,
        request: CreatePost,
    ) -> Result<FeedPost> {
        request.validate()?;

        let author = resolve_write_author(principal, request.author_name.clone());
        let stored = self.store.insert_post(&request, &author).await?;

        Ok(stored.into_feed_post(0))
    }

    pub async fn post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<CommentView>> {
        let comments = self.store.post_comments(post_id).await?;
        Ok(comments.into_iter().map(Comment::into_view).collect())
    }

    pub async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        principal: Option<&User>,
        request: CreateComment,
    ) -> Result<CommentView> {
        if !self.store.post_exists(post_id).await? {
            return Err(ServerError::PostByIdNotFound(post_id));
        }

        let author = resolve_write_author(principal, request.author_name);
        let comment = self
            .store
            .insert_comment(post_id, &request.body, &author)
            .await?;

        Ok(comment.into_view())
    }
}

/// Cache keys derive from the logical query shape only.
fn feed_page_key(limit: i64, cursor_token: Option<&str>) -> String {
    format!(
        "feed:limit={limit}:cursor={}",
        cursor_token.unwrap_or_default()
    )
}

/// Write-time author resolution: a principal always wins; anonymous authors
/// get their supplied label, or the guest default when they gave none.
fn resolve_write_author(principal: Option<&User>, label: Option<String>) -> Author {
    match principal {
        Some(user) => Author::Principal {
            id: user.id,
            handle: user.handle.clone(),
        },
        None => Author::Label(
            label
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| GUEST_AUTHOR_LABEL.to_owned()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{FeedService, FeedStore};
    use crate::server::ServerError;
    use async_trait::async_trait;
    use stammtisch_cache::Cache;
    use stammtisch_common::{
        cursor::Cursor,
        model::{
            Id,
            comment::{Comment, CommentBody, CreateComment},
            post::{Author, CreatePost, PostKind, PostMarker, StoredPost},
            user::{User, UserHandle},
        },
    };
    use stammtisch_db::client::DbError;
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use time::{Duration as TimeDuration, UtcDateTime};

    fn at_seconds(seconds: i64) -> UtcDateTime {
        UtcDateTime::UNIX_EPOCH + TimeDuration::seconds(seconds)
    }

    fn text_post(id: u64, created_at_seconds: i64) -> StoredPost {
        StoredPost {
            id: id.into(),
            created_at: at_seconds(created_at_seconds),
            kind: PostKind::Text,
            title: None,
            body: Some(format!("post {id}")),
            link_url: None,
            image_url: None,
            author: Author::Label("Guest".into()),
        }
    }

    /// In-memory store implementing the same keyset contract as Postgres.
    #[derive(Default)]
    struct MemStore {
        posts: Mutex<Vec<StoredPost>>,
        comments: Mutex<Vec<Comment>>,
        window_queries: AtomicUsize,
        count_queries: AtomicUsize,
    }

    impl MemStore {
        fn with_posts(posts: Vec<StoredPost>) -> Self {
            Self {
                posts: Mutex::new(posts),
                ..Self::default()
            }
        }

        fn add_comments(&self, post_id: u64, count: usize) {
            let mut comments = self.comments.lock().unwrap();
            for i in 0..count {
                comments.push(Comment {
                    id: (1000 * post_id + i as u64).into(),
                    post_id: post_id.into(),
                    created_at: at_seconds(0),
                    body: CommentBody::new("cheers".into()).unwrap(),
                    author: Author::Label("Guest".into()),
                });
            }
        }
    }

    #[async_trait]
    impl FeedStore for MemStore {
        async fn feed_window(
            &self,
            limit: i64,
            cursor: Option<&Cursor>,
        ) -> Result<Vec<StoredPost>, DbError> {
            self.window_queries.fetch_add(1, Ordering::SeqCst);

            let mut posts: Vec<_> = self
                .posts
                .lock()
                .unwrap()
                .iter()
                .filter(|post| {
                    cursor.is_none_or(|cursor| {
                        post.created_at < cursor.created_at
                            || (post.created_at == cursor.created_at && post.id < cursor.post)
                    })
                })
                .cloned()
                .collect();
            posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            posts.truncate(usize::try_from(limit).unwrap());
            Ok(posts)
        }

        async fn comment_counts(
            &self,
            post_ids: &[Id<PostMarker>],
        ) -> Result<HashMap<Id<PostMarker>, u64>, DbError> {
            self.count_queries.fetch_add(1, Ordering::SeqCst);

            let mut counts = HashMap::new();
            for comment in self.comments.lock().unwrap().iter() {
                if post_ids.contains(&comment.post_id) {
                    *counts.entry(comment.post_id).or_default() += 1;
                }
            }
            Ok(counts)
        }

        async fn insert_post(
            &self,
            post: &CreatePost,
            author: &Author,
        ) -> Result<StoredPost, DbError> {
            let mut posts = self.posts.lock().unwrap();
            let stored = StoredPost {
                id: (posts.len() as u64 + 1).into(),
                created_at: at_seconds(posts.len() as i64),
                kind: post.kind,
                title: post.title.clone(),
                body: post.body.clone(),
                link_url: post.link_url.clone(),
                image_url: post.image_url.clone(),
                author: author.clone(),
            };
            posts.push(stored.clone());
            Ok(stored)
        }

        async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool, DbError> {
            Ok(self
                .posts
                .lock()
                .unwrap()
                .iter()
                .any(|post| post.id == post_id))
        }

        async fn post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>, DbError> {
            Ok(self
                .comments
                .lock()
                .unwrap()
                .iter()
                .filter(|comment| comment.post_id == post_id)
                .cloned()
                .collect())
        }

        async fn insert_comment(
            &self,
            post_id: Id<PostMarker>,
            body: &CommentBody,
            author: &Author,
        ) -> Result<Comment, DbError> {
            let mut comments = self.comments.lock().unwrap();
            let comment = Comment {
                id: (comments.len() as u64 + 1).into(),
                post_id,
                created_at: at_seconds(0),
                body: body.clone(),
                author: author.clone(),
            };
            comments.push(comment.clone());
            Ok(comment)
        }
    }

    /// Hit-capable cache fake; TTLs are ignored (tests stay within them).
    #[derive(Default)]
    struct MemoryCache(Mutex<HashMap<String, String>>);

    #[async_trait]
    impl Cache for MemoryCache {
        async fn get(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }

        async fn set(&self, key: &str, value: String, _ttl: Duration) {
            self.0.lock().unwrap().insert(key.to_owned(), value);
        }
    }

    /// A permanently unavailable cache: every read misses, every write drops.
    struct NullCache;

    #[async_trait]
    impl Cache for NullCache {
        async fn get(&self, _key: &str) -> Option<String> {
            None
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) {}
    }

    fn service(store: Arc<MemStore>, cache: Arc<dyn Cache>) -> FeedService {
        FeedService::new(store, cache, Duration::from_secs(5))
    }

    fn principal() -> User {
        User {
            id: 99_u64.into(),
            handle: UserHandle::new("barkeep".into()).unwrap(),
        }
    }

    fn link_post(url: &str) -> CreatePost {
        CreatePost {
            kind: PostKind::Link,
            title: None,
            body: None,
            link_url: Some(url.into()),
            image_url: None,
            author_name: None,
        }
    }

    #[tokio::test]
    async fn walking_pages_yields_every_post_once_in_order() {
        // Ties on created_at force the id tie-break to do the ordering.
        let posts = vec![
            text_post(5, 10),
            text_post(9, 9),
            text_post(3, 9),
            text_post(7, 9),
            text_post(2, 8),
            text_post(8, 8),
            text_post(1, 5),
        ];
        let store = Arc::new(MemStore::with_posts(posts));
        let service = service(store, Arc::new(NullCache));

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = service.feed_page(Some(2), cursor.as_deref()).await.unwrap();
            assert!(page.items.len() <= 2);
            seen.extend(page.items.iter().map(|item| u64::from(item.id)));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen, vec![5, 9, 7, 3, 8, 2, 1]);
    }

    #[tokio::test]
    async fn limit_is_clamped_to_the_allowed_range() {
        let posts = (1..=60).map(|id| text_post(id, i64::try_from(id).unwrap())).collect();
        let store = Arc::new(MemStore::with_posts(posts));
        let service = service(store, Arc::new(NullCache));

        let page = service.feed_page(Some(0), None).await.unwrap();
        assert_eq!(page.items.len(), 1);

        let page = service.feed_page(Some(1000), None).await.unwrap();
        assert_eq!(page.items.len(), 50);
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn continuation_cursor_comes_from_the_last_emitted_row() {
        let posts = vec![text_post(5, 10), text_post(9, 9), text_post(3, 9)];
        let store = Arc::new(MemStore::with_posts(posts));
        let service = service(store, Arc::new(NullCache));

        let page = service.feed_page(Some(2), None).await.unwrap();
        let ids: Vec<u64> = page.items.iter().map(|item| u64::from(item.id)).collect();
        assert_eq!(ids, vec![5, 9]);

        let cursor = Cursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(cursor.created_at, at_seconds(9));
        assert_eq!(u64::from(cursor.post), 9);

        let page = service
            .feed_page(Some(2), page.next_cursor.as_deref())
            .await
            .unwrap();
        let ids: Vec<u64> = page.items.iter().map(|item| u64::from(item.id)).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn comment_counts_come_from_one_aggregate_and_default_to_zero() {
        let posts = vec![text_post(2, 10), text_post(1, 9)];
        let store = Arc::new(MemStore::with_posts(posts));
        store.add_comments(2, 3);
        let service = service(store.clone(), Arc::new(NullCache));

        let page = service.feed_page(Some(10), None).await.unwrap();
        assert_eq!(page.items[0].comment_count, 3);
        assert_eq!(page.items[1].comment_count, 0);
        assert_eq!(store.count_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_reads_within_the_ttl_hit_the_cache() {
        let posts = vec![text_post(2, 10), text_post(1, 9)];
        let store = Arc::new(MemStore::with_posts(posts));
        let service = service(store.clone(), Arc::new(MemoryCache::default()));

        let first = service.feed_page(Some(10), None).await.unwrap();
        let second = service.feed_page(Some(10), None).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(store.window_queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_cache_degrades_to_the_store() {
        let posts = vec![text_post(2, 10), text_post(1, 9)];
        let store = Arc::new(MemStore::with_posts(posts));
        let service = service(store.clone(), Arc::new(NullCache));

        let first = service.feed_page(Some(10), None).await.unwrap();
        let second = service.feed_page(Some(10), None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.window_queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let store = Arc::new(MemStore::default());
        let service = service(store, Arc::new(NullCache));

        let result = service.feed_page(Some(10), Some("not a cursor")).await;
        assert!(matches!(result, Err(ServerError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn text_post_without_body_is_rejected() {
        let store = Arc::new(MemStore::default());
        let service = service(store, Arc::new(NullCache));

        let request = CreatePost {
            kind: PostKind::Text,
            title: None,
            body: None,
            link_url: None,
            image_url: None,
            author_name: None,
        };
        let result = service.create_post(None, request).await;
        assert!(matches!(result, Err(ServerError::InvalidPost(_))));
    }

    #[tokio::test]
    async fn anonymous_link_post_gets_the_guest_label() {
        let store = Arc::new(MemStore::default());
        let service = service(store, Arc::new(NullCache));

        let post = service
            .create_post(None, link_post("https://example.com/negroni"))
            .await
            .unwrap();
        assert_eq!(post.author_name, "Guest");
        assert_eq!(post.comment_count, 0);
    }

    #[tokio::test]
    async fn principal_post_is_attributed_to_the_handle() {
        let store = Arc::new(MemStore::default());
        let service = service(store, Arc::new(NullCache));

        let mut request = link_post("https://example.com/negroni");
        // A supplied label loses against an authenticated principal.
        request.author_name = Some("Somebody Else".into());

        let post = service.create_post(Some(&principal()), request).await.unwrap();
        assert_eq!(post.author_name, "barkeep");
    }

    #[tokio::test]
    async fn comment_on_a_missing_post_is_not_found() {
        let store = Arc::new(MemStore::default());
        let service = service(store, Arc::new(NullCache));

        let request = CreateComment {
            body: CommentBody::new("cheers".into()).unwrap(),
            author_name: None,
        };
        let result = service.create_comment(404_u64.into(), None, request).await;
        assert!(matches!(result, Err(ServerError::PostByIdNotFound(_))));
    }

    #[tokio::test]
    async fn comment_creation_round_trips_through_the_store() {
        let store = Arc::new(MemStore::with_posts(vec![text_post(1, 10)]));
        let service = service(store.clone(), Arc::new(NullCache));

        let request = CreateComment {
            body: CommentBody::new("cheers".into()).unwrap(),
            author_name: Some("Regular".into()),
        };
        let view = service.create_comment(1_u64.into(), None, request).await.unwrap();
        assert_eq!(view.body, "cheers");
        assert_eq!(view.author_name, "Regular");

        let listed = service.post_comments(1_u64.into()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
