use crate::server::{
    Result, ServerError, ServerRouter, auth::MaybePrincipal, feed::FeedService, json::Json,
    query::Query,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use stammtisch_common::model::{
    Id,
    comment::{CommentView, CreateComment},
    post::{CreatePost, FeedPage, FeedPost, PostMarker},
};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_feed)
        .typed_post(create_post)
        .typed_get(get_post_comments)
        .typed_post(create_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

#[derive(Deserialize)]
struct FeedParams {
    limit: Option<i64>,
    cursor: Option<String>,
}

async fn get_feed(
    PostsPath(): PostsPath,
    State(feed): State<Arc<FeedService>>,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedPage>> {
    let page = feed
        .feed_page(params.limit, params.cursor.as_deref())
        .await?;

    Ok(Json(page))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(feed): State<Arc<FeedService>>,
    principal: MaybePrincipal,
    Json(request): Json<CreatePost>,
) -> Result<(StatusCode, Json<FeedPost>)> {
    let post = feed.create_post(principal.principal(), request).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comments", rejection(ServerError))]
struct PostCommentsPath {
    id: Id<PostMarker>,
}

async fn get_post_comments(
    PostCommentsPath { id }: PostCommentsPath,
    State(feed): State<Arc<FeedService>>,
) -> Result<Json<Vec<CommentView>>> {
    let comments = feed.post_comments(id).await?;

    Ok(Json(comments))
}

async fn create_comment(
    PostCommentsPath { id }: PostCommentsPath,
    State(feed): State<Arc<FeedService>>,
    principal: MaybePrincipal,
    Json(request): Json<CreateComment>,
) -> Result<(StatusCode, Json<CommentView>)> {
    let comment = feed
        .create_comment(id, principal.principal(), request)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}
