use crate::server::{ServerError, ServerRouter, json::Json};
use axum::Router;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;

mod auth;
mod library;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(posts::routes())
        .merge(auth::routes())
        .merge(users::routes())
        .merge(library::routes())
        .typed_get(healthz)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/healthz", rejection(ServerError))]
struct HealthzPath();

#[derive(Serialize)]
struct Health {
    status: &'static str,
    time: UtcDateTime,
}

async fn healthz(HealthzPath(): HealthzPath) -> Json<Health> {
    Json(Health {
        status: "ok",
        time: UtcDateTime::now(),
    })
}
