//! Static reference catalogs, served cache-aside under fixed keys.

use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use stammtisch_cache::Cache;
use std::{borrow::Cow, sync::Arc, time::Duration};

const CATALOG_TTL: Duration = Duration::from_secs(60);

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_recipes)
        .typed_get(get_places)
        .typed_get(get_history)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
struct CatalogEntry {
    title: Cow<'static, str>,
    blurb: Cow<'static, str>,
}

async fn cached_catalog(
    cache: &dyn Cache,
    key: &str,
    entries: &[CatalogEntry],
) -> Result<Json<Vec<CatalogEntry>>> {
    if let Some(cached) = cache.get(key).await
        && let Ok(entries) = serde_json::from_str(&cached)
    {
        return Ok(Json(entries));
    }

    if let Ok(json) = serde_json::to_string(entries) {
        cache.set(key, json, CATALOG_TTL).await;
    }

    Ok(Json(entries.to_vec()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/library/recipes", rejection(ServerError))]
struct RecipesPath();

async fn get_recipes(
    RecipesPath(): RecipesPath,
    State(cache): State<Arc<dyn Cache>>,
) -> Result<Json<Vec<CatalogEntry>>> {
    cached_catalog(&*cache, "library:recipes", RECIPES).await
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/library/places", rejection(ServerError))]
struct PlacesPath();

async fn get_places(
    PlacesPath(): PlacesPath,
    State(cache): State<Arc<dyn Cache>>,
) -> Result<Json<Vec<CatalogEntry>>> {
    cached_catalog(&*cache, "library:places", PLACES).await
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/library/history", rejection(ServerError))]
struct HistoryPath();

async fn get_history(
    HistoryPath(): HistoryPath,
    State(cache): State<Arc<dyn Cache>>,
) -> Result<Json<Vec<CatalogEntry>>> {
    cached_catalog(&*cache, "library:history", HISTORY).await
}

const RECIPES: &[CatalogEntry] = &[
    CatalogEntry {
        title: Cow::Borrowed("Obatzda"),
        blurb: Cow::Borrowed("Camembert beaten with butter, paprika, and a splash of Weissbier."),
    },
    CatalogEntry {
        title: Cow::Borrowed("Brezn knoedel"),
        blurb: Cow::Borrowed("Day-old pretzels steamed back to life as dumplings."),
    },
    CatalogEntry {
        title: Cow::Borrowed("Radler"),
        blurb: Cow::Borrowed("Half lager, half lemonade, entirely an afternoon drink."),
    },
];

const PLACES: &[CatalogEntry] = &[
    CatalogEntry {
        title: Cow::Borrowed("Zum Goldenen Anker"),
        blurb: Cow::Borrowed("Corner table reserved since 1987, allegedly."),
    },
    CatalogEntry {
        title: Cow::Borrowed("Braeustuebl am Tor"),
        blurb: Cow::Borrowed("Self-service benches under the chestnut trees."),
    },
];

const HISTORY: &[CatalogEntry] = &[
    CatalogEntry {
        title: Cow::Borrowed("The regulars' table"),
        blurb: Cow::Borrowed("A standing reservation that outlives its reservers."),
    },
    CatalogEntry {
        title: Cow::Borrowed("Tap markers"),
        blurb: Cow::Borrowed("Personalized steins kept behind the bar for the regulars."),
    },
];
