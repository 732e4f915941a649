// Spotify client against a fake accounts + API server
//
// Spotify is the only backend with an OAuth hop, so these tests center
// on token life cycle: one fetch serves many calls, a 401 drops the
// cache, bad credentials die at the token endpoint before any API hit.

mod helpers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use helpers::Hits;
use rockmix_core::sources::{MusicSource, SpotifyClient};
use serde_json::{json, Value};

type Params = HashMap<String, String>;

/// Authorization header values in arrival order.
#[derive(Clone, Default)]
struct AuthLog(Arc<Mutex<Vec<String>>>);

impl AuthLog {
    fn push(&self, headers: &HeaderMap) {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.0.lock().unwrap().push(auth);
    }

    fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn track_page() -> Value {
    json!({ "tracks": { "items": [
        { "id": "t1", "name": "One Vision", "duration_ms": 243_000,
          "artists": [{ "name": "Queen" }],
          "album": { "name": "A Kind of Magic" },
          "external_urls": { "spotify": "https://open.spotify.com/track/t1" } }
    ] } })
}

fn client(base: &str) -> SpotifyClient {
    let mut client = SpotifyClient::new()
        .with_api_url(format!("{base}/v1"))
        .with_token_url(format!("{base}/api/token"));
    client.set_credentials("id", Some("secret"));
    client
}

#[tokio::test]
async fn token_is_fetched_once_and_reused() {
    let token_hits = Hits::default();
    let api_hits = Hits::default();
    let token_auth = AuthLog::default();
    let api_auth = AuthLog::default();

    let router = Router::new()
        .route("/api/token", {
            let token_hits = token_hits.clone();
            let token_auth = token_auth.clone();
            post(move |headers: HeaderMap| {
                let token_hits = token_hits.clone();
                let token_auth = token_auth.clone();
                async move {
                    token_hits.bump();
                    token_auth.push(&headers);
                    Json(json!({
                        "access_token": "tok-1",
                        "token_type": "Bearer",
                        "expires_in": 3600,
                    }))
                }
            })
        })
        .route("/v1/search", {
            let api_hits = api_hits.clone();
            let api_auth = api_auth.clone();
            get(move |headers: HeaderMap| {
                let api_hits = api_hits.clone();
                let api_auth = api_auth.clone();
                async move {
                    api_hits.bump();
                    api_auth.push(&headers);
                    Json(track_page())
                }
            })
        });
    let base = helpers::spawn(router).await;
    let client = client(&base);

    let first = client.search_track("Queen", "One Vision").await.unwrap();
    let second = client.search_track("Queen", "One Vision").await.unwrap();
    assert_eq!(first.track.external_id.as_deref(), Some("t1"));
    assert_eq!(second.track.duration, Some(243));

    assert_eq!(token_hits.get(), 1);
    assert_eq!(api_hits.get(), 2);
    assert_eq!(token_auth.all(), ["Basic aWQ6c2VjcmV0"]);
    assert_eq!(api_auth.all(), ["Bearer tok-1", "Bearer tok-1"]);
}

#[tokio::test]
async fn unauthorized_response_forces_token_refetch() {
    let token_hits = Hits::default();

    let router = Router::new()
        .route("/api/token", {
            let token_hits = token_hits.clone();
            post(move || {
                let token_hits = token_hits.clone();
                async move {
                    let n = token_hits.bump();
                    Json(json!({
                        "access_token": format!("tok-{n}"),
                        "token_type": "Bearer",
                        "expires_in": 3600,
                    }))
                }
            })
        })
        .route(
            "/v1/search",
            get(move |headers: HeaderMap| async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if auth == "Bearer tok-1" {
                    (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({ "error": {
                            "status": 401, "message": "The access token expired"
                        } })),
                    )
                } else {
                    (StatusCode::OK, Json(track_page()))
                }
            }),
        );
    let base = helpers::spawn(router).await;
    let client = client(&base);

    let err = client
        .search_track("Queen", "One Vision")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "api-unauthorized");

    // 401 evicted the cached token, so the retry mints tok-2 and succeeds
    let found = client.search_track("Queen", "One Vision").await.unwrap();
    assert_eq!(found.track.title, "One Vision");
    assert_eq!(token_hits.get(), 2);
}

#[tokio::test]
async fn invalid_client_maps_to_unauthorized() {
    let api_hits = Hits::default();

    let router = Router::new()
        .route(
            "/api/token",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid_client" })),
                )
            }),
        )
        .route("/v1/search", {
            let api_hits = api_hits.clone();
            get(move || {
                let api_hits = api_hits.clone();
                async move {
                    api_hits.bump();
                    Json(track_page())
                }
            })
        });
    let base = helpers::spawn(router).await;

    let err = client(&base)
        .search_track("Queen", "One Vision")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "api-unauthorized");
    assert_eq!(api_hits.get(), 0);
}

#[tokio::test]
async fn top_tracks_resolves_artist_then_fetches() {
    let recorded: Arc<Mutex<Vec<(String, Option<String>)>>> = Arc::default();

    let router = Router::new()
        .route(
            "/api/token",
            post(|| async {
                Json(json!({
                    "access_token": "tok-1",
                    "token_type": "Bearer",
                    "expires_in": 3600,
                }))
            }),
        )
        .route(
            "/v1/search",
            get(|Query(params): Query<Params>| async move {
                match params.get("type").map(String::as_str) {
                    Some("artist") => Json(json!({ "artists": { "items": [
                        { "id": "ar-queen", "name": "Queen" }
                    ] } })),
                    _ => Json(json!({ "tracks": { "items": [] } })),
                }
            }),
        )
        .route("/v1/artists/:id/top-tracks", {
            let recorded = recorded.clone();
            get(move |Path(id): Path<String>, Query(params): Query<Params>| {
                let recorded = recorded.clone();
                async move {
                    recorded
                        .lock()
                        .unwrap()
                        .push((id, params.get("market").cloned()));
                    Json(json!({ "tracks": [
                        { "id": "t-br", "name": "Bohemian Rhapsody",
                          "duration_ms": 354_000, "artists": [{ "name": "Queen" }],
                          "album": { "name": "A Night at the Opera" },
                          "external_urls": { "spotify": "https://open.spotify.com/track/t-br" } },
                        { "id": "t-ov", "name": "One Vision",
                          "duration_ms": 243_000, "artists": [{ "name": "Queen" }],
                          "album": { "name": "A Kind of Magic" },
                          "external_urls": { "spotify": "https://open.spotify.com/track/t-ov" } },
                        { "id": "t-ds", "name": "Don't Stop Me Now",
                          "duration_ms": 209_000, "artists": [{ "name": "Queen" }],
                          "album": { "name": "Jazz" },
                          "external_urls": { "spotify": "https://open.spotify.com/track/t-ds" } }
                    ] }))
                }
            })
        });
    let base = helpers::spawn(router).await;

    let tracks = client(&base).top_tracks("Queen", 2).await.unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].title, "Bohemian Rhapsody");
    assert_eq!(tracks[0].rank, 1);
    assert_eq!(tracks[0].duration, Some(354));
    assert_eq!(tracks[0].album.as_deref(), Some("A Night at the Opera"));
    assert_eq!(tracks[1].title, "One Vision");
    assert_eq!(tracks[1].rank, 2);

    let calls = recorded.lock().unwrap().clone();
    assert_eq!(calls, [("ar-queen".to_string(), Some("US".to_string()))]);
}
