//! Admin HTTP surface: health check, manual generation, image upload and activation
use std::num::NonZeroU16;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::activation::{ActivatedImage, ImageActivation, UploadTarget};
use crate::db::entities::wallpapers;
use crate::error::WallpaperError;
use crate::pipeline::WallpaperGenerationPipeline;

mod middleware;

use middleware::require_admin_token;

/// Shared state for the handlers
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<WallpaperGenerationPipeline>,
    activation: Arc<ImageActivation>,
    admin_token: Option<String>,
}

impl AppState {
    /// Builds the state; an empty token counts as no token.
    pub fn new(
        pipeline: Arc<WallpaperGenerationPipeline>,
        activation: Arc<ImageActivation>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            pipeline,
            activation,
            admin_token: admin_token.filter(|token| !token.trim().is_empty()),
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Runs the pipeline once, regardless of the scheduler flags.
async fn generate_wallpaper_handler(
    State(state): State<AppState>,
) -> Result<Json<wallpapers::Model>, WallpaperError> {
    info!("manual wallpaper generation requested");
    state.pipeline.run().await.map(Json)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    file_name: String,
}

/// Hands out a fresh object key and a presigned PUT URL for it.
async fn upload_image_handler(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadTarget>, WallpaperError> {
    state
        .activation
        .upload_target(&request.file_name)
        .await
        .map(Json)
}

#[derive(Debug, Deserialize)]
struct ActivateRequest {
    key: String,
}

async fn activate_image_handler(
    State(state): State<AppState>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<ActivatedImage>, WallpaperError> {
    state.activation.activate(&request.key).await.map(Json)
}

fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/wallpapers/generate", post(generate_wallpaper_handler))
        .route("/images", post(upload_image_handler))
        .route("/images/activate", post(activate_image_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/healthz", get(healthz_handler))
        .nest("/admin", admin)
        .with_state(state)
}

/// Binds the listener and serves until the process is stopped.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    state: AppState,
) -> Result<(), anyhow::Error> {
    if state.admin_token.is_none() {
        info!("No admin token configured, admin routes will refuse every request");
    }
    let app = create_router(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use sea_orm::EntityTrait;

    use crate::clients::ObjectStore;
    use crate::db::entities::images;
    use crate::db::migrated_test_db;
    use crate::testing::{FakeSet, Fakes, UPSCALED_URL, fast_config, png_bytes};

    const TOKEN: &str = "let-me-in";

    async fn setup_state(fakes: &FakeSet, admin_token: Option<&str>) -> AppState {
        state_with_db(fakes, admin_token, migrated_test_db().await)
    }

    fn state_with_db(
        fakes: &FakeSet,
        admin_token: Option<&str>,
        db: sea_orm::DatabaseConnection,
    ) -> AppState {
        let pipeline = WallpaperGenerationPipeline::new(
            fast_config(),
            fakes.collaborators(),
            fakes.catalog.clone(),
        );
        let activation = ImageActivation::new(fast_config(), &fakes.collaborators(), db);
        AppState::new(
            Arc::new(pipeline),
            Arc::new(activation),
            admin_token.map(str::to_string),
        )
    }

    fn post(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn healthz_needs_no_token() {
        let fakes = Fakes::default().build();
        let app = create_router(setup_state(&fakes, None).await);

        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_reject_missing_or_wrong_tokens() {
        let fakes = Fakes::default().build();
        let app = create_router(setup_state(&fakes, Some(TOKEN)).await);

        for token in [None, Some("nope"), Some("let-me-i"), Some("let-me-in-please")] {
            let response = app
                .clone()
                .oneshot(post("/admin/wallpapers/generate", token))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert!(fakes.log.calls().is_empty());
    }

    #[tokio::test]
    async fn admin_routes_are_closed_without_a_configured_token() {
        let fakes = Fakes::default().build();
        let app = create_router(setup_state(&fakes, Some("  ")).await);

        let response = app
            .oneshot(post("/admin/wallpapers/generate", Some("  ")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(fakes.log.calls().is_empty());
    }

    #[tokio::test]
    async fn manual_generation_returns_the_record() {
        let fakes = Fakes::default().build();
        let app = create_router(setup_state(&fakes, Some(TOKEN)).await);

        let response = app
            .oneshot(post("/admin/wallpapers/generate", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["image_key"], "cdn-1");
        assert_eq!(body["input"]["engine"], "dall-e");
        assert!(
            body["object_key"]
                .as_str()
                .is_some_and(|key| key.ends_with(".png"))
        );
        assert_eq!(fakes.catalog.len(), 1);
    }

    #[tokio::test]
    async fn manual_generation_ignores_feature_flags() {
        let fakes = Fakes::default().build();
        let db = migrated_test_db().await;
        let config = crate::config::PipelineConfig {
            scheduler_enabled: false,
            generate_wallpaper_enabled: false,
            ..fast_config()
        };
        let state = AppState::new(
            Arc::new(WallpaperGenerationPipeline::new(
                config.clone(),
                fakes.collaborators(),
                fakes.catalog.clone(),
            )),
            Arc::new(ImageActivation::new(config, &fakes.collaborators(), db)),
            Some(TOKEN.to_string()),
        );

        let response = create_router(state)
            .oneshot(post("/admin/wallpapers/generate", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fakes.catalog.len(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_bad_gateway() {
        let fakes = Fakes::default().cdn_fails().build();
        let app = create_router(setup_state(&fakes, Some(TOKEN)).await);

        let response = app
            .oneshot(post("/admin/wallpapers/generate", Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(fakes.catalog.len(), 0);
    }

    #[tokio::test]
    async fn image_routes_need_the_token() {
        let fakes = Fakes::default().build();
        let app = create_router(setup_state(&fakes, Some(TOKEN)).await);

        let upload = app
            .clone()
            .oneshot(post_json(
                "/admin/images",
                None,
                serde_json::json!({"fileName": "a.png"}),
            ))
            .await
            .unwrap();
        assert_eq!(upload.status(), StatusCode::UNAUTHORIZED);

        let activate = app
            .oneshot(post_json(
                "/admin/images/activate",
                Some("nope"),
                serde_json::json!({"key": "a.png"}),
            ))
            .await
            .unwrap();
        assert_eq!(activate.status(), StatusCode::UNAUTHORIZED);
        assert!(fakes.log.calls().is_empty());
    }

    #[tokio::test]
    async fn activating_a_key_that_was_never_uploaded_is_not_found() {
        let fakes = Fakes::default().build();
        let db = migrated_test_db().await;
        let app = create_router(state_with_db(&fakes, Some(TOKEN), db.clone()));

        let response = app
            .oneshot(post_json(
                "/admin/images/activate",
                Some(TOKEN),
                serde_json::json!({"key": "missing.png"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(images::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_then_activate() {
        let fakes = Fakes::default().build();
        let db = migrated_test_db().await;
        let app = create_router(state_with_db(&fakes, Some(TOKEN), db.clone()));

        let response = app
            .clone()
            .oneshot(post_json(
                "/admin/images",
                Some(TOKEN),
                serde_json::json!({"fileName": "tiny.png"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let target = read_json(response).await;
        let key = target["key"].as_str().expect("key").to_string();
        assert!(key.ends_with(".png"));
        let put_url = target["putSignedUrl"].as_str().expect("put url");
        assert!(put_url.contains(&key));
        assert!(images::Entity::find().all(&db).await.unwrap().is_empty());

        // the client uploads straight to the bucket with the PUT URL
        fakes.store.insert(&key, png_bytes(16, 9));
        let signed = fakes
            .store
            .signed_url(&key, fast_config().signed_url_ttl)
            .await
            .expect("signed url");
        fakes.fetcher.serve(&signed, png_bytes(16, 9));
        fakes.fetcher.serve(UPSCALED_URL, png_bytes(48, 27));

        let response = app
            .oneshot(post_json(
                "/admin/images/activate",
                Some(TOKEN),
                serde_json::json!({"key": key}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        let stem = key.trim_end_matches(".png");
        assert_eq!(body["objectKey"], key.as_str());
        assert_eq!(body["imageKey"], stem);
        assert_eq!(body["width"], 48);
        assert_eq!(body["height"], 27);
        assert_eq!(
            body["imageUrl"],
            format!("https://cdn.test/{stem}/public").as_str()
        );
        assert!(
            body["objectSignedUrl"]
                .as_str()
                .is_some_and(|url| url.contains(&key))
        );

        let rows = images::Entity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].object_key, key);
        assert_eq!(rows[0].image_key, stem);
        assert_eq!((rows[0].width, rows[0].height), (48, 27));
    }
}
