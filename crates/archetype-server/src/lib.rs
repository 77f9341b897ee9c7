pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Forms
        .route(
            "/forms/{name}",
            get(routes::forms::render_form).post(routes::forms::submit_form),
        )
        .route(
            "/api/contexts/{context}/fields",
            get(routes::fields::list_context_fields),
        )
        // AJAX
        .route("/ajax/fb_login", post(routes::facebook::fb_login))
        .route("/ajax/fb_connect", post(routes::facebook::fb_connect))
        // Funnels
        .route("/api/funnels/complete", post(routes::funnels::complete))
        .route("/api/funnels/{name}/next", get(routes::funnels::next_phase))
        .route(
            "/api/funnels/{name}/phases/{phase}/visit",
            post(routes::funnels::visit_phase),
        )
        // Misc
        .route("/api/nonce/{action}", get(routes::nonce::create_nonce))
        .route("/api/avatar", post(routes::avatar::upload_avatar))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn load_state(root: PathBuf) -> anyhow::Result<AppState> {
    tokio::task::spawn_blocking(move || AppState::load(&root))
        .await
        .map_err(|e| anyhow::anyhow!("task join error: {e}"))?
}

/// Load the site under `root` and serve it on `port`.
pub async fn serve(root: PathBuf, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, listener, open_browser).await
}

/// Serve on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(
    root: PathBuf,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app_state = load_state(root).await?;
    tracing::info!(site = app_state.site.name(), "site loaded");
    let app = build_router(app_state);

    tracing::info!("archetype listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
