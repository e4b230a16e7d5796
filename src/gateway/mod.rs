pub mod handlers;
pub mod openapi;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::bearer_auth_middleware;
pub use state::AppState;

/// Build the HTTP router.
///
/// `/` and `/health` are public. Everything under `/accounts` runs behind
/// the bearer middleware, which puts an `AuthenticatedUser` into the
/// request extensions.
pub fn build_router(state: Arc<AppState>) -> Router {
    let account_routes = Router::new()
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route("/accounts/user/{user_id}", get(handlers::get_account_by_user))
        .route(
            "/accounts/{account_id}",
            get(handlers::get_account)
                .put(handlers::update_account)
                .delete(handlers::delete_account),
        )
        .route("/accounts/{account_id}/deposit", post(handlers::deposit))
        .route("/accounts/{account_id}/withdraw", post(handlers::withdraw))
        .route(
            "/accounts/{account_id}/transfer/{to_account_id}",
            post(handlers::transfer),
        )
        .layer(from_fn_with_state(state.clone(), bearer_auth_middleware));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(account_routes)
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Serve `app` on `host:port` until `shutdown` resolves.
pub async fn run_server<F>(host: &str, port: u16, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        tracing::error!(%addr, error = %e, "[GATEWAY] Failed to bind, port may already be in use");
    })?;

    tracing::info!("[GATEWAY] Listening on http://{}", addr);
    tracing::info!("[GATEWAY] API docs at http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
