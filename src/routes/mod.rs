use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod auth;
pub mod documents;
pub mod health;
pub mod orders;

/// Photos from phone cameras are large; a submission carries several.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let api_routes = Router::new()
        .route("/generar-pdf", post(documents::generate_pdf))
        .route("/descargar-pdf/:folio", get(documents::download_pdf))
        .route("/enviar-pdf-correo", post(documents::send_pdf_by_email))
        .route("/regenerar-pdf/:folio", post(documents::regenerate_pdf))
        .route("/marcar-pagado/:folio", put(orders::mark_paid))
        .route("/ordenes/:folio", get(orders::get_order))
        .route("/health", get(health::health_check));

    Router::new()
        .route("/login", post(auth::login))
        .route("/addOrder", post(orders::add_order))
        .route("/getOrders", get(orders::list_orders))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
