use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use crate::state::SharedState;

/// Static pages for the landing, host, player, and display consoles.
///
/// Everything under `public/` is peripheral to the server core; unknown
/// routes fall through to axum's 404.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route_service("/", ServeFile::new("public/index.html"))
        .route_service("/host", ServeFile::new("public/host.html"))
        .route_service("/play", ServeFile::new("public/play.html"))
        .route_service("/screen", ServeFile::new("public/screen.html"))
        .nest_service("/assets", ServeDir::new("public/assets"))
}
