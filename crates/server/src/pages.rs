use std::sync::Arc;

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use include_dir::{include_dir, Dir};
use tracing::debug;

use crate::app_state::AppState;

static WEB_DIST: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/web/dist");

const INDEX: &str = "index.html";

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(redirect_to_web))
        .route("/web", get(redirect_to_web))
        .route("/web/", get(index))
        .route("/web/*path", get(asset))
}

async fn redirect_to_web() -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/web/")]).into_response()
}

async fn index() -> Response {
    serve(INDEX)
}

async fn asset(Path(path): Path<String>) -> Response {
    if path.is_empty() || path.ends_with('/') {
        return serve(&format!("{path}{INDEX}"));
    }
    serve(&path)
}

fn serve(path: &str) -> Response {
    debug!(path, "lookup file");
    let Some(file) = WEB_DIST.get_file(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    debug!(path, content_type = %content_type, "set content type");
    (
        [(header::CONTENT_TYPE, content_type.essence_str().to_string())],
        file.contents(),
    )
        .into_response()
}
