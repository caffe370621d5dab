//! Landing page with an upload form

use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// GET / - Upload form
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
