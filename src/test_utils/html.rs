use axum::{body::Body, response::Response};
use scraper::Html;

/// Read the whole response body and parse it as an HTML page.
pub(crate) async fn parse_html_document(response: Response<Body>) -> Html {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("could not read response body");

    Html::parse_document(&String::from_utf8_lossy(&bytes))
}

#[track_caller]
pub(crate) fn assert_valid_html(html: &Html) {
    assert!(html.errors.is_empty(), "invalid HTML: {:?}", html.errors);
}
