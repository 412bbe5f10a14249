//! Full-page error responses: the 404 fallback and the "something went wrong" page.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_htmx::HxRedirect;

use crate::{endpoints, html::error_view};

/// An error rendered as a whole page rather than an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub description: String,
    pub fix: String,
}

impl ErrorPage {
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            description: "There's nothing here.".to_owned(),
            fix: "The page may have moved. Head back to the dashboard to find your way.".to_owned(),
        }
    }

    pub fn internal(fix: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            description: "Something went wrong on our end.".to_owned(),
            fix: fix.into(),
        }
    }
}

impl Default for ErrorPage {
    fn default() -> Self {
        Self::internal("Try again in a little while. If it keeps happening, check the server logs.")
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        let title = self
            .status
            .canonical_reason()
            .unwrap_or("Error");
        let page = error_view(title, self.status.as_str(), &self.description, &self.fix);

        (self.status, Html(page.into_string())).into_response()
    }
}

pub async fn get_internal_server_error_page() -> Response {
    ErrorPage::default().into_response()
}

/// Fallback for unknown routes.
pub async fn get_404_not_found() -> Response {
    ErrorPage::not_found().into_response()
}

/// Send an htmx request to the error page.
///
/// Plain GET handlers should redirect with `axum::response::Redirect` instead.
pub fn get_internal_server_error_redirect() -> Response {
    (
        HxRedirect(endpoints::INTERNAL_ERROR_VIEW.to_owned()),
        StatusCode::INTERNAL_SERVER_ERROR,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::{endpoints, test_utils::assert_hx_redirect};

    use super::{ErrorPage, get_404_not_found, get_internal_server_error_redirect};

    #[tokio::test]
    async fn unknown_route_is_404_page() {
        let response = get_404_not_found().await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("Not Found"));
        assert!(body.contains("404"));
    }

    #[test]
    fn internal_error_uses_given_fix() {
        let response = ErrorPage::internal("Check the timezone").into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn redirect_points_at_error_page() {
        let response = get_internal_server_error_redirect();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_hx_redirect(&response, endpoints::INTERNAL_ERROR_VIEW);
    }
}
