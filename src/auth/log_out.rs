//! Ends the session by expiring the auth cookie.

use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::PrivateCookieJar;

use crate::{auth::invalidate_auth_cookie, endpoints};

pub async fn get_log_out(jar: PrivateCookieJar) -> Response {
    (invalidate_auth_cookie(jar), Redirect::to(endpoints::LOG_IN_VIEW)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use axum_extra::extract::PrivateCookieJar;
    use axum_test::TestServer;
    use time::{Duration, OffsetDateTime, UtcOffset};

    use crate::{
        Error,
        app_state::create_cookie_key,
        auth::{COOKIE_TOKEN, DEFAULT_COOKIE_DURATION, UserID, set_auth_cookie},
        endpoints,
    };

    use super::get_log_out;

    async fn log_in_as_alice(jar: PrivateCookieJar) -> Result<PrivateCookieJar, Error> {
        set_auth_cookie(jar, UserID::new(1), DEFAULT_COOKIE_DURATION, UtcOffset::UTC)
    }

    fn get_test_server() -> TestServer {
        let app = Router::new()
            .route("/log_in", get(log_in_as_alice))
            .route(endpoints::LOG_OUT, get(get_log_out))
            .with_state(create_cookie_key("42"));

        TestServer::try_new(app).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn log_out_redirects_to_log_in_page() {
        let server = get_test_server();

        let response = server.get(endpoints::LOG_OUT).await;

        response.assert_status_see_other();
        assert_eq!(response.header("location"), endpoints::LOG_IN_VIEW);
    }

    #[tokio::test]
    async fn log_out_expires_the_auth_cookie() {
        let server = get_test_server();
        let session = server.get("/log_in").await.cookie(COOKIE_TOKEN);

        let cookie = server
            .get(endpoints::LOG_OUT)
            .add_cookie(session)
            .await
            .cookie(COOKIE_TOKEN);

        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert!(cookie.expires_datetime().unwrap() <= OffsetDateTime::now_utc());
    }
}
