//! Route guards that turn the session cookie into a [UserID](crate::auth::UserID) and keep
//! active sessions alive.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use axum_htmx::HxRedirect;
use rusqlite::Connection;
use time::Duration;

use crate::{
    AppState,
    api::unauthenticated_response,
    auth::{
        build_log_in_redirect_url,
        cookie::{extend_auth_cookie_duration_if_needed, get_token_from_cookies},
    },
    timezone::get_local_offset,
};

/// What the auth guards, log-in and registration handlers need from [AppState].
#[derive(Debug, Clone)]
pub struct AuthState {
    pub cookie_key: Key,
    /// Length of a session, refreshed on every authenticated request.
    pub cookie_duration: Duration,
    pub local_timezone: String,
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
            local_timezone: state.local_timezone.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

impl FromRef<AuthState> for Key {
    fn from_ref(state: &AuthState) -> Self {
        state.cookie_key.clone()
    }
}

/// How a guarded route answers a request without a valid session.
#[derive(Debug, Clone, Copy)]
enum Rejection {
    /// Redirect the browser to the log-in page.
    Page,
    /// Ask htmx to load the log-in page.
    Htmx,
    /// 401 with a JSON error body.
    Api,
}

impl Rejection {
    fn respond(self, request: &Request) -> Response {
        match self {
            Rejection::Page => Redirect::to(&build_log_in_redirect_url(request)).into_response(),
            Rejection::Htmx => {
                (HxRedirect(build_log_in_redirect_url(request)), StatusCode::OK).into_response()
            }
            Rejection::Api => unauthenticated_response(),
        }
    }
}

/// Run `request` as the user named in its auth cookie, then refresh the cookie on the response.
async fn guard(state: AuthState, request: Request, next: Next, rejection: Rejection) -> Response {
    let Some(local_offset) = get_local_offset(&state.local_timezone) else {
        tracing::error!(
            "Unknown timezone {}, rejecting request.",
            state.local_timezone
        );
        return rejection.respond(&request);
    };

    let (mut parts, body) = request.into_parts();
    let jar = match PrivateCookieJar::from_request_parts(&mut parts, &state).await {
        Ok(jar) => jar,
        Err(error) => {
            tracing::error!("Could not read cookies: {error:?}. Rejecting request.");
            return rejection.respond(&Request::from_parts(parts, body));
        }
    };
    let Ok(token) = get_token_from_cookies(&jar) else {
        return rejection.respond(&Request::from_parts(parts, body));
    };

    parts.extensions.insert(token.user_id);
    let mut response = next.run(Request::from_parts(parts, body)).await;

    let jar = extend_auth_cookie_duration_if_needed(jar.clone(), state.cookie_duration, local_offset)
        .unwrap_or_else(|error| {
            tracing::error!("Could not extend session: {error:?}. Keeping the old cookie.");
            jar
        });
    copy_set_cookie_headers(jar, &mut response);

    response
}

fn copy_set_cookie_headers(jar: PrivateCookieJar, response: &mut Response) {
    let jar_response = jar.into_response();

    for value in jar_response.headers().get_all(SET_COOKIE) {
        response.headers_mut().append(SET_COOKIE, value.clone());
    }
}

/// Guard for HTML pages.
///
/// Handlers receive the user with `Extension(user_id): Extension<UserID>`.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    guard(state, request, next, Rejection::Page).await
}

/// Guard for htmx form posts.
pub async fn auth_guard_hx(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    guard(state, request, next, Rejection::Htmx).await
}

/// Guard for the JSON API.
pub async fn auth_guard_api(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    guard(state, request, next, Rejection::Api).await
}

#[cfg(test)]
mod auth_guard_tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension, Router,
        extract::State,
        http::StatusCode,
        middleware,
        response::Html,
        routing::{get, post},
    };
    use axum_extra::extract::{
        PrivateCookieJar,
        cookie::{Cookie, Key, SameSite},
    };
    use axum_test::TestServer;
    use rusqlite::Connection;
    use sha2::Digest;
    use time::{Duration, OffsetDateTime, UtcOffset};

    use crate::{
        Error,
        auth::{
            AuthState, COOKIE_TOKEN, DEFAULT_COOKIE_DURATION, UserID, auth_guard, auth_guard_api,
            auth_guard_hx, set_auth_cookie,
        },
        endpoints,
    };

    async fn test_handler(Extension(user_id): Extension<UserID>) -> Html<String> {
        Html(format!("<h1>Hello, user {user_id}!</h1>"))
    }

    async fn stub_log_in_route(
        State(state): State<AuthState>,
        jar: PrivateCookieJar,
    ) -> Result<PrivateCookieJar, Error> {
        set_auth_cookie(jar, UserID::new(1), state.cookie_duration, UtcOffset::UTC)
    }

    const TEST_LOG_IN_ROUTE: &str = "/test_log_in";
    const TEST_PAGE_ROUTE: &str = "/protected";
    const TEST_FORM_ROUTE: &str = "/protected/form";
    const TEST_API_ROUTE: &str = "/api/protected";

    fn get_test_server(cookie_duration: Duration) -> TestServer {
        let hash = sha2::Sha512::digest("nafstenoas");
        let state = AuthState {
            cookie_key: Key::from(&hash),
            cookie_duration,
            local_timezone: "Etc/UTC".to_owned(),
            db_connection: Arc::new(Mutex::new(Connection::open_in_memory().unwrap())),
        };

        let app = Router::new()
            .route(TEST_PAGE_ROUTE, get(test_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard))
            .merge(
                Router::new()
                    .route(TEST_FORM_ROUTE, post(test_handler))
                    .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard_hx)),
            )
            .merge(
                Router::new()
                    .route(TEST_API_ROUTE, get(test_handler))
                    .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard_api)),
            )
            .route(TEST_LOG_IN_ROUTE, post(stub_log_in_route))
            .with_state(state);

        TestServer::try_new(app).expect("Could not create test server.")
    }

    #[track_caller]
    fn assert_date_time_close(left: OffsetDateTime, right: OffsetDateTime) {
        assert!(
            (left - right).abs() < Duration::seconds(1),
            "got date time {left:?}, want {right:?}"
        );
    }

    #[tokio::test]
    async fn valid_cookie_passes_user_id_to_handler() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);
        let token_cookie = server.post(TEST_LOG_IN_ROUTE).await.cookie(COOKIE_TOKEN);

        let response = server.get(TEST_PAGE_ROUTE).add_cookie(token_cookie).await;

        response.assert_status_ok();
        response.assert_text("<h1>Hello, user 1!</h1>");
    }

    #[tokio::test]
    async fn guard_extends_short_cookie() {
        let server = get_test_server(Duration::minutes(5));
        let response = server.post(TEST_LOG_IN_ROUTE).await;
        let mut token_cookie = response.cookie(COOKIE_TOKEN);
        token_cookie.set_expires(OffsetDateTime::now_utc() + Duration::seconds(5));

        let response = server.get(TEST_PAGE_ROUTE).add_cookie(token_cookie).await;

        let auth_cookie = response.cookie(COOKIE_TOKEN);
        assert_date_time_close(
            auth_cookie.expires_datetime().unwrap(),
            OffsetDateTime::now_utc() + Duration::minutes(5),
        );
        assert_eq!(auth_cookie.http_only(), Some(true));
        assert_eq!(auth_cookie.same_site(), Some(SameSite::Strict));
    }

    #[tokio::test]
    async fn page_without_cookie_redirects_to_log_in() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);

        let response = server.get(TEST_PAGE_ROUTE).await;

        response.assert_status_see_other();
        let expected_query =
            serde_urlencoded::to_string([("redirect_url", TEST_PAGE_ROUTE)]).unwrap();
        assert_eq!(
            response.header("location"),
            format!("{}?{}", endpoints::LOG_IN_VIEW, expected_query)
        );
    }

    #[tokio::test]
    async fn page_with_garbage_cookie_redirects_to_log_in() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);

        let response = server
            .get(TEST_PAGE_ROUTE)
            .add_cookie(Cookie::build((COOKIE_TOKEN, "FOOBAR")).build())
            .await;

        response.assert_status_see_other();
    }

    #[tokio::test]
    async fn form_without_cookie_gets_hx_redirect() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);

        let response = server
            .post(TEST_FORM_ROUTE)
            .add_header("HX-Request", "true")
            .add_header("HX-Current-URL", "http://localhost/budgets")
            .await;

        response.assert_status_ok();
        let expected_query = serde_urlencoded::to_string([("redirect_url", "/budgets")]).unwrap();
        assert_eq!(
            response.header("hx-redirect"),
            format!("{}?{}", endpoints::LOG_IN_VIEW, expected_query)
        );
    }

    #[tokio::test]
    async fn api_without_cookie_gets_401_json() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);

        let response = server.get(TEST_API_ROUTE).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json();
        assert_eq!(
            body["error"],
            "Authentication credentials were not provided."
        );
    }
}
