//! The log-in page and the form handler that starts a session.

use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::Deserialize;

use crate::{
    Error,
    auth::{
        AuthState, REMEMBER_ME_COOKIE_DURATION, User, get_user_by_username, invalidate_auth_cookie,
        normalize_redirect_url, set_auth_cookie,
    },
    db, endpoints,
    html::{
        BUTTON_PRIMARY_STYLE, LINK_STYLE, base, loading_spinner, log_in_register, password_input,
        text_input,
    },
    timezone::get_local_offset,
};

pub const INVALID_CREDENTIALS_ERROR_MSG: &str = "Incorrect username or password.";

fn log_in_form(username: &str, error_message: Option<&str>, redirect_url: Option<&str>) -> Markup {
    html! {
        form
            hx-post=(endpoints::LOG_IN_API)
            hx-indicator="#indicator"
            hx-disabled-elt="#username, #password, #submit-button"
            class="space-y-4 md:space-y-6"
        {
            @if let Some(redirect_url) = redirect_url {
                input type="hidden" name="redirect_url" value=(redirect_url);
            }

            (text_input("Username", "username", "text", username, true, None))

            (password_input("password", "Password", 0, error_message))

            div class="flex items-center gap-x-3"
            {
                input
                    type="checkbox"
                    name="remember_me"
                    id="remember_me"
                    tabindex="0"
                    class="rounded-xs";

                label
                    for="remember_me"
                    class="block text-sm font-medium text-gray-900 dark:text-white"
                {
                    "Keep me logged in for one week"
                }
            }

            button type="submit" id="submit-button" tabindex="0" class=(BUTTON_PRIMARY_STYLE)
            {
                span class="inline htmx-indicator" id="indicator"
                {
                    (loading_spinner())
                }
                "Log in"
            }

            p class="text-sm font-light text-gray-500 dark:text-gray-400" {
                "Don't have an account? "
                a href=(endpoints::REGISTER_VIEW) tabindex="0" class=(LINK_STYLE)
                {
                  "Register here"
                }
            }
        }
    }
}

fn parse_redirect_url(raw_url: Option<&str>, source: &str) -> Option<String> {
    match raw_url.and_then(normalize_redirect_url) {
        Some(redirect_url) => Some(redirect_url),
        None => {
            if let Some(redirect_url) = raw_url {
                tracing::warn!("Invalid redirect URL from {source}: {redirect_url}");
            }
            None
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub redirect_url: Option<String>,
}

/// Display the log-in page.
pub async fn get_log_in_page(Query(query): Query<RedirectQuery>) -> Response {
    let redirect_url = parse_redirect_url(query.redirect_url.as_deref(), "log-in query");
    let log_in_form = log_in_form("", None, redirect_url.as_deref());
    let content = log_in_register("Log in to your account", &log_in_form);

    base("Log In", &content).into_response()
}

#[derive(Clone, Deserialize)]
pub struct LogInData {
    pub username: String,
    pub password: String,
    /// Set to any value when the "keep me logged in" checkbox is ticked.
    pub remember_me: Option<String>,
    /// Local path to return to after logging in.
    pub redirect_url: Option<String>,
}

/// The user called `username` if `password` is theirs.
///
/// Unknown usernames and wrong passwords both give `Ok(None)` so the caller cannot tell them
/// apart.
fn authenticate(
    username: &str,
    password: &str,
    connection: &Connection,
) -> Result<Option<User>, Error> {
    let user = match get_user_by_username(username, connection) {
        Ok(user) => user,
        Err(Error::NotFound) => return Ok(None),
        Err(error) => return Err(error),
    };

    let is_match = user
        .password_hash
        .verify(password)
        .map_err(|error| Error::HashingError(error.to_string()))?;

    Ok(is_match.then_some(user))
}

/// Check the submitted credentials and start a session.
///
/// Success sets the auth cookie and sends htmx to `redirect_url` when it is a local path, or to
/// the dashboard. Failure re-renders the form with an error.
pub async fn post_log_in(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    Form(user_data): Form<LogInData>,
) -> Response {
    let redirect_url = parse_redirect_url(user_data.redirect_url.as_deref(), "log-in form");
    let redirect_url = redirect_url.as_deref();
    let form_with_error =
        |message: &str| log_in_form(&user_data.username, Some(message), redirect_url).into_response();

    let authenticated = db::lock(&state.db_connection).and_then(|connection| {
        authenticate(&user_data.username, &user_data.password, &connection)
    });
    let user = match authenticated {
        Ok(Some(user)) => user,
        Ok(None) => return form_with_error(INVALID_CREDENTIALS_ERROR_MSG),
        Err(error) => {
            tracing::error!("Could not verify credentials: {error}");
            return form_with_error("An internal error occurred. Please try again later.");
        }
    };

    let Some(local_offset) = get_local_offset(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone).into_response();
    };
    let cookie_duration = match user_data.remember_me {
        Some(_) => REMEMBER_ME_COOKIE_DURATION,
        None => state.cookie_duration,
    };

    match set_auth_cookie(jar.clone(), user.id, cookie_duration, local_offset) {
        Ok(jar) => {
            tracing::info!("User {} logged in", user.username);
            let redirect_url = redirect_url.unwrap_or(endpoints::DASHBOARD_VIEW);

            (StatusCode::SEE_OTHER, HxRedirect(redirect_url.to_owned()), jar).into_response()
        }
        Err(error) => {
            tracing::error!("Could not set auth cookie: {error}");

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                HxRedirect(endpoints::INTERNAL_ERROR_VIEW.to_owned()),
                invalidate_auth_cookie(jar),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod log_in_page_tests {
    use axum::{extract::Query, http::StatusCode};
    use scraper::Selector;

    use crate::{
        endpoints,
        test_utils::{
            assert_form_input, assert_form_submit_button, assert_hx_endpoint, assert_valid_html,
            must_get_form, parse_html_document,
        },
    };

    use super::{RedirectQuery, get_log_in_page};

    #[tokio::test]
    async fn log_in_page_displays_form() {
        let response = get_log_in_page(Query(RedirectQuery { redirect_url: None })).await;

        assert_eq!(response.status(), StatusCode::OK);
        let document = parse_html_document(response).await;
        assert_valid_html(&document);

        let form = must_get_form(&document);
        assert_hx_endpoint(&form, endpoints::LOG_IN_API, "hx-post");
        assert_form_input(&form, "username", "text");
        assert_form_input(&form, "password", "password");
        assert_form_submit_button(&form);

        let register_link = form
            .select(&Selector::parse("a[href]").unwrap())
            .next()
            .expect("No register link found");
        assert_eq!(register_link.value().attr("href"), Some(endpoints::REGISTER_VIEW));
    }

    #[tokio::test]
    async fn log_in_page_preserves_redirect_url() {
        let redirect_url = "/transactions?page=2";
        let response = get_log_in_page(Query(RedirectQuery {
            redirect_url: Some(redirect_url.to_owned()),
        }))
        .await;

        let document = parse_html_document(response).await;
        let input = document
            .select(&Selector::parse("input[name=redirect_url]").unwrap())
            .next()
            .expect("No redirect_url input found");

        assert_eq!(input.value().attr("value"), Some(redirect_url));
    }

    #[tokio::test]
    async fn log_in_page_drops_external_redirect_url() {
        let response = get_log_in_page(Query(RedirectQuery {
            redirect_url: Some("https://example.com".to_owned()),
        }))
        .await;

        let document = parse_html_document(response).await;
        let inputs = document
            .select(&Selector::parse("input[name=redirect_url]").unwrap())
            .count();

        assert_eq!(inputs, 0);
    }
}

#[cfg(test)]
mod log_in_tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::{
        app_state::create_cookie_key,
        auth::{
            AuthState, COOKIE_TOKEN, DEFAULT_COOKIE_DURATION, PasswordHash,
            REMEMBER_ME_COOKIE_DURATION, create_user,
        },
        db::initialize,
        endpoints,
    };

    use super::{INVALID_CREDENTIALS_ERROR_MSG, post_log_in};

    fn get_test_server() -> TestServer {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        create_user(
            "alice",
            "alice@example.com",
            PasswordHash::from_raw_password("correct horse battery staple", &[], 4).unwrap(),
            &connection,
        )
        .unwrap();

        let state = AuthState {
            cookie_key: create_cookie_key("foobar"),
            cookie_duration: DEFAULT_COOKIE_DURATION,
            local_timezone: "Etc/UTC".to_owned(),
            db_connection: Arc::new(Mutex::new(connection)),
        };
        let app = Router::new()
            .route(endpoints::LOG_IN_API, post(post_log_in))
            .with_state(state);

        TestServer::try_new(app).unwrap()
    }

    #[track_caller]
    fn assert_close(left: OffsetDateTime, right: OffsetDateTime) {
        assert!(
            (left - right).abs() < Duration::seconds(2),
            "got date time {left:?}, want {right:?}"
        );
    }

    #[tokio::test]
    async fn log_in_succeeds_with_valid_credentials() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[("username", "alice"), ("password", "correct horse battery staple")])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("hx-redirect"), endpoints::DASHBOARD_VIEW);
        assert_close(
            response.cookie(COOKIE_TOKEN).expires_datetime().unwrap(),
            OffsetDateTime::now_utc() + DEFAULT_COOKIE_DURATION,
        );
    }

    #[tokio::test]
    async fn username_is_case_insensitive() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[("username", "ALICE"), ("password", "correct horse battery staple")])
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn remember_me_extends_auth_cookie() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[
                ("username", "alice"),
                ("password", "correct horse battery staple"),
                ("remember_me", "on"),
            ])
            .await;

        assert_close(
            response.cookie(COOKIE_TOKEN).expires_datetime().unwrap(),
            OffsetDateTime::now_utc() + REMEMBER_ME_COOKIE_DURATION,
        );
    }

    #[tokio::test]
    async fn redirects_to_requested_url() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[
                ("username", "alice"),
                ("password", "correct horse battery staple"),
                ("redirect_url", "/budgets"),
            ])
            .await;

        assert_eq!(response.header("hx-redirect"), "/budgets");
    }

    #[tokio::test]
    async fn ignores_external_redirect_url() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[
                ("username", "alice"),
                ("password", "correct horse battery staple"),
                ("redirect_url", "https://example.com"),
            ])
            .await;

        assert_eq!(response.header("hx-redirect"), endpoints::DASHBOARD_VIEW);
    }

    #[tokio::test]
    async fn wrong_password_shows_error() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[("username", "alice"), ("password", "wrong")])
            .await;

        response.assert_status_ok();
        assert!(response.text().contains(INVALID_CREDENTIALS_ERROR_MSG));
    }

    #[tokio::test]
    async fn unknown_user_shows_same_error() {
        let server = get_test_server();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&[("username", "mallory"), ("password", "wrong")])
            .await;

        response.assert_status_ok();
        assert!(response.text().contains(INVALID_CREDENTIALS_ERROR_MSG));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let server = get_test_server();

        server
            .post(endpoints::LOG_IN_API)
            .content_type("application/x-www-form-urlencoded")
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }
}
