//! The registration page and the endpoint for creating a new user.

use axum::{
    Form,
    extract::State,
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
    account::create_default_accounts,
    auth::{AuthState, PasswordHash, User, ValidatedPassword, create_user, set_auth_cookie},
    db, endpoints,
    error_page::get_internal_server_error_redirect,
    html::{
        BUTTON_PRIMARY_STYLE, LINK_STYLE, base, loading_spinner, log_in_register, password_input,
        text_input,
    },
    profile::get_or_create_profile,
    timezone::get_local_offset,
};

/// The minimum number of characters the password should have to be considered valid on the
/// client side. The server also checks the password strength.
const PASSWORD_INPUT_MIN_LENGTH: u8 = 8;

#[derive(Debug, Default)]
struct RegistrationErrors<'a> {
    username: Option<&'a str>,
    password: Option<&'a str>,
    confirm_password: Option<&'a str>,
}

fn registration_form(username: &str, email: &str, errors: RegistrationErrors) -> Markup {
    html! {
        form
            hx-post=(endpoints::USERS)
            hx-indicator="#indicator"
            hx-disabled-elt="#username, #email, #password, #confirm_password, #submit-button"
            class="space-y-4 md:space-y-6"
        {
            (text_input("Username", "username", "text", username, true, errors.username))
            (text_input("Email", "email", "email", email, true, None))
            (password_input("password", "Password", PASSWORD_INPUT_MIN_LENGTH, errors.password))
            (password_input(
                "confirm_password",
                "Confirm Password",
                PASSWORD_INPUT_MIN_LENGTH,
                errors.confirm_password,
            ))

            button type="submit" id="submit-button" tabindex="0" class=(BUTTON_PRIMARY_STYLE)
            {
                span class="inline htmx-indicator" id="indicator"
                {
                    (loading_spinner())
                }
                "Create Account"
            }

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Already have an account? "
                a href=(endpoints::LOG_IN_VIEW) tabindex="0" class=(LINK_STYLE)
                {
                  "Log in here"
                }
            }
        }
    }
}

/// Display the registration page.
pub async fn get_register_page() -> Response {
    let registration_form = registration_form("", "", RegistrationErrors::default());
    let content = log_in_register("Create an account", &registration_form);

    base("Register", &content).into_response()
}

#[derive(Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Create the user along with their profile and default accounts.
fn create_user_with_defaults(
    username: &str,
    email: &str,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let transaction = connection.unchecked_transaction()?;

    let user = create_user(username, email, password_hash, &transaction)?;
    get_or_create_profile(user.id, &transaction)?;
    create_default_accounts(user.id, &transaction)?;

    transaction.commit()?;

    Ok(user)
}

fn rerender(user_data: &RegisterForm, errors: RegistrationErrors) -> Response {
    registration_form(&user_data.username, &user_data.email, errors).into_response()
}

/// Handler for registration requests.
///
/// On success the auth cookie is set and the client is redirected to the dashboard.
/// Validation errors re-render the form with a message.
pub async fn register_user(
    State(state): State<AuthState>,
    jar: PrivateCookieJar,
    Form(user_data): Form<RegisterForm>,
) -> Response {
    if user_data.username.trim().is_empty() {
        return rerender(&user_data, RegistrationErrors {
            username: Some("Username cannot be empty"),
            ..Default::default()
        });
    }

    let validated_password = match ValidatedPassword::new(
        &user_data.password,
        &[user_data.username.as_str(), user_data.email.as_str()],
    ) {
        Ok(password) => password,
        Err(error) => {
            return rerender(&user_data, RegistrationErrors {
                password: Some(&error.to_string()),
                ..Default::default()
            });
        }
    };

    if user_data.password != user_data.confirm_password {
        return rerender(&user_data, RegistrationErrors {
            confirm_password: Some("Passwords do not match"),
            ..Default::default()
        });
    }

    let password_hash = match PasswordHash::new(validated_password, PasswordHash::DEFAULT_COST) {
        Ok(password_hash) => password_hash,
        Err(error) => {
            tracing::error!("Could not hash password: {error}");
            return get_internal_server_error_redirect();
        }
    };

    let user = {
        let connection = match db::lock(&state.db_connection) {
            Ok(connection) => connection,
            Err(_) => return get_internal_server_error_redirect(),
        };

        match create_user_with_defaults(
            &user_data.username,
            &user_data.email,
            password_hash,
            &connection,
        ) {
            Ok(user) => user,
            Err(Error::DuplicateUsername(_)) => {
                return rerender(&user_data, RegistrationErrors {
                    username: Some("That username is already taken"),
                    ..Default::default()
                });
            }
            Err(Error::EmptyField(field)) => {
                return rerender(&user_data, RegistrationErrors {
                    username: Some(&format!("The {field} cannot be empty")),
                    ..Default::default()
                });
            }
            Err(error) => {
                tracing::error!("Could not create user: {error}");
                return get_internal_server_error_redirect();
            }
        }
    };

    tracing::info!("Registered user {}", user.username);

    let Some(local_offset) = get_local_offset(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone).into_response();
    };

    match set_auth_cookie(jar, user.id, state.cookie_duration, local_offset) {
        Ok(jar) => (
            StatusCode::SEE_OTHER,
            HxRedirect(endpoints::DASHBOARD_VIEW.to_owned()),
            jar,
        )
            .into_response(),
        Err(error) => {
            tracing::error!("Could not set auth cookie: {error}");
            get_internal_server_error_redirect()
        }
    }
}
