//! Alerts for displaying error messages to users.
//!
//! Alerts are rendered as HTML fragments that htmx swaps into the alert
//! container at the bottom of every page.

use maud::{Markup, html};

const ERROR_STYLE: &str =
    "p-4 mb-4 text-sm text-red-800 rounded-lg bg-red-50 dark:bg-gray-800 dark:text-red-400";

/// A message shown to the user after a form submission fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// The operation failed, with an explanation of how to fix it.
    Error {
        /// The headline.
        message: String,
        /// Additional explanation.
        details: String,
    },
    /// The operation failed.
    ErrorSimple {
        /// The headline.
        message: String,
    },
}

impl Alert {
    /// Render the alert as an out-of-band swap into the alert container.
    pub fn into_html(self) -> Markup {
        let (message, details) = match self {
            Alert::Error { message, details } => (message, Some(details)),
            Alert::ErrorSimple { message } => (message, None),
        };

        html! {
            div
                id="alert-container"
                hx-swap-oob="true"
                class="w-full max-w-md px-4"
                style="position: fixed; bottom: 1rem; left: 50%; transform: translateX(-50%); z-index: 9999;"
            {
                div class=(ERROR_STYLE) role="alert"
                {
                    span class="font-medium" { (message) }

                    @if let Some(details) = details {
                        @if !details.is_empty() {
                            p { (details) }
                        }
                    }

                    button
                        type="button"
                        class="ms-auto text-sm underline"
                        onclick="this.closest('#alert-container').classList.add('hidden')"
                    {
                        "Dismiss"
                    }
                }
            }
        }
    }
}
