//! Where to send users after they log in.

use axum::{extract::Request, http::Uri};

use crate::endpoints;

/// Only local paths are allowed, and never the log in page itself.
fn is_safe_redirect_url(redirect_url: &str) -> bool {
    if !redirect_url.starts_with('/') || redirect_url.starts_with("//") {
        return false;
    }

    let path = redirect_url
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(redirect_url);

    path != endpoints::LOG_IN_VIEW && path != endpoints::LOG_OUT
}

/// Reduce `raw_url` to a local path and query, or `None` if it points elsewhere.
pub fn normalize_redirect_url(raw_url: &str) -> Option<String> {
    let uri = raw_url.parse::<Uri>().ok()?;
    if uri.scheme().is_some() || uri.authority().is_some() {
        return None;
    }
    let path_and_query = uri.path_and_query()?.as_str();

    is_safe_redirect_url(path_and_query).then(|| path_and_query.to_owned())
}

/// The log in URL that sends the user back to the page behind `request`.
///
/// HTMX requests come from a form on another page, so the `HX-Current-URL`
/// header is used instead of the request URI. Falls back to the dashboard.
pub fn build_log_in_redirect_url(request: &Request) -> String {
    let target = if is_htmx_request(request) {
        redirect_target_from_hx_current_url(request)
    } else {
        request
            .uri()
            .path_and_query()
            .and_then(|path_and_query| normalize_redirect_url(path_and_query.as_str()))
    };

    let target = target.unwrap_or_else(|| endpoints::DASHBOARD_VIEW.to_owned());

    match serde_urlencoded::to_string([("redirect_url", &target)]) {
        Ok(param) => format!("{}?{}", endpoints::LOG_IN_VIEW, param),
        Err(error) => {
            tracing::error!("Could not encode redirect URL {target}: {error}");
            endpoints::LOG_IN_VIEW.to_owned()
        }
    }
}

fn is_htmx_request(request: &Request) -> bool {
    request
        .headers()
        .get("hx-request")
        .and_then(|header| header.to_str().ok())
        .is_some_and(|header| header.eq_ignore_ascii_case("true"))
}

fn redirect_target_from_hx_current_url(request: &Request) -> Option<String> {
    let current_url = request
        .headers()
        .get("hx-current-url")
        .and_then(|header| header.to_str().ok())?;

    // HX-Current-URL is absolute, keep only the local part.
    let path_and_query = current_url
        .parse::<Uri>()
        .ok()?
        .path_and_query()?
        .as_str()
        .to_owned();

    let redirect_url = is_safe_redirect_url(&path_and_query).then_some(path_and_query);
    if redirect_url.is_none() {
        tracing::warn!("Ignoring HX-Current-URL header value: {current_url}");
    }

    redirect_url
}
