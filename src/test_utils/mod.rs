//! Assertions shared by the handler tests.

mod form;
mod html;
mod http;

pub(crate) use form::{
    assert_form_input, assert_form_submit_button, assert_hx_endpoint, must_get_form,
};
pub(crate) use html::{assert_valid_html, parse_html_document};
pub(crate) use http::{MultipartPart, assert_hx_redirect, assert_status_ok, must_make_multipart};
