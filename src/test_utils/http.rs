use axum::{
    body::Body,
    extract::{FromRequest, Multipart},
    http::{Request, StatusCode},
    response::Response,
};

#[track_caller]
pub(crate) fn assert_status_ok(response: &Response<Body>) {
    assert_eq!(response.status(), StatusCode::OK);
}

#[track_caller]
fn get_header(response: &Response<Body>, header_name: &str) -> String {
    let header_error_message = format!("Headers missing {header_name}");

    response
        .headers()
        .get(header_name)
        .expect(&header_error_message)
        .to_str()
        .expect("Could not convert to str")
        .to_string()
}

#[track_caller]
pub(crate) fn assert_hx_redirect(response: &Response<Body>, endpoint: &str) {
    assert_eq!(get_header(response, "hx-redirect"), endpoint);
}

/// One part of a `multipart/form-data` body.
pub(crate) struct MultipartPart<'a> {
    pub name: &'a str,
    /// Set for file uploads.
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

impl<'a> MultipartPart<'a> {
    pub(crate) fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            body: value.as_bytes(),
        }
    }

    pub(crate) fn file(name: &'a str, file_name: &'a str, content_type: &'a str, body: &'a [u8]) -> Self {
        Self {
            name,
            file_name: Some(file_name),
            content_type: Some(content_type),
            body,
        }
    }
}

pub(crate) async fn must_make_multipart(uri: &str, parts: &[MultipartPart<'_>]) -> Multipart {
    let boundary = "MY_BOUNDARY123456789";
    let mut data: Vec<u8> = Vec::new();

    for part in parts {
        data.extend_from_slice(format!("--{boundary}\r\n").as_bytes());

        let disposition = match part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        data.extend_from_slice(disposition.as_bytes());

        if let Some(content_type) = part.content_type {
            data.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }

        data.extend_from_slice(b"\r\n");
        data.extend_from_slice(part.body);
        data.extend_from_slice(b"\r\n");
    }

    data.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(data))
        .unwrap();

    Multipart::from_request(request, &()).await.unwrap()
}
