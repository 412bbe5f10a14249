//! Reading file uploads from `multipart/form-data` requests.

use std::collections::HashMap;

use axum::extract::{Multipart, multipart::Field};

use crate::Error;

/// A file sent in a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// The file and text fields of a multipart form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// The trimmed value of a text field, `None` if it is missing or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Parse a required text field, e.g. an ID.
    ///
    /// # Errors
    /// Returns [Error::EmptyField] if the field is missing or [Error::MultipartError] if it
    /// cannot be parsed.
    pub fn parse<T: std::str::FromStr>(&self, name: &'static str) -> Result<T, Error> {
        let value = self.text(name).ok_or(Error::EmptyField(name))?;

        value
            .parse()
            .map_err(|_| Error::MultipartError(format!("invalid value for {name}: \"{value}\"")))
    }

    /// The uploaded file.
    ///
    /// # Errors
    /// Returns [Error::EmptyField] if no file was sent.
    pub fn take_file(&mut self) -> Result<UploadedFile, Error> {
        self.file.take().ok_or(Error::EmptyField("file"))
    }
}

async fn read_file_field(
    mut field: Field<'_>,
    max_file_size: usize,
) -> Result<UploadedFile, Error> {
    let file_name = match field.file_name() {
        Some(file_name) => file_name.to_owned(),
        None => {
            tracing::error!("Could not get file name from multipart form field: {field:#?}");
            return Err(Error::MultipartError(
                "Could not get file name from multipart form field".to_owned(),
            ));
        }
    };
    let content_type = field.content_type().map(str::to_owned);
    let mut data = Vec::new();

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(error) => {
                tracing::error!("Could not read data from multipart form field: {error}");
                return Err(Error::MultipartError(
                    "Could not read data from multipart form field.".to_owned(),
                ));
            }
        };

        if data.len() + chunk.len() > max_file_size {
            return Err(Error::FileTooLarge(max_file_size));
        }

        data.extend_from_slice(&chunk);
    }

    tracing::debug!("Received file '{}' that is {} bytes", file_name, data.len());

    Ok(UploadedFile {
        file_name,
        content_type,
        data,
    })
}

/// Read every field of `multipart`, keeping the field named `file` as the upload.
///
/// # Errors
/// Returns [Error::FileTooLarge] if the file is larger than `max_file_size` bytes, or
/// [Error::MultipartError] if the form cannot be read.
pub async fn read_upload_form(
    mut multipart: Multipart,
    max_file_size: usize,
) -> Result<UploadForm, Error> {
    let mut form = UploadForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return Err(Error::MultipartError(error.body_text())),
        };

        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "file" {
            form.file = Some(read_file_field(field, max_file_size).await?);
        } else {
            let value = field
                .text()
                .await
                .map_err(|error| Error::MultipartError(error.body_text()))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use crate::{
        Error,
        test_utils::{MultipartPart, must_make_multipart},
    };

    use super::read_upload_form;

    #[tokio::test]
    async fn reads_file_and_text_fields() {
        let multipart = must_make_multipart(
            "/upload",
            &[
                MultipartPart::text("account_id", " 3 "),
                MultipartPart::text("notes", ""),
                MultipartPart::file("file", "march.csv", "text/csv", b"date,amount"),
            ],
        )
        .await;

        let mut form = read_upload_form(multipart, 1024).await.unwrap();

        assert_eq!(form.parse::<i64>("account_id"), Ok(3));
        assert_eq!(form.text("notes"), None);
        let file = form.take_file().unwrap();
        assert_eq!(file.file_name, "march.csv");
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(file.data, b"date,amount");
    }

    #[tokio::test]
    async fn rejects_large_files() {
        let multipart = must_make_multipart(
            "/upload",
            &[MultipartPart::file("file", "big.bin", "application/octet-stream", &[0; 64])],
        )
        .await;

        let result = read_upload_form(multipart, 32).await;

        assert!(matches!(result, Err(Error::FileTooLarge(32))));
    }

    #[tokio::test]
    async fn missing_fields_are_reported() {
        let multipart =
            must_make_multipart("/upload", &[MultipartPart::text("account_id", "abc")]).await;

        let mut form = read_upload_form(multipart, 32).await.unwrap();

        assert_eq!(form.take_file(), Err(Error::EmptyField("file")));
        assert!(matches!(
            form.parse::<i64>("account_id"),
            Err(Error::MultipartError(_))
        ));
        assert_eq!(form.parse::<i64>("transaction_id"), Err(Error::EmptyField("transaction_id")));
    }
}
