//! Importing bank statements in CSV and OFX formats.
//!
//! Uploads are stored as pending imports and turned into transactions by a background job,
//! skipping transactions that were imported before.

mod api;
mod core;
mod parse;
mod process;

pub use api::{
    MAX_IMPORT_FILE_SIZE, delete_import_endpoint, get_import_endpoint, list_imports_endpoint,
    retry_import_endpoint, upload_import_endpoint,
};
pub use core::{ImportStatus, create_import, create_import_table, get_import};
pub use process::process_pending_imports;
