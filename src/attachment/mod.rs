//! Files such as receipts attached to transactions, stored in the database.

mod api;
mod core;

pub use api::{
    delete_attachment_endpoint, download_attachment_endpoint, get_attachment_endpoint,
    list_attachments_endpoint, upload_attachment_endpoint,
};
pub use core::{MAX_ATTACHMENT_SIZE, cleanup_old_attachments, create_attachment_table};
