//! Content classification
//!
//! Decides which remote files count as images and which MIME type they
//! are served with.

pub mod filetype;

pub use filetype::{content_type, is_image, ImageFormat, FALLBACK_MIME};
