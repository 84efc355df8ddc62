//! Content-addressed media cache: download once per content hash, serve from
//! disk afterwards.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::{MediaAsset, MediaDownloader, MediaRef, MediaStore},
};
