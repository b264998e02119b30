//! Core types and traits for the Pinhole URL shortener.
//!
//! This crate provides the domain types shared by the generator, the storage
//! backends and the shortener facade, plus the [`UrlStore`] contract every
//! backend implements.

pub mod error;
pub mod owner;
pub mod record;
pub mod shortcode;
pub mod store;

pub use error::{ShortenerError, StorageError};
pub use owner::OwnerId;
pub use record::UrlRecord;
pub use shortcode::ShortCode;
pub use store::{Purge, UrlStore};
