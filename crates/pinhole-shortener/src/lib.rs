//! URL shortener facade.
//!
//! [`ShortenerService`] is the single entry point request handlers talk to.
//! It validates input, derives codes with the hash generator and delegates
//! persistence to whichever [`pinhole_core::UrlStore`] the factory opened.

pub mod config;
pub mod service;
pub mod shortener;

pub use config::CLI;
pub use service::ShortenerService;
pub use shortener::{BatchItem, BatchShortened, DeleteReport, ShortenOutcome, Shortener};
