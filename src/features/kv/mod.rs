pub mod client;
pub mod models;

pub use client::{CloudflareClient, DEFAULT_PAGE_LIMIT, KvApi};
pub use models::{KeyEntry, KeyPage, Namespace};
