pub mod models;
pub mod scope;

pub use scope::{canonicalize, normalize, normalize_against, CrawlTarget};
