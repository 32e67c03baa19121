pub mod page_extractor;
pub mod sitemap;

pub use page_extractor::{PageExtract, PageExtractor};
