pub mod site;
pub mod sitemap;

pub use sitemap::{render_csv, render_html, render_xml, render_xml_at, UrlOverride};
