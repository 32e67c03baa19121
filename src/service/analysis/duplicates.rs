use std::collections::HashMap;

use crate::domain::models::{DuplicateMetaTag, DuplicatePage, MetaTagKind, PageRecord};
use crate::extractor::page_extractor::collapse_whitespace;
use crate::service::progress::StepProgress;

/// Group pages whose extracted text hashes identically. Pages without text
/// (assets, empty bodies) take no part.
pub fn find_duplicate_pages(records: &[PageRecord], progress: &dyn StepProgress) -> Vec<DuplicatePage> {
    let total = records.len();
    let mut groups: Vec<DuplicatePage> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        progress.step(i + 1, total);
        if !record.is_html() || !record.has_text() {
            continue;
        }
        match index.get(record.content_hash.as_str()) {
            Some(&slot) => groups[slot].urls.push(record.url.clone()),
            None => {
                index.insert(record.content_hash.as_str(), groups.len());
                groups.push(DuplicatePage {
                    title: record.title.clone(),
                    content_length: record.text.len(),
                    urls: vec![record.url.clone()],
                });
            }
        }
    }

    groups.retain(|group| group.urls.len() >= 2);
    tracing::debug!("[ANALYSIS] {} duplicate content groups", groups.len());
    groups
}

/// Group pages sharing a title or meta description. Comparison ignores case
/// and surrounding whitespace; the reported value is the first one seen.
pub fn find_duplicate_meta(records: &[PageRecord], progress: &dyn StepProgress) -> Vec<DuplicateMetaTag> {
    let total = records.len();
    let mut groups: Vec<DuplicateMetaTag> = Vec::new();
    let mut index: HashMap<(MetaTagKind, String), usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        progress.step(i + 1, total);
        if !record.is_html() {
            continue;
        }

        let values = [
            (MetaTagKind::Title, record.title.as_deref()),
            (MetaTagKind::Description, record.meta.description.as_deref()),
        ];
        for (tag, value) in values {
            let Some(value) = value.map(collapse_whitespace).filter(|v| !v.is_empty()) else {
                continue;
            };
            let key = (tag, value.to_lowercase());
            match index.get(&key) {
                Some(&slot) => groups[slot].pages.push(record.url.clone()),
                None => {
                    index.insert(key, groups.len());
                    groups.push(DuplicateMetaTag {
                        tag,
                        value,
                        pages: vec![record.url.clone()],
                    });
                }
            }
        }
    }

    groups.retain(|group| group.pages.len() >= 2);
    tracing::debug!("[ANALYSIS] {} duplicate meta groups", groups.len());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::progress::no_steps;

    #[test]
    fn test_identical_text_forms_one_group() {
        let records = vec![
            PageRecord::test_instance("https://example.com/a", "Same words here"),
            PageRecord::test_instance("https://example.com/b", "same   words HERE"),
            PageRecord::test_instance("https://example.com/c", "Same words here"),
            PageRecord::test_instance("https://example.com/d", "Something else entirely"),
        ];

        let groups = find_duplicate_pages(&records, &no_steps);

        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].urls,
            vec!["https://example.com/a", "https://example.com/b", "https://example.com/c"]
        );
    }

    #[test]
    fn test_empty_pages_are_not_duplicates() {
        let records = vec![
            PageRecord::test_instance("https://example.com/a", ""),
            PageRecord::test_instance("https://example.com/b", ""),
        ];
        assert!(find_duplicate_pages(&records, &no_steps).is_empty());
    }

    #[test]
    fn test_duplicate_titles_and_descriptions() {
        let mut a = PageRecord::test_instance("https://example.com/a", "one");
        let mut b = PageRecord::test_instance("https://example.com/b", "two");
        let mut c = PageRecord::test_instance("https://example.com/c", "three");
        a.title = Some("Welcome".to_string());
        b.title = Some("  welcome ".to_string());
        c.title = Some("Contact".to_string());
        a.meta.description = Some("Shared blurb".to_string());
        c.meta.description = Some("Shared blurb".to_string());

        let groups = find_duplicate_meta(&[a, b, c], &no_steps);

        assert_eq!(groups.len(), 2);
        let title = groups.iter().find(|g| g.tag == MetaTagKind::Title).unwrap();
        assert_eq!(title.value, "Welcome");
        assert_eq!(title.pages.len(), 2);
        let description = groups
            .iter()
            .find(|g| g.tag == MetaTagKind::Description)
            .unwrap();
        assert_eq!(
            description.pages,
            vec!["https://example.com/a", "https://example.com/c"]
        );
    }

    #[test]
    fn test_progress_reaches_total() {
        let records = vec![
            PageRecord::test_instance("https://example.com/a", "x"),
            PageRecord::test_instance("https://example.com/b", "y"),
        ];
        let last = std::sync::Mutex::new((0, 0));
        let progress = |current: usize, total: usize| *last.lock().unwrap() = (current, total);
        find_duplicate_pages(&records, &progress);
        assert_eq!(*last.lock().unwrap(), (2, 2));
    }
}
