use std::collections::{BTreeMap, VecDeque};

use dashmap::DashSet;

use crate::domain::models::FrontierEntry;

/// Canonical URLs already admitted to a crawl, whether fetched or queued.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: DashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically admit `url`. Returns `false` when it was already present.
    pub fn insert(&self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Admitted-but-unfetched entries, one FIFO per depth. `pop` always drains
/// the shallowest level first, so dequeues stay in BFS order even when
/// concurrent workers finish out of order and push deeper entries early.
#[derive(Debug, Default)]
pub struct Frontier {
    levels: BTreeMap<usize, VecDeque<FrontierEntry>>,
    len: usize,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FrontierEntry) {
        self.levels.entry(entry.depth).or_default().push_back(entry);
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<FrontierEntry> {
        let mut level = self.levels.first_entry()?;
        let entry = level.get_mut().pop_front();
        if level.get().is_empty() {
            level.remove();
        }
        if entry.is_some() {
            self.len -= 1;
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(url: &str, depth: usize) -> FrontierEntry {
        FrontierEntry {
            url: url.to_string(),
            depth,
            source_url: None,
            link_text: None,
        }
    }

    #[test]
    fn test_visited_insert_once() {
        let visited = VisitedSet::new();
        assert!(visited.insert("https://example.com"));
        assert!(!visited.insert("https://example.com"));
        assert_eq!(visited.len(), 1);
        assert!(visited.contains("https://example.com"));
    }

    #[tokio::test]
    async fn test_visited_insert_is_atomic_across_tasks() {
        let visited = Arc::new(VisitedSet::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let visited = visited.clone();
            handles.push(tokio::spawn(async move { visited.insert("https://example.com/a") }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_frontier_is_fifo() {
        let mut frontier = Frontier::new();
        frontier.push(entry("https://example.com", 0));
        frontier.push(entry("https://example.com/a", 1));
        frontier.push(entry("https://example.com/b", 1));

        assert_eq!(frontier.len(), 3);
        assert_eq!(frontier.pop().unwrap().url, "https://example.com");
        assert_eq!(frontier.pop().unwrap().url, "https://example.com/a");
        assert_eq!(frontier.pop().unwrap().url, "https://example.com/b");
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_shallower_entries_pop_first_regardless_of_push_order() {
        let mut frontier = Frontier::new();
        frontier.push(entry("https://example.com/a2", 2));
        frontier.push(entry("https://example.com/a3", 3));
        frontier.push(entry("https://example.com/b", 1));
        frontier.push(entry("https://example.com/b2", 2));

        let order: Vec<_> = std::iter::from_fn(|| frontier.pop()).map(|e| e.url).collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/b",
                "https://example.com/a2",
                "https://example.com/b2",
                "https://example.com/a3",
            ]
        );
        assert!(frontier.is_empty());
        assert_eq!(frontier.len(), 0);
    }
}
