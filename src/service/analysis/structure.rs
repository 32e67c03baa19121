//! Internal link graph and PageRank-style scoring.

use std::collections::{HashMap, HashSet};

use crate::config::AnalysisOptions;
use crate::domain::models::{LinkEdge, PageNode, PageRecord, SiteStructure};
use crate::service::progress::StepProgress;

/// Total score shared by all nodes.
const TOTAL_SCORE: f64 = 100.0;

/// Build the internal link graph of the crawled HTML pages and score it.
///
/// Edges point only at pages that are themselves nodes; self-links and
/// repeated links between the same pair count once. Score lost at pages
/// without outgoing links is spread evenly, so scores always sum to 100.
pub fn analyze_structure(
    records: &[PageRecord],
    options: &AnalysisOptions,
    progress: &dyn StepProgress,
) -> SiteStructure {
    let pages: Vec<&PageRecord> = records.iter().filter(|r| r.is_html()).collect();
    let skipped_pages = records.len() - pages.len();
    let n = pages.len();

    let index: HashMap<&str, usize> = pages
        .iter()
        .enumerate()
        .map(|(i, page)| (page.url.as_str(), i))
        .collect();

    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut incoming = vec![0usize; n];
    let mut links = Vec::new();

    for (from, page) in pages.iter().enumerate() {
        let mut seen = HashSet::new();
        for target in &page.links.internal {
            let Some(&to) = index.get(target.as_str()) else {
                continue;
            };
            if to == from || !seen.insert(to) {
                continue;
            }
            outgoing[from].push(to);
            incoming[to] += 1;
            links.push(LinkEdge {
                from: page.url.clone(),
                to: pages[to].url.clone(),
            });
        }
    }

    let (scores, iterations, converged) = page_rank(&outgoing, options, progress);

    tracing::info!(
        "[ANALYSIS] Link graph: {} nodes, {} edges, {} iterations (converged: {})",
        n,
        links.len(),
        iterations,
        converged
    );

    let nodes = pages
        .iter()
        .enumerate()
        .map(|(i, page)| PageNode {
            url: page.url.clone(),
            page_rank: scores[i],
            incoming_links: incoming[i],
            outgoing_links: outgoing[i].len(),
        })
        .collect();

    SiteStructure {
        nodes,
        links,
        iterations,
        converged,
        skipped_pages,
    }
}

/// Iterate until the L1 change drops below epsilon or the cap is hit.
fn page_rank(
    outgoing: &[Vec<usize>],
    options: &AnalysisOptions,
    progress: &dyn StepProgress,
) -> (Vec<f64>, usize, bool) {
    let n = outgoing.len();
    if n == 0 {
        return (Vec::new(), 0, true);
    }

    let damping = options.damping_factor;
    let base = (1.0 - damping) * TOTAL_SCORE / n as f64;
    let mut scores = vec![TOTAL_SCORE / n as f64; n];
    let mut next = vec![0.0; n];

    for iteration in 1..=options.max_iterations {
        let dangling: f64 = outgoing
            .iter()
            .zip(&scores)
            .filter(|(out, _)| out.is_empty())
            .map(|(_, score)| score)
            .sum();
        let spread = damping * dangling / n as f64;

        next.iter_mut().for_each(|s| *s = base + spread);
        for (from, targets) in outgoing.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = damping * scores[from] / targets.len() as f64;
            for &to in targets {
                next[to] += share;
            }
        }

        let delta: f64 = scores.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut scores, &mut next);
        progress.step(iteration, options.max_iterations);

        if delta < options.epsilon {
            return (scores, iteration, true);
        }
    }

    tracing::debug!(
        "[ANALYSIS] PageRank stopped at the {}-iteration cap",
        options.max_iterations
    );
    (scores, options.max_iterations, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::progress::no_steps;

    fn page(url: &str, links: &[&str]) -> PageRecord {
        let mut record = PageRecord::test_instance(url, "text");
        record.links.internal = links.iter().map(|l| l.to_string()).collect();
        record
    }

    fn sum(structure: &SiteStructure) -> f64 {
        structure.nodes.iter().map(|n| n.page_rank).sum()
    }

    #[test]
    fn test_scores_sum_to_one_hundred() {
        let records = vec![
            page("https://e.com", &["https://e.com/a", "https://e.com/b"]),
            page("https://e.com/a", &["https://e.com"]),
            page("https://e.com/b", &[]),
        ];
        let structure = analyze_structure(&records, &AnalysisOptions::default(), &no_steps);

        assert!((sum(&structure) - 100.0).abs() < 1e-6);
        let home = structure.node("https://e.com").unwrap();
        assert_eq!(home.incoming_links, 1);
        assert_eq!(home.outgoing_links, 2);
        assert!(home.page_rank > structure.node("https://e.com/b").unwrap().page_rank);
    }

    #[test]
    fn test_self_links_and_repeats_count_once() {
        let records = vec![
            page("https://e.com", &["https://e.com", "https://e.com/a", "https://e.com/a"]),
            page("https://e.com/a", &[]),
        ];
        let structure = analyze_structure(&records, &AnalysisOptions::default(), &no_steps);

        assert_eq!(structure.links.len(), 1);
        assert_eq!(structure.node("https://e.com").unwrap().outgoing_links, 1);
        assert_eq!(structure.node("https://e.com/a").unwrap().incoming_links, 1);
    }

    #[test]
    fn test_links_to_uncrawled_pages_are_dropped() {
        let records = vec![page("https://e.com", &["https://e.com/never-fetched"])];
        let structure = analyze_structure(&records, &AnalysisOptions::default(), &no_steps);

        assert!(structure.links.is_empty());
        assert!((structure.nodes[0].page_rank - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric_cycle_converges_to_equal_scores() {
        let records = vec![
            page("https://e.com/1", &["https://e.com/2"]),
            page("https://e.com/2", &["https://e.com/3"]),
            page("https://e.com/3", &["https://e.com/1"]),
        ];
        let structure = analyze_structure(&records, &AnalysisOptions::default(), &no_steps);

        assert!(structure.converged);
        for node in &structure.nodes {
            assert!((node.page_rank - 100.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_iteration_cap() {
        let records = vec![
            page("https://e.com", &["https://e.com/a"]),
            page("https://e.com/a", &["https://e.com/b"]),
            page("https://e.com/b", &[]),
        ];
        let options = AnalysisOptions {
            max_iterations: 2,
            epsilon: 0.0,
            ..Default::default()
        };
        let structure = analyze_structure(&records, &options, &no_steps);

        assert_eq!(structure.iterations, 2);
        assert!(!structure.converged);
        assert!((sum(&structure) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_graph() {
        let structure = analyze_structure(&[], &AnalysisOptions::default(), &no_steps);
        assert!(structure.nodes.is_empty());
        assert!(structure.converged);
    }
}
