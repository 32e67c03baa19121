//! Content-uniqueness scoring.
//!
//! Every analysed page is compared with every other page using word
//! shingles and Jaccard similarity. Small sites get the exact all-pairs
//! comparison; above `exact_comparison_limit` pages, candidate pairs come
//! from MinHash signatures bucketed with LSH banding, and only candidates
//! are compared exactly. Pages whose content hashes match are similar at
//! 1.0 without looking at shingles.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::AnalysisOptions;
use crate::domain::models::{ContentAnalysisResult, PageContent, PageRecord, SimilarPage};
use crate::service::progress::StepProgress;

const MINHASH_SIZE: usize = 64;
const LSH_BANDS: usize = 16;
const LSH_ROWS: usize = MINHASH_SIZE / LSH_BANDS;

/// Word tokens, lowercased.
fn words(text: &str) -> Vec<String> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let re = WORD.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());
    re.find_iter(text).map(|m| m.as_str().to_lowercase()).collect()
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Sorted, deduplicated hashes of the page's k-word shingles. A text
/// shorter than `k` words becomes one shingle.
pub fn shingles(text: &str, k: usize) -> Vec<u64> {
    let words = words(text);
    if words.is_empty() {
        return Vec::new();
    }
    let k = k.max(1);

    let mut out: Vec<u64> = if words.len() <= k {
        vec![hash_of(&words)]
    } else {
        words.windows(k).map(hash_of).collect()
    };
    out.sort_unstable();
    out.dedup();
    out
}

/// Jaccard index of two sorted shingle sets.
pub fn jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let (mut i, mut j, mut shared) = (0, 0, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

fn mix(mut x: u64) -> u64 {
    // splitmix64 finaliser
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

fn minhash(shingles: &[u64]) -> [u64; MINHASH_SIZE] {
    let mut signature = [u64::MAX; MINHASH_SIZE];
    for &shingle in shingles {
        for (seed, slot) in signature.iter_mut().enumerate() {
            let h = mix(shingle ^ mix(seed as u64 + 1));
            if h < *slot {
                *slot = h;
            }
        }
    }
    signature
}

struct Analysed<'a> {
    record: &'a PageRecord,
    shingles: Vec<u64>,
}

/// Score every page's uniqueness. Non-HTML pages and pages without text
/// are skipped and counted in `skipped_pages`.
pub fn analyze_uniqueness(
    records: &[PageRecord],
    options: &AnalysisOptions,
    progress: &dyn StepProgress,
) -> ContentAnalysisResult {
    let pages: Vec<Analysed<'_>> = records
        .iter()
        .filter(|r| r.is_html() && r.has_text())
        .map(|record| Analysed {
            record,
            shingles: shingles(&record.text, options.shingle_size),
        })
        .collect();
    let skipped_pages = records.len() - pages.len();
    let n = pages.len();

    tracing::info!(
        "[ANALYSIS] Uniqueness over {} pages ({} skipped, {} mode)",
        n,
        skipped_pages,
        if n > options.exact_comparison_limit { "lsh" } else { "exact" }
    );

    let mut best: Vec<(f64, Option<usize>)> = vec![(0.0, None); n];
    let consider = |i: usize, j: usize, best: &mut Vec<(f64, Option<usize>)>| {
        let similarity = if pages[i].record.content_hash == pages[j].record.content_hash {
            1.0
        } else {
            jaccard(&pages[i].shingles, &pages[j].shingles)
        };
        for (me, other) in [(i, j), (j, i)] {
            if best[me].1.is_none() || similarity > best[me].0 {
                best[me] = (similarity, Some(other));
            }
        }
    };

    if n <= options.exact_comparison_limit {
        for i in 0..n {
            for j in (i + 1)..n {
                consider(i, j, &mut best);
            }
            progress.step(i + 1, n);
        }
    } else {
        for (i, j) in lsh_candidates(&pages) {
            consider(i, j, &mut best);
        }
        progress.step(n, n);
    }

    let mut page_contents = Vec::with_capacity(n);
    let mut duplicate_pages = Vec::new();
    for (page, (similarity, other)) in pages.iter().zip(best) {
        let most_similar_to = other.map(|o| pages[o].record.url.clone());
        let is_unique = similarity < options.similarity_threshold;
        if !is_unique {
            if let Some(duplicate_of) = most_similar_to.clone() {
                duplicate_pages.push(SimilarPage {
                    url: page.record.url.clone(),
                    duplicate_of,
                    similarity,
                });
            }
        }
        page_contents.push(PageContent {
            url: page.record.url.clone(),
            word_count: page.record.word_count,
            content_hash: page.record.content_hash.clone(),
            max_similarity: similarity,
            most_similar_to,
            is_unique,
        });
    }

    let unique_pages = page_contents.iter().filter(|p| p.is_unique).count();
    let overall_uniqueness = if n == 0 {
        100.0
    } else {
        100.0 * unique_pages as f64 / n as f64
    };

    tracing::info!(
        "[ANALYSIS] {}/{} pages unique ({:.1}%)",
        unique_pages,
        n,
        overall_uniqueness
    );

    ContentAnalysisResult {
        overall_uniqueness,
        unique_pages,
        total_pages: n,
        page_contents,
        duplicate_pages,
        skipped_pages,
    }
}

/// Candidate pairs sharing an LSH band or an identical content hash.
fn lsh_candidates(pages: &[Analysed<'_>]) -> HashSet<(usize, usize)> {
    let mut buckets: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
    for (i, page) in pages.iter().enumerate() {
        let signature = minhash(&page.shingles);
        for (band, rows) in signature.chunks(LSH_ROWS).enumerate() {
            buckets.entry((band, hash_of(rows))).or_default().push(i);
        }
        // band index past the last LSH band keys exact hash matches
        buckets
            .entry((LSH_BANDS, hash_of(&page.record.content_hash)))
            .or_default()
            .push(i);
    }

    let mut pairs = HashSet::new();
    for members in buckets.values().filter(|m| m.len() > 1) {
        for (a, &i) in members.iter().enumerate() {
            for &j in &members[a + 1..] {
                pairs.insert((i.min(j), i.max(j)));
            }
        }
    }
    tracing::debug!("[ANALYSIS] LSH produced {} candidate pairs", pairs.len());
    pairs
}
