//! Near-duplicate detection and consolidation for batches of content items.
//!
//! The same story often arrives through several feeds and search pages with
//! lightly reworded headlines. This module vectorizes each item's comparison
//! text (title plus leading body) with a bag-of-ngrams TF-IDF model fit once
//! over the whole batch, computes the full pairwise cosine-similarity
//! matrix, and greedily clusters items whose similarity to a cluster's
//! *anchor* (its first item) meets the threshold. Each cluster folds into a
//! single [`MergedItem`]; everything else passes through unchanged, in its
//! original order.
//!
//! Clustering is anchor-based by design, not transitive closure: an item
//! similar to a later cluster member but not to the anchor stays out. The
//! similarity matrix is O(N²) in time and space, which makes this the
//! dominant cost of the whole pipeline; shard large batches by date or
//! source before calling in here.

use crate::error::{IngestError, Result};
use crate::models::{ContentItem, Deduped, MergedItem};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Token pattern: runs of two or more word characters, lowercased upstream.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// English stop words removed before n-gram construction.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an",
        "and", "any", "are", "as", "at", "be", "because", "been", "before", "being",
        "below", "between", "both", "but", "by", "can", "cannot", "could", "did", "do",
        "does", "doing", "down", "during", "each", "few", "for", "from", "further",
        "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
        "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself",
        "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
        "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out",
        "over", "own", "same", "she", "should", "so", "some", "such", "than", "that",
        "the", "their", "theirs", "them", "themselves", "then", "there", "these",
        "they", "this", "those", "through", "to", "too", "under", "until", "up",
        "very", "was", "we", "were", "what", "when", "where", "which", "while", "who",
        "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
        "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Vocabulary cap: keep only the most frequent terms across the batch.
const MAX_VOCABULARY: usize = 1000;

/// Sparse TF-IDF vector, L2-normalized, sorted by term index.
type SparseVec = Vec<(usize, f64)>;

/// Consolidates near-duplicate items in a batch.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    similarity_threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(0.85)
    }
}

impl Deduplicator {
    /// Create a deduplicator with a cosine-similarity threshold in `[0, 1]`.
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold: similarity_threshold.clamp(0.0, 1.0),
        }
    }

    /// Merge near-duplicate items, preserving everything else untouched and
    /// in original relative order.
    ///
    /// Each surviving cluster contributes one [`Deduped::Merged`] at its
    /// anchor's position, so the output length is
    /// `N - Σ(cluster_size - 1)`. If the batch cannot be vectorized at all
    /// (a degenerate all-stop-word corpus, for instance) the input comes
    /// back unchanged, since a partially vectorized comparison would be
    /// meaningless.
    #[instrument(level = "info", skip_all, fields(count = items.len()))]
    pub fn deduplicate(&self, items: Vec<ContentItem>) -> Vec<Deduped> {
        if items.is_empty() {
            return Vec::new();
        }

        let texts: Vec<String> = items.iter().map(ContentItem::comparison_text).collect();
        let vectors = match vectorize(&texts) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Vectorization failed; returning batch unchanged");
                return items.into_iter().map(Deduped::Single).collect();
            }
        };

        let similarity = similarity_matrix(&vectors);
        let clusters = self.find_clusters(&similarity);
        if clusters.is_empty() {
            return items.into_iter().map(Deduped::Single).collect();
        }

        let merged_away: usize = clusters.iter().map(|c| c.len() - 1).sum();
        info!(
            clusters = clusters.len(),
            merged_away, "Found duplicate clusters"
        );

        assemble(items, clusters)
    }

    /// Greedy single-pass, anchor-based clustering over the similarity
    /// matrix. Returns clusters of size >= 2, each with its anchor first.
    fn find_clusters(&self, similarity: &[Vec<f64>]) -> Vec<Vec<usize>> {
        let n = similarity.len();
        let mut processed = vec![false; n];
        let mut clusters = Vec::new();

        for anchor in 0..n {
            if processed[anchor] {
                continue;
            }
            processed[anchor] = true;

            let mut members = vec![anchor];
            for candidate in (anchor + 1)..n {
                if processed[candidate] {
                    continue;
                }
                if similarity[anchor][candidate] >= self.similarity_threshold {
                    members.push(candidate);
                    processed[candidate] = true;
                }
            }

            if members.len() > 1 {
                clusters.push(members);
            }
        }

        clusters
    }
}

/// Fold one cluster of items into a merged record.
///
/// The representative body is the longest member body by character count
/// (first occurrence wins ties), the publication date is the earliest among
/// members, and the member URLs keep their input order.
fn merge_cluster(items: &[ContentItem], members: &[usize]) -> MergedItem {
    let mut representative = &items[members[0]];
    let mut longest = representative.body.chars().count();
    for &idx in &members[1..] {
        let chars = items[idx].body.chars().count();
        if chars > longest {
            representative = &items[idx];
            longest = chars;
        }
    }

    let earliest = members
        .iter()
        .map(|&idx| items[idx].published_at)
        .min()
        .expect("cluster is never empty");

    let sources: BTreeSet<String> = members
        .iter()
        .map(|&idx| items[idx].source_name.clone())
        .collect();
    let source_urls: Vec<String> = members.iter().map(|&idx| items[idx].url.clone()).collect();

    let mut item = representative.clone();
    item.published_at = earliest;

    MergedItem {
        item,
        sources,
        source_urls,
        is_merged: true,
        merged_count: members.len(),
    }
}

/// Build the final output: singles in original order, each merged record at
/// its anchor's position.
fn assemble(items: Vec<ContentItem>, clusters: Vec<Vec<usize>>) -> Vec<Deduped> {
    let merged_by_anchor: HashMap<usize, MergedItem> = clusters
        .iter()
        .map(|members| (members[0], merge_cluster(&items, members)))
        .collect();
    let clustered: HashSet<usize> = clusters.iter().flatten().copied().collect();

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            if let Some(merged) = merged_by_anchor.get(&idx) {
                Some(Deduped::Merged(merged.clone()))
            } else if clustered.contains(&idx) {
                None
            } else {
                Some(Deduped::Single(item))
            }
        })
        .collect()
}

/// Collapse a token that is one character repeated down to a two-character
/// run. Such a run carries no more signal than the character itself, and
/// without the collapse two padded texts of different lengths ("xx..." of
/// 600 vs 200) tokenize to disjoint terms and compare as totally unrelated.
fn collapse_run(token: &str) -> &str {
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return token;
    };
    if chars.all(|c| c == first) {
        let end = token
            .char_indices()
            .nth(2)
            .map(|(i, _)| i)
            .unwrap_or(token.len());
        &token[..end]
    } else {
        token
    }
}

/// Tokenize one comparison text into unigrams and bigrams.
///
/// Lowercases, keeps word tokens of length >= 2 with repeated-character
/// runs collapsed, drops English stop words, then forms bigrams over the
/// surviving tokens.
fn ngrams(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = TOKEN_RE
        .find_iter(&lowered)
        .map(|m| collapse_run(m.as_str()))
        .filter(|t| !STOP_WORDS.contains(t))
        .collect();

    let mut grams: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    for pair in tokens.windows(2) {
        grams.push(format!("{} {}", pair[0], pair[1]));
    }
    grams
}

/// Fit a TF-IDF model over the whole batch and produce one normalized
/// sparse vector per text.
///
/// The vocabulary is capped at [`MAX_VOCABULARY`] terms, kept by descending
/// corpus frequency (ties broken alphabetically for determinism). Inverse
/// document frequency is smoothed: `ln((1 + n) / (1 + df)) + 1`.
fn vectorize(texts: &[String]) -> Result<Vec<SparseVec>> {
    let token_lists: Vec<Vec<String>> = texts.iter().map(|t| ngrams(t)).collect();

    let mut corpus_counts: HashMap<&str, usize> = HashMap::new();
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &token_lists {
        let mut seen = HashSet::new();
        for token in tokens {
            *corpus_counts.entry(token.as_str()).or_insert(0) += 1;
            if seen.insert(token.as_str()) {
                *doc_freq.entry(token.as_str()).or_insert(0) += 1;
            }
        }
    }

    if corpus_counts.is_empty() {
        return Err(IngestError::Vectorization(
            "empty vocabulary: no tokens survived filtering".into(),
        ));
    }

    let mut terms: Vec<(&str, usize)> = corpus_counts.iter().map(|(t, c)| (*t, *c)).collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    terms.truncate(MAX_VOCABULARY);

    let vocabulary: HashMap<&str, usize> = terms
        .iter()
        .enumerate()
        .map(|(idx, (term, _))| (*term, idx))
        .collect();

    let n_docs = texts.len() as f64;
    let idf: Vec<f64> = terms
        .iter()
        .map(|(term, _)| {
            let df = doc_freq[term] as f64;
            ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
        })
        .collect();

    let vectors = token_lists
        .iter()
        .map(|tokens| {
            let mut tf: HashMap<usize, f64> = HashMap::new();
            for token in tokens {
                if let Some(&idx) = vocabulary.get(token.as_str()) {
                    *tf.entry(idx).or_insert(0.0) += 1.0;
                }
            }

            let mut vector: SparseVec = tf
                .into_iter()
                .map(|(idx, count)| (idx, count * idf[idx]))
                .collect();
            vector.sort_by_key(|(idx, _)| *idx);

            let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, w) in &mut vector {
                    *w /= norm;
                }
            }
            vector
        })
        .collect();

    Ok(vectors)
}

/// Dot product of two normalized sparse vectors, i.e. their cosine.
fn cosine(a: &SparseVec, b: &SparseVec) -> f64 {
    let mut dot = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

/// Full N×N cosine matrix. Symmetric with a unit diagonal (for non-empty
/// vectors), but filled densely since the clustering pass reads both halves.
fn similarity_matrix(vectors: &[SparseVec]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let sim = cosine(&vectors[i], &vectors[j]);
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn item(title: &str, body: &str, url: &str, source: &str, day: &str) -> ContentItem {
        ContentItem::new(title, body, url, source, date(day))
    }

    #[test]
    fn test_empty_input() {
        let dedup = Deduplicator::default();
        assert!(dedup.deduplicate(Vec::new()).is_empty());
    }

    #[test]
    fn test_distinct_items_pass_through_in_order() {
        let dedup = Deduplicator::default();
        let items = vec![
            item(
                "Central bank raises rates",
                "Policy makers voted to raise the benchmark rate by a quarter point.",
                "https://a.example/rates",
                "Wire A",
                "2024-01-01",
            ),
            item(
                "Volcano erupts on island",
                "Residents evacuated as lava flows reached the coastal village.",
                "https://b.example/volcano",
                "Wire B",
                "2024-01-02",
            ),
            item(
                "Championship final ends in draw",
                "The match finished level after extra time and goes to a replay.",
                "https://c.example/final",
                "Wire C",
                "2024-01-03",
            ),
        ];

        let out = dedup.deduplicate(items.clone());
        assert_eq!(out.len(), 3);
        for (deduped, original) in out.iter().zip(&items) {
            assert!(matches!(deduped, Deduped::Single(_)));
            assert_eq!(deduped.item().url, original.url);
        }
    }

    #[test]
    fn test_identical_pair_merges() {
        let dedup = Deduplicator::default();
        let items = vec![
            item(
                "Storm closes schools",
                "Heavy snowfall closed schools across the region on Monday.",
                "https://a.example/storm",
                "Wire A",
                "2024-01-02",
            ),
            item(
                "Storm closes schools",
                "Heavy snowfall closed schools across the region on Monday.",
                "https://b.example/storm",
                "Wire B",
                "2024-01-01",
            ),
        ];

        let out = dedup.deduplicate(items);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Deduped::Merged(m) => {
                assert_eq!(m.merged_count, 2);
                assert_eq!(
                    m.source_urls,
                    vec!["https://a.example/storm", "https://b.example/storm"]
                );
                assert!(m.sources.contains("Wire A") && m.sources.contains("Wire B"));
                assert_eq!(m.item.published_at, date("2024-01-01"));
            }
            Deduped::Single(_) => panic!("expected a merged record"),
        }
    }

    #[test]
    fn test_longest_body_wins_and_earliest_date() {
        // Same title, bodies of 600 vs 200 chars, threshold 0.5.
        let dedup = Deduplicator::new(0.5);
        let items = vec![
            item("A", &"x".repeat(600), "u1", "S1", "2024-01-02"),
            item("A", &"x".repeat(200), "u2", "S2", "2024-01-01"),
        ];

        let out = dedup.deduplicate(items);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Deduped::Merged(m) => {
                assert_eq!(m.item.body.len(), 600);
                assert_eq!(m.item.published_at, date("2024-01-01"));
                assert_eq!(m.source_urls, vec!["u1", "u2"]);
            }
            Deduped::Single(_) => panic!("expected a merged record"),
        }
    }

    #[test]
    fn test_body_length_compared_by_characters() {
        // 10 CJK chars take 30 bytes; the 20-char ASCII body is longer as
        // text and must win even though it is shorter in bytes.
        let dedup = Deduplicator::new(0.1);
        let items = vec![
            item("Same storm report", &"雨".repeat(10), "u1", "S1", "2024-01-01"),
            item("Same storm report", &"a".repeat(20), "u2", "S2", "2024-01-02"),
        ];

        let out = dedup.deduplicate(items);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Deduped::Merged(m) => {
                assert_eq!(m.item.body.chars().count(), 20);
                assert_eq!(m.item.url, "u2");
            }
            Deduped::Single(_) => panic!("expected a merged record"),
        }
    }

    #[test]
    fn test_repeated_char_runs_compare_equal() {
        assert_eq!(ngrams(&"x".repeat(600)), ngrams(&"x".repeat(200)));
        assert_eq!(collapse_run("xxxx"), "xx");
        assert_eq!(collapse_run("雨雨雨"), "雨雨");
        assert_eq!(collapse_run("storm"), "storm");
        assert_eq!(collapse_run("ab"), "ab");
    }

    #[test]
    fn test_tie_on_body_length_keeps_first() {
        let dedup = Deduplicator::new(0.5);
        let items = vec![
            item("Same story here", "identical body text", "u1", "S1", "2024-02-02"),
            item("Same story here", "identical body text", "u2", "S2", "2024-02-01"),
        ];

        let out = dedup.deduplicate(items);
        match &out[0] {
            Deduped::Merged(m) => assert_eq!(m.item.url, "u1"),
            Deduped::Single(_) => panic!("expected a merged record"),
        }
    }

    #[test]
    fn test_merged_record_sits_at_anchor_position() {
        let dedup = Deduplicator::default();
        let items = vec![
            item(
                "Port strike enters second week",
                "Dockworkers remain off the job as talks stall at the port authority.",
                "https://a.example/strike",
                "Wire A",
                "2024-03-01",
            ),
            item(
                "Rare comet visible tonight",
                "Astronomers say the comet will be visible to the naked eye after dusk.",
                "https://b.example/comet",
                "Wire B",
                "2024-03-02",
            ),
            item(
                "Port strike enters second week",
                "Dockworkers remain off the job as talks stall at the port authority.",
                "https://c.example/strike",
                "Wire C",
                "2024-03-03",
            ),
        ];

        let out = dedup.deduplicate(items);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Deduped::Merged(m) if m.merged_count == 2));
        assert!(matches!(&out[1], Deduped::Single(_)));
        assert_eq!(out[1].item().url, "https://b.example/comet");
    }

    #[test]
    fn test_output_never_longer_than_input() {
        let dedup = Deduplicator::new(0.3);
        let items = vec![
            item("Budget passes", "The chamber approved the budget.", "u1", "A", "2024-01-01"),
            item("Budget passes chamber", "The chamber approved the budget.", "u2", "B", "2024-01-01"),
            item("Harvest begins early", "Farmers started the harvest two weeks early.", "u3", "C", "2024-01-01"),
        ];
        let n = items.len();
        assert!(dedup.deduplicate(items).len() <= n);
    }

    #[test]
    fn test_all_stopword_corpus_degrades_to_identity() {
        let dedup = Deduplicator::default();
        let items = vec![
            item("is", "to", "u1", "A", "2024-01-01"),
            item("is", "to", "u2", "B", "2024-01-01"),
        ];

        // Identical, but nothing survives tokenization, so the batch must
        // come back unchanged rather than half-merged.
        let out = dedup.deduplicate(items);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| matches!(d, Deduped::Single(_))));
    }

    #[test]
    fn test_anchor_based_not_transitive() {
        // B overlaps A and C, but A and C share nothing. With a threshold
        // that joins only A-B, C must stay out of the cluster even though
        // it resembles B.
        let dedup = Deduplicator::new(0.95);
        let items = vec![
            item("alpha beta gamma delta", "", "u1", "A", "2024-01-01"),
            item("alpha beta gamma delta", "", "u2", "B", "2024-01-01"),
            item("gamma delta epsilon zeta", "", "u3", "C", "2024-01-01"),
        ];

        let out = dedup.deduplicate(items);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Deduped::Merged(m) if m.merged_count == 2));
        assert_eq!(out[1].item().url, "u3");
    }

    #[test]
    fn test_ngrams_include_bigrams_and_drop_stopwords() {
        let grams = ngrams("The quick brown fox");
        assert!(grams.contains(&"quick".to_string()));
        assert!(grams.contains(&"quick brown".to_string()));
        assert!(!grams.iter().any(|g| g == "the"));
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let texts = vec![
            "storm closes schools across region".to_string(),
            "storm closes schools across region".to_string(),
        ];
        let vectors = vectorize(&texts).unwrap();
        let sim = cosine(&vectors[0], &vectors[1]);
        assert!((sim - 1.0).abs() < 1e-9);
    }
}
