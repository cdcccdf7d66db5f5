//! Segmentation engine.
//!
//! Resolves model-proposed grapheme boundaries into byte-correct,
//! sentence-aligned segments covering the whole input, with a
//! content-addressed cache in front of the model chain.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::ai::SegmentationModel;
use crate::database::BoundaryCache;
use crate::models::InputType;

pub mod fallback;
pub mod grapheme;
pub mod sentence;

pub use grapheme::GraphemeTable;

/// A resolved segment, ready to be persisted. Offsets are byte positions
/// into the (trimmed) segmentation input and always UTF-8 boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSegment {
    pub idx: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub title: String,
    pub text: String,
}

/// SHA-256 hex of the normalized (trimmed, lower-cased) text; the cache key.
pub fn normalized_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct SegmentationEngine {
    models: Vec<Arc<dyn SegmentationModel>>,
    cache: Arc<dyn BoundaryCache>,
    /// When both models fail: rule-based splitting if set, otherwise a
    /// single segment covering the whole text.
    rule_based_fallback: bool,
}

impl SegmentationEngine {
    pub fn new(
        models: Vec<Arc<dyn SegmentationModel>>,
        cache: Arc<dyn BoundaryCache>,
        rule_based_fallback: bool,
    ) -> Self {
        Self {
            models,
            cache,
            rule_based_fallback,
        }
    }

    /// Split `text` into at most `target_count` ordered segments covering it
    /// without gaps or overlap. Empty text yields no segments and no model
    /// call; `target_count < 1` is clamped to 1. Cache errors degrade to
    /// cache misses.
    pub async fn segment(
        &self,
        text: &str,
        target_count: i32,
        input_type: InputType,
    ) -> Vec<PlannedSegment> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let target = target_count.max(1) as usize;

        let table = GraphemeTable::new(text);
        let count = table.grapheme_count();
        let hash = normalized_hash(text);

        let cached = match self.cache.get(&hash).await {
            Ok(hit) => hit.filter(|b| is_valid_boundary_list(b, count)),
            Err(e) => {
                warn!("boundary cache probe failed: {}", e);
                None
            }
        };

        let mut boundaries = match cached {
            Some(boundaries) => {
                debug!(%hash, "boundary cache hit");
                boundaries
            }
            None => match self.propose(text, &table, target, input_type).await {
                Some(boundaries) => {
                    if let Err(e) = self.cache.put(&hash, input_type, &boundaries).await {
                        warn!("boundary cache store failed: {}", e);
                    }
                    boundaries
                }
                None if self.rule_based_fallback => fallback::split(text)
                    .into_iter()
                    .map(|byte| table.grapheme_of(byte))
                    .collect(),
                None => vec![count],
            },
        };

        // The final boundary is always the text end; segments must cover the
        // whole input.
        if boundaries.last() != Some(&count) {
            boundaries.push(count);
        }

        let ends = merge_boundaries(&boundaries, target);
        build_segments(text, &table, &ends)
    }

    /// Walk the model chain; the first structurally valid proposal wins and
    /// is sentence-adjusted. `None` when every model fails.
    async fn propose(
        &self,
        text: &str,
        table: &GraphemeTable,
        target: usize,
        input_type: InputType,
    ) -> Option<Vec<usize>> {
        let count = table.grapheme_count();
        for model in &self.models {
            match model
                .propose_boundaries(text, count, target, input_type)
                .await
            {
                Ok(raw) if is_valid_boundary_list(&raw, count) => {
                    return Some(adjust_boundaries(text, table, &raw));
                }
                Ok(raw) => {
                    warn!(?raw, "segmentation model returned invalid boundaries");
                }
                Err(e) => {
                    warn!("segmentation model failed: {}", e);
                }
            }
        }
        None
    }
}

/// Structural validity: non-empty, strictly ascending, within
/// `[0, grapheme_count]`.
fn is_valid_boundary_list(boundaries: &[usize], grapheme_count: usize) -> bool {
    !boundaries.is_empty()
        && boundaries.windows(2).all(|w| w[0] < w[1])
        && boundaries.iter().all(|&b| b <= grapheme_count)
}

/// Sentence-align every boundary except the text end, drop duplicates and
/// degenerate zero cuts, and ensure the list ends at the text end.
fn adjust_boundaries(text: &str, table: &GraphemeTable, raw: &[usize]) -> Vec<usize> {
    let count = table.grapheme_count();

    let mut adjusted: Vec<usize> = raw
        .iter()
        .map(|&g| {
            if g >= count {
                return count;
            }
            let byte = table.byte_of(g).expect("validated boundary");
            let nudged = sentence::adjust_to_sentence_end(text, byte);
            table.grapheme_of(nudged)
        })
        .collect();

    adjusted.sort_unstable();
    adjusted.dedup();
    adjusted.retain(|&g| g > 0);
    if adjusted.last() != Some(&count) {
        adjusted.push(count);
    }
    adjusted
}

/// Distribute `boundaries` over at most `target` segments. With more
/// boundaries than segments, each segment takes `floor(B/T)` of them and the
/// first `B mod T` segments take one extra; a segment's end is its last
/// assigned boundary.
fn merge_boundaries(boundaries: &[usize], target: usize) -> Vec<usize> {
    let b = boundaries.len();
    if b <= target {
        return boundaries.to_vec();
    }

    let base = b / target;
    let extra = b % target;
    let mut ends = Vec::with_capacity(target);
    let mut cursor = 0;
    for k in 0..target {
        cursor += base + usize::from(k < extra);
        ends.push(boundaries[cursor - 1]);
    }
    ends
}

fn build_segments(text: &str, table: &GraphemeTable, ends: &[usize]) -> Vec<PlannedSegment> {
    let mut segments = Vec::with_capacity(ends.len());
    let mut prev = 0;
    for (idx, &end) in ends.iter().enumerate() {
        let start_char = table.byte_of(prev).expect("boundary in range");
        let end_char = table.byte_of(end).expect("boundary in range");
        segments.push(PlannedSegment {
            idx,
            start_char,
            end_char,
            title: format!("Part {}", idx + 1),
            text: text[start_char..end_char].to_string(),
        });
        prev = end;
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::ai::{AiError, AiResult};

    /// Scripted model double that counts invocations.
    struct ScriptedModel {
        boundaries: Option<Vec<usize>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn returning(boundaries: Vec<usize>) -> Self {
            Self {
                boundaries: Some(boundaries),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                boundaries: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SegmentationModel for ScriptedModel {
        async fn propose_boundaries(
            &self,
            _text: &str,
            _grapheme_count: usize,
            _target: usize,
            _input_type: InputType,
        ) -> AiResult<Vec<usize>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.boundaries {
                Some(b) => Ok(b.clone()),
                None => Err(AiError::EmptyResponse),
            }
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<String, Vec<usize>>>,
    }

    #[async_trait]
    impl BoundaryCache for MemoryCache {
        async fn get(&self, text_hash: &str) -> Result<Option<Vec<usize>>, sqlx::Error> {
            Ok(self.entries.lock().unwrap().get(text_hash).cloned())
        }

        async fn put(
            &self,
            text_hash: &str,
            _input_type: InputType,
            boundaries: &[usize],
        ) -> Result<(), sqlx::Error> {
            self.entries
                .lock()
                .unwrap()
                .insert(text_hash.to_string(), boundaries.to_vec());
            Ok(())
        }
    }

    fn engine_with(
        model: Arc<ScriptedModel>,
        cache: Arc<MemoryCache>,
        rule_based: bool,
    ) -> SegmentationEngine {
        SegmentationEngine::new(vec![model as Arc<dyn SegmentationModel>], cache, rule_based)
    }

    fn assert_partition(segments: &[PlannedSegment], text: &str) {
        assert_eq!(segments[0].start_char, 0);
        assert_eq!(segments.last().unwrap().end_char, text.len());
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end_char, pair[1].start_char);
        }
        for seg in segments {
            // Slicing must hold (valid UTF-8 boundaries) and match the
            // stored text.
            assert_eq!(&text[seg.start_char..seg.end_char], seg.text);
        }
    }

    #[tokio::test]
    async fn three_sentence_text_splits_on_llm_boundaries() {
        let model = Arc::new(ScriptedModel::returning(vec![3, 6, 8]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model.clone(), cache, false);

        let segments = engine.segment("A. B. C.", 3, InputType::Educational).await;
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments
                .iter()
                .map(|s| (s.start_char, s.end_char))
                .collect::<Vec<_>>(),
            vec![(0, 3), (3, 6), (6, 8)]
        );
        assert_eq!(
            segments.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
            vec!["Part 1", "Part 2", "Part 3"]
        );
        assert_partition(&segments, "A. B. C.");
    }

    #[tokio::test]
    async fn second_run_hits_cache_and_skips_the_model() {
        let model = Arc::new(ScriptedModel::returning(vec![3, 6, 8]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model.clone(), cache.clone(), false);

        let first = engine.segment("A. B. C.", 3, InputType::Educational).await;
        assert_eq!(model.calls(), 1);

        let second = engine.segment("A. B. C.", 3, InputType::Educational).await;
        assert_eq!(model.calls(), 1, "cached run must not invoke the model");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn zwj_emoji_boundary_maps_to_byte_after_bang() {
        let text = "Hello 🙋‍♂️! Bye.";
        // Grapheme 8 is the exclusive boundary just past the '!'.
        let model = Arc::new(ScriptedModel::returning(vec![8, 13]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model, cache, false);

        let segments = engine.segment(text, 2, InputType::Fictional).await;
        assert_eq!(segments.len(), 2);
        let bang_end = text.find('!').unwrap() + 1;
        assert_eq!(segments[0].end_char, bang_end);
        assert_eq!(segments[0].text, "Hello 🙋‍♂️!");
        assert_partition(&segments, text);
    }

    #[tokio::test]
    async fn empty_text_produces_no_segments_and_no_model_call() {
        let model = Arc::new(ScriptedModel::returning(vec![1]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model.clone(), cache, false);

        assert!(engine.segment("   ", 3, InputType::Educational).await.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn zero_target_clamps_to_one_segment() {
        let model = Arc::new(ScriptedModel::returning(vec![3, 6, 8]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model, cache, false);

        let segments = engine.segment("A. B. C.", 0, InputType::Educational).await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_char, 0);
        assert_eq!(segments[0].end_char, 8);
    }

    #[tokio::test]
    async fn model_failure_without_rule_fallback_yields_whole_text() {
        let model = Arc::new(ScriptedModel::failing());
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model, cache, false);

        let text = "First. Second. Third.";
        let segments = engine.segment(text, 3, InputType::Financial).await;
        assert_eq!(segments.len(), 1);
        assert_partition(&segments, text);
    }

    #[tokio::test]
    async fn model_failure_with_rule_fallback_splits_sentences() {
        let model = Arc::new(ScriptedModel::failing());
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model, cache, true);

        let text = "First. Second. Third.";
        let segments = engine.segment(text, 3, InputType::Financial).await;
        assert_eq!(segments.len(), 3);
        assert_partition(&segments, text);
    }

    #[tokio::test]
    async fn invalid_model_output_falls_through() {
        // Descending boundaries are structurally invalid.
        let model = Arc::new(ScriptedModel::returning(vec![6, 3]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model.clone(), cache, false);

        let segments = engine.segment("A. B. C.", 2, InputType::Educational).await;
        assert_eq!(model.calls(), 1);
        assert_eq!(segments.len(), 1, "invalid output degrades to one segment");
    }

    #[tokio::test]
    async fn more_boundaries_than_target_are_distributed() {
        // Five boundaries into two segments: 3 + 2.
        let text = "A. B. C. D. E.";
        let model = Arc::new(ScriptedModel::returning(vec![3, 6, 9, 12, 14]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model, cache, false);

        let segments = engine.segment(text, 2, InputType::Educational).await;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end_char, 9);
        assert_eq!(segments[1].end_char, 14);
        assert_partition(&segments, text);
    }

    #[tokio::test]
    async fn mid_sentence_boundary_is_nudged_to_sentence_end() {
        let text = "One ends here. Two keeps going on.";
        let cut = text.find("keeps").unwrap(); // grapheme == byte here
        let model = Arc::new(ScriptedModel::returning(vec![cut, text.len()]));
        let cache = Arc::new(MemoryCache::default());
        let engine = engine_with(model, cache, false);

        let segments = engine.segment(text, 2, InputType::Educational).await;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end_char, 15);
        assert_partition(&segments, text);
    }

    #[test]
    fn merge_keeps_all_when_under_target() {
        assert_eq!(merge_boundaries(&[3, 6], 5), vec![3, 6]);
    }

    #[test]
    fn merge_distributes_remainder_to_leading_segments() {
        // 7 boundaries over 3 segments: 3, 2, 2.
        let b = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(merge_boundaries(&b, 3), vec![3, 5, 7]);
    }

    #[test]
    fn normalized_hash_ignores_case_and_padding() {
        assert_eq!(normalized_hash("  Hello  "), normalized_hash("hello"));
        assert_ne!(normalized_hash("hello"), normalized_hash("world"));
    }
}
