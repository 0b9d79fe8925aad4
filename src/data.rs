use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Deepest nesting level the built-in data source produces.
const MAX_GENERATED_DEPTH: u32 = 8;
/// Spans shorter than this are not subdivided further.
const MIN_SUBDIVIDED_SPAN_MS: f64 = 50.0;
/// Blocks shorter than this end the current nesting level.
const MIN_BLOCK_MS: f64 = 20.0;
/// Idle gap between sibling blocks.
const SIBLING_GAP_MS: f64 = 10.0;
const METHOD_NAME_COUNT: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct TraceBlock {
    pub name: String,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub depth: u32,
    pub thread_id: u32,
    pub source_file: Option<String>,
    pub line: Option<u32>,
}

impl TraceBlock {
    pub fn new(name: impl Into<String>, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            start_ms,
            // Negative durations degrade to zero-width blocks.
            duration_ms: if duration_ms.is_finite() {
                duration_ms.max(0.0)
            } else {
                0.0
            },
            depth: 0,
            thread_id: 0,
            source_file: None,
            line: None,
        }
    }

    #[must_use]
    pub fn at(mut self, thread_id: u32, depth: u32) -> Self {
        self.thread_id = thread_id;
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn with_source(mut self, file: impl Into<String>, line: u32) -> Self {
        self.source_file = Some(file.into());
        self.line = Some(line);
        self
    }

    #[cfg(test)]
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodStats {
    pub name: String,
    pub total_duration_ms: f64,
    pub call_count: usize,
    pub percentage: f64,
}

impl MethodStats {
    pub fn percentage_of(total_duration_ms: f64, trace_total_ms: f64) -> f64 {
        if trace_total_ms > 0.0 && trace_total_ms.is_finite() {
            total_duration_ms / trace_total_ms * 100.0
        } else {
            0.0
        }
    }
}

/// The loaded trace. Read-only once constructed; block order is the draw
/// order and the hit-test priority (later blocks win).
#[derive(Debug, Clone)]
pub struct TraceMetadata {
    pub process_name: String,
    pub total_duration_ms: f64,
    blocks: Vec<TraceBlock>,
    thread_count: u32,
    max_depth: u32,
}

impl TraceMetadata {
    pub fn new(
        process_name: impl Into<String>,
        total_duration_ms: f64,
        blocks: Vec<TraceBlock>,
    ) -> Self {
        let thread_count = blocks.iter().map(|b| b.thread_id + 1).max().unwrap_or(0);
        let max_depth = blocks.iter().map(|b| b.depth).max().unwrap_or(0);
        Self {
            process_name: process_name.into(),
            total_duration_ms: if total_duration_ms.is_finite() {
                total_duration_ms.max(0.0)
            } else {
                0.0
            },
            blocks,
            thread_count,
            max_depth,
        }
    }

    pub fn blocks(&self) -> &[TraceBlock] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&TraceBlock> {
        self.blocks.get(index)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Index of the first block (in insertion order) named `name`.
    pub fn first_block_named(&self, name: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.name == name)
    }

    /// Aggregate statistics for every block named `name` across the whole trace.
    pub fn stats_for_method(&self, name: &str) -> MethodStats {
        let (total, count) = self
            .blocks
            .iter()
            .filter(|b| b.name == name)
            .fold((0.0, 0usize), |(total, count), b| (total + b.duration_ms, count + 1));

        MethodStats {
            name: name.to_string(),
            total_duration_ms: total,
            call_count: count,
            percentage: MethodStats::percentage_of(total, self.total_duration_ms),
        }
    }
}

/// Build a synthetic trace: `thread_count` lanes of recursively nested calls
/// covering `[0, total_ms)`.
///
/// Each lane is generated on its own RNG seeded from `seed + thread_id`, so
/// lanes can be produced in parallel while the output stays identical for a
/// given seed.
pub fn generate_mock_data(seed: u64, thread_count: u32, total_ms: f64) -> TraceMetadata {
    let total_ms = if total_ms.is_finite() && total_ms > 0.0 {
        total_ms
    } else {
        1.0
    };
    let source_file = concat!(env!("CARGO_MANIFEST_DIR"), "/src/main.rs");

    let lanes: Vec<Vec<TraceBlock>> = (0..thread_count)
        .into_par_iter()
        .map(|thread_id| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(thread_id as u64));
            let mut blocks = Vec::new();
            generate_lane(
                &mut blocks,
                &mut rng,
                source_file,
                thread_id,
                0.0,
                total_ms,
                0,
            );
            blocks
        })
        .collect();

    let blocks: Vec<TraceBlock> = lanes.into_iter().flatten().collect();
    log::info!(
        "Generated {} blocks across {} threads (seed {seed}, {total_ms} ms)",
        blocks.len(),
        thread_count
    );
    TraceMetadata::new("SampleProcess", total_ms, blocks)
}

fn generate_lane(
    blocks: &mut Vec<TraceBlock>,
    rng: &mut StdRng,
    source_file: &str,
    thread_id: u32,
    start: f64,
    end: f64,
    depth: u32,
) {
    if depth > MAX_GENERATED_DEPTH || end - start < MIN_SUBDIVIDED_SPAN_MS {
        return;
    }

    let mut current = start;
    while current < end {
        let duration = (end - current) * rng.random::<f64>() * 0.8;
        if duration < MIN_BLOCK_MS {
            break;
        }

        let name = format!("Method_{}", rng.random_range(0..METHOD_NAME_COUNT));
        let line = rng.random_range(1..30);
        blocks.push(
            TraceBlock::new(name, current, duration)
                .at(thread_id, depth)
                .with_source(source_file, line),
        );
        generate_lane(blocks, rng, source_file, thread_id, current, current + duration, depth + 1);
        current += duration + SIBLING_GAP_MS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TraceMetadata {
        TraceMetadata::new(
            "test",
            100.0,
            vec![
                TraceBlock::new("A", 0.0, 10.0),
                TraceBlock::new("A", 20.0, 5.0),
                TraceBlock::new("B", 40.0, 20.0).at(1, 0),
            ],
        )
    }

    #[test]
    fn test_stats_for_method() {
        let meta = sample();
        let a = meta.stats_for_method("A");
        assert_eq!(a.call_count, 2);
        assert_eq!(a.total_duration_ms, 15.0);
        assert!((a.percentage - 15.0).abs() < 1e-9);

        let b = meta.stats_for_method("B");
        assert_eq!(b.call_count, 1);
        assert!((b.percentage - b.total_duration_ms / meta.total_duration_ms * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_for_absent_method() {
        let stats = sample().stats_for_method("missing");
        assert_eq!(stats.call_count, 0);
        assert_eq!(stats.total_duration_ms, 0.0);
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn test_percentage_guarded_for_zero_total() {
        let meta = TraceMetadata::new("empty", 0.0, vec![TraceBlock::new("A", 0.0, 10.0)]);
        assert_eq!(meta.stats_for_method("A").percentage, 0.0);
    }

    #[test]
    fn test_negative_duration_clamped() {
        let block = TraceBlock::new("A", 5.0, -3.0);
        assert_eq!(block.duration_ms, 0.0);
        assert_eq!(block.end_ms(), 5.0);
    }

    #[test]
    fn test_derived_lane_info() {
        let meta = TraceMetadata::new(
            "lanes",
            10.0,
            vec![TraceBlock::new("A", 0.0, 1.0).at(3, 2), TraceBlock::new("B", 0.0, 1.0)],
        );
        assert_eq!(meta.thread_count(), 4);
        assert_eq!(meta.max_depth(), 2);
        assert_eq!(meta.first_block_named("B"), Some(1));
        assert_eq!(meta.first_block_named("C"), None);
    }

    #[test]
    fn test_mock_data_is_deterministic() {
        let a = generate_mock_data(42, 4, 10_000.0);
        let b = generate_mock_data(42, 4, 10_000.0);
        assert!(!a.is_empty());
        assert_eq!(a.blocks(), b.blocks());
        assert!(a.thread_count() <= 4);
    }

    #[test]
    fn test_mock_data_shape() {
        let meta = generate_mock_data(7, 2, 10_000.0);
        assert_eq!(meta.total_duration_ms, 10_000.0);
        for block in meta.blocks() {
            assert!(block.duration_ms >= MIN_BLOCK_MS);
            assert!(block.depth <= MAX_GENERATED_DEPTH);
            assert!(block.end_ms() <= 10_000.0 + 1e-6);
            assert!(block.name.starts_with("Method_"));
            assert!(block.source_file.is_some());
        }
        // Lanes are concatenated in thread order.
        let threads: Vec<u32> = meta.blocks().iter().map(|b| b.thread_id).collect();
        assert!(threads.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_children_follow_parents() {
        let meta = generate_mock_data(3, 1, 10_000.0);
        for (index, block) in meta.blocks().iter().enumerate() {
            if block.depth == 0 {
                continue;
            }
            let parent = meta.blocks()[..index]
                .iter()
                .rev()
                .find(|p| p.depth + 1 == block.depth);
            let parent = parent.expect("nested block has an earlier parent");
            assert!(parent.start_ms <= block.start_ms);
            assert!(block.end_ms() <= parent.end_ms() + 1e-6);
        }
    }
}
