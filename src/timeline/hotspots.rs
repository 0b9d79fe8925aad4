//! Ranking of methods by time spent inside the current viewport.
//!
//! Recomputed from scratch on every view change; the block set is bounded so
//! the full scan is cheap enough to keep the panel exactly in sync.

use super::viewport::Viewport;
use crate::data::{MethodStats, TraceBlock};
use std::collections::HashMap;

pub const DEFAULT_TOP_N: usize = 5;

/// Top `top_n` methods among the blocks that horizontally intersect
/// `[0, view_width]`, ordered by descending total duration.
///
/// Every thread contributes regardless of vertical position. Ties keep the
/// order in which each name was first encountered.
pub fn visible_hotspots(
    blocks: &[TraceBlock],
    viewport: &Viewport,
    top_n: usize,
) -> Vec<MethodStats> {
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<MethodStats> = Vec::new();

    for block in blocks {
        if !viewport.intersects_horizontally(&viewport.block_rect(block)) {
            continue;
        }
        let index = *index_by_name.entry(block.name.as_str()).or_insert_with(|| {
            groups.push(MethodStats {
                name: block.name.clone(),
                total_duration_ms: 0.0,
                call_count: 0,
                percentage: 0.0,
            });
            groups.len() - 1
        });
        let group = &mut groups[index];
        group.total_duration_ms += block.duration_ms;
        group.call_count += 1;
    }

    // `sort_by` is stable, which gives the first-encountered tie-break.
    groups.sort_by(|a, b| b.total_duration_ms.total_cmp(&a.total_duration_ms));
    groups.truncate(top_n);
    for group in &mut groups {
        group.percentage = MethodStats::percentage_of(group.total_duration_ms, viewport.total_ms());
    }
    groups
}
