//! Interaction state of one timeline view, independent of the UI toolkit.
//!
//! The iced shell forwards pointer and resize input here and draws from the
//! state it exposes. Every viewport mutation notifies the view listeners,
//! re-ranks the visible hotspots and re-resolves the hovered block.

use crate::data::{MethodStats, TraceBlock, TraceMetadata};
use crate::observers::Observers;
use crate::timeline::{hit_test, visible_hotspots, Viewport};
use std::sync::Arc;

#[derive(Debug)]
pub struct TimelineSession {
    metadata: Arc<TraceMetadata>,
    viewport: Viewport,
    top_n: usize,
    pointer: Option<(f64, f64)>,
    hovered: Option<usize>,
    selected: Option<usize>,
    filter: String,
    hotspots: Vec<MethodStats>,
    selection_listeners: Observers<Option<TraceBlock>>,
    view_listeners: Observers<Viewport>,
    hotspot_listeners: Observers<[MethodStats]>,
}

impl TimelineSession {
    pub fn new(metadata: Arc<TraceMetadata>, top_n: usize) -> Self {
        let viewport = Viewport::new(metadata.total_duration_ms);
        let hotspots = visible_hotspots(metadata.blocks(), &viewport, top_n);
        Self {
            metadata,
            viewport,
            top_n,
            pointer: None,
            hovered: None,
            selected: None,
            filter: String::new(),
            hotspots,
            selection_listeners: Observers::new(),
            view_listeners: Observers::new(),
            hotspot_listeners: Observers::new(),
        }
    }

    pub fn metadata(&self) -> &TraceMetadata {
        &self.metadata
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn pointer(&self) -> Option<(f64, f64)> {
        self.pointer
    }

    pub fn hovered_index(&self) -> Option<usize> {
        self.hovered
    }

    pub fn hovered_block(&self) -> Option<&TraceBlock> {
        self.hovered.and_then(|index| self.metadata.block(index))
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_block(&self) -> Option<&TraceBlock> {
        self.selected.and_then(|index| self.metadata.block(index))
    }

    /// The last published hotspot ranking.
    pub fn hotspots(&self) -> &[MethodStats] {
        &self.hotspots
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn subscribe_selection(
        &mut self,
        listener: impl FnMut(&Option<TraceBlock>) + Send + 'static,
    ) {
        self.selection_listeners.subscribe(listener);
    }

    pub fn subscribe_view(&mut self, listener: impl FnMut(&Viewport) + Send + 'static) {
        self.view_listeners.subscribe(listener);
    }

    pub fn subscribe_hotspots(&mut self, listener: impl FnMut(&[MethodStats]) + Send + 'static) {
        self.hotspot_listeners.subscribe(listener);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        if self.viewport.resize(width, height) {
            log::debug!("Viewport resized to {width}x{height}");
            self.view_changed();
        }
    }

    pub fn zoom_at(&mut self, anchor_x: f64, factor: f64) {
        self.viewport.zoom_at(anchor_x, factor);
        self.view_changed();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_by(dx, dy);
        self.view_changed();
    }

    pub fn set_offset(&mut self, x: f64, y: f64) {
        self.viewport.set_offset(x, y);
        self.view_changed();
    }

    fn view_changed(&mut self) {
        self.view_listeners.notify(&self.viewport);
        self.refresh_hotspots();
        if let Some((x, y)) = self.pointer {
            self.hovered = hit_test(x, y, self.metadata.blocks(), &self.viewport);
        }
    }

    fn refresh_hotspots(&mut self) {
        let hotspots = visible_hotspots(self.metadata.blocks(), &self.viewport, self.top_n);
        if hotspots != self.hotspots {
            self.hotspots = hotspots;
            self.hotspot_listeners.notify(&self.hotspots);
        }
    }

    /// Resolve the block under the pointer. Returns `true` only when the
    /// hovered block changed.
    pub fn hover(&mut self, x: f64, y: f64) -> bool {
        self.pointer = Some((x, y));
        let found = hit_test(x, y, self.metadata.blocks(), &self.viewport);
        if found == self.hovered {
            return false;
        }
        self.hovered = found;
        true
    }

    pub fn leave(&mut self) -> bool {
        self.pointer = None;
        self.hovered.take().is_some()
    }

    pub fn select_hovered(&mut self) {
        self.select(self.hovered);
    }

    pub fn select(&mut self, index: Option<usize>) {
        let index = index.filter(|&i| i < self.metadata.blocks().len());
        if index == self.selected {
            return;
        }
        self.selected = index;
        let block = self.selected_block().cloned();
        self.selection_listeners.notify(&block);
    }

    /// Centre the first block named `name` and select it.
    pub fn focus_method(&mut self, name: &str) -> bool {
        let Some(index) = self.metadata.first_block_named(name) else {
            return false;
        };
        let start_ms = self.metadata.blocks()[index].start_ms;
        let offset_x = self.viewport.offset_centering(start_ms);
        self.set_offset(offset_x, self.viewport.offset_y);
        self.select(Some(index));
        true
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    pub fn filter_active(&self) -> bool {
        !self.filter.trim().is_empty()
    }

    /// Case-insensitive substring match against the active filter.
    pub fn matches_filter(&self, name: &str) -> bool {
        self.filter_active()
            && name
                .to_lowercase()
                .contains(&self.filter.trim().to_lowercase())
    }

    pub fn selected_stats(&self) -> Option<MethodStats> {
        self.selected_block()
            .map(|block| self.metadata.stats_for_method(&block.name))
    }

    /// Source file of the selected block, for the host to open.
    pub fn source_request(&self) -> Option<&str> {
        self.selected_block()
            .and_then(|block| block.source_file.as_deref())
            .filter(|path| !path.is_empty())
    }
}
