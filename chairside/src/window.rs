//! Windowed ("virtualized") list geometry.
//!
//! Only rows inside the viewport plus an overscan margin are rendered. The
//! window is recomputed synchronously on every scroll event; only the
//! `is_scrolling` indicator is debounced, through a settle timer that each
//! new event restarts.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::interface::{ChairsideError, Result};
use crate::runtime::runtime_handle;

pub const DEFAULT_OVERSCAN: usize = 5;
pub const DEFAULT_SCROLL_SETTLE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub overscan: usize,
    pub scroll_settle_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            overscan: DEFAULT_OVERSCAN,
            scroll_settle_ms: DEFAULT_SCROLL_SETTLE.as_millis() as u64,
        }
    }
}

/// Validated row and viewport heights, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListGeometry {
    item_height: f64,
    container_height: f64,
}

impl ListGeometry {
    /// Rejects non-finite or non-positive row heights and negative viewports.
    pub fn new(item_height: f64, container_height: f64) -> Result<Self> {
        if !item_height.is_finite() || item_height <= 0.0 {
            return Err(ChairsideError::InvalidGeometry(format!(
                "item height must be a positive number, got {}",
                item_height
            )));
        }
        if !container_height.is_finite() || container_height < 0.0 {
            return Err(ChairsideError::InvalidGeometry(format!(
                "container height must be zero or more, got {}",
                container_height
            )));
        }
        Ok(Self { item_height, container_height })
    }

    pub fn item_height(&self) -> f64 {
        self.item_height
    }

    pub fn container_height(&self) -> f64 {
        self.container_height
    }

    /// Height of the full scrollable content
    pub fn total_height(&self, total_items: usize) -> f64 {
        total_items as f64 * self.item_height
    }

    /// Top offset of row `index` within the content
    pub fn offset_of(&self, index: usize) -> f64 {
        index as f64 * self.item_height
    }

    pub fn window(&self, scroll_top: f64, total_items: usize, overscan: usize) -> ViewportWindow {
        if total_items == 0 {
            return ViewportWindow::EMPTY;
        }
        let scroll_top = clamp_scroll(scroll_top);
        let first_visible = (scroll_top / self.item_height).floor() as usize;
        let visible_rows = (self.container_height / self.item_height).ceil() as usize;

        let start = first_visible.saturating_sub(overscan);
        let raw_end = first_visible.saturating_add(visible_rows);
        let end = (total_items - 1).min(raw_end.saturating_add(overscan));

        if start > end {
            // scrolled past the content
            return ViewportWindow { start, end_exclusive: start };
        }
        ViewportWindow { start, end_exclusive: end + 1 }
    }
}

fn clamp_scroll(scroll_top: f64) -> f64 {
    if scroll_top.is_finite() {
        scroll_top.max(0.0)
    } else {
        0.0
    }
}

/// Inclusive range of rendered rows, expanded by overscan and clamped to the
/// list. Empty for an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportWindow {
    start: usize,
    end_exclusive: usize,
}

impl ViewportWindow {
    pub const EMPTY: ViewportWindow = ViewportWindow { start: 0, end_exclusive: 0 };

    pub fn start(&self) -> usize {
        self.start
    }

    /// Last rendered index, `None` when nothing is rendered
    pub fn end(&self) -> Option<usize> {
        (self.end_exclusive > self.start).then(|| self.end_exclusive - 1)
    }

    pub fn len(&self) -> usize {
        self.end_exclusive - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices().contains(&index)
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end_exclusive
    }
}

/// `computeWindow` in one call, validating the geometry first.
pub fn compute_window(
    scroll_top: f64,
    item_height: f64,
    container_height: f64,
    total_items: usize,
    overscan: usize,
) -> Result<ViewportWindow> {
    Ok(ListGeometry::new(item_height, container_height)?.window(scroll_top, total_items, overscan))
}

/// A rendered row and its absolute position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedItem {
    pub index: usize,
    pub top: f64,
    pub height: f64,
}

struct ScrollIndicator {
    scrolling: AtomicBool,
    /// Bumped per scroll event so a stale settle timer cannot clear the flag
    generation: AtomicU64,
}

/// Scroll state of one virtualized list
pub struct VirtualList {
    geometry: ListGeometry,
    total_items: usize,
    overscan: usize,
    settle_delay: Duration,
    scroll_top: f64,
    indicator: Arc<ScrollIndicator>,
    settle_timer: Option<JoinHandle<()>>,
}

impl VirtualList {
    pub fn new(geometry: ListGeometry, total_items: usize, config: &WindowConfig) -> Self {
        Self {
            geometry,
            total_items,
            overscan: config.overscan,
            settle_delay: Duration::from_millis(config.scroll_settle_ms),
            scroll_top: 0.0,
            indicator: Arc::new(ScrollIndicator {
                scrolling: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
            settle_timer: None,
        }
    }

    /// Handle a scroll event. The window is current immediately; the
    /// scrolling flag clears `settle_delay` after the last event.
    pub fn on_scroll(&mut self, scroll_top: f64) -> ViewportWindow {
        self.scroll_top = clamp_scroll(scroll_top);

        let generation = self.indicator.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.indicator.scrolling.store(true, Ordering::SeqCst);

        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        let indicator = Arc::clone(&self.indicator);
        let delay = self.settle_delay;
        self.settle_timer = Some(runtime_handle().spawn(async move {
            tokio::time::sleep(delay).await;
            if indicator.generation.load(Ordering::SeqCst) == generation {
                indicator.scrolling.store(false, Ordering::SeqCst);
            }
        }));

        self.window()
    }

    pub fn window(&self) -> ViewportWindow {
        self.geometry.window(self.scroll_top, self.total_items, self.overscan)
    }

    pub fn visible_items(&self) -> Vec<PositionedItem> {
        self.window()
            .indices()
            .map(|index| PositionedItem {
                index,
                top: self.geometry.offset_of(index),
                height: self.geometry.item_height(),
            })
            .collect()
    }

    /// Pair each rendered row with its item; `items` is the list being windowed.
    pub fn visible_slice<'a, T>(&self, items: &'a [T]) -> impl Iterator<Item = (PositionedItem, &'a T)> + 'a {
        let positions = self.visible_items();
        positions
            .into_iter()
            .filter_map(move |pos| items.get(pos.index).map(|item| (pos, item)))
    }

    /// Content height for scrollbar sizing
    pub fn total_height(&self) -> f64 {
        self.geometry.total_height(self.total_items)
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn is_scrolling(&self) -> bool {
        self.indicator.scrolling.load(Ordering::SeqCst)
    }

    pub fn scroll_to_index(&mut self, index: usize) -> ViewportWindow {
        self.scroll_top = self.geometry.offset_of(index);
        self.window()
    }

    pub fn scroll_to_top(&mut self) -> ViewportWindow {
        self.scroll_top = 0.0;
        self.window()
    }

    pub fn set_total_items(&mut self, total_items: usize) {
        self.total_items = total_items;
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn resize(&mut self, container_height: f64) -> Result<()> {
        self.geometry = ListGeometry::new(self.geometry.item_height(), container_height)?;
        Ok(())
    }
}

impl Drop for VirtualList {
    fn drop(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
    }
}
