//! Fixed-row-height windowing.

#![forbid(unsafe_code)]

/// Geometry that stays fixed for a viewer instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowGeometry {
    pub row_height: f64,
    pub overscan: usize,
    /// Top padding of the scroll container.
    pub padding: f64,
}

/// Visible range `[start, end)` and the spacers around it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VirtualWindow {
    pub start: usize,
    pub end: usize,
    pub top_spacer: f64,
    pub bottom_spacer: f64,
}

impl VirtualWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl RowGeometry {
    /// Window for `len` rows seen from `scroll_offset`.
    pub fn window(&self, scroll_offset: f64, viewport_height: f64, len: usize) -> VirtualWindow {
        let effective = (scroll_offset - self.padding).max(0.0);
        let first = (effective / self.row_height).floor() as usize;
        let start = first.saturating_sub(self.overscan).min(len);
        let last = ((effective + viewport_height.max(0.0)) / self.row_height).ceil() as usize;
        let end = last.saturating_add(self.overscan).min(len).max(start);
        VirtualWindow {
            start,
            end,
            top_spacer: start as f64 * self.row_height,
            bottom_spacer: (len - end) as f64 * self.row_height,
        }
    }

    /// Full scrollable height of `len` rows, padding included on both ends.
    pub fn content_height(&self, len: usize) -> f64 {
        len as f64 * self.row_height + self.padding * 2.0
    }
}
