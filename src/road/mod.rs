//! Big Road: placement, paging and rasterisation.
//!
//! ```text
//! history + correct set ──► grid::encode ──► page::paginate ──► render::render
//!        (session)            (pure)            (pure)            (pure)
//! ```
//!
//! Nothing here holds state between calls; the road is rebuilt from the full
//! history on every render.

pub mod glyph;
pub mod grid;
pub mod page;
pub mod render;

use std::collections::BTreeSet;

use anyhow::Result;

use crate::outcome::Outcome;
use grid::{encode, EncodedRoad};
use page::{paginate, PageWindow};
use render::{render, RenderStyle, RoadImage};

/// Road geometry shared by encoder, paginator and renderer.
#[derive(Debug, Clone)]
pub struct RoadLayout {
    pub grid_cols: usize,
    pub cols_per_page: usize,
    pub style: RenderStyle,
}

impl Default for RoadLayout {
    fn default() -> Self {
        Self {
            grid_cols: grid::DEFAULT_GRID_COLS,
            cols_per_page: 30,
            style: RenderStyle::default(),
        }
    }
}

/// One rendered page together with the facts used to draw it.
#[derive(Debug, Clone)]
pub struct RoadFrame {
    pub road: EncodedRoad,
    pub window: PageWindow,
    pub image: RoadImage,
}

impl RoadLayout {
    pub fn encode(&self, history: &[Outcome], correct: &BTreeSet<usize>) -> EncodedRoad {
        encode(history, correct, self.grid_cols)
    }

    pub fn paginate(&self, road: &EncodedRoad, page_index: usize) -> PageWindow {
        paginate(road.highest_column, page_index, self.cols_per_page)
    }

    /// Encode, page and draw in one step.
    pub fn frame(&self, history: &[Outcome], correct: &BTreeSet<usize>, page_index: usize) -> Result<RoadFrame> {
        let road = self.encode(history, correct);
        let window = self.paginate(&road, page_index);
        let page = road.grid.window(window.start, window.width());
        let image = render(&page, window.page_index, window.total_pages, &self.style)?;
        Ok(RoadFrame { road, window, image })
    }
}
