/// Visible slice of the road for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
    pub total_pages: usize,
    pub page_index: usize,
}

impl PageWindow {
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn is_last(&self) -> bool {
        self.page_index + 1 == self.total_pages
    }
}

/// Number of pages needed to show `highest_column`, never less than one.
pub fn total_pages(highest_column: Option<usize>, cols_per_page: usize) -> usize {
    let per_page = cols_per_page.max(1);
    let used = highest_column.map_or(0, |c| c + 1);
    used.div_ceil(per_page).max(1)
}

/// Clamp `page_index` into range and derive the column window.
pub fn paginate(highest_column: Option<usize>, page_index: usize, cols_per_page: usize) -> PageWindow {
    let per_page = cols_per_page.max(1);
    let total = total_pages(highest_column, per_page);
    let page_index = page_index.min(total - 1);
    let start = page_index * per_page;
    PageWindow {
        start,
        end: start + per_page,
        total_pages: total,
        page_index,
    }
}

/// Page the session should land on after a new P/B round.
pub fn last_page(highest_column: Option<usize>, cols_per_page: usize) -> usize {
    total_pages(highest_column, cols_per_page) - 1
}
