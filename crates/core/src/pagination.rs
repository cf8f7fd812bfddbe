/// Page placement derived from a hit count and a requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub current_page: u64,
    pub total_pages: u64,
    pub from_offset: u64,
    pub effective_size: u64,
}

impl PageWindow {
    /// Returns `None` when there is nothing to page through.
    pub fn compute(total_documents: u64, requested_page: i64, page_size: u64) -> Option<Self> {
        if total_documents == 0 || page_size == 0 {
            return None;
        }

        let total_pages = total_documents.div_ceil(page_size);
        let requested = u64::try_from(requested_page.max(1)).unwrap_or(1);
        let current_page = requested.min(total_pages);
        let from_offset = (current_page - 1) * page_size;
        let remaining = total_documents - from_offset;

        Some(Self {
            current_page,
            total_pages,
            from_offset,
            effective_size: page_size.min(remaining),
        })
    }
}
