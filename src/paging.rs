//! Page arithmetic shared by the listings and the selection slicer.

use std::ops::Range;

use crate::error::SapiError;

/// Number of pages needed for `count` items, `ceil(count / page_size)`
pub fn page_count(count: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    count.div_ceil(page_size)
}

/// Index range of page `page` (1-based) clamped to `count` items
pub fn page_window(count: u64, page: u64, page_size: u64) -> Range<u64> {
    let start = page.saturating_sub(1).saturating_mul(page_size).min(count);
    let end = start.saturating_add(page_size).min(count);
    start..end
}

/// Validate a page size against an inclusive upper bound
pub fn check_page_size(page_size: u64, max: u64) -> Result<(), SapiError> {
    if page_size == 0 || page_size > max {
        return Err(SapiError::InvalidParameter(format!(
            "pageSize out of range: {} (valid: 1 - {})",
            page_size, max
        )));
    }
    Ok(())
}

/// Validate a 1-based page number against the number of pages
pub fn check_page_number(page: u64, pages: u64) -> Result<(), SapiError> {
    if page == 0 {
        return Err(SapiError::InvalidParameter("pageNumber must be at least 1".to_string()));
    }
    if page > pages {
        return Err(SapiError::PageOutOfRange { page, pages });
    }
    Ok(())
}

/// Offset and length of selection slice `slice` over `count` outputs.
///
/// The last slice is shorter when `count` is not a multiple of `slice_size`.
pub fn slice_bounds(count: usize, slice: usize, slice_size: usize) -> (usize, usize) {
    let offset = slice.saturating_mul(slice_size).min(count);
    let limit = slice_size.min(count - offset);
    (offset, limit)
}
