use std::collections::HashMap;

pub const PAGE_MARKER: char = '\u{000C}';

const MIN_DETECTION_RATIO: f64 = 0.3;

fn printed_page_number(line: &str) -> Option<u32> {
    let line = line.trim();
    if line.is_empty() || line.len() > 5 || !line.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    line.parse().ok()
}

pub fn build_page_map(text: &str) -> Option<HashMap<u32, u32>> {
    let pages: Vec<&str> = text.split(PAGE_MARKER).collect();
    let total_pages = pages.len() as u32;

    let mut detected: Vec<(u32, u32)> = Vec::new();
    for (index, page_text) in pages.iter().enumerate() {
        let physical = index as u32 + 1;
        let first_line = match page_text.trim().lines().next() {
            Some(line) => line,
            None => continue,
        };
        if let Some(printed) = printed_page_number(first_line) {
            detected.push((physical, printed));
        }
    }

    if detected.is_empty()
        || (detected.len() as f64) / f64::from(total_pages.max(1)) < MIN_DETECTION_RATIO
    {
        return None;
    }

    let direct: HashMap<u32, u32> = detected.iter().copied().collect();
    let mut page_map = HashMap::new();

    for physical in 1..=total_pages {
        if let Some(&printed) = direct.get(&physical) {
            page_map.insert(physical, printed);
            continue;
        }

        // Nearest detection by index distance, ties to the lowest physical page.
        let mut best_dist = u32::MAX;
        let mut best_offset = 0i64;
        for &(det_physical, det_printed) in &detected {
            let dist = physical.abs_diff(det_physical);
            if dist < best_dist {
                best_dist = dist;
                best_offset = i64::from(det_physical) - i64::from(det_printed);
            }
        }
        let printed = (i64::from(physical) - best_offset).max(1) as u32;
        page_map.insert(physical, printed);
    }

    Some(page_map)
}

/// Maps byte offsets in the marker-stripped text back to physical pages.
pub struct PageIndex {
    starts: Vec<usize>,
}

impl PageIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        let mut cursor = 0;
        for (index, page_text) in text.split(PAGE_MARKER).enumerate() {
            if index > 0 {
                starts.push(cursor);
            }
            cursor += page_text.len();
        }
        Self { starts }
    }

    pub fn page_at(&self, offset: usize) -> u32 {
        self.starts.partition_point(|&start| start <= offset) as u32
    }

    pub fn total_pages(&self) -> u32 {
        self.starts.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_printed_numbers_and_interpolates_gaps() {
        let text = "5\nfirst page body\u{000C}6\nsecond page body\u{000C}no number here";
        let map = build_page_map(text).expect("two of three pages carry numbers");

        assert_eq!(map[&1], 5);
        assert_eq!(map[&2], 6);
        // Page 3 borrows page 2's offset.
        assert_eq!(map[&3], 7);
    }

    #[test]
    fn first_nonblank_line_is_used_for_detection() {
        let text = "\n\n  12  \nHEARING BEFORE THE COMMITTEE";
        let map = build_page_map(text).expect("single page detected");
        assert_eq!(map[&1], 12);
    }

    #[test]
    fn sparse_detection_yields_no_map() {
        let text = "1\nnumbered\u{000C}body\u{000C}body\u{000C}body\u{000C}body";
        assert!(build_page_map(text).is_none());
        assert!(build_page_map("no digits anywhere").is_none());
        assert!(build_page_map("").is_none());
    }

    #[test]
    fn lines_of_prose_are_not_page_numbers() {
        assert_eq!(printed_page_number("123456"), None);
        assert_eq!(printed_page_number("12a"), None);
        assert_eq!(printed_page_number(" 483 "), Some(483));
    }

    #[test]
    fn interpolated_numbers_never_drop_below_one() {
        // Page 2 prints "1", so page 1 would interpolate to zero.
        let text = "preface\u{000C}1\nchapter one";
        let map = build_page_map(text).expect("half the pages detected");
        assert_eq!(map[&1], 1);
        assert_eq!(map[&2], 1);
    }

    #[test]
    fn interpolation_ties_break_to_lowest_physical_page() {
        // Pages 1 and 3 are detected with different offsets; page 2 is
        // equidistant and must use page 1's offset.
        let text = "10\na\u{000C}middle\u{000C}1\nc";
        let map = build_page_map(text).expect("two of three pages detected");
        assert_eq!(map[&2], 11);
    }

    #[test]
    fn page_index_resolves_offsets_to_physical_pages() {
        let index = PageIndex::new("aaa\u{000C}bbb\u{000C}cc");
        assert_eq!(index.total_pages(), 3);
        assert_eq!(index.page_at(0), 1);
        assert_eq!(index.page_at(2), 1);
        assert_eq!(index.page_at(3), 2);
        assert_eq!(index.page_at(5), 2);
        assert_eq!(index.page_at(6), 3);
        assert_eq!(index.page_at(999), 3);
    }

    #[test]
    fn page_index_on_unpaginated_text_is_single_page() {
        let index = PageIndex::new("plain text without markers");
        assert_eq!(index.total_pages(), 1);
        assert_eq!(index.page_at(0), 1);
        assert_eq!(index.page_at(500), 1);
    }
}
