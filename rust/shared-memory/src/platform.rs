//! Platform queries used to size the event arena

/// Largest arena the local system will map
pub const MAX_ARENA_SIZE: usize = 1024 * 1024 * 1024;

/// Platform-specific utilities
pub struct PlatformUtils;

impl PlatformUtils {
    /// Virtual memory page size
    pub fn page_size() -> usize {
        #[cfg(unix)]
        {
            let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if size > 0 {
                return size as usize;
            }
        }
        4096
    }

    /// Round `size` up to a whole number of pages
    pub fn align_to_page_size(size: usize) -> usize {
        let page = Self::page_size();
        size.div_ceil(page) * page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_alignment() {
        let page = PlatformUtils::page_size();
        assert!(page > 0);
        assert!(page.is_power_of_two());

        assert_eq!(PlatformUtils::align_to_page_size(1), page);
        assert_eq!(PlatformUtils::align_to_page_size(page), page);
        assert_eq!(PlatformUtils::align_to_page_size(page + 1), 2 * page);
        assert_eq!(PlatformUtils::align_to_page_size(0), 0);
    }
}
