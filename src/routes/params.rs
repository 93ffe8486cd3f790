use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Page number, starting at 1
    pub page: Option<i64>,
    /// Items per page, 1 to 100
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// Returns `(page, limit, offset)`. Out-of-range values fall back to the
    /// defaults instead of being clamped; so does a page whose offset would
    /// not fit in an `i64`.
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE);
        let limit = self
            .limit
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .unwrap_or(DEFAULT_LIMIT);
        match (page - 1).checked_mul(limit) {
            Some(offset) => (page, limit, offset),
            None => (DEFAULT_PAGE, limit, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_use_defaults() {
        assert_eq!(Pagination::default().normalize(), (1, 10, 0));
    }

    #[test]
    fn out_of_range_values_fall_back() {
        assert_eq!(Pagination::new(0, 0).normalize(), (1, 10, 0));
        assert_eq!(Pagination::new(-3, 101).normalize(), (1, 10, 0));
        assert_eq!(Pagination::new(2, 500).normalize(), (2, 10, 10));
    }

    #[test]
    fn page_past_the_offset_range_falls_back() {
        assert_eq!(Pagination::new(i64::MAX, 10).normalize(), (1, 10, 0));
        assert_eq!(Pagination::new(i64::MAX / 5, 100).normalize(), (1, 100, 0));

        let (page, limit, offset) = Pagination::new(i64::MAX / 10 + 1, 10).normalize();
        assert_eq!((page, limit), (i64::MAX / 10 + 1, 10));
        assert_eq!(offset, i64::MAX / 10 * 10);
    }

    #[test]
    fn offset_follows_page_and_limit() {
        assert_eq!(Pagination::new(3, 25).normalize(), (3, 25, 50));
        assert_eq!(Pagination::new(1, 100).normalize(), (1, 100, 0));
    }
}
