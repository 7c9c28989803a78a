use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

const MAX_PAGE: i64 = 1_000_000;

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Name,
}

/// Catalog filters. Prices arrive as raw strings so a malformed bound can be
/// dropped with a warning instead of rejecting the request.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub featured: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}

impl ProductQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }

    pub fn min_price(&self) -> Option<Decimal> {
        parse_price_bound("min_price", self.min_price.as_deref())
    }

    pub fn max_price(&self) -> Option<Decimal> {
        parse_price_bound("max_price", self.max_price.as_deref())
    }

    pub fn featured_only(&self) -> bool {
        self.featured
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

fn parse_price_bound(name: &str, raw: Option<&str>) -> Option<Decimal> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<Decimal>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(filter = name, value = raw, error = %err, "ignoring malformed price filter");
            None
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl OrderListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(500),
        };
        assert_eq!(p.normalize(), (1, 100, 0));

        let p = Pagination {
            page: Some(3),
            per_page: None,
        };
        assert_eq!(p.normalize(), (3, 20, 40));
    }

    #[test]
    fn huge_pages_do_not_overflow() {
        let p = Pagination {
            page: Some(i64::MAX),
            per_page: Some(100),
        };
        let (page, per_page, offset) = p.normalize();
        assert_eq!(page, MAX_PAGE);
        assert_eq!(per_page, 100);
        assert_eq!(offset, (MAX_PAGE - 1) * 100);

        let p = Pagination {
            page: Some(i64::MIN),
            per_page: Some(i64::MAX),
        };
        assert_eq!(p.normalize(), (1, 100, 0));
    }

    #[test]
    fn malformed_price_filters_are_ignored() {
        let query = ProductQuery {
            min_price: Some("abc".into()),
            max_price: Some("49.99".into()),
            ..Default::default()
        };
        assert_eq!(query.min_price(), None);
        assert_eq!(query.max_price(), Some(Decimal::new(4999, 2)));
    }

    #[test]
    fn featured_flag_and_search_are_normalized() {
        let query = ProductQuery {
            featured: Some("TRUE".into()),
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(query.featured_only());
        assert_eq!(query.search_term(), None);

        let query = ProductQuery {
            featured: Some("yes".into()),
            search: Some(" mug ".into()),
            ..Default::default()
        };
        assert!(!query.featured_only());
        assert_eq!(query.search_term(), Some("mug"));
    }
}
