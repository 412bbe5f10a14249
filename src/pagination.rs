//! This modules defines the common functionality for paging, searching and ordering lists.

use maud::{Markup, html};
use serde::{Deserialize, Serialize};

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The page number to default to when not specified in a request.
    pub default_page: u64,
    /// The number of items per page when not specified in a request.
    pub default_page_size: u64,
    /// The largest page size a client may request.
    pub max_page_size: u64,
    /// The maximum number of pages to show in the pagination indicator.
    pub max_pages: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_page_size: 25,
            max_page_size: 100,
            max_pages: 5,
        }
    }
}

/// The query parameters shared by the list endpoints.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    /// The 1-based page number.
    pub page: Option<u64>,
    /// The number of items per page, capped at [PaginationConfig::max_page_size].
    pub page_size: Option<u64>,
    /// Case-insensitive text to search for.
    pub search: Option<String>,
    /// A field name to order by, prefixed with '-' for descending order.
    pub ordering: Option<String>,
}

impl ListQuery {
    /// The page and page size after applying defaults and limits.
    pub fn page_and_size(&self, config: &PaginationConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(config.default_page).max(1);
        let page_size = self
            .page_size
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size);

        (page, page_size)
    }

    /// The search text as a SQL `LIKE` pattern, or `None` if there is no search.
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(|search| format!("%{}%", search.to_lowercase()))
    }

    /// Build an `ORDER BY` clause from the requested ordering.
    ///
    /// `allowed` maps the field names clients may order by to SQL columns.
    /// Anything else falls back to `default`. `id` is always appended as a tie
    /// breaker so pages are stable.
    pub fn order_by(&self, allowed: &[(&str, &str)], default: &str) -> String {
        let requested = self.ordering.as_deref().unwrap_or(default);
        let column_for = |field: &str| {
            allowed
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, column)| *column)
        };

        let (field, descending) = parse_ordering(requested);
        let (column, descending) = match column_for(field) {
            Some(column) => (column, descending),
            None => {
                let (field, descending) = parse_ordering(default);
                (column_for(field).unwrap_or("id"), descending)
            }
        };

        let direction = if descending { "DESC" } else { "ASC" };

        format!("ORDER BY {column} {direction}, id {direction}")
    }
}

/// The SQL `LIMIT` and `OFFSET` for a 1-based `page`.
pub fn limit_clause(page: u64, page_size: u64) -> String {
    format!(
        "LIMIT {page_size} OFFSET {}",
        page.saturating_sub(1) * page_size
    )
}

fn parse_ordering(ordering: &str) -> (&str, bool) {
    match ordering.trim().strip_prefix('-') {
        Some(field) => (field, true),
        None => (ordering.trim(), false),
    }
}

/// A page of results.
#[derive(Debug, Serialize, PartialEq)]
pub struct Page<T> {
    /// The total number of items across all pages.
    pub count: u64,
    /// The next page number, if there is one.
    pub next: Option<u64>,
    /// The previous page number, if there is one.
    pub previous: Option<u64>,
    /// The items on this page.
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap the `results` of `page` given the total `count` of items.
    pub fn new(results: Vec<T>, count: u64, page: u64, page_size: u64) -> Self {
        let page_count = count.div_ceil(page_size.max(1));

        Self {
            count,
            next: (page < page_count).then_some(page + 1),
            previous: (page > 1).then(|| page - 1),
            results,
        }
    }

    /// Convert each result with `f`, stopping at the first error.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PaginationIndicator {
    Page(u64),
    CurrPage(u64),
    Ellipsis,
    NextButton(u64),
    BackButton(u64),
}

pub fn create_pagination_indicators(
    curr_page: u64,
    page_count: u64,
    max_pages: u64,
) -> Vec<PaginationIndicator> {
    let map_page = |page| {
        if page == curr_page {
            PaginationIndicator::CurrPage(page)
        } else {
            PaginationIndicator::Page(page)
        }
    };

    let mut indicators: Vec<PaginationIndicator> = if page_count <= max_pages {
        (1..=page_count).map(map_page).collect()
    } else if curr_page <= (max_pages / 2) {
        (1..=max_pages).map(map_page).collect()
    } else if curr_page > (page_count - max_pages / 2) {
        ((page_count - max_pages + 1)..=page_count)
            .map(map_page)
            .collect()
    } else {
        ((curr_page - max_pages / 2)..=(curr_page + max_pages / 2))
            .map(map_page)
            .collect()
    };

    if page_count > max_pages {
        if curr_page > (max_pages / 2) + 1 {
            indicators.insert(0, PaginationIndicator::Page(1));
            indicators.insert(1, PaginationIndicator::Ellipsis);
        }

        if curr_page < (page_count - max_pages / 2) {
            indicators.push(PaginationIndicator::Ellipsis);
            indicators.push(PaginationIndicator::Page(page_count));
        }
    }

    if curr_page > 1 {
        indicators.insert(0, PaginationIndicator::BackButton(curr_page - 1));
    }

    if curr_page < page_count {
        indicators.push(PaginationIndicator::NextButton(curr_page + 1));
    }

    indicators
}

/// Links to the pages of a list at `url`, as given by [create_pagination_indicators].
pub fn pagination_view(url: &str, indicators: &[PaginationIndicator]) -> Markup {
    let page_link = |page: u64| format!("{url}?page={page}");
    let link_style = "block px-3 py-2 leading-tight text-gray-500 bg-white border \
        border-gray-300 hover:bg-gray-100 hover:text-gray-700 dark:bg-gray-800 \
        dark:border-gray-700 dark:text-gray-400 dark:hover:bg-gray-700 dark:hover:text-white";
    let current_style = "block px-3 py-2 leading-tight text-blue-600 border border-gray-300 \
        bg-blue-50 dark:border-gray-700 dark:bg-gray-700 dark:text-white";

    html! {
        nav aria-label="Pagination" class="mt-4"
        {
            ul class="inline-flex -space-x-px text-sm"
            {
                @for indicator in indicators {
                    li
                    {
                        @match indicator {
                            PaginationIndicator::Page(page) => {
                                a href=(page_link(*page)) class=(link_style) { (page) }
                            }
                            PaginationIndicator::CurrPage(page) => {
                                span aria-current="page" class=(current_style) { (page) }
                            }
                            PaginationIndicator::Ellipsis => {
                                span class=(link_style) { "..." }
                            }
                            PaginationIndicator::BackButton(page) => {
                                a href=(page_link(*page)) class=(link_style) { "Back" }
                            }
                            PaginationIndicator::NextButton(page) => {
                                a href=(page_link(*page)) class=(link_style) { "Next" }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod list_query_tests {
    use super::{ListQuery, Page, PaginationConfig, limit_clause};

    #[test]
    fn page_size_defaults_to_25() {
        let query = ListQuery::default();

        assert_eq!(query.page_and_size(&PaginationConfig::default()), (1, 25));
    }

    #[test]
    fn page_size_is_capped_at_100() {
        let query = ListQuery {
            page_size: Some(1000),
            page: Some(0),
            ..Default::default()
        };

        assert_eq!(query.page_and_size(&PaginationConfig::default()), (1, 100));
    }

    #[test]
    fn ordering_outside_allow_list_uses_default() {
        let query = ListQuery {
            ordering: Some("password; DROP TABLE user".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            query.order_by(&[("date", "date"), ("amount", "amount_cents")], "-date"),
            "ORDER BY date DESC, id DESC"
        );
    }

    #[test]
    fn ascending_ordering() {
        let query = ListQuery {
            ordering: Some("amount".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            query.order_by(&[("date", "date"), ("amount", "amount_cents")], "-date"),
            "ORDER BY amount_cents ASC, id ASC"
        );
    }

    #[test]
    fn blank_search_is_ignored() {
        let query = ListQuery {
            search: Some("   ".to_owned()),
            ..Default::default()
        };

        assert_eq!(query.search_pattern(), None);
    }

    #[test]
    fn limit_clause_skips_earlier_pages() {
        assert_eq!(limit_clause(1, 25), "LIMIT 25 OFFSET 0");
        assert_eq!(limit_clause(3, 10), "LIMIT 10 OFFSET 20");
    }

    #[test]
    fn page_links() {
        let page = Page::new(vec![1, 2], 60, 2, 25);

        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let last = Page::new(vec![1], 60, 3, 25);
        assert_eq!(last.next, None);

        let only = Page::new(Vec::<i32>::new(), 0, 1, 25);
        assert_eq!((only.next, only.previous), (None, None));
    }
}

#[cfg(test)]
mod indicator_tests {
    use crate::pagination::{PaginationIndicator, create_pagination_indicators};

    #[test]
    fn shows_all_pages() {
        let want = [
            PaginationIndicator::CurrPage(1),
            PaginationIndicator::Page(2),
            PaginationIndicator::Page(3),
            PaginationIndicator::NextButton(2),
        ];

        let got = create_pagination_indicators(1, 3, 5);

        assert_eq!(want, got.as_slice());
    }

    #[test]
    fn shows_page_subset_in_center() {
        let want = [
            PaginationIndicator::BackButton(4),
            PaginationIndicator::Page(1),
            PaginationIndicator::Ellipsis,
            PaginationIndicator::Page(3),
            PaginationIndicator::Page(4),
            PaginationIndicator::CurrPage(5),
            PaginationIndicator::Page(6),
            PaginationIndicator::Page(7),
            PaginationIndicator::Ellipsis,
            PaginationIndicator::Page(10),
            PaginationIndicator::NextButton(6),
        ];

        let got = create_pagination_indicators(5, 10, 5);

        assert_eq!(want, got.as_slice());
    }
}
