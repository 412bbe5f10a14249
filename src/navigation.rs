//! The navigation bar shown at the top of each page, and at the bottom on small screens.

use maud::{Markup, html};

use crate::endpoints;

/// A section of the app reachable from the navigation bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Section {
    url: &'static str,
    title: &'static str,
}

const SECTIONS: [Section; 3] = [
    Section {
        url: endpoints::DASHBOARD_VIEW,
        title: "Dashboard",
    },
    Section {
        url: endpoints::TRANSACTIONS_VIEW,
        title: "Transactions",
    },
    Section {
        url: endpoints::BUDGETS_VIEW,
        title: "Budgets",
    },
];

impl Section {
    /// Whether `endpoint` is this section's page or one of its sub-pages, e.g. "/budgets/new".
    fn contains(&self, endpoint: &str) -> bool {
        endpoint
            .strip_prefix(self.url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

const DESKTOP_LINK_STYLE: &str = "block py-2 px-3 text-gray-900 rounded-sm hover:bg-gray-100 \
    lg:hover:bg-transparent lg:hover:text-blue-700 lg:p-0 dark:text-white \
    lg:dark:hover:text-blue-500 dark:hover:bg-gray-700";
const DESKTOP_CURRENT_STYLE: &str = "block py-2 px-3 text-white bg-blue-700 rounded-sm \
    lg:bg-transparent lg:text-blue-700 lg:p-0 dark:text-white lg:dark:text-blue-500";
const MOBILE_LINK_STYLE: &str = "flex w-full items-center justify-center rounded-lg px-2 py-2 \
    text-xs font-semibold text-gray-600 hover:bg-blue-50 hover:text-blue-700 \
    dark:text-gray-300 dark:hover:bg-blue-900/20";
const MOBILE_CURRENT_STYLE: &str = "flex w-full items-center justify-center rounded-lg px-2 py-2 \
    text-xs font-semibold bg-blue-50 text-blue-700 dark:bg-blue-900/30 dark:text-blue-200";
const NEW_EXPENSE_BUTTON_STYLE: &str = "px-4 py-2 text-sm font-medium text-white bg-blue-700 \
    rounded-lg hover:bg-blue-800 dark:bg-blue-600 dark:hover:bg-blue-700";

pub struct NavBar {
    current: Option<Section>,
}

impl NavBar {
    /// The navigation bar for the page at `active_endpoint`.
    ///
    /// The section containing the page is highlighted.
    pub fn new(active_endpoint: &str) -> Self {
        Self {
            current: SECTIONS
                .into_iter()
                .find(|section| section.contains(active_endpoint)),
        }
    }

    fn is_current(&self, section: &Section) -> bool {
        self.current.as_ref() == Some(section)
    }

    pub fn into_html(self) -> Markup {
        html!(
            nav class="bg-white border-gray-200 dark:bg-gray-900"
            {
                div class="max-w-screen-xl flex items-center justify-between mx-auto p-4"
                {
                    a href=(endpoints::ROOT) class="text-2xl font-semibold dark:text-white"
                    {
                        "Expense Tracker"
                    }

                    ul class="hidden lg:flex lg:items-center lg:space-x-8 font-medium"
                    {
                        @for section in SECTIONS {
                            @let style = if self.is_current(&section) {
                                DESKTOP_CURRENT_STYLE
                            } else {
                                DESKTOP_LINK_STYLE
                            };

                            li
                            {
                                a
                                    href=(section.url)
                                    class=(style)
                                    aria-current=[self.is_current(&section).then_some("page")]
                                {
                                    (section.title)
                                }
                            }
                        }

                        li
                        {
                            a href=(endpoints::NEW_EXPENSE_VIEW) class=(NEW_EXPENSE_BUTTON_STYLE)
                            {
                                "Record expense"
                            }
                        }

                        li { a href=(endpoints::LOG_OUT) class=(DESKTOP_LINK_STYLE) { "Log out" } }
                    }
                }
            }

            nav class="fixed inset-x-0 bottom-0 z-40 lg:hidden"
            {
                ul
                    class="grid grid-cols-4 gap-2 mx-4 mb-4 px-4 py-3 rounded-xl border
                    border-gray-200 bg-white/95 shadow-lg dark:border-gray-700 dark:bg-gray-900/95"
                    aria-label="Primary"
                {
                    @for section in SECTIONS {
                        @let style = if self.is_current(&section) {
                            MOBILE_CURRENT_STYLE
                        } else {
                            MOBILE_LINK_STYLE
                        };

                        li { a href=(section.url) class=(style) { (section.title) } }
                    }

                    li { a href=(endpoints::LOG_OUT) class=(MOBILE_LINK_STYLE) { "Log out" } }
                }
            }
        )
    }
}
