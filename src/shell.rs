use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    SalesPerformance,
    ProductAnalytics,
    Benchmarking,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub primary: &'static str,
    pub secondary: &'static str,
    pub icon: &'static str,
}

impl Theme {
    pub fn gradient(&self) -> String {
        format!(
            "linear-gradient(135deg, {} 0%, {} 100%)",
            self.primary, self.secondary
        )
    }
}

impl Page {
    pub const ALL: [Page; 4] = [
        Page::SalesPerformance,
        Page::ProductAnalytics,
        Page::Benchmarking,
        Page::Assistant,
    ];

    pub const DEFAULT: Page = Page::SalesPerformance;

    pub fn slug(self) -> &'static str {
        match self {
            Self::SalesPerformance => "sales",
            Self::ProductAnalytics => "products",
            Self::Benchmarking => "benchmarking",
            Self::Assistant => "assistant",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::SalesPerformance => "Sales Performance",
            Self::ProductAnalytics => "Product Analytics",
            Self::Benchmarking => "Benchmarking & Insights",
            Self::Assistant => "AI Assistant",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::SalesPerformance => "graph-up-arrow",
            Self::ProductAnalytics => "box-seam",
            Self::Benchmarking => "bar-chart-line",
            Self::Assistant => "robot",
        }
    }

    pub fn theme(self) -> Theme {
        match self {
            Self::SalesPerformance => Theme {
                primary: "#10b981",
                secondary: "#059669",
                icon: "#86efac",
            },
            Self::ProductAnalytics => Theme {
                primary: "#3b82f6",
                secondary: "#2563eb",
                icon: "#93c5fd",
            },
            Self::Benchmarking => Theme {
                primary: "#8b5cf6",
                secondary: "#7c3aed",
                icon: "#c4b5fd",
            },
            Self::Assistant => Theme {
                primary: "#f59e0b",
                secondary: "#d97706",
                icon: "#fcd34d",
            },
        }
    }

    /// Where the page's content is served from.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::SalesPerformance => "/v1/dashboards/sales",
            Self::ProductAnalytics => "/v1/dashboards/products",
            Self::Benchmarking => "/v1/dashboards/benchmarking",
            Self::Assistant => "/v1/assistant/messages",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|page| page.slug().eq_ignore_ascii_case(slug.trim()))
    }
}

impl Serialize for Page {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.slug())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDescriptor {
    pub slug: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub endpoint: &'static str,
    pub theme: Theme,
    pub gradient: String,
    pub is_default: bool,
}

impl From<Page> for PageDescriptor {
    fn from(page: Page) -> Self {
        let theme = page.theme();
        Self {
            slug: page.slug(),
            title: page.title(),
            icon: page.icon(),
            endpoint: page.endpoint(),
            gradient: theme.gradient(),
            theme,
            is_default: page == Page::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub default_page: Page,
    pub pages: Vec<PageDescriptor>,
}

pub fn navigation() -> Navigation {
    Navigation {
        default_page: Page::DEFAULT,
        pages: Page::ALL.into_iter().map(PageDescriptor::from).collect(),
    }
}
