use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recognized content-style tags for generated promotional text. Advisory:
/// unknown styles are stored as-is.
pub const CONTENT_STYLES: &[&str] = &["simple", "enthusiastic", "professional", "casual", "urgent"];

/// A bot subscriber. `user_id` is the platform-assigned identity; `id` is the
/// local row id.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub category: String,
    pub region: String,
    pub language_code: String,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_clicks: i64,
    pub total_conversions: i64,
    pub total_earnings: f64,
}

impl User {
    /// Human-readable name for logs and bot messages.
    pub fn display_name(&self) -> String {
        if let Some(ref first) = self.first_name {
            if !first.is_empty() {
                return first.clone();
            }
        }
        if let Some(ref username) = self.username {
            if !username.is_empty() {
                return format!("@{username}");
            }
        }
        format!("User{}", self.user_id)
    }
}

/// One discovered product offer with its affiliate link and counters.
#[derive(Debug, Clone, Serialize)]
pub struct Deal {
    pub id: i64,
    pub title: String,
    pub price: Option<String>,
    pub discount: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub asin: Option<String>,
    pub affiliate_link: String,
    pub original_link: Option<String>,
    pub description: Option<String>,
    pub generated_content: Option<String>,
    pub content_style: String,
    pub rating: f64,
    pub review_count: i64,
    pub image_url: Option<String>,
    pub clicks: i64,
    pub conversions: i64,
    pub earnings: f64,
    pub posted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Product data for a new deal, as extracted by the scraper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDeal {
    pub title: String,
    pub price: Option<String>,
    pub discount: Option<String>,
    pub category: Option<String>,
    pub asin: Option<String>,
    pub original_link: Option<String>,
    pub description: Option<String>,
    pub generated_content: Option<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: i64,
    pub image_url: Option<String>,
}

/// Immutable audit record of one affiliate-link click.
#[derive(Debug, Clone, Serialize)]
pub struct ClickEvent {
    pub id: i64,
    pub deal_id: i64,
    pub user_id: Option<i64>,
    pub clicked_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// Aggregate snapshot over the current active deals.
#[derive(Debug, Clone, Serialize)]
pub struct DealStats {
    pub total_deals: i64,
    pub recent_deals: i64,
    pub total_clicks: i64,
    pub total_conversions: i64,
    pub total_earnings: f64,
    pub active_users: i64,
    pub category_stats: Vec<CategoryCount>,
    pub source_stats: Vec<SourceCount>,
}

impl DealStats {
    /// Conversions as a percentage of clicks; zero when nothing was clicked.
    pub fn conversion_rate(&self) -> f64 {
        if self.total_clicks > 0 {
            self.total_conversions as f64 / self.total_clicks as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn avg_earnings_per_deal(&self) -> f64 {
        if self.total_deals > 0 {
            self.total_earnings / self.total_deals as f64
        } else {
            0.0
        }
    }

    pub fn avg_earnings_per_click(&self) -> f64 {
        if self.total_clicks > 0 {
            self.total_earnings / self.total_clicks as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub count: i64,
}

/// Query params for the recent-deals endpoint.
#[derive(Debug, Deserialize)]
pub struct DealsQueryParams {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
}

impl DealsQueryParams {
    pub fn hours(&self) -> i64 {
        self.hours.unwrap_or(24).clamp(1, 720)
    }
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}

/// Query params for the active-users endpoint.
#[derive(Debug, Deserialize)]
pub struct UsersQueryParams {
    pub days: Option<i64>,
}

impl UsersQueryParams {
    pub fn days(&self) -> i64 {
        self.days.unwrap_or(30).clamp(1, 365)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub timestamp: DateTime<Utc>,
}

/// Millisecond epoch timestamp from storage; out-of-range values clamp to
/// the epoch.
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Integer cents from storage to dollars.
pub(crate) fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Dollar amount to integer cents, rounded to the nearest cent.
pub(crate) fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}
