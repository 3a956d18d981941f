use crate::error::{AppError, AppResult};
use crate::storage::sqlite::Db;
use crate::types::{cents_to_dollars, from_millis, Deal, NewDeal, CONTENT_STYLES};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

const DEAL_COLUMNS: &str = "id, title, price, discount, category, source, asin, affiliate_link,
     original_link, description, generated_content, content_style, rating, review_count,
     image_url, clicks, conversions, earnings_cents, posted_at, updated_at, is_active";

fn row_to_deal(row: &Row) -> rusqlite::Result<Deal> {
    Ok(Deal {
        id: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        discount: row.get(3)?,
        category: row.get(4)?,
        source: row.get(5)?,
        asin: row.get(6)?,
        affiliate_link: row.get(7)?,
        original_link: row.get(8)?,
        description: row.get(9)?,
        generated_content: row.get(10)?,
        content_style: row.get(11)?,
        rating: row.get(12)?,
        review_count: row.get(13)?,
        image_url: row.get(14)?,
        clicks: row.get(15)?,
        conversions: row.get(16)?,
        earnings: cents_to_dollars(row.get(17)?),
        posted_at: from_millis(row.get(18)?),
        updated_at: from_millis(row.get(19)?),
        is_active: row.get(20)?,
    })
}

/// Validate scraped product data before insert.
fn validate_new_deal(product: &NewDeal, affiliate_link: &str, content_style: &str) -> AppResult<()> {
    if product.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }
    match url::Url::parse(affiliate_link) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
        _ => {
            return Err(AppError::Validation(
                "affiliate_link must be an absolute http(s) URL".to_string(),
            ));
        }
    }
    if !CONTENT_STYLES.contains(&content_style) {
        tracing::debug!(content_style, "unrecognized content style");
    }
    Ok(())
}

/// Insert a newly discovered offer with zeroed counters and both timestamps
/// set to now. Returns the persisted row including its generated id.
pub async fn add_deal(
    db: &Db,
    product: NewDeal,
    affiliate_link: String,
    source: String,
    content_style: String,
) -> AppResult<Deal> {
    validate_new_deal(&product, &affiliate_link, &content_style)?;

    let deal = db
        .run("add_deal", move |conn| {
            let now_ms = chrono::Utc::now().timestamp_millis();
            conn.execute(
                "INSERT INTO deals (
                    title, price, discount, category, source, asin,
                    affiliate_link, original_link, description, generated_content,
                    content_style, rating, review_count, image_url,
                    posted_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                params![
                    product.title,
                    product.price,
                    product.discount,
                    product.category,
                    source,
                    product.asin,
                    affiliate_link,
                    product.original_link,
                    product.description,
                    product.generated_content,
                    content_style,
                    product.rating,
                    product.review_count,
                    product.image_url,
                    now_ms,
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?1"),
                params![id],
                row_to_deal,
            )
        })
        .await?;

    tracing::info!(deal_id = deal.id, title = %deal.title, "deal added");
    Ok(deal)
}

pub async fn get_deal(db: &Db, deal_id: i64) -> AppResult<Option<Deal>> {
    let deal = db
        .run("get_deal", move |conn| {
            conn.query_row(
                &format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?1"),
                params![deal_id],
                row_to_deal,
            )
            .optional()
        })
        .await?;
    Ok(deal)
}

/// Look up a deal by ASIN. Duplicate ASINs are tolerated; the most recently
/// posted row wins.
pub async fn get_deal_by_asin(db: &Db, asin: String) -> AppResult<Option<Deal>> {
    let deal = db
        .run("get_deal_by_asin", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {DEAL_COLUMNS} FROM deals WHERE asin = ?1
                     ORDER BY posted_at DESC, id DESC LIMIT 1"
                ),
                params![asin],
                row_to_deal,
            )
            .optional()
        })
        .await?;
    Ok(deal)
}

/// Active deals posted within the window, newest first, capped at `limit`.
/// The category filter is exact-match and skipped for the wildcard "all".
pub async fn get_recent_deals(
    db: &Db,
    hours: i64,
    limit: i64,
    category: Option<String>,
) -> AppResult<Vec<Deal>> {
    let category = category.filter(|c| !c.is_empty() && c != "all");

    let deals = db
        .run("get_recent_deals", move |conn| {
            let cutoff_ms = chrono::Utc::now()
                .timestamp_millis()
                .saturating_sub(hours.saturating_mul(3_600_000));

            if let Some(category) = category {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {DEAL_COLUMNS} FROM deals
                     WHERE is_active = 1 AND posted_at >= ?1 AND category = ?2
                     ORDER BY posted_at DESC, id DESC LIMIT ?3"
                ))?;
                let rows = stmt
                    .query_map(params![cutoff_ms, category, limit], row_to_deal)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            } else {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {DEAL_COLUMNS} FROM deals
                     WHERE is_active = 1 AND posted_at >= ?1
                     ORDER BY posted_at DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![cutoff_ms, limit], row_to_deal)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
        .await?;
    Ok(deals)
}

/// Hard-delete deals older than the horizon, cascading to their click
/// events. Returns the number of deals removed; horizons under one day are
/// rejected.
///
/// The event delete is explicit rather than left to the FK cascade so the
/// no-orphan guarantee holds regardless of which pooled connection runs it.
pub async fn cleanup_old_deals(db: &Db, days: i64) -> AppResult<usize> {
    if days < 1 {
        return Err(AppError::Validation(
            "retention horizon must be at least one day".to_string(),
        ));
    }

    let deleted = db
        .run("cleanup_old_deals", move |conn| {
            let cutoff_ms = chrono::Utc::now()
                .timestamp_millis()
                .saturating_sub(days.saturating_mul(86_400_000));
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM click_events WHERE deal_id IN
                    (SELECT id FROM deals WHERE posted_at < ?1)",
                params![cutoff_ms],
            )?;
            let deleted = tx.execute("DELETE FROM deals WHERE posted_at < ?1", params![cutoff_ms])?;
            tx.commit()?;
            Ok(deleted)
        })
        .await?;
    Ok(deleted)
}
