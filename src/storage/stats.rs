use crate::error::AppResult;
use crate::storage::sqlite::Db;
use crate::types::{cents_to_dollars, CategoryCount, DealStats, SourceCount};
use rusqlite::params;

/// Platform-wide aggregates over active deals plus the 30-day active user
/// count. All sums come back in one snapshot read.
pub async fn get_deal_stats(db: &Db) -> AppResult<DealStats> {
    db.run("get_deal_stats", move |conn| {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let (total_deals, total_clicks, total_conversions, total_earnings_cents) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(clicks), 0), COALESCE(SUM(conversions), 0),
                        COALESCE(SUM(earnings_cents), 0)
                 FROM deals WHERE is_active = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )?;

        let recent_deals: i64 = conn.query_row(
            "SELECT COUNT(*) FROM deals WHERE is_active = 1 AND posted_at >= ?1",
            params![now_ms - 86_400_000],
            |row| row.get(0),
        )?;

        let active_users: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE is_active = 1 AND last_seen >= ?1",
            params![now_ms - 30 * 86_400_000],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare_cached(
            "SELECT category, COUNT(*) AS cnt FROM deals
             WHERE is_active = 1 AND category IS NOT NULL
             GROUP BY category ORDER BY cnt DESC",
        )?;
        let category_stats = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    category: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT source, COUNT(*) AS cnt FROM deals
             WHERE is_active = 1 AND source IS NOT NULL
             GROUP BY source ORDER BY cnt DESC",
        )?;
        let source_stats = stmt
            .query_map([], |row| {
                Ok(SourceCount {
                    source: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DealStats {
            total_deals,
            recent_deals,
            total_clicks,
            total_conversions,
            total_earnings: cents_to_dollars(total_earnings_cents),
            active_users,
            category_stats,
            source_stats,
        })
    })
    .await
}
