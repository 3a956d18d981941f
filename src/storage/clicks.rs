use crate::error::{AppError, AppResult};
use crate::storage::sqlite::Db;
use crate::types::{dollars_to_cents, from_millis, ClickEvent};
use rusqlite::{params, TransactionBehavior};

/// Record a single click: bump the deal counter and append an audit event in
/// one transaction, so the counter and the event log never drift apart.
///
/// The counter update runs first and doubles as the existence check; when it
/// matches no row the transaction is dropped unwritten.
pub async fn record_click(
    db: &Db,
    deal_id: i64,
    user_id: Option<i64>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    referrer: Option<String>,
) -> AppResult<ClickEvent> {
    let event = db
        .run("record_click", move |conn| {
            let now_ms = chrono::Utc::now().timestamp_millis();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let updated = tx.execute(
                "UPDATE deals SET clicks = clicks + 1, updated_at = ?1 WHERE id = ?2",
                params![now_ms, deal_id],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO click_events (deal_id, user_id, clicked_at, ip_address, user_agent, referrer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![deal_id, user_id, now_ms, ip_address, user_agent, referrer],
            )?;
            let event = ClickEvent {
                id: tx.last_insert_rowid(),
                deal_id,
                user_id,
                clicked_at: from_millis(now_ms),
                ip_address,
                user_agent,
                referrer,
            };
            tx.commit()?;
            Ok(Some(event))
        })
        .await?;

    event.ok_or_else(|| AppError::NotFound(format!("deal {deal_id} not found")))
}

/// Fold click, conversion, and earnings deltas into a deal's running totals.
/// Deltas are strictly additive; negative or non-finite adjustments are
/// rejected rather than silently shrinking history. Returns false when the
/// deal is unknown.
pub async fn update_deal_stats(
    db: &Db,
    deal_id: i64,
    clicks: i64,
    conversions: i64,
    earnings: f64,
) -> AppResult<bool> {
    if clicks < 0 || conversions < 0 || earnings < 0.0 || !earnings.is_finite() {
        return Err(AppError::Validation(
            "stat deltas must be finite and non-negative".to_string(),
        ));
    }
    let earnings_cents = dollars_to_cents(earnings);

    let updated = db
        .run("update_deal_stats", move |conn| {
            conn.execute(
                "UPDATE deals SET
                    clicks = clicks + ?1,
                    conversions = conversions + ?2,
                    earnings_cents = earnings_cents + ?3,
                    updated_at = ?4
                 WHERE id = ?5",
                params![
                    clicks,
                    conversions,
                    earnings_cents,
                    chrono::Utc::now().timestamp_millis(),
                    deal_id,
                ],
            )
        })
        .await?;
    Ok(updated > 0)
}
