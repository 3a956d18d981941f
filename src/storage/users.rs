use crate::error::AppResult;
use crate::storage::sqlite::Db;
use crate::types::{cents_to_dollars, from_millis, User};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

const USER_COLUMNS: &str = "id, user_id, username, first_name, last_name, category, region,
     language_code, is_active, joined_at, last_seen, total_clicks, total_conversions,
     total_earnings_cents";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        category: row.get(5)?,
        region: row.get(6)?,
        language_code: row.get(7)?,
        is_active: row.get(8)?,
        joined_at: from_millis(row.get(9)?),
        last_seen: from_millis(row.get(10)?),
        total_clicks: row.get(11)?,
        total_conversions: row.get(12)?,
        total_earnings: cents_to_dollars(row.get(13)?),
    })
}

/// Register a subscriber or touch an existing one. A known identity only has
/// its last-seen bumped; identity fields from re-registration are ignored.
/// New users get the default preferences (category "all", region "US",
/// language "en") and zeroed counters.
pub async fn upsert_user(
    db: &Db,
    user_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
) -> AppResult<User> {
    let (user, created) = db
        .run("upsert_user", move |conn| {
            let now_ms = chrono::Utc::now().timestamp_millis();
            // Immediate: the read decides between insert and touch, so take
            // the write lock up front instead of upgrading mid-transaction
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing = tx
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                    params![user_id],
                    row_to_user,
                )
                .optional()?;

            let result = if let Some(mut user) = existing {
                tx.execute(
                    "UPDATE users SET last_seen = ?1 WHERE user_id = ?2",
                    params![now_ms, user_id],
                )?;
                user.last_seen = from_millis(now_ms);
                (user, false)
            } else {
                let inserted = match tx.execute(
                    "INSERT INTO users (user_id, username, first_name, last_name, joined_at, last_seen)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![user_id, username, first_name, last_name, now_ms],
                ) {
                    Ok(_) => true,
                    // Lost a registration race for this identity: fall back to the touch.
                    Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                        tx.execute(
                            "UPDATE users SET last_seen = ?1 WHERE user_id = ?2",
                            params![now_ms, user_id],
                        )?;
                        false
                    }
                    Err(e) => return Err(e),
                };
                let user = tx.query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                    params![user_id],
                    row_to_user,
                )?;
                (user, inserted)
            };

            tx.commit()?;
            Ok(result)
        })
        .await?;

    if created {
        tracing::info!(user_id = user.user_id, name = %user.display_name(), "new user registered");
    }

    Ok(user)
}

pub async fn get_user(db: &Db, user_id: i64) -> AppResult<Option<User>> {
    let user = db
        .run("get_user", move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                params![user_id],
                row_to_user,
            )
            .optional()
        })
        .await?;
    Ok(user)
}

/// Update the supplied preference fields and touch last-seen. Returns whether
/// a row changed; false when no field was supplied or the identity is
/// unknown. One fixed statement: absent fields pass NULL and COALESCE keeps
/// the stored value.
pub async fn update_user_preferences(
    db: &Db,
    user_id: i64,
    category: Option<String>,
    region: Option<String>,
) -> AppResult<bool> {
    let category = category.filter(|c| !c.is_empty());
    let region = region.filter(|r| !r.is_empty());
    if category.is_none() && region.is_none() {
        return Ok(false);
    }

    let updated = db
        .run("update_user_preferences", move |conn| {
            let now_ms = chrono::Utc::now().timestamp_millis();
            conn.execute(
                "UPDATE users SET
                    category  = COALESCE(?1, category),
                    region    = COALESCE(?2, region),
                    last_seen = ?3
                 WHERE user_id = ?4",
                params![category, region, now_ms, user_id],
            )
        })
        .await?;

    Ok(updated > 0)
}

/// Users with the active flag set and last-seen within the window, most
/// recent first.
pub async fn get_active_users(db: &Db, days: i64) -> AppResult<Vec<User>> {
    let users = db
        .run("get_active_users", move |conn| {
            let cutoff_ms = chrono::Utc::now()
                .timestamp_millis()
                .saturating_sub(days.saturating_mul(86_400_000));
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE is_active = 1 AND last_seen >= ?1
                 ORDER BY last_seen DESC"
            ))?;
            let rows = stmt
                .query_map(params![cutoff_ms], row_to_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;
    Ok(users)
}
