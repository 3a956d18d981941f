use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use dealtrack::api::handler::{self, ApiState};
use dealtrack::storage::{clicks, deals, migrations, sqlite, users, Db};
use dealtrack::types::NewDeal;

/// Spawn the server on a random port; hand back the address and a Db handle
/// for seeding.
async fn spawn_server() -> (SocketAddr, Db) {
    // Create temp db
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let db_path = tmp.path().to_path_buf();
    // Keep tmp alive by leaking it (test only)
    std::mem::forget(tmp);

    let pool = deadpool_sqlite::Config::new(&db_path)
        .create_pool(deadpool_sqlite::Runtime::Tokio1)
        .unwrap();

    {
        let conn = pool.get().await.unwrap();
        conn.interact(|conn| {
            sqlite::apply_pragmas(conn).unwrap();
            migrations::run_migrations(conn).unwrap();
        })
        .await
        .unwrap();
    }

    let db = Db::from_pool(pool, Duration::from_secs(5));

    let api_state = Arc::new(ApiState { db: db.clone() });
    let app = Router::new()
        .route("/api/stats", get(handler::get_stats))
        .route("/api/deals", get(handler::list_deals))
        .route("/api/deals/{id}", get(handler::get_deal))
        .route("/api/users", get(handler::list_users))
        .route("/r/{deal_id}", get(handler::redirect_deal))
        .route("/health", get(handler::health))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::any())
                .allow_methods([axum::http::Method::GET]),
        )
        .with_state(api_state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, db)
}

async fn seed_deal(db: &Db, title: &str, category: &str) -> dealtrack::types::Deal {
    deals::add_deal(
        db,
        NewDeal {
            title: title.to_string(),
            price: Some("$49.99".to_string()),
            category: Some(category.to_string()),
            asin: Some("B09ABCD123".to_string()),
            rating: 4.2,
            review_count: 300,
            ..Default::default()
        },
        "https://www.amazon.com/dp/B09ABCD123?tag=dealtrack-20".to_string(),
        "amazon".to_string(),
        "enthusiastic".to_string(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (addr, _db) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/health"))
        .header("origin", "https://dash.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_stats_endpoint_reports_derived_metrics() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::new();

    users::upsert_user(&db, 1, Some("alice".to_string()), None, None)
        .await
        .unwrap();
    let deal = seed_deal(&db, "Robot vacuum", "electronics").await;
    for _ in 0..4 {
        clicks::record_click(&db, deal.id, None, None, None, None)
            .await
            .unwrap();
    }
    clicks::update_deal_stats(&db, deal.id, 0, 1, 5.0)
        .await
        .unwrap();

    let resp = client
        .get(format!("http://{addr}/api/stats"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(body["total_deals"], 1);
    assert_eq!(body["recent_deals"], 1);
    assert_eq!(body["total_clicks"], 4);
    assert_eq!(body["total_conversions"], 1);
    assert_eq!(body["total_earnings"], 5.0);
    assert_eq!(body["active_users"], 1);
    assert_eq!(body["conversion_rate"], 25.0);
    assert_eq!(body["avg_earnings_per_deal"], 5.0);
    assert_eq!(body["avg_earnings_per_click"], 1.25);
    assert_eq!(body["category_stats"][0]["category"], "electronics");
    assert_eq!(body["category_stats"][0]["count"], 1);
    assert_eq!(body["source_stats"][0]["source"], "amazon");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_deals_endpoint_lists_and_filters() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::new();

    seed_deal(&db, "Robot vacuum", "electronics").await;
    seed_deal(&db, "Cookbook", "books").await;

    let resp = client
        .get(format!("http://{addr}/api/deals"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[0]["title"], "Cookbook");
    assert!(body[0]["earnings"].is_number());
    assert!(body[0]["posted_at"].is_string());

    let resp = client
        .get(format!("http://{addr}/api/deals?category=books"))
        .send()
        .await
        .unwrap();
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["title"], "Cookbook");

    let resp = client
        .get(format!("http://{addr}/api/deals?category=garden"))
        .send()
        .await
        .unwrap();
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(body.is_empty());

    let resp = client
        .get(format!("http://{addr}/api/deals?limit=1"))
        .send()
        .await
        .unwrap();
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 1);
}

#[tokio::test]
async fn test_deal_detail_and_404() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::new();

    let deal = seed_deal(&db, "Robot vacuum", "electronics").await;

    let resp = client
        .get(format!("http://{addr}/api/deals/{}", deal.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["title"], "Robot vacuum");
    assert_eq!(body["asin"], "B09ABCD123");

    let resp = client
        .get(format!("http://{addr}/api/deals/999999"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_users_endpoint_applies_window() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::new();

    users::upsert_user(&db, 1, Some("fresh".to_string()), None, None)
        .await
        .unwrap();
    users::upsert_user(&db, 2, Some("stale".to_string()), None, None)
        .await
        .unwrap();
    let stale_seen = chrono::Utc::now().timestamp_millis() - 40 * 86_400_000;
    db.run("age_user", move |conn| {
        conn.execute(
            "UPDATE users SET last_seen = ?1 WHERE user_id = 2",
            rusqlite::params![stale_seen],
        )
    })
    .await
    .unwrap();

    let resp = client
        .get(format!("http://{addr}/api/users"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["user_id"], 1);
    assert_eq!(body[0]["username"], "fresh");

    let resp = client
        .get(format!("http://{addr}/api/users?days=60"))
        .send()
        .await
        .unwrap();
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 2);
}

#[tokio::test]
async fn test_redirect_records_click_and_bounces() {
    let (addr, db) = spawn_server().await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let deal = seed_deal(&db, "Robot vacuum", "electronics").await;
    let deal_id = deal.id;

    let resp = client
        .get(format!("http://{addr}/r/{deal_id}?u=123"))
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .header("user-agent", "Mozilla/5.0 (test)")
        .header("referer", "https://t.me/dealchannel")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 307);
    assert_eq!(
        resp.headers().get("location").unwrap(),
        "https://www.amazon.com/dp/B09ABCD123?tag=dealtrack-20"
    );

    let stored = deals::get_deal(&db, deal_id).await.unwrap().unwrap();
    assert_eq!(stored.clicks, 1);

    let (user_id, ip, agent): (Option<i64>, Option<String>, Option<String>) = db
        .run("read_event", move |conn| {
            conn.query_row(
                "SELECT user_id, ip_address, user_agent FROM click_events WHERE deal_id = ?1",
                rusqlite::params![deal_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
        })
        .await
        .unwrap();
    assert_eq!(user_id, Some(123));
    assert_eq!(ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(agent.as_deref(), Some("Mozilla/5.0 (test)"));
}

#[tokio::test]
async fn test_redirect_unknown_deal_is_404() {
    let (addr, _db) = spawn_server().await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let resp = client
        .get(format!("http://{addr}/r/424242"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
