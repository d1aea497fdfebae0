use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_pin, new_id},
    models::{
        ActiveQueueRow, CustomerRow, DayBookingRow, ServiceRow, ShopHoursRow, ShopRow,
        BOOKING_BOOKED,
    },
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn fetch_shop(pool: &SqlitePool, shop_id: &str) -> Result<Option<ShopRow>, sqlx::Error> {
    sqlx::query_as::<_, ShopRow>(
        r#"SELECT id, name, suburb, tv_left_percent, tv_ad_rotation_seconds
           FROM shops
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(shop_id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_service(
    pool: &SqlitePool,
    service_id: &str,
) -> Result<Option<ServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, ServiceRow>(
        r#"SELECT id, name, duration_minutes, slack_minutes, price, is_active
           FROM services
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await
}

/// Hours row for one weekday (0 = Sunday). A missing row means the shop is
/// closed that day, same as an explicit is_closed flag.
pub async fn fetch_hours(
    pool: &SqlitePool,
    shop_id: &str,
    day_of_week: i64,
) -> Result<Option<ShopHoursRow>, sqlx::Error> {
    sqlx::query_as::<_, ShopHoursRow>(
        r#"SELECT open_time, close_time, is_closed
           FROM shop_hours
           WHERE shop_id = ? AND day_of_week = ?
           LIMIT 1"#,
    )
    .bind(shop_id)
    .bind(day_of_week)
    .fetch_optional(pool)
    .await
}

/// Customers are keyed by phone number: reuse the existing row, otherwise
/// create one. INSERT OR IGNORE plus re-select keeps a concurrent duplicate
/// from failing the request.
pub async fn find_or_create_customer(
    pool: &SqlitePool,
    first_name: &str,
    last_name: &str,
    phone: &str,
) -> Result<CustomerRow, sqlx::Error> {
    sqlx::query(
        r#"INSERT OR IGNORE INTO customers (id, first_name, last_name, phone, created_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(first_name)
    .bind(last_name)
    .bind(phone)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    sqlx::query_as::<_, CustomerRow>(
        "SELECT id, first_name, last_name, phone FROM customers WHERE phone = ? LIMIT 1",
    )
    .bind(phone)
    .fetch_one(pool)
    .await
}

pub async fn fetch_customer_by_phone(
    pool: &SqlitePool,
    phone: &str,
) -> Result<Option<CustomerRow>, sqlx::Error> {
    sqlx::query_as::<_, CustomerRow>(
        "SELECT id, first_name, last_name, phone FROM customers WHERE phone = ? LIMIT 1",
    )
    .bind(phone)
    .fetch_optional(pool)
    .await
}

/// The active queue snapshot: queued + arrived entries in FIFO order.
/// created_at ascending is the ordering invariant the ETA projection
/// depends on.
pub async fn fetch_active_queue(
    pool: &SqlitePool,
    shop_id: &str,
    limit: i64,
) -> Result<Vec<ActiveQueueRow>, sqlx::Error> {
    sqlx::query_as::<_, ActiveQueueRow>(
        r#"SELECT q.id, q.status, q.created_at,
                  c.first_name, c.last_name,
                  s.name AS service_name, s.duration_minutes
           FROM queue_entries q
           JOIN customers c ON c.id = q.customer_id
           JOIN services s ON s.id = q.service_id
           WHERE q.shop_id = ? AND q.status IN ('queued', 'arrived')
           ORDER BY q.created_at ASC
           LIMIT ?"#,
    )
    .bind(shop_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Booked intervals inside [day_start, day_end), raw start/end strings, for
/// the availability overlap filter.
pub async fn fetch_day_booked_intervals(
    pool: &SqlitePool,
    shop_id: &str,
    day_start: &str,
    day_end: &str,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String)>(
        r#"SELECT start_at, end_at
           FROM bookings
           WHERE shop_id = ? AND status = ?
             AND start_at >= ? AND start_at < ?
           ORDER BY start_at ASC"#,
    )
    .bind(shop_id)
    .bind(BOOKING_BOOKED)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(pool)
    .await
}

/// The day's booked appointments joined for display on the TV and the
/// employee work view.
pub async fn fetch_day_bookings(
    pool: &SqlitePool,
    shop_id: &str,
    day_start: &str,
    day_end: &str,
    limit: i64,
) -> Result<Vec<DayBookingRow>, sqlx::Error> {
    sqlx::query_as::<_, DayBookingRow>(
        r#"SELECT b.id, b.start_at,
                  c.first_name, c.last_name,
                  s.name AS service_name
           FROM bookings b
           JOIN customers c ON c.id = b.customer_id
           JOIN services s ON s.id = b.service_id
           WHERE b.shop_id = ? AND b.status = ?
             AND b.start_at >= ? AND b.start_at < ?
           ORDER BY b.start_at ASC
           LIMIT ?"#,
    )
    .bind(shop_id)
    .bind(BOOKING_BOOKED)
    .bind(day_start)
    .bind(day_end)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Seeds a demo shop (hours, services, one employee, one ad) when
/// SEED_DEMO=true and the database holds no shop yet.
pub async fn seed_demo(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let wanted = env::var("SEED_DEMO").unwrap_or_else(|_| "false".to_string());
    if wanted != "true" {
        return Ok(());
    }

    let existing =
        sqlx::query_as::<_, (String,)>("SELECT id FROM shops LIMIT 1")
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        return Ok(());
    }

    let now = Utc::now().to_rfc3339();
    let shop_id = new_id();

    sqlx::query(
        r#"INSERT INTO shops (id, name, suburb, tv_left_percent, tv_ad_rotation_seconds, created_at)
           VALUES (?, ?, ?, 70, 10, ?)"#,
    )
    .bind(&shop_id)
    .bind("Fade District")
    .bind("Newtown")
    .bind(&now)
    .execute(pool)
    .await?;

    // Monday-Saturday 09:00-18:00, closed Sunday.
    for day in 0..7i64 {
        sqlx::query(
            r#"INSERT INTO shop_hours (shop_id, day_of_week, open_time, close_time, is_closed)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&shop_id)
        .bind(day)
        .bind("09:00:00")
        .bind("18:00:00")
        .bind(if day == 0 { 1i64 } else { 0i64 })
        .execute(pool)
        .await?;
    }

    let services = [
        ("Haircut", 30i64, 5i64, 35.0f64),
        ("Beard Trim", 20, 5, 25.0),
        ("Cut & Beard", 45, 5, 55.0),
    ];
    for (name, duration, slack, price) in services {
        sqlx::query(
            r#"INSERT INTO services (id, shop_id, name, duration_minutes, slack_minutes, price, is_active, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
        )
        .bind(new_id())
        .bind(&shop_id)
        .bind(name)
        .bind(duration)
        .bind(slack)
        .bind(price)
        .bind(&now)
        .execute(pool)
        .await?;
    }

    let pin = env::var("SEED_EMPLOYEE_PIN").unwrap_or_else(|_| "1234".to_string());
    if pin == "1234" {
        log::warn!("SEED_EMPLOYEE_PIN not set. Using default PIN '1234'. Set SEED_EMPLOYEE_PIN in production.");
    }
    let pin_hash =
        hash_pin(&pin).map_err(|_| sqlx::Error::Protocol("pin hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO employees (id, shop_id, name, role, pin_hash, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(&shop_id)
    .bind("Sam")
    .bind("staff")
    .bind(pin_hash)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"INSERT INTO ads (id, shop_id, title, image_url, video_url, is_active, created_at)
           VALUES (?, ?, ?, NULL, NULL, 1, ?)"#,
    )
    .bind(new_id())
    .bind(&shop_id)
    .bind("Grand opening, walk-ins welcome")
    .bind(&now)
    .execute(pool)
    .await?;

    log::info!("Seeded demo shop {shop_id}");
    Ok(())
}
