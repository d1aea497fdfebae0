use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::new_id,
    db,
    error::ApiError,
    models::{BOOKING_BOOKED, DEFAULT_TV_LEFT_PERCENT, DEFAULT_TV_ROTATION_SECONDS, QUEUE_ARRIVED, QUEUE_QUEUED},
    scheduling::{self, FALLBACK_DURATION_MINUTES, STEP_MINUTES},
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/shop").route(web::get().to(shop)))
        .service(web::resource("/api/availability").route(web::get().to(availability)))
        .service(web::resource("/api/bookings").route(web::post().to(create_booking)))
        .service(web::resource("/api/join-queue").route(web::post().to(join_queue)))
        .service(web::resource("/api/kiosk-checkin").route(web::post().to(kiosk_checkin)))
        .service(web::resource("/api/tv").route(web::get().to(tv_snapshot)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("").trim()
}

#[derive(Deserialize)]
struct ShopQuery {
    id: Option<String>,
}

async fn shop(
    state: web::Data<AppState>,
    query: web::Query<ShopQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing id"));
    }

    let shop = db::fetch_shop(&state.db, shop_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shop not found"))?;

    let services = sqlx::query_as::<_, (String, String, i64, f64)>(
        r#"SELECT id, name, duration_minutes, price
           FROM services
           WHERE shop_id = ? AND is_active = 1
           ORDER BY duration_minutes ASC"#,
    )
    .bind(shop_id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "shop": { "id": shop.id, "name": shop.name, "suburb": shop.suburb },
        "services": services
            .into_iter()
            .map(|(id, name, duration_minutes, price)| json!({
                "id": id,
                "name": name,
                "duration_minutes": duration_minutes,
                "price": price,
            }))
            .collect::<Vec<_>>(),
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityQuery {
    shop_id: Option<String>,
    service_id: Option<String>,
    date: Option<String>,
}

/// Open bookable slots for (shop, service, date): resolve the weekday's
/// hours, walk the slot grid, drop everything overlapping an existing
/// booking. A closed day answers with an empty slot list, not an error.
async fn availability(
    state: web::Data<AppState>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    let service_id = trimmed(&query.service_id);
    let date_raw = trimmed(&query.date);

    if shop_id.is_empty() || service_id.is_empty() || date_raw.is_empty() {
        return Err(ApiError::bad_request("Missing shopId, serviceId, or date"));
    }
    let date = scheduling::parse_day(date_raw)
        .ok_or_else(|| ApiError::bad_request("Invalid date format (expected YYYY-MM-DD)"))?;

    let shop = db::fetch_shop(&state.db, shop_id).await?;
    let service = db::fetch_service(&state.db, service_id).await?;

    let shop_name = shop.map(|s| s.name).unwrap_or_default();
    let service_name = service.as_ref().map(|s| s.name.clone()).unwrap_or_default();
    let duration = service
        .as_ref()
        .map(|s| s.duration_minutes)
        .filter(|&d| d > 0)
        .unwrap_or(FALLBACK_DURATION_MINUTES);

    let day_of_week = scheduling::day_of_week(date);
    let hours = db::fetch_hours(&state.db, shop_id, day_of_week as i64).await?;

    // Missing hours row and an explicit closed flag answer identically,
    // and neither scans the day's bookings.
    let open = match hours {
        Some(row) if row.is_closed == 0 => row,
        _ => {
            return Ok(HttpResponse::Ok().json(json!({
                "ok": true,
                "shop": { "id": shop_id, "name": shop_name },
                "service": { "id": service_id, "name": service_name, "duration_minutes": duration },
                "date": date_raw,
                "day_of_week": day_of_week,
                "open_time": null,
                "close_time": null,
                "step_minutes": STEP_MINUTES,
                "slots": [],
            })));
        }
    };

    let (day_start, day_end) = scheduling::day_bounds(date);
    let intervals =
        db::fetch_day_booked_intervals(&state.db, shop_id, &day_start.to_rfc3339(), &day_end.to_rfc3339())
            .await?;
    let booked: Vec<(DateTime<Utc>, DateTime<Utc>)> = intervals
        .iter()
        .filter_map(|(start, end)| Some((parse_ts(start)?, parse_ts(end)?)))
        .collect();

    let slots = scheduling::filter_available(
        scheduling::generate_slots(date, &open.open_time, &open.close_time, duration, STEP_MINUTES),
        &booked,
    );

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "shop": { "id": shop_id, "name": shop_name },
        "service": { "id": service_id, "name": service_name, "duration_minutes": duration },
        "date": date_raw,
        "day_of_week": day_of_week,
        "open_time": open.open_time,
        "close_time": open.close_time,
        "step_minutes": STEP_MINUTES,
        "slots": slots
            .iter()
            .map(|slot| json!({
                "start": slot.start.to_rfc3339(),
                "end": slot.end.to_rfc3339(),
                "label": scheduling::slot_label(slot.start),
            }))
            .collect::<Vec<_>>(),
    })))
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingPayload {
    shop_id: Option<String>,
    service_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    start_at: Option<String>,
}

/// Books a timed appointment. The slot filter upstream only reduces visible
/// conflicts; the store's overlap trigger is the authoritative check, and
/// its rejection comes back to the caller as a conflict, not a crash.
async fn create_booking(
    state: web::Data<AppState>,
    payload: web::Json<BookingPayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let service_id = trimmed(&payload.service_id);
    let first_name = trimmed(&payload.first_name);
    let last_name = trimmed(&payload.last_name);
    let phone = trimmed(&payload.phone);
    let start_raw = trimmed(&payload.start_at);

    if shop_id.is_empty()
        || service_id.is_empty()
        || first_name.is_empty()
        || last_name.is_empty()
        || phone.is_empty()
        || start_raw.is_empty()
    {
        return Err(ApiError::bad_request("Missing shopId/serviceId/name/phone/startAt"));
    }

    let start = parse_ts(start_raw)
        .ok_or_else(|| ApiError::bad_request("Invalid startAt"))?
        .trunc_subsecs(0);

    let customer = db::find_or_create_customer(&state.db, first_name, last_name, phone).await?;

    let duration = db::fetch_service(&state.db, service_id)
        .await?
        .map(|s| s.duration_minutes)
        .filter(|&d| d > 0)
        .unwrap_or(FALLBACK_DURATION_MINUTES);
    let end = start + Duration::minutes(duration);

    let booking_id = new_id();
    let result = sqlx::query(
        r#"INSERT INTO bookings (id, shop_id, service_id, customer_id, start_at, end_at, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&booking_id)
    .bind(shop_id)
    .bind(service_id)
    .bind(&customer.id)
    .bind(start.to_rfc3339())
    .bind(end.to_rfc3339())
    .bind(BOOKING_BOOKED)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await;

    if let Err(err) = result {
        // Trigger aborts arrive as database errors; anything else is a
        // genuine server fault.
        return Err(match err {
            sqlx::Error::Database(db_err) => ApiError::conflict(db_err.message().to_string()),
            other => ApiError::Database(other),
        });
    }

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "booking": {
            "id": booking_id,
            "shop_id": shop_id,
            "service_id": service_id,
            "customer_id": customer.id,
            "start_at": start.to_rfc3339(),
            "end_at": end.to_rfc3339(),
            "status": BOOKING_BOOKED,
        },
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinQueuePayload {
    shop_id: Option<String>,
    service_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
}

async fn join_queue(
    state: web::Data<AppState>,
    payload: web::Json<JoinQueuePayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let service_id = trimmed(&payload.service_id);
    let first_name = trimmed(&payload.first_name);
    let last_name = trimmed(&payload.last_name);
    let phone = trimmed(&payload.phone);

    if shop_id.is_empty()
        || service_id.is_empty()
        || first_name.is_empty()
        || last_name.is_empty()
        || phone.is_empty()
    {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let customer = db::find_or_create_customer(&state.db, first_name, last_name, phone).await?;

    let entry_id = new_id();
    sqlx::query(
        r#"INSERT INTO queue_entries (id, shop_id, customer_id, service_id, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&entry_id)
    .bind(shop_id)
    .bind(&customer.id)
    .bind(service_id)
    .bind(QUEUE_QUEUED)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "customerId": customer.id,
        "queueEntryId": entry_id,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KioskCheckinPayload {
    shop_id: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
}

/// Kiosk check-in: phone number finds the customer, the last name confirms
/// it, and the latest queued entry flips to arrived.
async fn kiosk_checkin(
    state: web::Data<AppState>,
    payload: web::Json<KioskCheckinPayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let last_name = trimmed(&payload.last_name);
    let phone = trimmed(&payload.phone);

    if shop_id.is_empty() || last_name.is_empty() || phone.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let customer = db::fetch_customer_by_phone(&state.db, phone)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found. Please join queue first."))?;

    if customer.last_name.trim().to_lowercase() != last_name.to_lowercase() {
        return Err(ApiError::unauthorized("Last name does not match phone number."));
    }

    let entry = sqlx::query_as::<_, (String,)>(
        r#"SELECT id FROM queue_entries
           WHERE shop_id = ? AND customer_id = ? AND status = ?
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(shop_id)
    .bind(&customer.id)
    .bind(QUEUE_QUEUED)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("No active queued booking found for this customer."))?;

    sqlx::query("UPDATE queue_entries SET status = ?, checked_in_at = ? WHERE id = ?")
        .bind(QUEUE_ARRIVED)
        .bind(Utc::now().to_rfc3339())
        .bind(&entry.0)
        .execute(&state.db)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true, "queueEntryId": entry.0 })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TvQuery {
    shop_id: Option<String>,
}

/// One poll of the TV display: the active queue with projected waits,
/// today's booked appointments with minutes until start, active ads, and
/// the display settings. A missing shop degrades to defaults so the screen
/// stays up.
async fn tv_snapshot(
    state: web::Data<AppState>,
    query: web::Query<TvQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId"));
    }

    let shop = db::fetch_shop(&state.db, shop_id).await?;
    let left_percent = scheduling::clamp_left_percent(
        shop.as_ref()
            .map(|s| s.tv_left_percent)
            .unwrap_or(DEFAULT_TV_LEFT_PERCENT),
    );
    let rotation_seconds = scheduling::clamp_rotation_seconds(
        shop.as_ref()
            .map(|s| s.tv_ad_rotation_seconds)
            .unwrap_or(DEFAULT_TV_ROTATION_SECONDS),
    );

    let rows = db::fetch_active_queue(&state.db, shop_id, 20).await?;
    let durations: Vec<i64> = rows.iter().map(|r| r.duration_minutes).collect();
    let etas = scheduling::project_etas(&durations);

    let queue: Vec<_> = rows
        .iter()
        .zip(etas.iter())
        .map(|(row, eta)| {
            json!({
                "id": row.id,
                "status": row.status,
                "created_at": row.created_at,
                "eta_minutes": eta,
                "customer": { "first_name": row.first_name, "last_name": row.last_name },
                "service": { "name": row.service_name, "duration_minutes": row.duration_minutes },
            })
        })
        .collect();

    let now = Utc::now();
    let (day_start, day_end) = scheduling::day_bounds(now.date_naive());
    let bookings: Vec<_> =
        db::fetch_day_bookings(&state.db, shop_id, &day_start.to_rfc3339(), &day_end.to_rfc3339(), 10)
            .await?
            .into_iter()
            .map(|row| {
                // Minutes until start; may be negative once the start time
                // has passed, the display clamps at zero.
                let eta = parse_ts(&row.start_at)
                    .map(|start| (start - now).num_minutes())
                    .unwrap_or(0);
                json!({
                    "id": row.id,
                    "status": BOOKING_BOOKED,
                    "start_at": row.start_at,
                    "eta_minutes": eta,
                    "customer": { "first_name": row.first_name, "last_name": row.last_name },
                    "service": { "name": row.service_name },
                })
            })
            .collect();

    let ads = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<String>)>(
        r#"SELECT id, title, image_url, video_url
           FROM ads
           WHERE shop_id = ? AND is_active = 1
           ORDER BY created_at DESC
           LIMIT 10"#,
    )
    .bind(shop_id)
    .fetch_all(&state.db)
    .await?
    .into_iter()
    .map(|(id, title, image_url, video_url)| {
        json!({ "id": id, "title": title, "image_url": image_url, "video_url": video_url })
    })
    .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "tv_left_percent": left_percent,
        "tv_ad_rotation_seconds": rotation_seconds,
        "queue": queue,
        "bookings": bookings,
        "ads": ads,
    })))
}
