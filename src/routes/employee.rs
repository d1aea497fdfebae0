use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{authenticate_pin, new_id},
    db,
    error::ApiError,
    models::QUEUE_COMPLETED,
    scheduling,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/employee")
            .service(web::resource("/login").route(web::post().to(login)))
            .service(web::resource("/clock-in").route(web::post().to(clock_in)))
            .service(web::resource("/clock-out").route(web::post().to(clock_out)))
            .service(web::resource("/work").route(web::get().to(work_snapshot)))
            .service(web::resource("/start").route(web::post().to(start_session)))
            .service(web::resource("/finish").route(web::post().to(finish_session))),
    );
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("").trim()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    shop_id: Option<String>,
    pin: Option<String>,
}

async fn login(
    state: web::Data<AppState>,
    payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let pin = trimmed(&payload.pin);
    if shop_id.is_empty() || pin.is_empty() {
        return Err(ApiError::bad_request("Missing shopId or pin"));
    }

    let employee = authenticate_pin(&state.db, shop_id, pin)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid PIN"))?;

    let clocked_in = open_attendance(&state, shop_id, &employee.id).await?.is_some();

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "employee": { "id": employee.id, "name": employee.name, "role": employee.role },
        "clockedIn": clocked_in,
    })))
}

async fn open_attendance(
    state: &web::Data<AppState>,
    shop_id: &str,
    employee_id: &str,
) -> Result<Option<String>, ApiError> {
    let row = sqlx::query_as::<_, (String,)>(
        r#"SELECT id FROM employee_attendance
           WHERE shop_id = ? AND employee_id = ? AND clock_out_at IS NULL
           LIMIT 1"#,
    )
    .bind(shop_id)
    .bind(employee_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(row.map(|r| r.0))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeePayload {
    shop_id: Option<String>,
    employee_id: Option<String>,
}

async fn clock_in(
    state: web::Data<AppState>,
    payload: web::Json<EmployeePayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let employee_id = trimmed(&payload.employee_id);
    if shop_id.is_empty() || employee_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId or employeeId"));
    }

    if open_attendance(&state, shop_id, employee_id).await?.is_some() {
        return Err(ApiError::conflict("Already clocked in."));
    }

    let attendance_id = new_id();
    sqlx::query(
        r#"INSERT INTO employee_attendance (id, shop_id, employee_id, clock_in_at)
           VALUES (?, ?, ?, ?)"#,
    )
    .bind(&attendance_id)
    .bind(shop_id)
    .bind(employee_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true, "attendanceId": attendance_id })))
}

async fn clock_out(
    state: web::Data<AppState>,
    payload: web::Json<EmployeePayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let employee_id = trimmed(&payload.employee_id);
    if shop_id.is_empty() || employee_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId or employeeId"));
    }

    let attendance_id = open_attendance(&state, shop_id, employee_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Not clocked in."))?;

    sqlx::query("UPDATE employee_attendance SET clock_out_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&attendance_id)
        .execute(&state.db)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkQuery {
    shop_id: Option<String>,
    date: Option<String>,
}

/// The work screen poll: the active queue with projected waits plus the
/// day's booked appointments.
async fn work_snapshot(
    state: web::Data<AppState>,
    query: web::Query<WorkQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    let date_raw = trimmed(&query.date);
    if shop_id.is_empty() || date_raw.is_empty() {
        return Err(ApiError::bad_request("Missing shopId or date"));
    }
    let date = scheduling::parse_day(date_raw)
        .ok_or_else(|| ApiError::bad_request("Invalid date format (expected YYYY-MM-DD)"))?;

    let rows = db::fetch_active_queue(&state.db, shop_id, 30).await?;
    let durations: Vec<i64> = rows.iter().map(|r| r.duration_minutes).collect();
    let etas = scheduling::project_etas(&durations);

    let queue: Vec<_> = rows
        .iter()
        .zip(etas.iter())
        .map(|(row, eta)| {
            json!({
                "id": row.id,
                "status": row.status,
                "eta_minutes": eta,
                "customer": { "first_name": row.first_name, "last_name": row.last_name },
                "service": { "name": row.service_name, "duration_minutes": row.duration_minutes },
            })
        })
        .collect();

    let (day_start, day_end) = scheduling::day_bounds(date);
    let bookings: Vec<_> =
        db::fetch_day_bookings(&state.db, shop_id, &day_start.to_rfc3339(), &day_end.to_rfc3339(), 30)
            .await?
            .into_iter()
            .map(|row| {
                json!({
                    "id": row.id,
                    "start_at": row.start_at,
                    "customer": { "first_name": row.first_name, "last_name": row.last_name },
                    "service": { "name": row.service_name },
                })
            })
            .collect();

    Ok(HttpResponse::Ok().json(json!({ "ok": true, "queue": queue, "bookings": bookings })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    shop_id: Option<String>,
    employee_id: Option<String>,
    queue_entry_id: Option<String>,
    booking_id: Option<String>,
}

/// Opens a service session on a queue entry or a booking. One open session
/// per employee.
async fn start_session(
    state: web::Data<AppState>,
    payload: web::Json<StartPayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let employee_id = trimmed(&payload.employee_id);
    let queue_entry_id = trimmed(&payload.queue_entry_id);
    let booking_id = trimmed(&payload.booking_id);

    if shop_id.is_empty()
        || employee_id.is_empty()
        || (queue_entry_id.is_empty() && booking_id.is_empty())
    {
        return Err(ApiError::bad_request("Missing fields"));
    }

    if open_session(&state, shop_id, employee_id).await?.is_some() {
        return Err(ApiError::conflict("You already have an active service."));
    }

    let session_id = new_id();
    sqlx::query(
        r#"INSERT INTO service_sessions (id, shop_id, employee_id, queue_entry_id, booking_id, started_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&session_id)
    .bind(shop_id)
    .bind(employee_id)
    .bind(if queue_entry_id.is_empty() { None } else { Some(queue_entry_id) })
    .bind(if booking_id.is_empty() { None } else { Some(booking_id) })
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "ok": true, "sessionId": session_id })))
}

async fn open_session(
    state: &web::Data<AppState>,
    shop_id: &str,
    employee_id: &str,
) -> Result<Option<(String, Option<String>)>, ApiError> {
    let row = sqlx::query_as::<_, (String, Option<String>)>(
        r#"SELECT id, queue_entry_id FROM service_sessions
           WHERE shop_id = ? AND employee_id = ? AND finished_at IS NULL
           LIMIT 1"#,
    )
    .bind(shop_id)
    .bind(employee_id)
    .fetch_optional(&state.db)
    .await?;
    Ok(row)
}

/// Closes the employee's open session and completes the queue entry it was
/// serving, moving the customer out of the active queue.
async fn finish_session(
    state: web::Data<AppState>,
    payload: web::Json<EmployeePayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let employee_id = trimmed(&payload.employee_id);
    if shop_id.is_empty() || employee_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId or employeeId"));
    }

    let (session_id, queue_entry_id) = open_session(&state, shop_id, employee_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No active service."))?;

    sqlx::query("UPDATE service_sessions SET finished_at = ? WHERE id = ?")
        .bind(Utc::now().to_rfc3339())
        .bind(&session_id)
        .execute(&state.db)
        .await?;

    if let Some(entry_id) = queue_entry_id {
        sqlx::query("UPDATE queue_entries SET status = ? WHERE id = ?")
            .bind(QUEUE_COMPLETED)
            .bind(entry_id)
            .execute(&state.db)
            .await?;
    }

    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}
