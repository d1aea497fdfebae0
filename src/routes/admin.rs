use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::new_id,
    db,
    error::ApiError,
    models::{ServiceRow, DEFAULT_TV_LEFT_PERCENT, DEFAULT_TV_ROTATION_SECONDS},
    scheduling,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .service(web::resource("/dashboard").route(web::get().to(dashboard)))
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service))
                    .route(web::patch().to(update_service)),
            )
            .service(
                web::resource("/ads")
                    .route(web::get().to(list_ads))
                    .route(web::post().to(create_ad))
                    .route(web::patch().to(toggle_ad)),
            )
            .service(
                web::resource("/tv-settings")
                    .route(web::get().to(tv_settings))
                    .route(web::patch().to(update_tv_settings)),
            ),
    );
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("").trim()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShopIdQuery {
    shop_id: Option<String>,
}

/// Shop-wide counters derived from the same active-queue snapshot the TV
/// uses: totals by status plus the mean projected wait.
async fn dashboard(
    state: web::Data<AppState>,
    query: web::Query<ShopIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId"));
    }

    let shop = db::fetch_shop(&state.db, shop_id).await?;

    let rows = db::fetch_active_queue(&state.db, shop_id, 50).await?;
    let durations: Vec<i64> = rows.iter().map(|r| r.duration_minutes).collect();
    let etas = scheduling::project_etas(&durations);
    let stats = scheduling::aggregate(
        rows.iter()
            .map(|r| r.status.as_str())
            .zip(etas.iter().copied()),
    );

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "shop": shop.map(|s| json!({ "id": s.id, "name": s.name, "suburb": s.suburb })),
        "stats": {
            "total_active": stats.total_active,
            "queued": stats.queued,
            "arrived": stats.arrived,
            "avg_eta_minutes": stats.avg_eta_minutes,
            "last_refresh": Utc::now().to_rfc3339(),
        },
    })))
}

fn service_json(row: &ServiceRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "name": row.name,
        "duration_minutes": row.duration_minutes,
        "slack_minutes": row.slack_minutes,
        "price": row.price,
        "is_active": row.is_active != 0,
    })
}

async fn list_services(
    state: web::Data<AppState>,
    query: web::Query<ShopIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId"));
    }

    let rows = sqlx::query_as::<_, ServiceRow>(
        r#"SELECT id, name, duration_minutes, slack_minutes, price, is_active
           FROM services
           WHERE shop_id = ?
           ORDER BY created_at ASC"#,
    )
    .bind(shop_id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "services": rows.iter().map(service_json).collect::<Vec<_>>(),
    })))
}

#[derive(Deserialize)]
struct ServiceCreatePayload {
    #[serde(rename = "shopId")]
    shop_id: Option<String>,
    name: Option<String>,
    duration_minutes: Option<i64>,
    slack_minutes: Option<i64>,
    price: Option<f64>,
}

async fn create_service(
    state: web::Data<AppState>,
    payload: web::Json<ServiceCreatePayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let name = trimmed(&payload.name);
    let (Some(duration_minutes), Some(price)) = (payload.duration_minutes, payload.price) else {
        return Err(ApiError::bad_request("Missing/invalid fields"));
    };
    if shop_id.is_empty() || name.is_empty() || duration_minutes <= 0 {
        return Err(ApiError::bad_request("Missing/invalid fields"));
    }
    let slack_minutes = payload.slack_minutes.unwrap_or(0);

    let service_id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, shop_id, name, duration_minutes, slack_minutes, price, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&service_id)
    .bind(shop_id)
    .bind(name)
    .bind(duration_minutes)
    .bind(slack_minutes)
    .bind(price)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    let row = fetch_service_row(&state, &service_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "service": service_json(&row) })))
}

#[derive(Deserialize)]
struct ServiceUpdatePayload {
    id: Option<String>,
    is_active: Option<bool>,
    name: Option<String>,
    duration_minutes: Option<i64>,
    slack_minutes: Option<i64>,
    price: Option<f64>,
}

async fn update_service(
    state: web::Data<AppState>,
    payload: web::Json<ServiceUpdatePayload>,
) -> Result<HttpResponse, ApiError> {
    let id = trimmed(&payload.id);
    if id.is_empty() {
        return Err(ApiError::bad_request("Missing id"));
    }

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    sqlx::query(
        r#"UPDATE services SET
               is_active = COALESCE(?, is_active),
               name = COALESCE(?, name),
               duration_minutes = COALESCE(?, duration_minutes),
               slack_minutes = COALESCE(?, slack_minutes),
               price = COALESCE(?, price)
           WHERE id = ?"#,
    )
    .bind(payload.is_active.map(i64::from))
    .bind(name)
    .bind(payload.duration_minutes)
    .bind(payload.slack_minutes)
    .bind(payload.price)
    .bind(id)
    .execute(&state.db)
    .await?;

    let row = fetch_service_row(&state, id).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "service": service_json(&row) })))
}

async fn fetch_service_row(state: &web::Data<AppState>, id: &str) -> Result<ServiceRow, ApiError> {
    db::fetch_service(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))
}

async fn list_ads(
    state: web::Data<AppState>,
    query: web::Query<ShopIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId"));
    }

    let rows = sqlx::query_as::<_, crate::models::AdRow>(
        r#"SELECT id, title, image_url, video_url, is_active, created_at
           FROM ads
           WHERE shop_id = ?
           ORDER BY created_at DESC"#,
    )
    .bind(shop_id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "ads": rows.iter().map(ad_json).collect::<Vec<_>>(),
    })))
}

fn ad_json(row: &crate::models::AdRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "title": row.title,
        "image_url": row.image_url,
        "video_url": row.video_url,
        "is_active": row.is_active != 0,
        "created_at": row.created_at,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdCreatePayload {
    shop_id: Option<String>,
    title: Option<String>,
    image_url: Option<String>,
    video_url: Option<String>,
}

async fn create_ad(
    state: web::Data<AppState>,
    payload: web::Json<AdCreatePayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    let title = trimmed(&payload.title);
    let image_url = trimmed(&payload.image_url);
    let video_url = trimmed(&payload.video_url);

    // An ad needs at least something to show.
    if shop_id.is_empty() || (title.is_empty() && image_url.is_empty() && video_url.is_empty()) {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let ad_id = new_id();
    sqlx::query(
        r#"INSERT INTO ads (id, shop_id, title, image_url, video_url, is_active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&ad_id)
    .bind(shop_id)
    .bind(if title.is_empty() { None } else { Some(title) })
    .bind(if image_url.is_empty() { None } else { Some(image_url) })
    .bind(if video_url.is_empty() { None } else { Some(video_url) })
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    let row = fetch_ad_row(&state, &ad_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "ad": ad_json(&row) })))
}

#[derive(Deserialize)]
struct AdTogglePayload {
    id: Option<String>,
    is_active: Option<bool>,
}

async fn toggle_ad(
    state: web::Data<AppState>,
    payload: web::Json<AdTogglePayload>,
) -> Result<HttpResponse, ApiError> {
    let id = trimmed(&payload.id);
    if id.is_empty() {
        return Err(ApiError::bad_request("Missing id"));
    }
    let is_active = payload.is_active.unwrap_or(false);

    sqlx::query("UPDATE ads SET is_active = ? WHERE id = ?")
        .bind(i64::from(is_active))
        .bind(id)
        .execute(&state.db)
        .await?;

    let row = fetch_ad_row(&state, id).await?;
    Ok(HttpResponse::Ok().json(json!({ "ok": true, "ad": ad_json(&row) })))
}

async fn fetch_ad_row(
    state: &web::Data<AppState>,
    id: &str,
) -> Result<crate::models::AdRow, ApiError> {
    sqlx::query_as::<_, crate::models::AdRow>(
        r#"SELECT id, title, image_url, video_url, is_active, created_at
           FROM ads
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Ad not found"))
}

async fn tv_settings(
    state: web::Data<AppState>,
    query: web::Query<ShopIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&query.shop_id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId"));
    }

    let shop = db::fetch_shop(&state.db, shop_id).await?;
    let left = shop
        .as_ref()
        .map(|s| s.tv_left_percent)
        .unwrap_or(DEFAULT_TV_LEFT_PERCENT);
    let rotation = shop
        .as_ref()
        .map(|s| s.tv_ad_rotation_seconds)
        .unwrap_or(DEFAULT_TV_ROTATION_SECONDS);

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "tv_left_percent": scheduling::clamp_left_percent(left),
        "tv_ad_rotation_seconds": scheduling::clamp_rotation_seconds(rotation),
    })))
}

#[derive(Deserialize)]
struct TvSettingsPayload {
    #[serde(rename = "shopId")]
    shop_id: Option<String>,
    tv_left_percent: Option<i64>,
    tv_ad_rotation_seconds: Option<i64>,
}

async fn update_tv_settings(
    state: web::Data<AppState>,
    payload: web::Json<TvSettingsPayload>,
) -> Result<HttpResponse, ApiError> {
    let shop_id = trimmed(&payload.shop_id);
    if shop_id.is_empty() {
        return Err(ApiError::bad_request("Missing shopId"));
    }

    let left = scheduling::clamp_left_percent(
        payload.tv_left_percent.unwrap_or(DEFAULT_TV_LEFT_PERCENT),
    );
    let rotation = scheduling::clamp_rotation_seconds(
        payload
            .tv_ad_rotation_seconds
            .unwrap_or(DEFAULT_TV_ROTATION_SECONDS),
    );

    let result =
        sqlx::query("UPDATE shops SET tv_left_percent = ?, tv_ad_rotation_seconds = ? WHERE id = ?")
            .bind(left)
            .bind(rotation)
            .bind(shop_id)
            .execute(&state.db)
            .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Shop not found"));
    }

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "tv_left_percent": left,
        "tv_ad_rotation_seconds": rotation,
    })))
}
