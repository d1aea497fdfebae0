use actix_web::{test, web, App};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;

use waitline::{auth, routes, state::AppState};

async fn setup() -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    AppState { db: pool }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(routes::public::configure)
                .configure(routes::admin::configure)
                .configure(routes::employee::configure),
        )
        .await
    };
}

macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req).await;
        let status = resp.status().as_u16();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

macro_rules! get {
    ($app:expr, $uri:expr) => {
        send!($app, test::TestRequest::get().uri($uri).to_request())
    };
}

macro_rules! post {
    ($app:expr, $uri:expr, $body:expr) => {
        send!(
            $app,
            test::TestRequest::post().uri($uri).set_json($body).to_request()
        )
    };
}

macro_rules! patch {
    ($app:expr, $uri:expr, $body:expr) => {
        send!(
            $app,
            test::TestRequest::patch().uri($uri).set_json($body).to_request()
        )
    };
}

async fn seed_shop(state: &AppState, id: &str, name: &str) {
    sqlx::query(
        "INSERT INTO shops (id, name, suburb, tv_left_percent, tv_ad_rotation_seconds, created_at) \
         VALUES (?, ?, 'Newtown', 70, 10, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .expect("seed shop");
}

async fn seed_hours(state: &AppState, shop_id: &str, day: i64, open: &str, close: &str, closed: bool) {
    sqlx::query(
        "INSERT INTO shop_hours (shop_id, day_of_week, open_time, close_time, is_closed) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(shop_id)
    .bind(day)
    .bind(open)
    .bind(close)
    .bind(i64::from(closed))
    .execute(&state.db)
    .await
    .expect("seed hours");
}

async fn seed_service(state: &AppState, id: &str, shop_id: &str, name: &str, duration: i64) {
    sqlx::query(
        "INSERT INTO services (id, shop_id, name, duration_minutes, slack_minutes, price, is_active, created_at) \
         VALUES (?, ?, ?, ?, 0, 30.0, 1, ?)",
    )
    .bind(id)
    .bind(shop_id)
    .bind(name)
    .bind(duration)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .expect("seed service");
}

async fn seed_employee(state: &AppState, id: &str, shop_id: &str, name: &str, pin: &str) {
    let pin_hash = auth::hash_pin(pin).expect("hash pin");
    sqlx::query(
        "INSERT INTO employees (id, shop_id, name, role, pin_hash, is_active, created_at) \
         VALUES (?, ?, ?, 'staff', ?, 1, ?)",
    )
    .bind(id)
    .bind(shop_id)
    .bind(name)
    .bind(pin_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .expect("seed employee");
}

// 2024-06-02 is a Sunday, 2024-06-03 a Monday.
const SUNDAY: &str = "2024-06-02";
const MONDAY: &str = "2024-06-03";

#[actix_web::test]
async fn availability_rejects_missing_and_malformed_input() {
    let state = setup().await;
    let app = app!(state);

    let (status, body) = get!(app, "/api/availability?shopId=s1&date=2024-06-03");
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("Missing"));

    let (status, body) = get!(app, "/api/availability?shopId=s1&serviceId=v1&date=2024-6-3");
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("Invalid date format"));
}

#[actix_web::test]
async fn closed_day_and_missing_hours_yield_empty_slots() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    // Sunday explicitly closed, Monday has no hours row at all.
    seed_hours(&state, "s1", 0, "09:00:00", "18:00:00", true).await;
    let app = app!(state);

    for date in [SUNDAY, MONDAY] {
        let uri = format!("/api/availability?shopId=s1&serviceId=v1&date={date}");
        let (status, body) = get!(app, &uri);
        assert_eq!(status, 200);
        assert_eq!(body["ok"], json!(true));
        assert!(body["open_time"].is_null());
        assert_eq!(body["slots"].as_array().unwrap().len(), 0);
    }
}

#[actix_web::test]
async fn open_day_emits_the_full_slot_grid() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    seed_hours(&state, "s1", 1, "09:00:00", "12:00:00", false).await;
    let app = app!(state);

    let uri = format!("/api/availability?shopId=s1&serviceId=v1&date={MONDAY}");
    let (status, body) = get!(app, &uri);
    assert_eq!(status, 200);
    assert_eq!(body["open_time"], json!("09:00:00"));
    assert_eq!(body["day_of_week"], json!(1));
    assert_eq!(body["step_minutes"], json!(10));

    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0]["label"], json!("09:00"));
    assert_eq!(slots[15]["label"], json!("11:30"));
}

#[actix_web::test]
async fn a_booking_removes_every_overlapping_slot() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    seed_hours(&state, "s1", 1, "09:00:00", "12:00:00", false).await;
    let app = app!(state);

    let (status, body) = post!(
        app,
        "/api/bookings",
        json!({
            "shopId": "s1",
            "serviceId": "v1",
            "firstName": "Ava",
            "lastName": "Stone",
            "phone": "0400000001",
            "startAt": "2024-06-03T10:00:00Z",
        })
    );
    assert_eq!(status, 200, "booking failed: {body}");
    assert_eq!(body["booking"]["status"], json!("booked"));

    let uri = format!("/api/availability?shopId=s1&serviceId=v1&date={MONDAY}");
    let (_, body) = get!(app, &uri);
    let labels: Vec<&str> = body["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();

    assert_eq!(labels.len(), 11);
    assert!(labels.contains(&"09:30"));
    assert!(labels.contains(&"10:30"));
    for taken in ["09:40", "09:50", "10:00", "10:10", "10:20"] {
        assert!(!labels.contains(&taken), "{taken} should be excluded");
    }
}

#[actix_web::test]
async fn conflicting_booking_is_rejected_at_write_time() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    seed_hours(&state, "s1", 1, "09:00:00", "18:00:00", false).await;
    let app = app!(state);

    let payload = |phone: &str, start: &str| {
        json!({
            "shopId": "s1",
            "serviceId": "v1",
            "firstName": "Ava",
            "lastName": "Stone",
            "phone": phone,
            "startAt": start,
        })
    };

    let (status, _) = post!(app, "/api/bookings", payload("0400000001", "2024-06-03T10:00:00Z"));
    assert_eq!(status, 200);

    // Same interval, different customer: the store's trigger must refuse it.
    let (status, body) = post!(app, "/api/bookings", payload("0400000002", "2024-06-03T10:10:00Z"));
    assert_eq!(status, 409);
    assert!(body["error"].as_str().unwrap().contains("overlap"));

    // Touching interval right after is fine.
    let (status, _) = post!(app, "/api/bookings", payload("0400000003", "2024-06-03T10:30:00Z"));
    assert_eq!(status, 200);
}

#[actix_web::test]
async fn queue_etas_run_as_a_prefix_sum() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v20", "s1", "Beard Trim", 20).await;
    seed_service(&state, "v15", "s1", "Buzz Cut", 15).await;
    seed_service(&state, "v0", "s1", "Consult", 0).await;
    let app = app!(state);

    for (service, phone, first, last) in [
        ("v20", "0400000001", "Ava", "Stone"),
        ("v15", "0400000002", "Ben", "Reed"),
        ("v0", "0400000003", "Cal", "Hart"),
    ] {
        let (status, _) = post!(
            app,
            "/api/join-queue",
            json!({
                "shopId": "s1",
                "serviceId": service,
                "firstName": first,
                "lastName": last,
                "phone": phone,
            })
        );
        assert_eq!(status, 200);
    }

    // First customer checks in at the kiosk, case-insensitive last name.
    let (status, _) = post!(
        app,
        "/api/kiosk-checkin",
        json!({ "shopId": "s1", "lastName": "stone", "phone": "0400000001" })
    );
    assert_eq!(status, 200);

    let (status, body) = get!(app, "/api/tv?shopId=s1");
    assert_eq!(status, 200);
    let queue = body["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 3);
    let etas: Vec<i64> = queue.iter().map(|q| q["eta_minutes"].as_i64().unwrap()).collect();
    assert_eq!(etas, vec![0, 20, 35]);
    assert_eq!(queue[0]["status"], json!("arrived"));
    assert_eq!(queue[1]["status"], json!("queued"));

    let (status, body) = get!(app, "/api/admin/dashboard?shopId=s1");
    assert_eq!(status, 200);
    assert_eq!(body["stats"]["total_active"], json!(3));
    assert_eq!(body["stats"]["queued"], json!(2));
    assert_eq!(body["stats"]["arrived"], json!(1));
    assert_eq!(body["stats"]["avg_eta_minutes"], json!(18));
}

#[actix_web::test]
async fn empty_queue_dashboard_is_all_zero() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    let app = app!(state);

    let (status, body) = get!(app, "/api/admin/dashboard?shopId=s1");
    assert_eq!(status, 200);
    assert_eq!(body["stats"]["total_active"], json!(0));
    assert_eq!(body["stats"]["avg_eta_minutes"], json!(0));
}

#[actix_web::test]
async fn kiosk_checkin_guards_identity_and_queue_state() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    let app = app!(state);

    // Unknown phone.
    let (status, _) = post!(
        app,
        "/api/kiosk-checkin",
        json!({ "shopId": "s1", "lastName": "Stone", "phone": "0400000009" })
    );
    assert_eq!(status, 404);

    let (_, body) = post!(
        app,
        "/api/join-queue",
        json!({
            "shopId": "s1",
            "serviceId": "v1",
            "firstName": "Ava",
            "lastName": "Stone",
            "phone": "0400000001",
        })
    );
    assert_eq!(body["ok"], json!(true));

    // Wrong last name.
    let (status, _) = post!(
        app,
        "/api/kiosk-checkin",
        json!({ "shopId": "s1", "lastName": "Reed", "phone": "0400000001" })
    );
    assert_eq!(status, 401);

    // Correct, then a second check-in finds nothing queued.
    let (status, _) = post!(
        app,
        "/api/kiosk-checkin",
        json!({ "shopId": "s1", "lastName": "Stone", "phone": "0400000001" })
    );
    assert_eq!(status, 200);
    let (status, _) = post!(
        app,
        "/api/kiosk-checkin",
        json!({ "shopId": "s1", "lastName": "Stone", "phone": "0400000001" })
    );
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn tv_snapshot_for_unknown_shop_degrades_to_defaults() {
    let state = setup().await;
    let app = app!(state);

    // The display keeps polling even when the shop id is wrong; it gets the
    // default layout and empty lists instead of an error.
    let (status, body) = get!(app, "/api/tv?shopId=ghost");
    assert_eq!(status, 200);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["tv_left_percent"], json!(70));
    assert_eq!(body["tv_ad_rotation_seconds"], json!(10));
    assert_eq!(body["queue"].as_array().unwrap().len(), 0);
    assert_eq!(body["bookings"].as_array().unwrap().len(), 0);
    assert_eq!(body["ads"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn unknown_service_falls_back_to_twenty_minutes() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_hours(&state, "s1", 1, "09:00:00", "10:00:00", false).await;
    let app = app!(state);

    // 09:00-10:00 with the 20 min fallback: 09:00 .. 09:40.
    let uri = format!("/api/availability?shopId=s1&serviceId=ghost&date={MONDAY}");
    let (status, body) = get!(app, &uri);
    assert_eq!(status, 200);
    assert_eq!(body["service"]["duration_minutes"], json!(20));
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 5);
    assert_eq!(slots[0]["label"], json!("09:00"));
    assert_eq!(slots[4]["label"], json!("09:40"));
}

#[actix_web::test]
async fn zero_duration_service_books_a_twenty_minute_interval() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v0", "s1", "Consult", 0).await;
    seed_hours(&state, "s1", 1, "09:00:00", "18:00:00", false).await;
    let app = app!(state);

    let (status, body) = post!(
        app,
        "/api/bookings",
        json!({
            "shopId": "s1",
            "serviceId": "v0",
            "firstName": "Ava",
            "lastName": "Stone",
            "phone": "0400000001",
            "startAt": "2024-06-03T10:00:00Z",
        })
    );
    assert_eq!(status, 200, "booking failed: {body}");
    assert_eq!(body["booking"]["start_at"], json!("2024-06-03T10:00:00+00:00"));
    assert_eq!(body["booking"]["end_at"], json!("2024-06-03T10:20:00+00:00"));
}

#[actix_web::test]
async fn tv_settings_are_clamped_on_write_and_read() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    // Pre-existing out-of-range row must not leak through a read.
    sqlx::query("UPDATE shops SET tv_left_percent = 95, tv_ad_rotation_seconds = 1 WHERE id = 's1'")
        .execute(&state.db)
        .await
        .unwrap();
    let app = app!(state);

    let (status, body) = get!(app, "/api/admin/tv-settings?shopId=s1");
    assert_eq!(status, 200);
    assert_eq!(body["tv_left_percent"], json!(90));
    assert_eq!(body["tv_ad_rotation_seconds"], json!(3));

    let (status, body) = patch!(
        app,
        "/api/admin/tv-settings",
        json!({ "shopId": "s1", "tv_left_percent": 5, "tv_ad_rotation_seconds": 500 })
    );
    assert_eq!(status, 200);
    assert_eq!(body["tv_left_percent"], json!(30));
    assert_eq!(body["tv_ad_rotation_seconds"], json!(60));

    let (_, body) = get!(app, "/api/tv?shopId=s1");
    assert_eq!(body["tv_left_percent"], json!(30));
    assert_eq!(body["tv_ad_rotation_seconds"], json!(60));

    // Writing settings for a shop that does not exist is an error, not a
    // silent no-op.
    let (status, _) = patch!(
        app,
        "/api/admin/tv-settings",
        json!({ "shopId": "ghost", "tv_left_percent": 50, "tv_ad_rotation_seconds": 10 })
    );
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn service_and_ad_management_round_trip() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    let app = app!(state);

    let (status, body) = post!(
        app,
        "/api/admin/services",
        json!({ "shopId": "s1", "name": "Haircut", "duration_minutes": 30, "price": 35.0 })
    );
    assert_eq!(status, 200);
    let service_id = body["service"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["service"]["is_active"], json!(true));

    let (status, _) = post!(
        app,
        "/api/admin/services",
        json!({ "shopId": "s1", "name": "", "duration_minutes": 30, "price": 35.0 })
    );
    assert_eq!(status, 400);

    let (status, body) = patch!(
        app,
        "/api/admin/services",
        json!({ "id": service_id, "is_active": false, "duration_minutes": 45 })
    );
    assert_eq!(status, 200);
    assert_eq!(body["service"]["is_active"], json!(false));
    assert_eq!(body["service"]["duration_minutes"], json!(45));

    let (status, body) = post!(
        app,
        "/api/admin/ads",
        json!({ "shopId": "s1", "title": "Winter special" })
    );
    assert_eq!(status, 200);
    let ad_id = body["ad"]["id"].as_str().unwrap().to_string();

    let (status, _) = post!(app, "/api/admin/ads", json!({ "shopId": "s1" }));
    assert_eq!(status, 400);

    let (status, body) = patch!(
        app,
        "/api/admin/ads",
        json!({ "id": ad_id, "is_active": false })
    );
    assert_eq!(status, 200);
    assert_eq!(body["ad"]["is_active"], json!(false));

    // Inactive ads disappear from the TV rotation.
    let (_, body) = get!(app, "/api/tv?shopId=s1");
    assert_eq!(body["ads"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn employee_login_clock_and_session_lifecycle() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    seed_employee(&state, "e1", "s1", "Sam", "4321").await;
    let app = app!(state);

    let (status, _) = post!(app, "/api/employee/login", json!({ "shopId": "s1", "pin": "9999" }));
    assert_eq!(status, 401);

    let (status, body) = post!(app, "/api/employee/login", json!({ "shopId": "s1", "pin": "4321" }));
    assert_eq!(status, 200);
    assert_eq!(body["employee"]["id"], json!("e1"));
    assert_eq!(body["clockedIn"], json!(false));

    let (status, _) = post!(
        app,
        "/api/employee/clock-in",
        json!({ "shopId": "s1", "employeeId": "e1" })
    );
    assert_eq!(status, 200);
    let (status, _) = post!(
        app,
        "/api/employee/clock-in",
        json!({ "shopId": "s1", "employeeId": "e1" })
    );
    assert_eq!(status, 409);

    let (_, body) = post!(app, "/api/employee/login", json!({ "shopId": "s1", "pin": "4321" }));
    assert_eq!(body["clockedIn"], json!(true));

    // Take a customer through a full service.
    let (_, body) = post!(
        app,
        "/api/join-queue",
        json!({
            "shopId": "s1",
            "serviceId": "v1",
            "firstName": "Ava",
            "lastName": "Stone",
            "phone": "0400000001",
        })
    );
    let entry_id = body["queueEntryId"].as_str().unwrap().to_string();

    let (status, _) = post!(
        app,
        "/api/employee/start",
        json!({ "shopId": "s1", "employeeId": "e1", "queueEntryId": entry_id })
    );
    assert_eq!(status, 200);

    // One open session per employee.
    let (status, _) = post!(
        app,
        "/api/employee/start",
        json!({ "shopId": "s1", "employeeId": "e1", "queueEntryId": "whatever" })
    );
    assert_eq!(status, 409);

    let (status, _) = post!(
        app,
        "/api/employee/finish",
        json!({ "shopId": "s1", "employeeId": "e1" })
    );
    assert_eq!(status, 200);

    // The completed entry leaves the active queue.
    let (_, body) = get!(app, "/api/tv?shopId=s1");
    assert_eq!(body["queue"].as_array().unwrap().len(), 0);

    let (status, _) = post!(
        app,
        "/api/employee/clock-out",
        json!({ "shopId": "s1", "employeeId": "e1" })
    );
    assert_eq!(status, 200);
}

#[actix_web::test]
async fn employee_work_snapshot_lists_queue_and_day_bookings() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    seed_hours(&state, "s1", 1, "09:00:00", "18:00:00", false).await;
    let app = app!(state);

    let (status, _) = post!(
        app,
        "/api/bookings",
        json!({
            "shopId": "s1",
            "serviceId": "v1",
            "firstName": "Ben",
            "lastName": "Reed",
            "phone": "0400000002",
            "startAt": "2024-06-03T14:00:00Z",
        })
    );
    assert_eq!(status, 200);

    let (status, _) = post!(
        app,
        "/api/join-queue",
        json!({
            "shopId": "s1",
            "serviceId": "v1",
            "firstName": "Ava",
            "lastName": "Stone",
            "phone": "0400000001",
        })
    );
    assert_eq!(status, 200);

    let uri = format!("/api/employee/work?shopId=s1&date={MONDAY}");
    let (status, body) = get!(app, &uri);
    assert_eq!(status, 200);
    assert_eq!(body["queue"].as_array().unwrap().len(), 1);
    assert_eq!(body["queue"][0]["eta_minutes"], json!(0));
    let bookings = body["bookings"].as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["customer"]["first_name"], json!("Ben"));

    // A different day sees no bookings.
    let (_, body) = get!(app, "/api/employee/work?shopId=s1&date=2024-06-04");
    assert_eq!(body["bookings"].as_array().unwrap().len(), 0);

    let (status, _) = get!(app, "/api/employee/work?shopId=s1&date=junk");
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn shop_lookup_reports_missing_shops() {
    let state = setup().await;
    seed_shop(&state, "s1", "Fade District").await;
    seed_service(&state, "v1", "s1", "Haircut", 30).await;
    seed_service(&state, "v2", "s1", "Beard Trim", 20).await;
    let app = app!(state);

    let (status, _) = get!(app, "/api/shop?id=nope");
    assert_eq!(status, 404);

    let (status, body) = get!(app, "/api/shop?id=s1");
    assert_eq!(status, 200);
    assert_eq!(body["shop"]["name"], json!("Fade District"));
    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 2);
    // Ordered by duration ascending.
    assert_eq!(services[0]["name"], json!("Beard Trim"));
}
