pub const QUEUE_QUEUED: &str = "queued";
pub const QUEUE_ARRIVED: &str = "arrived";
pub const QUEUE_COMPLETED: &str = "completed";

pub const BOOKING_BOOKED: &str = "booked";

pub const DEFAULT_TV_LEFT_PERCENT: i64 = 70;
pub const DEFAULT_TV_ROTATION_SECONDS: i64 = 10;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopRow {
    pub id: String,
    pub name: String,
    pub suburb: String,
    pub tv_left_percent: i64,
    pub tv_ad_rotation_seconds: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub slack_minutes: i64,
    pub price: f64,
    pub is_active: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// One active queue entry joined with its customer and service, in FIFO
/// order by created_at. Durations feed the ETA projection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveQueueRow {
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub first_name: String,
    pub last_name: String,
    pub service_name: String,
    pub duration_minutes: i64,
}

/// A booked appointment for the requested day, joined for display.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DayBookingRow {
    pub id: String,
    pub start_at: String,
    pub first_name: String,
    pub last_name: String,
    pub service_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShopHoursRow {
    pub open_time: String,
    pub close_time: String,
    pub is_closed: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmployeeRow {
    pub id: String,
    pub name: String,
    pub role: String,
    pub pin_hash: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdRow {
    pub id: String,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub is_active: i64,
    pub created_at: String,
}
