use sqlx::SqlitePool;

/// Shared per-worker state. The pool is the only shared resource; every
/// request recomputes its result from a fresh snapshot, nothing is cached.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
}
