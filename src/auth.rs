use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::EmployeeRow;

pub fn hash_pin(pin: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(pin.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_pin(pin: &str, pin_hash: &str) -> bool {
    match PasswordHash::new(pin_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(pin.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Resolves an active employee of the shop whose PIN matches. PINs are
/// stored hashed, so this walks the shop's staff list and verifies each.
pub async fn authenticate_pin(pool: &SqlitePool, shop_id: &str, pin: &str) -> Option<EmployeeRow> {
    let employees = sqlx::query_as::<_, EmployeeRow>(
        r#"SELECT id, name, role, pin_hash
           FROM employees
           WHERE shop_id = ? AND is_active = 1
           ORDER BY created_at ASC"#,
    )
    .bind(shop_id)
    .fetch_all(pool)
    .await
    .ok()?;

    employees
        .into_iter()
        .find(|employee| verify_pin(pin, &employee.pin_hash))
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
