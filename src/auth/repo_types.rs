use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                   // assigned by the store, never reused
    pub email: String,              // login name and token subject
    pub password_hash: String,      // Argon2 PHC string, never leaves the service
    pub is_active: bool,            // reserved, not checked at login
    pub created_at: OffsetDateTime, // set once on insert
}
