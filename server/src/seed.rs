//! Fixture data for local runs.

use anyhow::{Context, Result};
use chrono::{Duration, SecondsFormat, Utc};
use platform_authz::subjects::{QRCODES, RESERVATIONS, ROOMS, SEAT_STATUS, USERS};
use platform_db::MemoryStore;
use serde_json::json;
use tracing::info;
use uuid::{Uuid, uuid};

pub const ADMIN_ID: Uuid = uuid!("6f1c2a52-8d0e-4f1b-9a57-0c3d9e1b7a10");
pub const MEMBER_ID: Uuid = uuid!("b2e4d7a9-3c61-4e8f-a2d5-7f90c1e3b846");

/// Fields of a `users` record.
pub const USER_FIELDS: [&str; 5] = ["id", "uid", "name", "email", "admin"];

pub async fn load(store: &MemoryStore) -> Result<()> {
    let stamp = |age: Duration| (Utc::now() - age).to_rfc3339_opts(SecondsFormat::Millis, true);

    let fixtures = [
        (ROOMS, json!({"id": "library", "name": "Library", "seats": 40})),
        (ROOMS, json!({"id": "lab", "name": "Computer Lab", "seats": 24})),
        (SEAT_STATUS, json!({"id": "library-1", "roomId": "library", "occupied": false})),
        (QRCODES, json!({"id": "qr-library-1", "seatId": "library-1"})),
        (USERS, json!({"id": ADMIN_ID.to_string(), "uid": "admin", "name": "Admin", "email": "admin@example.org", "admin": true})),
        (USERS, json!({"id": MEMBER_ID.to_string(), "uid": "member", "name": "Member", "email": "member@example.org", "admin": false})),
        (RESERVATIONS, json!({
            "id": "fresh",
            "userId": MEMBER_ID.to_string(),
            "seatId": "library-1",
            "confirmed": false,
            "expired": false,
            "createdAt": stamp(Duration::minutes(1)),
        })),
        (RESERVATIONS, json!({
            "id": "confirmed",
            "userId": MEMBER_ID.to_string(),
            "seatId": "library-1",
            "confirmed": true,
            "expired": false,
            "createdAt": stamp(Duration::hours(2)),
        })),
        (RESERVATIONS, json!({
            "id": "archived",
            "userId": ADMIN_ID.to_string(),
            "seatId": "lab-3",
            "confirmed": true,
            "expired": true,
            "createdAt": stamp(Duration::days(3)),
        })),
    ];

    let count = fixtures.len();
    for (service, record) in fixtures {
        store
            .insert(service, record)
            .await
            .with_context(|| format!("seeding {service}"))?;
    }
    info!(records = count, "fixtures loaded");
    Ok(())
}
