use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{ActionStatus, ConsentAction, ConsentId, TppId};

pub async fn insert_consent_action(
    consent_id: &ConsentId,
    tpp_id: &TppId,
    status: ActionStatus,
    conn: &mut SqliteConnection,
) -> Result<ConsentAction, sqlx::Error> {
    let action = sqlx::query_as(
        "INSERT INTO consent_actions (consent_id, tpp_id, action_status, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(consent_id.as_str())
    .bind(tpp_id.as_str())
    .bind(status.as_str())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(action)
}

pub async fn fetch_consent_actions(
    consent_id: &ConsentId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ConsentAction>, sqlx::Error> {
    let actions = sqlx::query_as("SELECT * FROM consent_actions WHERE consent_id = $1 ORDER BY id ASC")
        .bind(consent_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(actions)
}
