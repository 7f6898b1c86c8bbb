use chrono::Utc;
use sqlx::SqliteConnection;

pub async fn fetch_aspsp_consent_data(parent_id: &str, conn: &mut SqliteConnection) -> Result<Option<Vec<u8>>, sqlx::Error> {
    let data = sqlx::query_scalar("SELECT data FROM aspsp_consent_data WHERE parent_id = $1")
        .bind(parent_id)
        .fetch_optional(conn)
        .await?;
    Ok(data)
}

pub async fn save_aspsp_consent_data(parent_id: &str, data: &[u8], conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO aspsp_consent_data (parent_id, data, updated_at) VALUES ($1, $2, $3)
        ON CONFLICT (parent_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
        "#,
    )
    .bind(parent_id)
    .bind(data)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}
