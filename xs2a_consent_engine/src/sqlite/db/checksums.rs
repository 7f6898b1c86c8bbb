use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{ChecksumType, ChecksumValue, ConsentId};

pub async fn fetch_checksum(
    consent_id: &ConsentId,
    checksum_type: ChecksumType,
    conn: &mut SqliteConnection,
) -> Result<Option<ChecksumValue>, sqlx::Error> {
    let value = sqlx::query_as("SELECT * FROM consent_checksums WHERE consent_id = $1 AND checksum_type = $2")
        .bind(consent_id.as_str())
        .bind(checksum_type.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(value)
}

pub async fn fetch_checksums(consent_id: &ConsentId, conn: &mut SqliteConnection) -> Result<Vec<ChecksumValue>, sqlx::Error> {
    let values = sqlx::query_as("SELECT * FROM consent_checksums WHERE consent_id = $1 ORDER BY checksum_type")
        .bind(consent_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(values)
}

/// Unconditionally writes the digest. Callers are responsible for the write-once rule.
pub async fn upsert_checksum(
    consent_id: &ConsentId,
    checksum_type: ChecksumType,
    digest: &[u8],
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO consent_checksums (consent_id, checksum_type, digest, updated_at) VALUES ($1, $2, $3, $4)
        ON CONFLICT (consent_id, checksum_type) DO UPDATE SET digest = excluded.digest, updated_at = excluded.updated_at
        "#,
    )
    .bind(consent_id.as_str())
    .bind(checksum_type.as_str())
    .bind(digest)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}
