use chrono::NaiveDate;
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::ConsentId;

/// Increments the usage counter for the day and returns the new daily count.
pub async fn record_usage(
    consent_id: &ConsentId,
    resource_id: &str,
    date: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let usage: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO consent_usage (consent_id, resource_id, usage_date, usage) VALUES ($1, $2, $3, 1)
        ON CONFLICT (consent_id, resource_id, usage_date) DO UPDATE SET usage = usage + 1
        RETURNING usage
        "#,
    )
    .bind(consent_id.as_str())
    .bind(resource_id)
    .bind(date)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Consent [{consent_id}] used for {resource_id} {usage} times on {date}");
    Ok(usage)
}

pub async fn usage_count(consent_id: &ConsentId, resource_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(usage), 0) FROM consent_usage WHERE consent_id = $1 AND resource_id = $2",
    )
    .bind(consent_id.as_str())
    .bind(resource_id)
    .fetch_one(conn)
    .await?;
    Ok(total)
}

pub async fn usage_count_on(
    consent_id: &ConsentId,
    resource_id: &str,
    date: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let usage: Option<i64> = sqlx::query_scalar(
        "SELECT usage FROM consent_usage WHERE consent_id = $1 AND resource_id = $2 AND usage_date = $3",
    )
    .bind(consent_id.as_str())
    .bind(resource_id)
    .bind(date)
    .fetch_optional(conn)
    .await?;
    Ok(usage.unwrap_or(0))
}

pub async fn save_number_of_transactions(
    consent_id: &ConsentId,
    resource_id: &str,
    number_of_transactions: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO consent_transactions (consent_id, resource_id, number_of_transactions) VALUES ($1, $2, $3)
        ON CONFLICT (consent_id, resource_id) DO UPDATE SET number_of_transactions = excluded.number_of_transactions
        "#,
    )
    .bind(consent_id.as_str())
    .bind(resource_id)
    .bind(number_of_transactions)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn number_of_transactions(
    consent_id: &ConsentId,
    resource_id: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let n: Option<i64> = sqlx::query_scalar(
        "SELECT number_of_transactions FROM consent_transactions WHERE consent_id = $1 AND resource_id = $2",
    )
    .bind(consent_id.as_str())
    .bind(resource_id)
    .fetch_optional(conn)
    .await?;
    Ok(n.unwrap_or(0))
}
