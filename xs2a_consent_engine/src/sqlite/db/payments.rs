use chrono::Utc;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, Payment, PaymentId, TransactionStatus},
    traits::ConsentDatabaseError,
};

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, ConsentDatabaseError> {
    let psu_data = serde_json::to_string(&payment.psu_data)?;
    let payment: Payment = sqlx::query_as(
        r#"
            INSERT INTO payments (
                payment_id,
                payment_type,
                payment_product,
                transaction_status,
                tpp_id,
                psu_data,
                created_at,
                status_changed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(payment.payment_id.as_str())
    .bind(payment.payment_type.as_str())
    .bind(payment.payment_product)
    .bind(TransactionStatus::Rcvd.as_str())
    .bind(payment.tpp_id.as_str())
    .bind(psu_data)
    .bind(payment.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment [{}] inserted with id {}", payment.payment_id, payment.id);
    Ok(payment)
}

pub async fn fetch_payment(payment_id: &PaymentId, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE payment_id = $1")
        .bind(payment_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn update_status(
    payment_id: &PaymentId,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<Payment, ConsentDatabaseError> {
    let payment: Option<Payment> = sqlx::query_as(
        "UPDATE payments SET transaction_status = $1, status_changed_at = $2 WHERE payment_id = $3 RETURNING *",
    )
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(payment_id.as_str())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Payment [{payment_id}] status set to {status}");
    payment.ok_or_else(|| ConsentDatabaseError::PaymentNotFound(payment_id.clone()))
}

/// Raises the multilevel SCA flag. Returns `false` if it was already set.
pub async fn set_multilevel_sca_required(payment_id: &PaymentId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET multilevel_sca_required = TRUE WHERE payment_id = $1 AND multilevel_sca_required = FALSE",
    )
    .bind(payment_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
