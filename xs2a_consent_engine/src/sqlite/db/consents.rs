use chrono::{NaiveDate, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{AccountAccess, Consent, ConsentId, ConsentStatus, NewConsent, TppId},
    traits::ConsentDatabaseError,
};

/// Inserts a new consent in `received` status. This is not atomic on its own; pass `&mut *tx` to embed it in a
/// transaction.
pub async fn insert_consent(consent: NewConsent, conn: &mut SqliteConnection) -> Result<Consent, ConsentDatabaseError> {
    let psu_data = serde_json::to_string(&consent.psu_data)?;
    let tpp_access = serde_json::to_string(&consent.tpp_access)?;
    let aspsp_access = serde_json::to_string(&consent.aspsp_access)?;
    let consent: Consent = sqlx::query_as(
        r#"
            INSERT INTO consents (
                consent_id,
                consent_type,
                request_type,
                status,
                tpp_id,
                psu_data,
                tpp_access,
                aspsp_access,
                recurring_indicator,
                combined_service_indicator,
                frequency_per_day,
                valid_until,
                created_at,
                status_changed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(consent.consent_id.as_str())
    .bind(consent.consent_type.as_str())
    .bind(consent.request_type.as_str())
    .bind(ConsentStatus::Received.as_str())
    .bind(consent.tpp_id.as_str())
    .bind(psu_data)
    .bind(tpp_access)
    .bind(aspsp_access)
    .bind(consent.recurring_indicator)
    .bind(consent.combined_service_indicator)
    .bind(consent.frequency_per_day)
    .bind(consent.valid_until)
    .bind(consent.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Consent [{}] inserted with id {}", consent.consent_id, consent.id);
    Ok(consent)
}

pub async fn fetch_consent(
    consent_id: &ConsentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Consent>, sqlx::Error> {
    let consent = sqlx::query_as("SELECT * FROM consents WHERE consent_id = $1")
        .bind(consent_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(consent)
}

pub async fn fetch_consents_for_tpp(tpp_id: &TppId, conn: &mut SqliteConnection) -> Result<Vec<Consent>, sqlx::Error> {
    let consents = sqlx::query_as("SELECT * FROM consents WHERE tpp_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(tpp_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(consents)
}

/// Changes the consent status and stamps `status_changed_at`. No transition rules are checked here.
pub async fn update_status(
    consent_id: &ConsentId,
    status: ConsentStatus,
    conn: &mut SqliteConnection,
) -> Result<Consent, ConsentDatabaseError> {
    let consent: Option<Consent> = sqlx::query_as(
        "UPDATE consents SET status = $1, status_changed_at = $2 WHERE consent_id = $3 RETURNING *",
    )
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(consent_id.as_str())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Consent [{consent_id}] status set to {status}");
    consent.ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))
}

/// Raises the multilevel SCA flag. Returns `false` if the flag was already set, in which case nothing is written.
pub async fn set_multilevel_sca_required(
    consent_id: &ConsentId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE consents SET multilevel_sca_required = TRUE WHERE consent_id = $1 AND multilevel_sca_required = FALSE",
    )
    .bind(consent_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_last_action_date(
    consent_id: &ConsentId,
    date: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<(), ConsentDatabaseError> {
    let result = sqlx::query("UPDATE consents SET last_action_date = $1 WHERE consent_id = $2")
        .bind(date)
        .bind(consent_id.as_str())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ConsentDatabaseError::ConsentNotFound(consent_id.clone()));
    }
    Ok(())
}

pub async fn update_aspsp_access(
    consent_id: &ConsentId,
    access: &AccountAccess,
    conn: &mut SqliteConnection,
) -> Result<Consent, ConsentDatabaseError> {
    let json = serde_json::to_string(access)?;
    let consent: Option<Consent> =
        sqlx::query_as("UPDATE consents SET aspsp_access = $1 WHERE consent_id = $2 RETURNING *")
            .bind(json)
            .bind(consent_id.as_str())
            .fetch_optional(conn)
            .await?;
    consent.ok_or_else(|| ConsentDatabaseError::ConsentNotFound(consent_id.clone()))
}

/// Finds the consents that `consent` supersedes: other recurring, non-finalised consents held by the same TPP, for
/// the same PSUs and of the same consent type.
pub async fn fetch_superseded_consents(
    consent: &Consent,
    conn: &mut SqliteConnection,
) -> Result<Vec<Consent>, sqlx::Error> {
    let candidates: Vec<Consent> = sqlx::query_as(
        r#"
        SELECT * FROM consents
        WHERE tpp_id = $1
          AND consent_type = $2
          AND consent_id <> $3
          AND recurring_indicator = TRUE
          AND status IN ('received', 'valid', 'partiallyAuthorised')
        ORDER BY id ASC
        "#,
    )
    .bind(consent.tpp_id.as_str())
    .bind(consent.consent_type.as_str())
    .bind(consent.consent_id.as_str())
    .fetch_all(conn)
    .await?;
    let superseded = candidates.into_iter().filter(|c| c.has_same_psus(consent)).collect::<Vec<Consent>>();
    Ok(superseded)
}
