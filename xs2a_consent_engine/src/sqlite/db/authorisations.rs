use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Authorisation, AuthorisationId, AuthorisationType, NewAuthorisation, PsuIdData, ScaApproach, ScaStatus},
    traits::ConsentDatabaseError,
};

pub async fn insert_authorisation(
    authorisation: NewAuthorisation,
    conn: &mut SqliteConnection,
) -> Result<Authorisation, ConsentDatabaseError> {
    let psu_data = authorisation.psu_data.as_ref().map(serde_json::to_string).transpose()?;
    let authorisation: Authorisation = sqlx::query_as(
        r#"
            INSERT INTO authorisations (
                authorisation_id,
                parent_id,
                authorisation_type,
                sca_status,
                sca_approach,
                psu_data,
                redirect_uri,
                nok_redirect_uri,
                created_at,
                updated_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(authorisation.authorisation_id.as_str())
    .bind(authorisation.parent_id)
    .bind(authorisation.authorisation_type.as_str())
    .bind(ScaStatus::Received.as_str())
    .bind(authorisation.sca_approach.as_str())
    .bind(psu_data)
    .bind(authorisation.redirect_uri)
    .bind(authorisation.nok_redirect_uri)
    .bind(authorisation.created_at)
    .bind(authorisation.expires_at)
    .fetch_one(conn)
    .await?;
    debug!(
        "🗃️ {} authorisation [{}] for {} inserted",
        authorisation.authorisation_type, authorisation.authorisation_id, authorisation.parent_id
    );
    Ok(authorisation)
}

pub async fn fetch_authorisation(
    authorisation_id: &AuthorisationId,
    conn: &mut SqliteConnection,
) -> Result<Option<Authorisation>, sqlx::Error> {
    let authorisation = sqlx::query_as("SELECT * FROM authorisations WHERE authorisation_id = $1")
        .bind(authorisation_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(authorisation)
}

pub async fn fetch_authorisations_for_parent(
    parent_id: &str,
    authorisation_type: AuthorisationType,
    conn: &mut SqliteConnection,
) -> Result<Vec<Authorisation>, sqlx::Error> {
    let authorisations = sqlx::query_as(
        "SELECT * FROM authorisations WHERE parent_id = $1 AND authorisation_type = $2 ORDER BY id ASC",
    )
    .bind(parent_id)
    .bind(authorisation_type.as_str())
    .fetch_all(conn)
    .await?;
    Ok(authorisations)
}

/// Compare-and-set on the SCA status. The row is only updated if it is still in `expected`.
///
/// Returns `None` if the authorisation does not exist or has moved on since it was read.
pub async fn update_if_status(
    authorisation_id: &AuthorisationId,
    expected: ScaStatus,
    new_status: ScaStatus,
    sca_approach: ScaApproach,
    authentication_method_id: Option<&str>,
    psu_data: Option<&PsuIdData>,
    conn: &mut SqliteConnection,
) -> Result<Option<Authorisation>, ConsentDatabaseError> {
    let psu_data = psu_data.map(serde_json::to_string).transpose()?;
    let authorisation = sqlx::query_as(
        r#"
        UPDATE authorisations SET
            sca_status = $1,
            sca_approach = $2,
            authentication_method_id = COALESCE($3, authentication_method_id),
            psu_data = COALESCE($4, psu_data),
            updated_at = $5
        WHERE authorisation_id = $6 AND sca_status = $7
        RETURNING *
        "#,
    )
    .bind(new_status.as_str())
    .bind(sca_approach.as_str())
    .bind(authentication_method_id)
    .bind(psu_data)
    .bind(Utc::now())
    .bind(authorisation_id.as_str())
    .bind(expected.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(authorisation)
}

/// Moves every non-finalised authorisation of the given types under `parent_id` to `failed`.
/// Returns the number of authorisations that were changed.
pub async fn fail_open_authorisations(
    parent_id: &str,
    types: &[AuthorisationType],
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let mut affected = 0;
    for authorisation_type in types {
        let result = sqlx::query(
            r#"
            UPDATE authorisations SET sca_status = $1, updated_at = $2
            WHERE parent_id = $3
              AND authorisation_type = $4
              AND sca_status NOT IN ('finalised', 'failed', 'exempted')
            "#,
        )
        .bind(ScaStatus::Failed.as_str())
        .bind(Utc::now())
        .bind(parent_id)
        .bind(authorisation_type.as_str())
        .execute(&mut *conn)
        .await?;
        affected += result.rows_affected();
    }
    if affected > 0 {
        debug!("🗃️ {affected} open authorisations for {parent_id} marked as failed");
    }
    Ok(affected)
}
