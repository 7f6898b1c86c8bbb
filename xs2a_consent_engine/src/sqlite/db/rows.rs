//! Row mappings. Enums are stored as their wire text and structured values as JSON text.
use std::str::FromStr;

use serde::de::DeserializeOwned;
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::db_types::{
    Authorisation,
    ChecksumValue,
    Consent,
    ConsentAction,
    ConversionError,
    Payment,
    PsuIdData,
};

fn text_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where T: FromStr<Err = ConversionError> {
    let value: String = row.try_get(column)?;
    value.parse().map_err(|e: ConversionError| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let value: String = row.try_get(column)?;
    serde_json::from_str(&value)
        .map_err(|e| sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) })
}

impl<'r> FromRow<'r, SqliteRow> for Consent {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            consent_id: row.try_get::<String, _>("consent_id")?.into(),
            consent_type: text_column(row, "consent_type")?,
            request_type: text_column(row, "request_type")?,
            status: text_column(row, "status")?,
            tpp_id: row.try_get::<String, _>("tpp_id")?.into(),
            psu_data: json_column(row, "psu_data")?,
            tpp_access: json_column(row, "tpp_access")?,
            aspsp_access: json_column(row, "aspsp_access")?,
            recurring_indicator: row.try_get("recurring_indicator")?,
            combined_service_indicator: row.try_get("combined_service_indicator")?,
            frequency_per_day: row.try_get("frequency_per_day")?,
            valid_until: row.try_get("valid_until")?,
            expire_date: row.try_get("expire_date")?,
            last_action_date: row.try_get("last_action_date")?,
            multilevel_sca_required: row.try_get("multilevel_sca_required")?,
            created_at: row.try_get("created_at")?,
            status_changed_at: row.try_get("status_changed_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Payment {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            payment_id: row.try_get::<String, _>("payment_id")?.into(),
            payment_type: text_column(row, "payment_type")?,
            payment_product: row.try_get("payment_product")?,
            transaction_status: text_column(row, "transaction_status")?,
            tpp_id: row.try_get::<String, _>("tpp_id")?.into(),
            psu_data: json_column(row, "psu_data")?,
            multilevel_sca_required: row.try_get("multilevel_sca_required")?,
            created_at: row.try_get("created_at")?,
            status_changed_at: row.try_get("status_changed_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Authorisation {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let psu_data = match row.try_get::<Option<String>, _>("psu_data")? {
            Some(json) => Some(serde_json::from_str::<PsuIdData>(&json).map_err(|e| sqlx::Error::ColumnDecode {
                index: "psu_data".to_string(),
                source: Box::new(e),
            })?),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            authorisation_id: row.try_get::<String, _>("authorisation_id")?.into(),
            parent_id: row.try_get("parent_id")?,
            authorisation_type: text_column(row, "authorisation_type")?,
            sca_status: text_column(row, "sca_status")?,
            sca_approach: text_column(row, "sca_approach")?,
            authentication_method_id: row.try_get("authentication_method_id")?,
            psu_data,
            redirect_uri: row.try_get("redirect_uri")?,
            nok_redirect_uri: row.try_get("nok_redirect_uri")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for ConsentAction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            consent_id: row.try_get::<String, _>("consent_id")?.into(),
            tpp_id: row.try_get::<String, _>("tpp_id")?.into(),
            action_status: text_column(row, "action_status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for ChecksumValue {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            consent_id: row.try_get::<String, _>("consent_id")?.into(),
            checksum_type: text_column(row, "checksum_type")?,
            digest: row.try_get("digest")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
