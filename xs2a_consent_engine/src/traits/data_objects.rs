use crate::db_types::{
    Authorisation,
    AuthorisationId,
    Consent,
    ConsentId,
    ConsentStatus,
    Payment,
    PaymentId,
    PsuIdData,
    ScaApproach,
    ScaStatus,
    TransactionStatus,
};

/// Everything that changes as the result of a single authorisation step. It is applied in one transaction.
#[derive(Debug, Clone)]
pub struct AuthorisationCommit {
    pub authorisation_id: AuthorisationId,
    /// The status the authorisation had when the step started. The commit fails if it has changed since.
    pub expected_status: ScaStatus,
    pub new_status: ScaStatus,
    pub sca_approach: ScaApproach,
    pub authentication_method_id: Option<String>,
    pub psu_data: Option<PsuIdData>,
    pub business_update: Option<BusinessObjectUpdate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusinessObjectUpdate {
    Consent {
        consent_id: ConsentId,
        status: Option<ConsentStatus>,
        multilevel_sca_required: Option<bool>,
        /// Retire older consents of the same TPP and PSUs if this consent ends up valid
        terminate_superseded: bool,
    },
    Payment {
        payment_id: PaymentId,
        status: Option<TransactionStatus>,
        multilevel_sca_required: Option<bool>,
    },
}

#[derive(Debug, Clone)]
pub struct ConsentStatusChange {
    pub consent: Consent,
    pub old_status: ConsentStatus,
}

#[derive(Debug, Clone)]
pub struct PaymentStatusChange {
    pub payment: Payment,
    pub old_status: TransactionStatus,
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub authorisation: Authorisation,
    pub old_sca_status: ScaStatus,
    /// The owning consent (if its status changed) followed by any consents it superseded
    pub consent_changes: Vec<ConsentStatusChange>,
    pub payment_change: Option<PaymentStatusChange>,
}
