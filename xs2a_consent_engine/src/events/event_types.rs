use crate::{
    db_types::{Authorisation, Consent, ConsentStatus, Payment, ScaStatus, TransactionStatus},
    traits::{ConsentStatusChange, PaymentStatusChange},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentStatusChangedEvent {
    pub consent: Consent,
    pub old_status: ConsentStatus,
}

impl ConsentStatusChangedEvent {
    pub fn new(consent: Consent, old_status: ConsentStatus) -> Self {
        Self { consent, old_status }
    }

    pub fn new_status(&self) -> ConsentStatus {
        self.consent.status
    }
}

impl From<ConsentStatusChange> for ConsentStatusChangedEvent {
    fn from(change: ConsentStatusChange) -> Self {
        Self::new(change.consent, change.old_status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaStatusChangedEvent {
    pub authorisation: Authorisation,
    pub old_status: ScaStatus,
}

impl ScaStatusChangedEvent {
    pub fn new(authorisation: Authorisation, old_status: ScaStatus) -> Self {
        Self { authorisation, old_status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatusChangedEvent {
    pub payment: Payment,
    pub old_status: TransactionStatus,
}

impl PaymentStatusChangedEvent {
    pub fn new(payment: Payment, old_status: TransactionStatus) -> Self {
        Self { payment, old_status }
    }
}

impl From<PaymentStatusChange> for PaymentStatusChangedEvent {
    fn from(change: PaymentStatusChange) -> Self {
        Self::new(change.payment, change.old_status)
    }
}
