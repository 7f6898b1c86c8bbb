//! Data types shared between the database backends and the public engine API.
//!
//! All enums are stored as text using their Berlin Group wire representation, so that the stored values are
//! directly readable by operators and by the (out of scope) HTTP layer.
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use xs2a_common::{AuthorisationId, ConsentId, PaymentId, TppId};

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("Invalid {}: {s}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------     ConsentStatus     ---------------------------------------------------------
text_enum!(
    ConsentStatus {
        Received => "received",
        Rejected => "rejected",
        Valid => "valid",
        RevokedByPsu => "revokedByPsu",
        Expired => "expired",
        TerminatedByTpp => "terminatedByTpp",
        /// At least one, but not all, of the required PSUs have authorised the consent.
        PartiallyAuthorised => "partiallyAuthorised",
    }
);

impl ConsentStatus {
    /// Finalised statuses never revert to a non-finalised status.
    pub fn is_finalised(&self) -> bool {
        matches!(self, Self::Rejected | Self::RevokedByPsu | Self::Expired | Self::TerminatedByTpp)
    }

    /// The consent has not (yet) been confirmed by every required PSU.
    pub fn is_not_confirmed(&self) -> bool {
        matches!(self, Self::Received | Self::PartiallyAuthorised)
    }
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
text_enum!(
    /// ISO 20022 transaction status codes.
    TransactionStatus {
        Accc => "ACCC",
        Accp => "ACCP",
        Acsc => "ACSC",
        Acsp => "ACSP",
        Actc => "ACTC",
        Acwc => "ACWC",
        Acwp => "ACWP",
        Acfc => "ACFC",
        Rcvd => "RCVD",
        Pdng => "PDNG",
        Rjct => "RJCT",
        Canc => "CANC",
        Patc => "PATC",
        Part => "PART",
    }
);

impl TransactionStatus {
    pub fn is_finalised(&self) -> bool {
        matches!(self, Self::Canc | Self::Rjct | Self::Acsc | Self::Accc)
    }
}

//--------------------------------------       ScaStatus       ---------------------------------------------------------
text_enum!(
    ScaStatus {
        Received => "received",
        PsuIdentified => "psuIdentified",
        PsuAuthenticated => "psuAuthenticated",
        ScaMethodSelected => "scaMethodSelected",
        /// Decoupled SCA has been started on the PSU device. Progress comes from the bank.
        Started => "started",
        /// Side state awaiting a confirmation code after the method was selected.
        Unconfirmed => "unconfirmed",
        Finalised => "finalised",
        Failed => "failed",
        Exempted => "exempted",
    }
);

impl ScaStatus {
    pub fn is_finalised(&self) -> bool {
        matches!(self, Self::Finalised | Self::Failed | Self::Exempted)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::PsuIdentified => 1,
            Self::PsuAuthenticated => 2,
            Self::ScaMethodSelected => 3,
            Self::Started | Self::Unconfirmed => 4,
            Self::Finalised | Self::Failed | Self::Exempted => 5,
        }
    }

    /// Returns true if the authorisation is allowed to move from this status to `next`.
    ///
    /// The graph only moves forward. Finalised statuses have no outgoing edges, and `Unconfirmed` can only be
    /// entered from `ScaMethodSelected`. Staying in the same status is not a transition.
    pub fn can_transition_to(&self, next: ScaStatus) -> bool {
        if self.is_finalised() || *self == next {
            return false;
        }
        match next {
            Self::Unconfirmed => *self == Self::ScaMethodSelected,
            next => next.rank() > self.rank(),
        }
    }
}

//--------------------------------------      ScaApproach      ---------------------------------------------------------
text_enum!(
    ScaApproach {
        Embedded => "EMBEDDED",
        Decoupled => "DECOUPLED",
        Redirect => "REDIRECT",
    }
);

//--------------------------------------   AuthorisationType   ---------------------------------------------------------
text_enum!(
    AuthorisationType {
        Consent => "CONSENT",
        PisCreation => "PIS_CREATION",
        PisCancellation => "PIS_CANCELLATION",
    }
);

//--------------------------------------      ConsentType      ---------------------------------------------------------
text_enum!(
    ConsentType {
        Ais => "AIS",
        Piis => "PIIS",
    }
);

//--------------------------------------  AisConsentRequestType ---------------------------------------------------------
text_enum!(
    AisConsentRequestType {
        GlobalConsent => "GLOBAL",
        AllAvailableAccounts => "ALL_AVAILABLE_ACCOUNTS",
        /// The TPP asked for access without naming accounts. The bank fills in the accounts during SCA.
        BankOffered => "BANK_OFFERED",
        DedicatedAccounts => "DEDICATED_ACCOUNTS",
    }
);

//--------------------------------------      PaymentType      ---------------------------------------------------------
text_enum!(
    PaymentType {
        Single => "SINGLE",
        Bulk => "BULK",
        Periodic => "PERIODIC",
    }
);

//--------------------------------------      ActionStatus     ---------------------------------------------------------
text_enum!(
    ActionStatus {
        Success => "SUCCESS",
        BadPayload => "BAD_PAYLOAD",
        Failure => "FAILURE",
        ConsentNotFound => "CONSENT_NOT_FOUND",
        ConsentInvalidStatus => "CONSENT_INVALID_STATUS",
        ConsentLimitExceeded => "CONSENT_LIMIT_EXCEEDED",
    }
);

//--------------------------------------     ChecksumType      ---------------------------------------------------------
text_enum!(
    /// The consent parameters protected by a checksum once PSU interaction has begun.
    ChecksumType {
        /// The access the TPP asked for
        AccountAccess => "ACCOUNT_ACCESSES",
        /// The access the bank granted
        AspspAccountAccess => "ASPSP_ACCOUNT_ACCESSES",
        FrequencyPerDay => "FREQUENCY_PER_DAY",
        ValidUntil => "VALID_UNTIL",
        RecurringIndicator => "RECURRING_INDICATOR",
        CombinedServiceIndicator => "COMBINED_SERVICE_INDICATOR",
    }
);

impl ChecksumType {
    pub const ALL: [ChecksumType; 6] = [
        ChecksumType::AccountAccess,
        ChecksumType::AspspAccountAccess,
        ChecksumType::FrequencyPerDay,
        ChecksumType::ValidUntil,
        ChecksumType::RecurringIndicator,
        ChecksumType::CombinedServiceIndicator,
    ];
}

//--------------------------------------   AccountAccessType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountAccessType {
    Accounts,
    Balances,
    Transactions,
}

//--------------------------------------    AccountReference   ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReference {
    /// The bank's opaque account identifier. Present once the ASPSP has resolved the account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl AccountReference {
    pub fn with_resource_id<S: Into<String>>(resource_id: S) -> Self {
        Self { resource_id: Some(resource_id.into()), ..Default::default() }
    }

    pub fn with_iban<S: Into<String>>(iban: S) -> Self {
        Self { iban: Some(iban.into()), ..Default::default() }
    }

    /// The key used for usage accounting: the resource id if known, otherwise the IBAN.
    pub fn key(&self) -> Option<&str> {
        self.resource_id.as_deref().or(self.iban.as_deref())
    }
}

//--------------------------------------     AccountAccess     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAccess {
    #[serde(default)]
    pub accounts: Vec<AccountReference>,
    #[serde(default)]
    pub balances: Vec<AccountReference>,
    #[serde(default)]
    pub transactions: Vec<AccountReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_accounts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_accounts_with_balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_psd2: Option<String>,
}

impl AccountAccess {
    /// True if no account references have been granted (flags are ignored).
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.balances.is_empty() && self.transactions.is_empty()
    }

    fn list(&self, access_type: AccountAccessType) -> &[AccountReference] {
        match access_type {
            AccountAccessType::Accounts => &self.accounts,
            AccountAccessType::Balances => &self.balances,
            AccountAccessType::Transactions => &self.transactions,
        }
    }

    /// Returns true if `resource_id` is granted for the given kind of access.
    pub fn grants(&self, access_type: AccountAccessType, resource_id: &str) -> bool {
        self.list(access_type).iter().any(|r| r.key() == Some(resource_id))
    }

    /// The union of all resources named in the three access lists.
    pub fn resource_ids(&self) -> BTreeSet<String> {
        self.accounts
            .iter()
            .chain(self.balances.iter())
            .chain(self.transactions.iter())
            .filter_map(|r| r.key().map(String::from))
            .collect()
    }
}

//--------------------------------------       PsuIdData       ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PsuIdData {
    pub psu_id: Option<String>,
    pub psu_id_type: Option<String>,
    pub psu_corporate_id: Option<String>,
    pub psu_corporate_id_type: Option<String>,
}

impl PsuIdData {
    pub fn new<S: Into<String>>(psu_id: S) -> Self {
        Self { psu_id: Some(psu_id.into()), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.psu_id.as_deref().map(str::is_empty).unwrap_or(true)
            && self.psu_corporate_id.as_deref().map(str::is_empty).unwrap_or(true)
    }
}

impl Display for PsuIdData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.psu_id, &self.psu_corporate_id) {
            (Some(id), Some(corp)) => write!(f, "{id} ({corp})"),
            (Some(id), None) => write!(f, "{id}"),
            (None, Some(corp)) => write!(f, "({corp})"),
            (None, None) => write!(f, "<anonymous>"),
        }
    }
}

//--------------------------------------        Consent        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consent {
    pub id: i64,
    pub consent_id: ConsentId,
    pub consent_type: ConsentType,
    pub request_type: AisConsentRequestType,
    pub status: ConsentStatus,
    pub tpp_id: TppId,
    pub psu_data: Vec<PsuIdData>,
    /// The access the TPP asked for
    pub tpp_access: AccountAccess,
    /// The access the bank actually granted
    pub aspsp_access: AccountAccess,
    pub recurring_indicator: bool,
    pub combined_service_indicator: bool,
    pub frequency_per_day: i64,
    pub valid_until: NaiveDate,
    pub expire_date: Option<NaiveDate>,
    pub last_action_date: Option<NaiveDate>,
    pub multilevel_sca_required: bool,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Consent {
    /// A one-off consent may only be used a bounded number of times per granted resource.
    pub fn is_one_off(&self) -> bool {
        !self.recurring_indicator
    }

    pub fn is_expired_by_date(&self, today: NaiveDate) -> bool {
        self.valid_until < today
    }

    pub fn is_not_confirmed(&self) -> bool {
        self.status.is_not_confirmed()
    }

    /// Compares the PSU sets of two consents, ignoring order.
    pub fn has_same_psus(&self, other: &Consent) -> bool {
        let mut mine = self.psu_data.clone();
        let mut theirs = other.psu_data.clone();
        mine.sort();
        theirs.sort();
        mine == theirs
    }
}

//--------------------------------------       NewConsent      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewConsent {
    pub consent_id: ConsentId,
    pub consent_type: ConsentType,
    pub request_type: AisConsentRequestType,
    pub tpp_id: TppId,
    pub psu_data: Vec<PsuIdData>,
    pub tpp_access: AccountAccess,
    pub aspsp_access: AccountAccess,
    pub recurring_indicator: bool,
    pub combined_service_indicator: bool,
    pub frequency_per_day: i64,
    pub valid_until: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl NewConsent {
    /// A new AIS consent for dedicated accounts, where the bank grants exactly what the TPP asked for.
    pub fn dedicated(tpp_id: TppId, psu: PsuIdData, access: AccountAccess, valid_until: NaiveDate) -> Self {
        Self {
            consent_id: ConsentId::random(),
            consent_type: ConsentType::Ais,
            request_type: AisConsentRequestType::DedicatedAccounts,
            tpp_id,
            psu_data: vec![psu],
            tpp_access: access.clone(),
            aspsp_access: access,
            recurring_indicator: true,
            combined_service_indicator: false,
            frequency_per_day: 4,
            valid_until,
            created_at: Utc::now(),
        }
    }

    pub fn with_request_type(mut self, request_type: AisConsentRequestType) -> Self {
        self.request_type = request_type;
        self
    }

    pub fn with_recurring_indicator(mut self, recurring: bool) -> Self {
        self.recurring_indicator = recurring;
        self
    }

    pub fn with_frequency_per_day(mut self, frequency: i64) -> Self {
        self.frequency_per_day = frequency;
        self
    }

    pub fn with_aspsp_access(mut self, access: AccountAccess) -> Self {
        self.aspsp_access = access;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_consent_id(mut self, consent_id: ConsentId) -> Self {
        self.consent_id = consent_id;
        self
    }
}

//--------------------------------------        Payment        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: i64,
    pub payment_id: PaymentId,
    pub payment_type: PaymentType,
    pub payment_product: String,
    pub transaction_status: TransactionStatus,
    pub tpp_id: TppId,
    pub psu_data: Vec<PsuIdData>,
    pub multilevel_sca_required: bool,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_id: PaymentId,
    pub payment_type: PaymentType,
    pub payment_product: String,
    pub tpp_id: TppId,
    pub psu_data: Vec<PsuIdData>,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn single(tpp_id: TppId, psu: PsuIdData, payment_product: &str) -> Self {
        Self {
            payment_id: PaymentId::random(),
            payment_type: PaymentType::Single,
            payment_product: payment_product.to_string(),
            tpp_id,
            psu_data: vec![psu],
            created_at: Utc::now(),
        }
    }

    pub fn with_payment_type(mut self, payment_type: PaymentType) -> Self {
        self.payment_type = payment_type;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------     Authorisation     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorisation {
    pub id: i64,
    pub authorisation_id: AuthorisationId,
    /// The consent id or payment id of the business object that owns this authorisation
    pub parent_id: String,
    pub authorisation_type: AuthorisationType,
    pub sca_status: ScaStatus,
    pub sca_approach: ScaApproach,
    pub authentication_method_id: Option<String>,
    pub psu_data: Option<PsuIdData>,
    pub redirect_uri: Option<String>,
    pub nok_redirect_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Authorisation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Longer authorisation lifetimes are cut down to this.
pub const MAX_AUTHORISATION_LIFETIME_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct NewAuthorisation {
    pub authorisation_id: AuthorisationId,
    pub parent_id: String,
    pub authorisation_type: AuthorisationType,
    pub sca_approach: ScaApproach,
    pub psu_data: Option<PsuIdData>,
    pub redirect_uri: Option<String>,
    pub nok_redirect_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewAuthorisation {
    pub fn new(parent_id: &str, authorisation_type: AuthorisationType, sca_approach: ScaApproach, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            authorisation_id: AuthorisationId::random(),
            parent_id: parent_id.to_string(),
            authorisation_type,
            sca_approach,
            psu_data: None,
            redirect_uri: None,
            nok_redirect_uri: None,
            created_at: now,
            expires_at: now + ttl.min(Duration::days(MAX_AUTHORISATION_LIFETIME_DAYS)),
        }
    }
}

//--------------------------------------      ConsentUsage     ---------------------------------------------------------
/// Number of times a consent was used to read a given resource on a given day. Counts only ever grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentUsage {
    pub consent_id: ConsentId,
    pub resource_id: String,
    pub usage_date: NaiveDate,
    pub usage: i64,
}

//--------------------------------------     ConsentAction     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentAction {
    pub id: i64,
    pub consent_id: ConsentId,
    pub tpp_id: TppId,
    pub action_status: ActionStatus,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     ChecksumValue     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    pub consent_id: ConsentId,
    pub checksum_type: ChecksumType,
    pub digest: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}
