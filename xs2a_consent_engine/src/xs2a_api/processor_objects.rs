use std::{fmt::Display, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use xs2a_common::Secret;

use crate::{
    db_types::{
        Authorisation,
        AuthorisationId,
        AuthorisationType,
        Consent,
        ConsentStatus,
        Payment,
        PsuIdData,
        ScaApproach,
        ScaStatus,
        TppId,
        TransactionStatus,
    },
    spi::{AspspConsentData, AuthenticationMethod, ChallengeData, SpiContext},
    xs2a_api::{
        errors::{ErrorHolder, MessageErrorCode},
        sca_strategy::ScaApproachStrategy,
    },
};

//--------------------------------------     BusinessObject    ---------------------------------------------------------
/// The thing an authorisation authorises: a consent or a payment.
pub trait BusinessObject {
    fn object_id(&self) -> &str;
    fn tpp_id(&self) -> &TppId;
    fn is_finalised(&self) -> bool;
}

impl BusinessObject for Consent {
    fn object_id(&self) -> &str {
        self.consent_id.as_str()
    }

    fn tpp_id(&self) -> &TppId {
        &self.tpp_id
    }

    fn is_finalised(&self) -> bool {
        self.status.is_finalised()
    }
}

impl BusinessObject for Payment {
    fn object_id(&self) -> &str {
        self.payment_id.as_str()
    }

    fn tpp_id(&self) -> &TppId {
        &self.tpp_id
    }

    fn is_finalised(&self) -> bool {
        self.transaction_status.is_finalised()
    }
}

//-------------------------------------- UpdateAuthorisationRequest ----------------------------------------------------
/// PSU input for the next authorisation step. Which fields are needed depends on the current SCA status.
#[derive(Debug, Clone)]
pub struct UpdateAuthorisationRequest {
    pub authorisation_id: AuthorisationId,
    /// The consent or payment id the TPP addressed
    pub parent_id: String,
    pub authorisation_type: AuthorisationType,
    pub psu_data: Option<PsuIdData>,
    pub password: Option<Secret<String>>,
    pub authentication_method_id: Option<String>,
    pub sca_authentication_data: Option<Secret<String>>,
}

impl UpdateAuthorisationRequest {
    pub fn new(authorisation_id: AuthorisationId, parent_id: &str, authorisation_type: AuthorisationType) -> Self {
        Self {
            authorisation_id,
            parent_id: parent_id.to_string(),
            authorisation_type,
            psu_data: None,
            password: None,
            authentication_method_id: None,
            sca_authentication_data: None,
        }
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu_data = Some(psu);
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Secret::from(password));
        self
    }

    pub fn with_authentication_method(mut self, method_id: &str) -> Self {
        self.authentication_method_id = Some(method_id.to_string());
        self
    }

    pub fn with_sca_code(mut self, code: &str) -> Self {
        self.sca_authentication_data = Some(Secret::from(code));
        self
    }
}

//-------------------------------------- CreateAuthorisationRequest ----------------------------------------------------
/// The TPP's SCA approach preference, taken from the `TPP-Redirect-Preferred` and `TPP-Decoupled-Preferred` headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TppScaPreference {
    pub redirect_preferred: Option<bool>,
    pub decoupled_preferred: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateAuthorisationRequest {
    pub parent_id: String,
    pub authorisation_type: AuthorisationType,
    pub psu_data: Option<PsuIdData>,
    pub preference: TppScaPreference,
    /// Overrides the preference, e.g. when the approach was fixed when the business object was created
    pub sca_approach: Option<ScaApproach>,
    pub redirect_uri: Option<String>,
    pub nok_redirect_uri: Option<String>,
}

impl CreateAuthorisationRequest {
    pub fn new(parent_id: &str, authorisation_type: AuthorisationType) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            authorisation_type,
            psu_data: None,
            preference: TppScaPreference::default(),
            sca_approach: None,
            redirect_uri: None,
            nok_redirect_uri: None,
        }
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu_data = Some(psu);
        self
    }

    pub fn with_preference(mut self, preference: TppScaPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_approach(mut self, approach: ScaApproach) -> Self {
        self.sca_approach = Some(approach);
        self
    }

    pub fn with_redirect_uris(mut self, ok: &str, nok: &str) -> Self {
        self.redirect_uri = Some(ok.to_string());
        self.nok_redirect_uri = Some(nok.to_string());
        self
    }
}

//--------------------------------------   ScaStatusCallback   ---------------------------------------------------------
/// An asynchronous status notification from the bank (redirect and decoupled flows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaStatusCallback {
    pub authorisation_id: AuthorisationId,
    pub sca_status: ScaStatus,
    pub consent_status: Option<ConsentStatus>,
    pub transaction_status: Option<TransactionStatus>,
}

impl ScaStatusCallback {
    pub fn new(authorisation_id: AuthorisationId, sca_status: ScaStatus) -> Self {
        Self { authorisation_id, sca_status, consent_status: None, transaction_status: None }
    }

    pub fn with_consent_status(mut self, status: ConsentStatus) -> Self {
        self.consent_status = Some(status);
        self
    }

    pub fn with_transaction_status(mut self, status: TransactionStatus) -> Self {
        self.transaction_status = Some(status);
        self
    }
}

//--------------------------------------   ProcessorResponse   ---------------------------------------------------------
/// The outcome of one authorisation step.
///
/// It always carries the authorisation identity, the business object id and the PSU, including when it reports an
/// error. If `error` is set and `sca_status` equals the stored status, nothing is written.
#[derive(Debug, Clone)]
pub struct ProcessorResponse {
    pub authorisation_id: AuthorisationId,
    pub parent_id: String,
    pub sca_status: ScaStatus,
    pub sca_approach: ScaApproach,
    pub psu_data: Option<PsuIdData>,
    pub authentication_method_id: Option<String>,
    pub available_sca_methods: Vec<AuthenticationMethod>,
    pub challenge_data: Option<ChallengeData>,
    pub psu_message: Option<String>,
    /// New consent status to commit alongside the SCA status
    pub consent_status: Option<ConsentStatus>,
    /// New transaction status to commit alongside the SCA status
    pub transaction_status: Option<TransactionStatus>,
    /// `Some(true)` if the business object must be flagged as requiring multilevel SCA
    pub multilevel_sca_required: Option<bool>,
    pub terminate_superseded: bool,
    pub error: Option<ErrorHolder>,
}

impl ProcessorResponse {
    pub fn for_authorisation(authorisation: &Authorisation, psu_data: Option<PsuIdData>) -> Self {
        Self {
            authorisation_id: authorisation.authorisation_id.clone(),
            parent_id: authorisation.parent_id.clone(),
            sca_status: authorisation.sca_status,
            sca_approach: authorisation.sca_approach,
            psu_data,
            authentication_method_id: authorisation.authentication_method_id.clone(),
            available_sca_methods: Vec::new(),
            challenge_data: None,
            psu_message: None,
            consent_status: None,
            transaction_status: None,
            multilevel_sca_required: None,
            terminate_superseded: false,
            error: None,
        }
    }

    pub fn with_status(mut self, status: ScaStatus) -> Self {
        self.sca_status = status;
        self
    }

    pub fn with_error(mut self, error: ErrorHolder) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_error_code<S: Display>(self, code: MessageErrorCode, message: S) -> Self {
        self.with_error(ErrorHolder::new(code, message))
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_business_update(&self) -> bool {
        self.consent_status.is_some()
            || self.transaction_status.is_some()
            || self.multilevel_sca_required.is_some()
            || self.terminate_superseded
    }

    /// True if this response changes anything that is stored for `authorisation`.
    pub fn needs_commit(&self, authorisation: &Authorisation) -> bool {
        if self.has_error() && self.sca_status == authorisation.sca_status {
            return false;
        }
        self.sca_status != authorisation.sca_status
            || self.sca_approach != authorisation.sca_approach
            || self.authentication_method_id != authorisation.authentication_method_id
            || (self.psu_data.is_some() && self.psu_data != authorisation.psu_data)
            || self.has_business_update()
    }
}

//--------------------------------------       ScaContext      ---------------------------------------------------------
/// Everything a status handler needs for one step. Handlers do not touch the database.
pub struct ScaContext<O> {
    pub request: UpdateAuthorisationRequest,
    pub authorisation: Authorisation,
    pub object: O,
    pub aspsp_data: AspspConsentData,
    pub strategy: Arc<dyn ScaApproachStrategy>,
    pub spi_timeout: Duration,
}

impl<O: BusinessObject> ScaContext<O> {
    /// The PSU for this step. PSU data in the request wins, unless it is empty.
    pub fn psu_data(&self) -> Option<PsuIdData> {
        match &self.request.psu_data {
            Some(psu) if !psu.is_empty() => Some(psu.clone()),
            _ => self.authorisation.psu_data.clone(),
        }
    }

    pub fn spi_context(&self) -> SpiContext {
        SpiContext {
            tpp_id: self.object.tpp_id().clone(),
            authorisation_id: self.authorisation.authorisation_id.clone(),
            psu_data: self.psu_data(),
        }
    }

    /// A response that echoes the stored state of the authorisation.
    pub fn response(&self) -> ProcessorResponse {
        ProcessorResponse::for_authorisation(&self.authorisation, self.psu_data())
    }

    pub fn current_status(&self) -> ScaStatus {
        self.authorisation.sca_status
    }
}
