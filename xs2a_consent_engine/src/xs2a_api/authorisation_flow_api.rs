//! `AuthorisationFlowApi` is the entry point for everything that moves an authorisation along: PSU input relayed by
//! the TPP, and status notifications sent by the bank.
//!
//! Each call for a given authorisation id is serialised with a per-id lock. The business object is refreshed
//! (lazy expiry) before anything else happens, the step is computed by the processor without touching storage, and
//! the result is committed in a single transaction. Events are published after the commit.
use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    config::AspspProfile,
    db_types::{Authorisation, AuthorisationId, NewAuthorisation, PsuIdData, ScaStatus},
    events::{ConsentStatusChangedEvent, EventProducers, PaymentStatusChangedEvent, ScaStatusChangedEvent},
    helpers::KeyedLocks,
    spi::AspspConsentData,
    traits::{AuthorisationCommit, BusinessObjectUpdate, CommitResult, ConsentDatabase, ConsentDatabaseError},
    xs2a_api::{
        authorisation_processor::AuthorisationProcessor,
        errors::{ErrorHolder, MessageErrorCode, ProcessorError},
        expiration_api::ConsentExpirationApi,
        processor_objects::{
            BusinessObject,
            CreateAuthorisationRequest,
            ProcessorResponse,
            ScaContext,
            ScaStatusCallback,
            UpdateAuthorisationRequest,
        },
        sca_strategy::ScaApproachStrategyResolver,
    },
};

pub struct AuthorisationFlowApi<B, P> {
    db: B,
    processor: P,
    resolver: ScaApproachStrategyResolver,
    profile: AspspProfile,
    expiration: ConsentExpirationApi<B>,
    locks: KeyedLocks,
    producers: EventProducers,
}

impl<B, P> Debug for AuthorisationFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthorisationFlowApi ({:?})", self.resolver)
    }
}

impl<B: Clone, P> AuthorisationFlowApi<B, P> {
    pub fn new(
        db: B,
        processor: P,
        resolver: ScaApproachStrategyResolver,
        profile: AspspProfile,
        producers: EventProducers,
    ) -> Self {
        let expiration = ConsentExpirationApi::new(db.clone(), producers.clone());
        Self { db, processor, resolver, profile, expiration, locks: KeyedLocks::new(), producers }
    }

    /// Shares a lock table with other flows, so that every path that mutates an authorisation is serialised on
    /// the same per-id locks.
    pub fn with_locks(mut self, locks: KeyedLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn profile(&self) -> &AspspProfile {
        &self.profile
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<B, P> AuthorisationFlowApi<B, P>
where
    B: ConsentDatabase,
    P: AuthorisationProcessor,
{
    /// Opens a new authorisation on a consent or payment.
    ///
    /// The owning object must exist and must not be finalised. The SCA approach is taken from the request if it is
    /// given, and otherwise chosen from the TPP preference and the bank profile.
    pub async fn create_authorisation(
        &self,
        request: CreateAuthorisationRequest,
    ) -> Result<Authorisation, ProcessorError> {
        let expected = self.processor.authorisation_type();
        if request.authorisation_type != expected {
            return Err(ProcessorError::AuthorisationTypeMismatch { expected, requested: request.authorisation_type });
        }
        let object = self
            .processor
            .load_object(&self.db, &request.parent_id)
            .await?
            .ok_or_else(|| ProcessorError::ParentNotFound(request.parent_id.clone()))?;
        let object = self.processor.refresh_business_object(&self.expiration, object, &self.profile).await?;
        if object.is_finalised() {
            debug!("🔐️ Refusing to authorise finalised object [{}]", request.parent_id);
            return Err(ProcessorError::ParentFinalised(request.parent_id));
        }
        let approach = match request.sca_approach {
            Some(approach) => approach,
            None => self.resolver.choose_approach(&request.preference, &self.profile),
        };
        self.resolver.resolve(approach)?;
        let mut authorisation =
            NewAuthorisation::new(&request.parent_id, expected, approach, self.profile.authorisation_expiration_time);
        authorisation.psu_data = request.psu_data.filter(|psu| !psu.is_empty());
        authorisation.redirect_uri = request.redirect_uri;
        authorisation.nok_redirect_uri = request.nok_redirect_uri;
        let authorisation = self.db.insert_authorisation(authorisation).await?;
        info!(
            "🔐️ Authorisation [{}] ({}, {}) created for [{}]",
            authorisation.authorisation_id, authorisation.authorisation_type, approach, authorisation.parent_id
        );
        Ok(authorisation)
    }

    /// Advances an authorisation by one step using PSU input.
    ///
    /// Business failures (unknown object, wrong status, SPI errors, invalid credentials) are reported in the
    /// response. `Err` is reserved for faults: a missing authorisation, storage errors, configuration faults and
    /// lost races with a concurrent request.
    pub async fn update_authorisation(
        &self,
        request: UpdateAuthorisationRequest,
    ) -> Result<ProcessorResponse, ProcessorError> {
        let _guard = self.locks.lock(request.authorisation_id.as_str()).await;
        let authorisation = self.fetch_authorisation(&request.authorisation_id).await?;
        let psu = request.psu_data.clone().filter(|p| !p.is_empty()).or_else(|| authorisation.psu_data.clone());
        if authorisation.authorisation_type != self.processor.authorisation_type() ||
            authorisation.parent_id != request.parent_id
        {
            warn!(
                "🔐️ Authorisation [{}] does not belong to {} [{}]",
                authorisation.authorisation_id, request.authorisation_type, request.parent_id
            );
            return Ok(ProcessorResponse::for_authorisation(&authorisation, psu).with_error_code(
                MessageErrorCode::ResourceUnknown,
                "The authorisation does not belong to the addressed resource",
            ));
        }
        let Some(object) = self.processor.load_object(&self.db, &authorisation.parent_id).await? else {
            debug!("🔐️ Object [{}] for authorisation [{}] is unknown", authorisation.parent_id, request.authorisation_id);
            return Ok(ProcessorResponse::for_authorisation(&authorisation, psu)
                .with_error_code(self.processor.unknown_object_code(), "The addressed resource is unknown"));
        };
        let object = self.processor.refresh_business_object(&self.expiration, object, &self.profile).await?;
        // Lazy expiry may have failed the authorisation
        let authorisation = self.fetch_authorisation(&request.authorisation_id).await?;

        if !authorisation.sca_status.is_finalised() {
            if object.is_finalised() {
                return Ok(ProcessorResponse::for_authorisation(&authorisation, psu).with_error_code(
                    MessageErrorCode::StatusInvalid,
                    format!("The resource {} is finalised", object.object_id()),
                ));
            }
            if authorisation.is_expired(Utc::now()) {
                return self.fail_expired(authorisation, psu).await;
            }
        }

        let strategy = self.resolver.resolve_for(&authorisation)?;
        let stored_data = self.db.fetch_aspsp_consent_data(&authorisation.parent_id).await?.unwrap_or_default();
        let aspsp_data = AspspConsentData::new(&authorisation.parent_id, stored_data);
        let mut ctx = ScaContext {
            request,
            authorisation: authorisation.clone(),
            object,
            aspsp_data,
            strategy,
            spi_timeout: self.profile.spi_timeout,
        };
        let response = self.processor.process(&mut ctx).await;
        if ctx.aspsp_data.is_dirty() {
            self.db.save_aspsp_consent_data(ctx.aspsp_data.parent_id(), ctx.aspsp_data.bytes()).await?;
            ctx.aspsp_data.mark_clean();
        }
        if !response.needs_commit(&authorisation) {
            return Ok(response);
        }
        let update = self.processor.business_update(&ctx.object, &response);
        self.commit(&authorisation, response, update).await
    }

    /// Applies a status notification from the bank (redirect and decoupled flows).
    ///
    /// Repeating a notification is harmless. Notifications for finalised authorisations, and notifications that
    /// would move the status backwards, are rejected in the response.
    pub async fn apply_bank_callback(&self, callback: ScaStatusCallback) -> Result<ProcessorResponse, ProcessorError> {
        let _guard = self.locks.lock(callback.authorisation_id.as_str()).await;
        let authorisation = self.fetch_authorisation(&callback.authorisation_id).await?;
        let response = ProcessorResponse::for_authorisation(&authorisation, authorisation.psu_data.clone());
        if authorisation.authorisation_type != self.processor.authorisation_type() {
            return Ok(response.with_error_code(
                MessageErrorCode::ResourceUnknown,
                "The authorisation does not belong to this flow",
            ));
        }
        let current = authorisation.sca_status;
        if callback.sca_status == current {
            trace!("🔐️ Repeated callback for [{}] in status {current}", authorisation.authorisation_id);
            return Ok(response);
        }
        if current.is_finalised() {
            return Ok(response.with_error(ErrorHolder::already_finalised(current)));
        }
        if !current.can_transition_to(callback.sca_status) {
            warn!(
                "🔐️ Bank callback tried to move [{}] from {current} to {}",
                authorisation.authorisation_id, callback.sca_status
            );
            return Ok(response.with_error_code(
                MessageErrorCode::StatusInvalid,
                format!("Cannot move from {current} to {}", callback.sca_status),
            ));
        }
        self.resolver.resolve_for(&authorisation)?;
        let Some(object) = self.processor.load_object(&self.db, &authorisation.parent_id).await? else {
            return Ok(response.with_error_code(self.processor.unknown_object_code(), "The addressed resource is unknown"));
        };
        let mut response = response.with_status(callback.sca_status);
        self.processor.apply_callback(&object, &callback, &mut response);
        let update = self.processor.business_update(&object, &response);
        debug!("🔐️ Bank callback moves [{}] from {current} to {}", authorisation.authorisation_id, callback.sca_status);
        self.commit(&authorisation, response, update).await
    }

    pub async fn sca_status(&self, authorisation_id: &AuthorisationId) -> Result<ScaStatus, ProcessorError> {
        Ok(self.fetch_authorisation(authorisation_id).await?.sca_status)
    }

    async fn fetch_authorisation(&self, authorisation_id: &AuthorisationId) -> Result<Authorisation, ProcessorError> {
        self.db
            .fetch_authorisation(authorisation_id)
            .await?
            .ok_or_else(|| ProcessorError::AuthorisationNotFound(authorisation_id.clone()))
    }

    async fn fail_expired(
        &self,
        authorisation: Authorisation,
        psu: Option<PsuIdData>,
    ) -> Result<ProcessorResponse, ProcessorError> {
        info!(
            "🔐️ Authorisation [{}] expired at {}. Failing it.",
            authorisation.authorisation_id, authorisation.expires_at
        );
        let response = ProcessorResponse::for_authorisation(&authorisation, psu)
            .with_status(ScaStatus::Failed)
            .with_error_code(MessageErrorCode::ScaInvalid, "The authorisation has expired");
        self.commit(&authorisation, response, None).await
    }

    /// Commits the outcome of a step. The stored status must still be the one the step started from.
    async fn commit(
        &self,
        authorisation: &Authorisation,
        response: ProcessorResponse,
        business_update: Option<BusinessObjectUpdate>,
    ) -> Result<ProcessorResponse, ProcessorError> {
        let from = authorisation.sca_status;
        let to = response.sca_status;
        if from != to && !from.can_transition_to(to) {
            error!("🔐️ Refusing illegal transition of [{}] from {from} to {to}", authorisation.authorisation_id);
            return Err(ProcessorError::IllegalTransition { from, to });
        }
        let commit = AuthorisationCommit {
            authorisation_id: authorisation.authorisation_id.clone(),
            expected_status: from,
            new_status: to,
            sca_approach: response.sca_approach,
            authentication_method_id: response.authentication_method_id.clone(),
            psu_data: response.psu_data.clone(),
            business_update,
        };
        match self.db.commit_authorisation_update(commit).await {
            Ok(result) => {
                debug!("🔐️ Authorisation [{}] is now {to}", authorisation.authorisation_id);
                self.publish(result).await;
                Ok(response)
            },
            Err(ConsentDatabaseError::ConcurrentModification { id, expected }) => {
                warn!("🔐️ Authorisation [{id}] left status {expected} while this request was being processed");
                Err(ProcessorError::ConcurrentModification(id))
            },
            Err(ConsentDatabaseError::AlreadyFinalised(what)) => {
                info!("🔐️ {what} was finalised before authorisation [{}] committed", authorisation.authorisation_id);
                let stored = ProcessorResponse::for_authorisation(authorisation, response.psu_data);
                Ok(stored
                    .with_error_code(MessageErrorCode::StatusInvalid, format!("{what} is finalised and cannot change")))
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn publish(&self, result: CommitResult) {
        if result.old_sca_status != result.authorisation.sca_status {
            let event = ScaStatusChangedEvent::new(result.authorisation, result.old_sca_status);
            self.producers.publish_sca_status_changed(event).await;
        }
        for change in result.consent_changes {
            self.producers.publish_consent_status_changed(ConsentStatusChangedEvent::from(change)).await;
        }
        if let Some(change) = result.payment_change {
            self.producers.publish_payment_status_changed(PaymentStatusChangedEvent::from(change)).await;
        }
    }
}
