//! # The SCA status machine
//!
//! An [`AuthorisationProcessor`] advances one authorisation by one step. The step is chosen by the *stored* SCA
//! status of the authorisation, not by what the request contains:
//!
//! | stored status         | handler                       |
//! |-----------------------|-------------------------------|
//! | `received`            | [`do_sca_received`]           |
//! | `psuIdentified`       | [`do_sca_psu_identified`]     |
//! | `psuAuthenticated`    | [`do_sca_psu_authenticated`]  |
//! | `scaMethodSelected`   | [`do_sca_method_selected`]    |
//! | `unconfirmed`         | [`do_sca_unconfirmed`]        |
//! | `started`             | [`do_sca_started`]            |
//! | `finalised`           | [`do_sca_finalised`]          |
//! | `failed`              | [`do_sca_failed`]             |
//! | `exempted`            | [`do_sca_exempted`]           |
//!
//! Handlers only talk to the SPI. They return a [`ProcessorResponse`] describing the new status and any business
//! object change, and the caller commits it atomically. An SPI failure leaves the status where it was.
//!
//! The business-specific parts (what a successful verification means for a consent or a payment) are supplied by
//! the implementors: [`AisAuthorisationProcessor`] and [`PaymentAuthorisationProcessor`].
//!
//! [`do_sca_received`]: AuthorisationProcessor::do_sca_received
//! [`do_sca_psu_identified`]: AuthorisationProcessor::do_sca_psu_identified
//! [`do_sca_psu_authenticated`]: AuthorisationProcessor::do_sca_psu_authenticated
//! [`do_sca_method_selected`]: AuthorisationProcessor::do_sca_method_selected
//! [`do_sca_unconfirmed`]: AuthorisationProcessor::do_sca_unconfirmed
//! [`do_sca_started`]: AuthorisationProcessor::do_sca_started
//! [`do_sca_finalised`]: AuthorisationProcessor::do_sca_finalised
//! [`do_sca_failed`]: AuthorisationProcessor::do_sca_failed
//! [`do_sca_exempted`]: AuthorisationProcessor::do_sca_exempted
//! [`AisAuthorisationProcessor`]: crate::AisAuthorisationProcessor
//! [`PaymentAuthorisationProcessor`]: crate::PaymentAuthorisationProcessor
use log::*;
use xs2a_common::Secret;

use crate::{
    config::AspspProfile,
    db_types::{AuthorisationType, PsuIdData, ScaApproach, ScaStatus},
    spi::{call_with_timeout, AuthenticationMethod, PsuAuthorisationOutcome, ScaSpi, ScaVerification, SpiError},
    traits::{BusinessObjectUpdate, ConsentDatabase, ConsentDatabaseError},
    xs2a_api::{
        errors::{ErrorHolder, ExpirationError, MessageErrorCode},
        expiration_api::ConsentExpirationApi,
        processor_objects::{BusinessObject, ProcessorResponse, ScaContext, ScaStatusCallback},
        sca_strategy::{MethodDecision, MethodStep},
    },
};

#[allow(async_fn_in_trait)]
pub trait AuthorisationProcessor {
    type Object: BusinessObject + Clone;
    type Spi: ScaSpi<Self::Object>;

    fn authorisation_type(&self) -> AuthorisationType;

    /// The error reported when the business object cannot be found.
    fn unknown_object_code(&self) -> MessageErrorCode;

    fn spi(&self) -> &Self::Spi;

    async fn load_object<B: ConsentDatabase>(
        &self,
        db: &B,
        parent_id: &str,
    ) -> Result<Option<Self::Object>, ConsentDatabaseError>;

    /// Applies lazy expiry to the business object before a step is processed.
    async fn refresh_business_object<B: ConsentDatabase>(
        &self,
        expiration: &ConsentExpirationApi<B>,
        object: Self::Object,
        profile: &AspspProfile,
    ) -> Result<Self::Object, ExpirationError>;

    /// Records what a confirmed SCA verification means for the business object on `response`.
    ///
    /// Returning an error discards the step: the status stays where it was and nothing is written.
    async fn apply_verification(
        &self,
        ctx: &mut ScaContext<Self::Object>,
        verification: &ScaVerification,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder>;

    /// Records what an SCA exemption means for the business object on `response`.
    async fn complete_exempted(
        &self,
        ctx: &mut ScaContext<Self::Object>,
        response: &mut ProcessorResponse,
    ) -> Result<(), ErrorHolder>;

    /// Records the business object part of a bank callback on `response`.
    fn apply_callback(&self, object: &Self::Object, callback: &ScaStatusCallback, response: &mut ProcessorResponse);

    /// Converts the business part of a response into a storage update.
    fn business_update(&self, object: &Self::Object, response: &ProcessorResponse) -> Option<BusinessObjectUpdate>;

    //--------------------------------------   Dispatch    --------------------------------------------------------------

    /// Runs the handler for the stored status of the authorisation.
    async fn process(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        let status = ctx.current_status();
        trace!("🔐️ Processing authorisation [{}] in status {status}", ctx.authorisation.authorisation_id);
        match status {
            ScaStatus::Received => self.do_sca_received(ctx).await,
            ScaStatus::PsuIdentified => self.do_sca_psu_identified(ctx).await,
            ScaStatus::PsuAuthenticated => self.do_sca_psu_authenticated(ctx).await,
            ScaStatus::ScaMethodSelected => self.do_sca_method_selected(ctx).await,
            ScaStatus::Unconfirmed => self.do_sca_unconfirmed(ctx).await,
            ScaStatus::Started => self.do_sca_started(ctx).await,
            ScaStatus::Finalised => self.do_sca_finalised(ctx).await,
            ScaStatus::Failed => self.do_sca_failed(ctx).await,
            ScaStatus::Exempted => self.do_sca_exempted(ctx).await,
        }
    }

    //--------------------------------------   Handlers    --------------------------------------------------------------

    /// Identifies the PSU. If a password is supplied as well, the PSU is authenticated straight away.
    async fn do_sca_received(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        if let Some(rejected) = reject_psu_input(ctx) {
            return rejected;
        }
        let Some(psu) = ctx.psu_data() else {
            return ctx.response().with_error_code(MessageErrorCode::FormatError, "PSU identification is missing");
        };
        match ctx.request.password.clone() {
            Some(password) => self.authenticate_psu(ctx, &psu, &password).await,
            None => ctx.response().with_status(ScaStatus::PsuIdentified),
        }
    }

    async fn do_sca_psu_identified(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        if let Some(rejected) = reject_psu_input(ctx) {
            return rejected;
        }
        let Some(psu) = ctx.psu_data() else {
            return ctx.response().with_error_code(MessageErrorCode::FormatError, "PSU identification is missing");
        };
        let Some(password) = ctx.request.password.clone() else {
            return ctx.response().with_error_code(MessageErrorCode::FormatError, "PSU password is missing");
        };
        self.authenticate_psu(ctx, &psu, &password).await
    }

    /// The PSU picks one of the offered SCA methods.
    async fn do_sca_psu_authenticated(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        if let Some(rejected) = reject_psu_input(ctx) {
            return rejected;
        }
        let Some(method_id) = ctx.request.authentication_method_id.clone() else {
            return ctx
                .response()
                .with_error_code(MessageErrorCode::FormatError, "An authentication method must be selected");
        };
        let spi_ctx = ctx.spi_context();
        let methods = call_with_timeout(
            ctx.spi_timeout,
            self.spi().request_available_sca_methods(&spi_ctx, &ctx.object, &mut ctx.aspsp_data),
        )
        .await;
        let methods = match methods {
            Ok(m) => m,
            Err(e) => return spi_failure(ctx, "request_available_sca_methods", e),
        };
        match methods.into_iter().find(|m| m.authentication_method_id == method_id) {
            Some(method) => self.select_method(ctx, method).await,
            None => ctx.response().with_error_code(
                MessageErrorCode::ScaMethodUnknown,
                "The selected authentication method is not available",
            ),
        }
    }

    /// Verifies the SCA code.
    ///
    /// 1. The business object was resolved before dispatch; an unknown object never reaches this handler.
    /// 2. The code goes to the SPI together with the bank's opaque consent data.
    /// 3. An SPI error leaves the authorisation in its current status and changes nothing.
    /// 4. On success the business outcome is applied (consent status and multilevel flag, or payment completion).
    /// 5. Superseded consents are terminated when the result is committed.
    /// 6. The authorisation is finalised. If the bank still waits for confirmation it becomes `unconfirmed`.
    async fn do_sca_method_selected(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        if let Some(rejected) = reject_psu_input(ctx) {
            return rejected;
        }
        let Some(code) = ctx.request.sca_authentication_data.clone() else {
            return ctx.response().with_error_code(MessageErrorCode::FormatError, "SCA authentication data is missing");
        };
        self.verify_code(ctx, &code).await
    }

    /// Re-verifies while the bank waits for confirmation.
    async fn do_sca_unconfirmed(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        self.do_sca_method_selected(ctx).await
    }

    /// Decoupled SCA is running on the PSU's device. Only a bank callback moves it on.
    async fn do_sca_started(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        debug!("🔐️ Authorisation [{}] is waiting for decoupled confirmation", ctx.authorisation.authorisation_id);
        ctx.response()
    }

    async fn do_sca_finalised(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        already_finalised(ctx)
    }

    async fn do_sca_failed(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        already_finalised(ctx)
    }

    async fn do_sca_exempted(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        already_finalised(ctx)
    }

    //--------------------------------------    Steps      --------------------------------------------------------------

    async fn authenticate_psu(
        &self,
        ctx: &mut ScaContext<Self::Object>,
        psu: &PsuIdData,
        password: &Secret<String>,
    ) -> ProcessorResponse {
        let spi_ctx = ctx.spi_context();
        let outcome = call_with_timeout(
            ctx.spi_timeout,
            self.spi().authorise_psu(&spi_ctx, psu, password, &ctx.object, &mut ctx.aspsp_data),
        )
        .await;
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => return spi_failure(ctx, "authorise_psu", e),
        };
        match outcome {
            PsuAuthorisationOutcome::Failed => {
                info!("🔐️ PSU {psu} failed authentication on [{}]", ctx.authorisation.authorisation_id);
                ctx.response()
                    .with_status(ScaStatus::Failed)
                    .with_error_code(MessageErrorCode::PsuCredentialsInvalid, "PSU credentials are invalid")
            },
            PsuAuthorisationOutcome::Exempted => self.exempt(ctx).await,
            PsuAuthorisationOutcome::Authenticated => {
                let methods = call_with_timeout(
                    ctx.spi_timeout,
                    self.spi().request_available_sca_methods(&spi_ctx, &ctx.object, &mut ctx.aspsp_data),
                )
                .await;
                let methods = match methods {
                    Ok(m) => m,
                    Err(e) => return spi_failure(ctx, "request_available_sca_methods", e),
                };
                match ctx.strategy.after_authentication(&methods) {
                    MethodDecision::NoMethods => self.exempt(ctx).await,
                    MethodDecision::Single(method) => self.select_method(ctx, method).await,
                    MethodDecision::Choose(methods) => {
                        let mut response = ctx.response().with_status(ScaStatus::PsuAuthenticated);
                        response.available_sca_methods = methods;
                        response
                    },
                }
            },
        }
    }

    async fn select_method(
        &self,
        ctx: &mut ScaContext<Self::Object>,
        method: AuthenticationMethod,
    ) -> ProcessorResponse {
        let spi_ctx = ctx.spi_context();
        let method_id = method.authentication_method_id.clone();
        match ctx.strategy.on_method_chosen(&method) {
            MethodStep::RequestChallenge => {
                let challenge = call_with_timeout(
                    ctx.spi_timeout,
                    self.spi().request_authorisation_code(&spi_ctx, &method_id, &ctx.object, &mut ctx.aspsp_data),
                )
                .await;
                match challenge {
                    Ok(challenge) => {
                        let mut response = ctx.response().with_status(ScaStatus::ScaMethodSelected);
                        response.authentication_method_id = Some(method_id);
                        response.challenge_data = Some(challenge);
                        response
                    },
                    Err(e) => spi_failure(ctx, "request_authorisation_code", e),
                }
            },
            MethodStep::StartDecoupled => {
                let started = call_with_timeout(
                    ctx.spi_timeout,
                    self.spi().start_sca_decoupled(&spi_ctx, Some(method_id.as_str()), &ctx.object, &mut ctx.aspsp_data),
                )
                .await;
                match started {
                    Ok(message) => {
                        let mut response = ctx.response().with_status(ScaStatus::Started);
                        response.sca_approach = ScaApproach::Decoupled;
                        response.authentication_method_id = Some(method_id);
                        response.psu_message = Some(message);
                        response
                    },
                    Err(e) => spi_failure(ctx, "start_sca_decoupled", e),
                }
            },
        }
    }

    async fn verify_code(&self, ctx: &mut ScaContext<Self::Object>, code: &Secret<String>) -> ProcessorResponse {
        let spi_ctx = ctx.spi_context();
        let verification = call_with_timeout(
            ctx.spi_timeout,
            self.spi().verify_sca_authorisation(&spi_ctx, code, &ctx.object, &mut ctx.aspsp_data),
        )
        .await;
        let verification = match verification {
            Ok(v) => v,
            Err(e) => return spi_failure(ctx, "verify_sca_authorisation", e),
        };
        if !verification.confirmed {
            debug!("🔐️ Authorisation [{}] awaits confirmation", ctx.authorisation.authorisation_id);
            return ctx.response().with_status(ScaStatus::Unconfirmed);
        }
        let mut response = ctx.response().with_status(ScaStatus::Finalised);
        if let Err(e) = self.apply_verification(ctx, &verification, &mut response).await {
            warn!("🔐️ Could not complete authorisation [{}]. {e}", ctx.authorisation.authorisation_id);
            return ctx.response().with_error(e);
        }
        response
    }

    async fn exempt(&self, ctx: &mut ScaContext<Self::Object>) -> ProcessorResponse {
        let mut response = ctx.response().with_status(ScaStatus::Exempted);
        if let Err(e) = self.complete_exempted(ctx, &mut response).await {
            warn!("🔐️ Could not complete exempted authorisation [{}]. {e}", ctx.authorisation.authorisation_id);
            return ctx.response().with_error(e);
        }
        info!("🔐️ SCA exempted for authorisation [{}]", ctx.authorisation.authorisation_id);
        response
    }
}

fn spi_failure<O: BusinessObject>(ctx: &ScaContext<O>, call: &str, error: SpiError) -> ProcessorResponse {
    warn!(
        "🔐️ SPI call {call} failed for [{}]. Status stays {}. {error}",
        ctx.authorisation.authorisation_id,
        ctx.current_status()
    );
    ctx.response().with_error(ErrorHolder::from(&error))
}

fn reject_psu_input<O: BusinessObject>(ctx: &ScaContext<O>) -> Option<ProcessorResponse> {
    if ctx.strategy.accepts_psu_input() {
        return None;
    }
    debug!(
        "🔐️ PSU input rejected for [{}]. The {} approach does not accept it",
        ctx.authorisation.authorisation_id,
        ctx.strategy.approach()
    );
    Some(ctx.response().with_error_code(
        MessageErrorCode::ServiceInvalid,
        "PSU data cannot be submitted for this SCA approach",
    ))
}

fn already_finalised<O: BusinessObject>(ctx: &ScaContext<O>) -> ProcessorResponse {
    ctx.response().with_error(ErrorHolder::already_finalised(ctx.current_status()))
}
