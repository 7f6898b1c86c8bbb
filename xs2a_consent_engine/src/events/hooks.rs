use std::{future::Future, pin::Pin, sync::Arc};

use futures_util::future::join_all;
use log::*;

use crate::events::{
    ConsentStatusChangedEvent,
    EventHandler,
    EventProducer,
    Handler,
    PaymentStatusChangedEvent,
    ScaStatusChangedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub consent_status_producer: Vec<EventProducer<ConsentStatusChangedEvent>>,
    pub sca_status_producer: Vec<EventProducer<ScaStatusChangedEvent>>,
    pub payment_status_producer: Vec<EventProducer<PaymentStatusChangedEvent>>,
}

impl EventProducers {
    pub async fn publish_consent_status_changed(&self, event: ConsentStatusChangedEvent) {
        trace!(
            "📬️ Consent [{}] moved from {} to {}",
            event.consent.consent_id,
            event.old_status,
            event.consent.status
        );
        join_all(self.consent_status_producer.iter().map(|p| p.publish_event(event.clone()))).await;
    }

    pub async fn publish_sca_status_changed(&self, event: ScaStatusChangedEvent) {
        trace!(
            "📬️ Authorisation [{}] moved from {} to {}",
            event.authorisation.authorisation_id,
            event.old_status,
            event.authorisation.sca_status
        );
        join_all(self.sca_status_producer.iter().map(|p| p.publish_event(event.clone()))).await;
    }

    pub async fn publish_payment_status_changed(&self, event: PaymentStatusChangedEvent) {
        trace!(
            "📬️ Payment [{}] moved from {} to {}",
            event.payment.payment_id,
            event.old_status,
            event.payment.transaction_status
        );
        join_all(self.payment_status_producer.iter().map(|p| p.publish_event(event.clone()))).await;
    }
}

pub struct EventHandlers {
    pub on_consent_status_changed: Option<EventHandler<ConsentStatusChangedEvent>>,
    pub on_sca_status_changed: Option<EventHandler<ScaStatusChangedEvent>>,
    pub on_payment_status_changed: Option<EventHandler<PaymentStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_consent_status_changed = hooks.on_consent_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_sca_status_changed = hooks.on_sca_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_status_changed = hooks.on_payment_status_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_consent_status_changed, on_sca_status_changed, on_payment_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_consent_status_changed {
            result.consent_status_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_sca_status_changed {
            result.sca_status_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_status_changed {
            result.payment_status_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_consent_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_sca_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_status_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_consent_status_changed: Option<Handler<ConsentStatusChangedEvent>>,
    pub on_sca_status_changed: Option<Handler<ScaStatusChangedEvent>>,
    pub on_payment_status_changed: Option<Handler<PaymentStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_consent_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ConsentStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_consent_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_sca_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ScaStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_sca_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_status_changed = Some(Arc::new(f));
        self
    }
}
