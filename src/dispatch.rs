//! The single entrypoint.
//!
//! [`Dispatcher::handle`] receives a raw event and either answers an
//! interactive request with one [`WireEnvelope`], or drains a batch of
//! queued messages into the [`IndexSynchronizer`].
//!
//! # Interactive pipeline
//!
//! ```text
//! parse ─▶ resolve handler ─▶ capabilities ─▶ policy ─▶ handler
//!                                                         │
//!                         envelope ◀─ normalize ◀─ notify ◀┘
//! ```
//!
//! Every failure in the pipeline becomes an error envelope; nothing on the
//! interactive path returns `Err`. The queued path is fail-fast: an error
//! from one message aborts the rest of the batch and surfaces as the
//! invocation's error, so the transport can redeliver it.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::capability::Capabilities;
use crate::event::{parse_event, ApiRequest, InboundEvent, MessageBatch};
use crate::notify::maybe_notify;
use crate::policy::{authorize, is_public_path};
use crate::response::{normalize, ApiError, Outcome, WireEnvelope};
use crate::services::Services;
use crate::sync::IndexSynchronizer;
use crate::traits::{invoke, HandlerRegistry, Method};

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Answer to an interactive request.
    Response(WireEnvelope),
    /// A drained batch; `dispatched` counts messages handed to the
    /// synchronizer.
    Batch { dispatched: usize },
}

impl Invocation {
    pub fn envelope(&self) -> Option<&WireEnvelope> {
        match self {
            Invocation::Response(env) => Some(env),
            Invocation::Batch { .. } => None,
        }
    }
}

pub struct Dispatcher {
    registry: HandlerRegistry,
    services: Arc<Services>,
    synchronizer: IndexSynchronizer,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, services: Arc<Services>) -> Self {
        let synchronizer = IndexSynchronizer::new(services.index.clone());
        Self {
            registry,
            services,
            synchronizer,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Handles one raw event.
    pub async fn handle(&self, raw: &str) -> Result<Invocation> {
        if self.services.config.app.debug {
            tracing::debug!(event = raw, "inbound event");
        }
        self.handle_event(parse_event(raw)).await
    }

    /// Handles an already-classified event.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<Invocation> {
        match event {
            InboundEvent::Interactive(request) => {
                Ok(Invocation::Response(self.handle_request(&request).await))
            }
            InboundEvent::Batch(batch) => {
                let dispatched = self.handle_batch(&batch).await?;
                Ok(Invocation::Batch { dispatched })
            }
        }
    }

    /// Runs an interactive request through the pipeline.
    pub async fn handle_request(&self, request: &ApiRequest) -> WireEnvelope {
        let span = tracing::info_span!(
            "invoke",
            method = request.http_method.as_deref().unwrap_or("-"),
            resource = request.resource_or_empty(),
            status = tracing::field::Empty,
        );

        async {
            let outcome = match self.process(request).await {
                Ok(outcome) => outcome,
                Err(err) => err.into_outcome(),
            };
            let envelope = normalize(&outcome, &BTreeMap::new());

            tracing::Span::current().record("status", envelope.status_code);
            tracing::info!("request handled");
            if self.services.config.app.debug {
                tracing::debug!(envelope = ?envelope, "response");
            }
            envelope
        }
        .instrument(span)
        .await
    }

    async fn process(&self, request: &ApiRequest) -> Result<Outcome, ApiError> {
        let method = request
            .method()
            .ok_or_else(|| ApiError::NotFound("Invalid Request".to_string()))?;
        let resource = request.resource_or_empty();
        let not_found = || ApiError::NotFound(format!("{} not found", resource));

        let method: Method = method.parse().map_err(|_| not_found())?;
        let handler = self.registry.find(method, resource).ok_or_else(not_found)?;

        let caps = if method == Method::Options {
            Capabilities::anonymous(request)
        } else {
            match Capabilities::from_request(request) {
                Ok(caps) => caps,
                Err(err) if is_public_path(request.path_or_empty()) => {
                    tracing::debug!(error = %err, "ignoring claims on public path");
                    Capabilities::anonymous(request)
                }
                Err(err) => return Err(err),
            }
        };

        if method != Method::Options
            && !authorize(
                method,
                request.path_or_empty(),
                handler.sensitivity(method),
                &caps,
            )
        {
            return Err(ApiError::Forbidden("Access Denied".to_string()));
        }

        let outcome = invoke(handler, method, request, &caps, &self.services).await?;
        maybe_notify(request, &caps, &outcome, &self.services).await?;
        Ok(outcome)
    }

    /// Hands each message from the configured queue to the synchronizer.
    ///
    /// Messages from other sources are skipped. The first failing message
    /// aborts the batch.
    pub async fn handle_batch(&self, batch: &MessageBatch) -> Result<usize> {
        let source = self.services.config.queue.event_source.as_str();
        let mut dispatched = 0;

        for (i, message) in batch.records.iter().enumerate() {
            if message.event_source != source {
                tracing::debug!(
                    event_source = %message.event_source,
                    "ignoring message from unrecognized source"
                );
                continue;
            }

            let report = self
                .synchronizer
                .handle_message(message)
                .await
                .with_context(|| format!("Failed to process queued message {}", i))?;
            tracing::info!(
                applied = report.applied,
                failed = report.failed,
                "queued message processed"
            );
            dispatched += 1;
        }

        Ok(dispatched)
    }
}
