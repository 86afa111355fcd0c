// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unbuffered processor that delivers every event on the calling task.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::builder::PayloadBuilder;
use crate::dispatcher::EventDispatcher;
use crate::event::UserEvent;
use crate::notification::{Notifier, LOG_EVENT_TOPIC};

use super::EventProcessor;

/// Forwards each event as a one-element batch, synchronously on the
/// calling task. No background worker, no batching window; dispatch
/// failures are logged and swallowed.
pub struct ForwardingProcessor {
    builder: Arc<dyn PayloadBuilder>,
    dispatcher: Arc<dyn EventDispatcher>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ForwardingProcessor {
    pub fn new(
        builder: Arc<dyn PayloadBuilder>,
        dispatcher: Arc<dyn EventDispatcher>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        ForwardingProcessor {
            builder,
            dispatcher,
            notifier,
        }
    }
}

#[async_trait]
impl EventProcessor for ForwardingProcessor {
    async fn process(&self, event: UserEvent) {
        if let Err(e) = event.validate() {
            error!("dropping malformed event: {e}");
            return;
        }
        debug!("received user event {}", event.uuid());

        let batch = [event];
        let payload = match self.builder.build_request(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode event: {e}");
                return;
            }
        };

        if let Some(notifier) = &self.notifier {
            notifier.notify(LOG_EVENT_TOPIC, &payload);
        }
        if let Err(e) = self.dispatcher.dispatch(&payload).await {
            error!("error dispatching event to {}: {e}", payload.url);
        }
    }
}
