// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Event processors: the producer-facing intake capability.
//!
//! Two implementations of one narrow trait, selected at construction time:
//! [`ForwardingProcessor`] delivers every event immediately on the calling
//! task, [`BatchProcessor`] queues and batches on a background worker.

mod batch;
mod forwarding;

pub use batch::{BatchConfig, BatchProcessor};
pub use forwarding::ForwardingProcessor;

use async_trait::async_trait;

use crate::event::UserEvent;

/// Accepts one event at a time from arbitrary producer tasks or threads.
///
/// Implementations never block the caller beyond a bounded enqueue attempt
/// and never surface failures to the producer; everything is reported
/// through `tracing`.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: UserEvent);
}
