// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Event batching and dispatch for the Uplift experimentation SDK.
//!
//! Producers hand exposure and conversion events to an
//! [`EventProcessor`](processor::EventProcessor); the batching
//! implementation queues them on a bounded channel, accumulates
//! context-homogeneous batches on a background worker task, and ships each
//! batch to the events intake as a single request. Delivery is best effort:
//! the pipeline favors a non-blocking producer path and bounded memory over
//! delivery guarantees, and every failure is reported through `tracing`
//! rather than surfaced to the caller.

pub mod builder;
pub mod dispatcher;
pub mod event;
pub mod notification;
pub mod payload;
pub mod processor;

pub use builder::{BatchPayloadBuilder, PayloadBuilder, PayloadError};
pub use dispatcher::{DispatchError, EventDispatcher, HttpEventDispatcher};
pub use event::{
    ConversionEvent, EventContext, EventError, ImpressionEvent, UserEvent, VisitorAttribute,
};
pub use notification::{Notifier, LOG_EVENT_TOPIC};
pub use payload::{EventBatch, HttpVerb, LogEvent};
pub use processor::{BatchConfig, BatchProcessor, EventProcessor, ForwardingProcessor};
