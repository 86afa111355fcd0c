// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Notification seam announcing payloads about to be dispatched.

use crate::payload::LogEvent;

/// Topic under which payload notifications are published.
pub const LOG_EVENT_TOPIC: &str = "log-event";

/// Receives exactly one notification per flushed batch, invoked
/// synchronously on the worker task immediately after the payload is built
/// and before it is dispatched. The payload is the same value handed to
/// the dispatch sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, topic: &str, payload: &LogEvent);
}
