// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wire-ready request payloads for the events intake.
//!
//! A flushed batch is rendered as one [`EventBatch`] body: the shared
//! context fields promoted to the batch level plus one [`Visitor`] entry
//! per event, in accumulation order. The serialized form is carried by a
//! [`LogEvent`], the immutable value handed to the dispatch sink.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::event::VisitorAttribute;

/// HTTP verb carried by a [`LogEvent`]. `Get` when unset; batch payloads
/// are always built with `Post`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpVerb {
    #[default]
    Get,
    Post,
}

/// A single reportable occurrence inside a visitor snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEvent {
    pub entity_id: String,
    pub uuid: String,
    pub key: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
}

/// The experiment decision an exposure was recorded under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub campaign_id: String,
    pub experiment_id: String,
    pub variation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub events: Vec<SnapshotEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisions: Option<Vec<Decision>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visitor {
    pub visitor_id: String,
    pub attributes: Vec<VisitorAttribute>,
    pub snapshots: Vec<Snapshot>,
}

/// The serialized body sent to the events intake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBatch {
    pub account_id: String,
    pub project_id: String,
    pub revision: String,
    pub client_name: String,
    pub client_version: String,
    pub anonymize_ip: bool,
    pub enrich_decisions: bool,
    pub visitors: Vec<Visitor>,
}

/// An encoded batch ready for the dispatch sink: destination, verb,
/// headers, and the serialized body. Immutable once built — the engine
/// clears its accumulation buffer without affecting payloads already
/// constructed from it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub url: String,
    pub http_verb: HttpVerb,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl LogEvent {
    pub fn new(
        url: impl Into<String>,
        http_verb: HttpVerb,
        headers: HashMap<String, String>,
        body: impl Into<String>,
    ) -> Self {
        LogEvent {
            url: url.into(),
            http_verb,
            headers,
            body: body.into(),
        }
    }
}
