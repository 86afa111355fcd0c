// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! User event entities and the reporting context they are recorded under.
//!
//! Events are immutable once constructed: the unique id and the wall-clock
//! timestamp are stamped at construction time, and processors only ever
//! read them afterwards.

use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Client name stamped into every event context.
pub const CLIENT_NAME: &str = "rust-sdk";

/// Client version stamped into every event context.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reserved tag key carrying a conversion's revenue.
pub const REVENUE_TAG_KEY: &str = "revenue";

/// Reserved tag key carrying a conversion's numeric value.
pub const VALUE_TAG_KEY: &str = "value";

/// Wire type recorded for caller-provided visitor attributes.
const CUSTOM_ATTRIBUTE_TYPE: &str = "custom";

/// Validation failures for events handed to a processor.
///
/// Processors log these and drop the offending event; nothing is surfaced
/// to the producer.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event has an empty user id")]
    EmptyUserId,
    #[error("event context is missing the {0}")]
    IncompleteContext(&'static str),
    #[error("conversion event has an empty event key")]
    EmptyEventKey,
}

/// The account/project identity an event is reported under.
///
/// Two contexts are compatible, and their events may share a batch, iff
/// their project id and revision are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub account_id: String,
    pub project_id: String,
    pub revision: String,
    pub client_name: String,
    pub client_version: String,
    pub anonymize_ip: bool,
}

impl EventContext {
    pub fn new(
        account_id: impl Into<String>,
        project_id: impl Into<String>,
        revision: impl Into<String>,
        anonymize_ip: bool,
    ) -> Self {
        EventContext {
            account_id: account_id.into(),
            project_id: project_id.into(),
            revision: revision.into(),
            client_name: CLIENT_NAME.to_string(),
            client_version: CLIENT_VERSION.to_string(),
            anonymize_ip,
        }
    }

    /// Whether events carrying `other` may share a batch with events
    /// carrying `self`.
    pub fn is_compatible(&self, other: &EventContext) -> bool {
        self.project_id == other.project_id && self.revision == other.revision
    }
}

/// One visitor attribute as recorded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorAttribute {
    pub entity_id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub value: Value,
}

impl VisitorAttribute {
    /// A caller-provided attribute, recorded with the `custom` wire type.
    pub fn custom(entity_id: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        VisitorAttribute {
            entity_id: entity_id.into(),
            key: key.into(),
            attribute_type: CUSTOM_ATTRIBUTE_TYPE.to_string(),
            value,
        }
    }
}

/// An experiment-exposure record.
///
/// The campaign/experiment/variation ids are produced by the caller's
/// decision layer and are opaque to this crate.
#[derive(Debug, Clone)]
pub struct ImpressionEvent {
    pub uuid: String,
    pub timestamp: i64,
    pub user_id: String,
    pub attributes: Vec<VisitorAttribute>,
    pub context: EventContext,
    pub campaign_id: String,
    pub experiment_id: String,
    pub variation_id: String,
}

/// A tracked conversion record.
#[derive(Debug, Clone)]
pub struct ConversionEvent {
    pub uuid: String,
    pub timestamp: i64,
    pub user_id: String,
    pub attributes: Vec<VisitorAttribute>,
    pub context: EventContext,
    pub entity_id: String,
    pub key: String,
    pub tags: Option<Map<String, Value>>,
}

/// A user-interaction record to be reported, one case per kind.
#[derive(Debug, Clone)]
pub enum UserEvent {
    Impression(ImpressionEvent),
    Conversion(ConversionEvent),
}

impl UserEvent {
    /// Creates an exposure event with a fresh id and timestamp.
    pub fn impression(
        context: EventContext,
        user_id: impl Into<String>,
        campaign_id: impl Into<String>,
        experiment_id: impl Into<String>,
        variation_id: impl Into<String>,
        attributes: Vec<VisitorAttribute>,
    ) -> Self {
        UserEvent::Impression(ImpressionEvent {
            uuid: generate_uuid(),
            timestamp: timestamp_ms(),
            user_id: user_id.into(),
            attributes,
            context,
            campaign_id: campaign_id.into(),
            experiment_id: experiment_id.into(),
            variation_id: variation_id.into(),
        })
    }

    /// Creates a conversion event with a fresh id and timestamp.
    pub fn conversion(
        context: EventContext,
        user_id: impl Into<String>,
        entity_id: impl Into<String>,
        key: impl Into<String>,
        attributes: Vec<VisitorAttribute>,
        tags: Option<Map<String, Value>>,
    ) -> Self {
        UserEvent::Conversion(ConversionEvent {
            uuid: generate_uuid(),
            timestamp: timestamp_ms(),
            user_id: user_id.into(),
            attributes,
            context,
            entity_id: entity_id.into(),
            key: key.into(),
            tags,
        })
    }

    pub fn context(&self) -> &EventContext {
        match self {
            UserEvent::Impression(event) => &event.context,
            UserEvent::Conversion(event) => &event.context,
        }
    }

    pub fn uuid(&self) -> &str {
        match self {
            UserEvent::Impression(event) => &event.uuid,
            UserEvent::Conversion(event) => &event.uuid,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            UserEvent::Impression(event) => event.timestamp,
            UserEvent::Conversion(event) => event.timestamp,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            UserEvent::Impression(event) => &event.user_id,
            UserEvent::Conversion(event) => &event.user_id,
        }
    }

    /// Rejects events whose emptiness would produce a meaningless wire
    /// payload.
    pub fn validate(&self) -> Result<(), EventError> {
        let context = self.context();
        if context.account_id.is_empty() {
            return Err(EventError::IncompleteContext("account id"));
        }
        if context.project_id.is_empty() {
            return Err(EventError::IncompleteContext("project id"));
        }
        if context.revision.is_empty() {
            return Err(EventError::IncompleteContext("revision"));
        }
        if self.user_id().is_empty() {
            return Err(EventError::EmptyUserId);
        }
        if let UserEvent::Conversion(conversion) = self {
            if conversion.key.is_empty() {
                return Err(EventError::EmptyEventKey);
            }
        }
        Ok(())
    }
}

/// Revenue recorded under the reserved `revenue` tag, when present and
/// integral. Non-integer values are ignored rather than coerced.
pub fn revenue_from_tags(tags: &Map<String, Value>) -> Option<i64> {
    tags.get(REVENUE_TAG_KEY).and_then(Value::as_i64)
}

/// Numeric value recorded under the reserved `value` tag, when present and
/// numeric.
pub fn numeric_value_from_tags(tags: &Map<String, Value>) -> Option<f64> {
    tags.get(VALUE_TAG_KEY).and_then(Value::as_f64)
}

fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

fn timestamp_ms() -> i64 {
    UNIX_EPOCH.elapsed().map_or(0, |elapsed| elapsed.as_millis() as i64)
}
