// Copyright 2025-Present Uplift, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Building wire payloads from accumulated event batches.
//!
//! The engine only calls [`PayloadBuilder::build_request`] with a non-empty,
//! context-homogeneous slice; the batch-level fields are promoted from the
//! first event's context.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::event::{
    self, ConversionEvent, ImpressionEvent, UserEvent,
};
use crate::payload::{Decision, EventBatch, HttpVerb, LogEvent, Snapshot, SnapshotEvent, Visitor};

/// Default events intake endpoint.
pub const EVENT_ENDPOINT: &str = "https://events.uplift.dev/v1/events";

/// Event key recorded for experiment exposures.
pub const ACTIVATE_EVENT_KEY: &str = "campaign_activated";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("cannot encode an empty batch")]
    EmptyBatch,
    #[error("failed to serialize event batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Turns an ordered sequence of events sharing one context into a single
/// outbound request.
pub trait PayloadBuilder: Send + Sync {
    fn build_request(&self, events: &[UserEvent]) -> Result<LogEvent, PayloadError>;
}

/// Default payload builder targeting the Uplift events API.
#[derive(Debug, Clone)]
pub struct BatchPayloadBuilder {
    endpoint: String,
}

impl Default for BatchPayloadBuilder {
    fn default() -> Self {
        BatchPayloadBuilder {
            endpoint: EVENT_ENDPOINT.to_string(),
        }
    }
}

impl BatchPayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds payloads against a custom intake endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        BatchPayloadBuilder {
            endpoint: endpoint.into(),
        }
    }
}

impl PayloadBuilder for BatchPayloadBuilder {
    fn build_request(&self, events: &[UserEvent]) -> Result<LogEvent, PayloadError> {
        let first = events.first().ok_or(PayloadError::EmptyBatch)?;
        let context = first.context();

        let batch = EventBatch {
            account_id: context.account_id.clone(),
            project_id: context.project_id.clone(),
            revision: context.revision.clone(),
            client_name: context.client_name.clone(),
            client_version: context.client_version.clone(),
            anonymize_ip: context.anonymize_ip,
            enrich_decisions: true,
            visitors: events.iter().map(build_visitor).collect(),
        };
        let body = serde_json::to_string(&batch)?;
        debug!("built payload for {} events", events.len());

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(LogEvent::new(
            self.endpoint.clone(),
            HttpVerb::Post,
            headers,
            body,
        ))
    }
}

fn build_visitor(user_event: &UserEvent) -> Visitor {
    match user_event {
        UserEvent::Impression(impression) => impression_visitor(impression),
        UserEvent::Conversion(conversion) => conversion_visitor(conversion),
    }
}

fn impression_visitor(event: &ImpressionEvent) -> Visitor {
    let decision = Decision {
        campaign_id: event.campaign_id.clone(),
        experiment_id: event.experiment_id.clone(),
        variation_id: event.variation_id.clone(),
    };
    let snapshot_event = SnapshotEvent {
        entity_id: event.campaign_id.clone(),
        uuid: event.uuid.clone(),
        key: ACTIVATE_EVENT_KEY.to_string(),
        timestamp: event.timestamp,
        revenue: None,
        value: None,
        tags: None,
    };

    Visitor {
        visitor_id: event.user_id.clone(),
        attributes: event.attributes.clone(),
        snapshots: vec![Snapshot {
            events: vec![snapshot_event],
            decisions: Some(vec![decision]),
        }],
    }
}

fn conversion_visitor(event: &ConversionEvent) -> Visitor {
    let snapshot_event = SnapshotEvent {
        entity_id: event.entity_id.clone(),
        uuid: event.uuid.clone(),
        key: event.key.clone(),
        timestamp: event.timestamp,
        revenue: event.tags.as_ref().and_then(event::revenue_from_tags),
        value: event.tags.as_ref().and_then(event::numeric_value_from_tags),
        tags: event.tags.clone(),
    };

    Visitor {
        visitor_id: event.user_id.clone(),
        attributes: event.attributes.clone(),
        snapshots: vec![Snapshot {
            events: vec![snapshot_event],
            decisions: None,
        }],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use crate::event::{EventContext, VisitorAttribute};

    use super::*;

    fn test_context() -> EventContext {
        EventContext::new("account-1", "project-1", "42", true)
    }

    fn parse_body(payload: &LogEvent) -> Value {
        serde_json::from_str(&payload.body).unwrap()
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let result = BatchPayloadBuilder::new().build_request(&[]);

        assert!(matches!(result, Err(PayloadError::EmptyBatch)));
    }

    #[test]
    fn test_batch_level_fields_promoted_from_context() {
        let event = UserEvent::impression(test_context(), "user-1", "c1", "e1", "v1", vec![]);

        let payload = BatchPayloadBuilder::new().build_request(&[event]).unwrap();
        let body = parse_body(&payload);

        assert_eq!(body["account_id"], "account-1");
        assert_eq!(body["project_id"], "project-1");
        assert_eq!(body["revision"], "42");
        assert_eq!(body["anonymize_ip"], true);
        assert_eq!(body["enrich_decisions"], true);
        assert_eq!(body["client_name"], crate::event::CLIENT_NAME);
    }

    #[test]
    fn test_payload_targets_endpoint_with_post() {
        let event = UserEvent::impression(test_context(), "user-1", "c1", "e1", "v1", vec![]);

        let payload = BatchPayloadBuilder::new().build_request(&[event]).unwrap();

        assert_eq!(payload.url, EVENT_ENDPOINT);
        assert_eq!(payload.http_verb, HttpVerb::Post);
        assert_eq!(
            payload.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_impression_visitor_carries_decision() {
        let attributes = vec![VisitorAttribute::custom("attr-1", "browser", json!("firefox"))];
        let event = UserEvent::impression(
            test_context(),
            "user-1",
            "campaign-1",
            "experiment-1",
            "variation-1",
            attributes,
        );

        let payload = BatchPayloadBuilder::new().build_request(&[event]).unwrap();
        let body = parse_body(&payload);
        let visitor = &body["visitors"][0];
        let snapshot = &visitor["snapshots"][0];

        assert_eq!(visitor["visitor_id"], "user-1");
        assert_eq!(visitor["attributes"][0]["key"], "browser");
        assert_eq!(snapshot["decisions"][0]["experiment_id"], "experiment-1");
        assert_eq!(snapshot["decisions"][0]["variation_id"], "variation-1");
        assert_eq!(snapshot["events"][0]["entity_id"], "campaign-1");
        assert_eq!(snapshot["events"][0]["key"], ACTIVATE_EVENT_KEY);
    }

    #[test]
    fn test_conversion_visitor_extracts_revenue_and_value() {
        let mut tags = Map::new();
        tags.insert("revenue".to_string(), json!(4200));
        tags.insert("value".to_string(), json!(1.5));
        tags.insert("category".to_string(), json!("checkout"));

        let event = UserEvent::conversion(
            test_context(),
            "user-1",
            "event-1",
            "purchase",
            vec![],
            Some(tags),
        );

        let payload = BatchPayloadBuilder::new().build_request(&[event]).unwrap();
        let body = parse_body(&payload);
        let snapshot_event = &body["visitors"][0]["snapshots"][0]["events"][0];

        assert_eq!(snapshot_event["key"], "purchase");
        assert_eq!(snapshot_event["revenue"], 4200);
        assert_eq!(snapshot_event["value"], 1.5);
        assert_eq!(snapshot_event["tags"]["category"], "checkout");
        assert!(body["visitors"][0]["snapshots"][0].get("decisions").is_none());
    }

    #[test]
    fn test_conversion_without_tags_omits_optionals() {
        let event =
            UserEvent::conversion(test_context(), "user-1", "event-1", "signup", vec![], None);

        let payload = BatchPayloadBuilder::new().build_request(&[event]).unwrap();
        let snapshot_event =
            parse_body(&payload)["visitors"][0]["snapshots"][0]["events"][0].clone();

        assert!(snapshot_event.get("revenue").is_none());
        assert!(snapshot_event.get("value").is_none());
        assert!(snapshot_event.get("tags").is_none());
    }

    #[test]
    fn test_visitors_preserve_batch_order() {
        let first = UserEvent::impression(test_context(), "user-1", "c1", "e1", "v1", vec![]);
        let second =
            UserEvent::conversion(test_context(), "user-2", "event-1", "purchase", vec![], None);
        let third = UserEvent::impression(test_context(), "user-3", "c1", "e1", "v2", vec![]);

        let payload = BatchPayloadBuilder::new()
            .build_request(&[first, second, third])
            .unwrap();
        let body = parse_body(&payload);
        let visitors = body["visitors"].as_array().unwrap();

        assert_eq!(visitors.len(), 3);
        assert_eq!(visitors[0]["visitor_id"], "user-1");
        assert_eq!(visitors[1]["visitor_id"], "user-2");
        assert_eq!(visitors[2]["visitor_id"], "user-3");
    }

    #[test]
    fn test_custom_endpoint() {
        let event = UserEvent::impression(test_context(), "user-1", "c1", "e1", "v1", vec![]);

        let payload = BatchPayloadBuilder::with_endpoint("http://127.0.0.1:9999/v1/events")
            .build_request(&[event])
            .unwrap();

        assert_eq!(payload.url, "http://127.0.0.1:9999/v1/events");
    }
}
