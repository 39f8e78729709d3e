//! Stripe webhook event types.
//!
//! Only the envelope is typed; `data.object` stays polymorphic and is read
//! field by field by the normalizer, since its shape depends on the event type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stripe webhook event (simplified).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: Value,

    /// Previous values for updated attributes (only for update events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<Value>,
}

impl StripeEvent {
    /// Reads a string at a dotted path inside `data.object`, e.g.
    /// `"lines.data.0.price.id"`. Numeric segments index arrays.
    pub fn object_str(&self, path: &str) -> Option<&str> {
        lookup(&self.data.object, path).and_then(Value::as_str)
    }

    /// Reads an integer at a dotted path inside `data.object`.
    pub fn object_i64(&self, path: &str) -> Option<i64> {
        lookup(&self.data.object, path).and_then(Value::as_i64)
    }

    pub fn object_bool(&self, path: &str) -> Option<bool> {
        lookup(&self.data.object, path).and_then(Value::as_bool)
    }

    /// Returns true if `previous_attributes` names `field`.
    pub fn changed(&self, field: &str) -> bool {
        self.data
            .previous_attributes
            .as_ref()
            .and_then(Value::as_object)
            .map(|attrs| attrs.contains_key(field))
            .unwrap_or(false)
    }

    /// Reads a string from `previous_attributes`.
    pub fn previous_str(&self, field: &str) -> Option<&str> {
        self.data
            .previous_attributes
            .as_ref()
            .and_then(|attrs| attrs.get(field))
            .and_then(Value::as_str)
    }

    /// Id of an expandable field: either the bare id string or the `id` of
    /// the expanded object.
    pub fn object_ref(&self, field: &str) -> Option<&str> {
        match self.data.object.get(field)? {
            Value::String(id) => Some(id.as_str()),
            Value::Object(obj) => obj.get("id").and_then(Value::as_str),
            _ => None,
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Builder for creating test StripeEvent instances.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: Value,
    previous_attributes: Option<Value>,
}

#[cfg(test)]
impl Default for StripeEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_123".to_string(),
            event_type: "checkout.session.completed".to_string(),
            created: 1_700_000_000,
            object: serde_json::json!({}),
            previous_attributes: None,
        }
    }
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn object(mut self, object: Value) -> Self {
        self.object = object;
        self
    }

    pub fn previous_attributes(mut self, attrs: Value) -> Self {
        self.previous_attributes = Some(attrs);
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: StripeEventData {
                object: self.object,
                previous_attributes: self.previous_attributes,
            },
            livemode: false,
            api_version: Some("2023-10-16".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_minimal_envelope() {
        let raw = json!({
            "id": "evt_1",
            "type": "invoice.paid",
            "created": 1700000000,
            "data": { "object": { "id": "in_1" } }
        });
        let event: StripeEvent = serde_json::from_value(raw).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "invoice.paid");
        assert!(!event.livemode);
        assert!(event.data.previous_attributes.is_none());
    }

    #[test]
    fn object_str_walks_nested_arrays() {
        let event = StripeEventBuilder::new()
            .object(json!({ "lines": { "data": [ { "price": { "id": "price_a" } } ] } }))
            .build();

        assert_eq!(event.object_str("lines.data.0.price.id"), Some("price_a"));
        assert_eq!(event.object_str("lines.data.1.price.id"), None);
        assert_eq!(event.object_str("lines.missing"), None);
    }

    #[test]
    fn object_ref_accepts_id_or_expanded_object() {
        let bare = StripeEventBuilder::new().object(json!({ "customer": "cus_1" })).build();
        let expanded = StripeEventBuilder::new()
            .object(json!({ "customer": { "id": "cus_2", "email": "a@b.c" } }))
            .build();

        assert_eq!(bare.object_ref("customer"), Some("cus_1"));
        assert_eq!(expanded.object_ref("customer"), Some("cus_2"));
        assert_eq!(bare.object_ref("subscription"), None);
    }

    #[test]
    fn changed_reads_previous_attributes() {
        let event = StripeEventBuilder::new()
            .previous_attributes(json!({ "cancel_at_period_end": false, "status": "active" }))
            .build();

        assert!(event.changed("cancel_at_period_end"));
        assert!(!event.changed("items"));
        assert_eq!(event.previous_str("status"), Some("active"));
    }
}
