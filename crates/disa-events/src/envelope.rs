//! The event envelope and its JSON wire codec.
//!
//! Every message on the bus is a JSON object:
//!
//! ```text
//! { "eventType": "incident.created", "timestamp": "2025-01-01T10:00:00.000Z", "payload": { ... } }
//! ```
//!
//! `eventType` repeats the routing key. Decoding dispatches on it, falling
//! back to the transport routing key when a producer left it out.
//! Timestamps are written as RFC 3339 in UTC; the decoder also accepts
//! zone-less ISO-8601 strings and `[y, m, d, h, min, s, nanos]` arrays, both
//! of which older producers emit.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::RoutingKey;
use crate::error::CodecError;
use crate::payload::{
    AssessmentCompleted, IncidentCreated, IncidentEscalated, PersonnelStatusChanged,
    ResourceCriticalLow, TaskAssigned,
};

/// A choreography event: one variant per routing key.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new incident was reported.
    IncidentCreated(IncidentCreated),
    /// An incident's severity went up one step.
    IncidentEscalated(IncidentEscalated),
    /// An assessment was completed.
    AssessmentCompleted(AssessmentCompleted),
    /// A resource's stock is below its threshold.
    ResourceCriticalLow(ResourceCriticalLow),
    /// A task was assigned to a person.
    TaskAssigned(TaskAssigned),
    /// A person was registered, changed or removed.
    PersonnelStatusChanged(PersonnelStatusChanged),
}

impl Event {
    /// The routing key this event is published under.
    pub const fn routing_key(&self) -> RoutingKey {
        match self {
            Self::IncidentCreated(_) => RoutingKey::IncidentCreated,
            Self::IncidentEscalated(_) => RoutingKey::IncidentEscalated,
            Self::AssessmentCompleted(_) => RoutingKey::AssessmentCompleted,
            Self::ResourceCriticalLow(_) => RoutingKey::ResourceCriticalLow,
            Self::TaskAssigned(_) => RoutingKey::TaskAssigned,
            Self::PersonnelStatusChanged(_) => RoutingKey::PersonnelStatusChanged,
        }
    }

    fn payload_value(&self) -> Result<Value, CodecError> {
        let value = match self {
            Self::IncidentCreated(p) => serde_json::to_value(p)?,
            Self::IncidentEscalated(p) => serde_json::to_value(p)?,
            Self::AssessmentCompleted(p) => serde_json::to_value(p)?,
            Self::ResourceCriticalLow(p) => serde_json::to_value(p)?,
            Self::TaskAssigned(p) => serde_json::to_value(p)?,
            Self::PersonnelStatusChanged(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    fn from_payload(key: RoutingKey, payload: Value) -> Result<Self, CodecError> {
        // A null or missing payload decodes as an empty object; the
        // reaction then reports whichever field it needed.
        let payload = if payload.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            payload
        };
        let event = match key {
            RoutingKey::IncidentCreated => Self::IncidentCreated(serde_json::from_value(payload)?),
            RoutingKey::IncidentEscalated => {
                Self::IncidentEscalated(serde_json::from_value(payload)?)
            }
            RoutingKey::AssessmentCompleted => {
                Self::AssessmentCompleted(serde_json::from_value(payload)?)
            }
            RoutingKey::ResourceCriticalLow => {
                Self::ResourceCriticalLow(serde_json::from_value(payload)?)
            }
            RoutingKey::TaskAssigned => Self::TaskAssigned(serde_json::from_value(payload)?),
            RoutingKey::PersonnelStatusChanged => {
                Self::PersonnelStatusChanged(serde_json::from_value(payload)?)
            }
        };
        Ok(event)
    }
}

impl From<IncidentCreated> for Event {
    fn from(p: IncidentCreated) -> Self {
        Self::IncidentCreated(p)
    }
}

impl From<IncidentEscalated> for Event {
    fn from(p: IncidentEscalated) -> Self {
        Self::IncidentEscalated(p)
    }
}

impl From<AssessmentCompleted> for Event {
    fn from(p: AssessmentCompleted) -> Self {
        Self::AssessmentCompleted(p)
    }
}

impl From<ResourceCriticalLow> for Event {
    fn from(p: ResourceCriticalLow) -> Self {
        Self::ResourceCriticalLow(p)
    }
}

impl From<TaskAssigned> for Event {
    fn from(p: TaskAssigned) -> Self {
        Self::TaskAssigned(p)
    }
}

impl From<PersonnelStatusChanged> for Event {
    fn from(p: PersonnelStatusChanged) -> Self {
        Self::PersonnelStatusChanged(p)
    }
}

/// An event stamped with its publication time.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// When the producer emitted the event.
    pub timestamp: DateTime<Utc>,
    /// The event itself.
    pub event: Event,
}

/// Raw JSON shape shared by encoder and decoder.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_type: Option<String>,
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    payload: Value,
}

impl EventEnvelope {
    /// Wrap `event` with the current time.
    pub fn now(event: impl Into<Event>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
        }
    }

    /// The routing key of the wrapped event.
    pub const fn routing_key(&self) -> RoutingKey {
        self.event.routing_key()
    }

    /// Serialize to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if a payload cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let wire = WireEnvelope {
            event_type: Some(self.routing_key().as_str().to_owned()),
            timestamp: Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            payload: self.event.payload_value()?,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Parse a message body.
    ///
    /// `routing_key` is the transport's routing attribute and is only used
    /// when the body carries no `eventType`. A missing timestamp is replaced
    /// with the decode time.
    ///
    /// # Errors
    ///
    /// - [`CodecError::Json`] if the body or payload is malformed
    /// - [`CodecError::UnknownEventType`] if the type is not in the contract
    /// - [`CodecError::Timestamp`] if a timestamp is present but unparseable
    pub fn decode(body: &[u8], routing_key: Option<&str>) -> Result<Self, CodecError> {
        let wire: WireEnvelope = serde_json::from_slice(body)?;
        let event_type = wire
            .event_type
            .as_deref()
            .or(routing_key)
            .ok_or_else(|| CodecError::UnknownEventType("<none>".to_owned()))?;
        let key: RoutingKey = event_type.parse()?;
        let timestamp = parse_timestamp(&wire.timestamp)?;
        let event = Event::from_payload(key, wire.payload)?;
        Ok(Self { timestamp, event })
    }
}

/// Accept RFC 3339, zone-less ISO-8601 (read as UTC), or a date-time array.
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, CodecError> {
    match value {
        Value::Null => Ok(Utc::now()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc())
            })
            .map_err(|e| CodecError::Timestamp(format!("{s}: {e}"))),
        Value::Array(parts) => parse_timestamp_array(parts)
            .ok_or_else(|| CodecError::Timestamp(format!("invalid date-time array: {value}"))),
        other => Err(CodecError::Timestamp(format!("unsupported timestamp: {other}"))),
    }
}

fn parse_timestamp_array(parts: &[Value]) -> Option<DateTime<Utc>> {
    let field = |i: usize| -> Option<u32> {
        match parts.get(i) {
            None => Some(0),
            Some(v) => v.as_u64().and_then(|n| u32::try_from(n).ok()),
        }
    };
    let year = parts
        .first()
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok())?;
    let date = NaiveDate::from_ymd_opt(year, field(1)?, field(2)?)?;
    let time = date.and_hms_nano_opt(field(3)?, field(4)?, field(5)?, field(6)?)?;
    Some(time.and_utc())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use disa_types::{IncidentId, Severity};

    use super::*;

    fn created() -> IncidentCreated {
        IncidentCreated {
            incident_id: Some(IncidentId::new(1)),
            incident_code: Some("INC-001".to_owned()),
            severity: Some(Severity::High),
            latitude: Some(6.9271),
            longitude: Some(79.8612),
            address: Some("Galle Road, Colombo".to_owned()),
            ..IncidentCreated::default()
        }
    }

    #[test]
    fn encoded_envelope_has_wire_shape() {
        let envelope = EventEnvelope::now(created());
        let body = envelope.encode().unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["eventType"], "incident.created");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(json["payload"]["incidentCode"], "INC-001");
        assert_eq!(json["payload"]["severity"], "HIGH");
    }

    #[test]
    fn decode_restores_the_event() {
        let envelope = EventEnvelope::now(created());
        let body = envelope.encode().unwrap();
        let decoded = EventEnvelope::decode(&body, None).unwrap();
        assert_eq!(decoded.event, envelope.event);
        assert_eq!(decoded.timestamp.timestamp_millis(), envelope.timestamp.timestamp_millis());
    }

    #[test]
    fn decode_accepts_naive_and_array_timestamps() {
        let naive = br#"{"eventType":"task.assigned","timestamp":"2025-03-01T08:15:30.123","payload":{"taskId":"TSK-004","assignedTo":"PER-301"}}"#;
        let env = EventEnvelope::decode(naive, None).unwrap();
        assert_eq!(env.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true), "2025-03-01T08:15:30.123Z");

        let array = br#"{"eventType":"task.assigned","timestamp":[2025,3,1,8,15,30],"payload":{}}"#;
        let env = EventEnvelope::decode(array, None).unwrap();
        assert_eq!(env.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true), "2025-03-01T08:15:30Z");
    }

    #[test]
    fn decode_falls_back_to_routing_key() {
        let body = br#"{"payload":{"resourceId":3,"currentStock":40,"threshold":50}}"#;
        let env = EventEnvelope::decode(body, Some("resource.critical_low")).unwrap();
        match env.event {
            Event::ResourceCriticalLow(p) => assert_eq!(p.current_stock, Some(40)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_types_and_garbage() {
        let unknown = br#"{"eventType":"incident.deleted","payload":{}}"#;
        assert!(matches!(
            EventEnvelope::decode(unknown, None),
            Err(CodecError::UnknownEventType(t)) if t == "incident.deleted"
        ));
        assert!(matches!(EventEnvelope::decode(b"not json", None), Err(CodecError::Json(_))));
        let bad_ts = br#"{"eventType":"task.assigned","timestamp":"yesterday","payload":{}}"#;
        assert!(matches!(EventEnvelope::decode(bad_ts, None), Err(CodecError::Timestamp(_))));
    }

    #[test]
    fn unknown_enum_value_does_not_fail_the_message() {
        let body = br#"{"eventType":"incident.created","payload":{"incidentId":9,"type":"VOLCANO","latitude":6.9,"longitude":79.8}}"#;
        let env = EventEnvelope::decode(body, None).unwrap();
        let Event::IncidentCreated(p) = env.event else {
            panic!("expected incident.created");
        };
        assert_eq!(p.incident_id, Some(IncidentId::new(9)));
        assert!(p.incident_type.is_none());
        assert_eq!(p.longitude, Some(79.8));
    }

    #[test]
    fn null_payload_decodes_with_empty_fields() {
        let body = br#"{"eventType":"assessment.completed","payload":null}"#;
        let env = EventEnvelope::decode(body, None).unwrap();
        assert_eq!(env.event, Event::AssessmentCompleted(AssessmentCompleted::default()));
    }
}
