//! Domain event abstractions and the out-of-band kind codec.
//!
//! Domain events are adjacently tagged serde enums:
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! #[serde(tag = "type", content = "data")]
//! enum AccountEvent {
//!     #[serde(rename = "account.opened")]
//!     Opened(AccountOpened),
//! }
//! ```
//!
//! The tag is the event *kind*: a stable string chosen by the author, used as
//! the storage type tag and the broker subject. [`encode`] moves the tag out of
//! band and keeps the variant body as field-named JSON bytes; [`decode`]
//! reverses it.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BoxError, CourierError};

/// Name of the tag field in adjacently tagged event enums.
pub const KIND_FIELD: &str = "type";

/// Name of the content field in adjacently tagged event enums.
pub const DATA_FIELD: &str = "data";

/// Marker trait that all domain event payloads implement.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
}

/// One state change: a payload and its position in the aggregate history.
///
/// Freshly recorded events carry version 0 until the aggregate engine stamps
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<E> {
    version: i64,
    payload: E,
}

impl<E> Event<E> {
    /// Wraps a payload that has not been assigned a version yet.
    #[must_use]
    pub fn new(payload: E) -> Self {
        Self {
            version: 0,
            payload,
        }
    }

    /// Wraps a payload at a known version, e.g. one loaded from storage.
    #[must_use]
    pub fn with_version(payload: E, version: i64) -> Self {
        Self { version, payload }
    }

    /// Position of this event in its aggregate's history.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The domain payload.
    #[must_use]
    pub fn payload(&self) -> &E {
        &self.payload
    }

    /// Consumes the event, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> E {
        self.payload
    }

    pub(crate) fn stamp(&mut self, version: i64) {
        self.version = version;
    }
}

/// An event payload split into its kind and serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    /// The event kind taken from the serde tag.
    pub kind: String,
    /// Field-named JSON of the variant body (`null` for unit variants).
    pub data: Vec<u8>,
}

/// Serializes a domain event, separating its kind from its body.
///
/// # Errors
///
/// Returns `CourierError::Serialization` if the payload fails to serialize or
/// is not an adjacently tagged enum.
pub fn encode<E: Serialize>(event: &E) -> Result<EncodedEvent, CourierError> {
    let value = serde_json::to_value(event).map_err(CourierError::Serialization)?;
    let Value::Object(mut fields) = value else {
        return Err(untagged());
    };
    let Some(Value::String(kind)) = fields.remove(KIND_FIELD) else {
        return Err(untagged());
    };
    let body = fields.remove(DATA_FIELD).unwrap_or(Value::Null);
    let data = serde_json::to_vec(&body).map_err(CourierError::Serialization)?;
    Ok(EncodedEvent { kind, data })
}

/// Rebuilds a domain event from its kind and serialized body.
///
/// # Errors
///
/// Returns `CourierError::Deserialization` if the body is not valid JSON or
/// does not match any variant of `E` tagged with `kind`.
pub fn decode<E: DeserializeOwned>(kind: &str, data: &[u8]) -> Result<E, CourierError> {
    let deserialization = |source| CourierError::Deserialization {
        kind: kind.to_owned(),
        source,
    };
    let body: Value = serde_json::from_slice(data).map_err(deserialization)?;
    let mut tagged = serde_json::Map::new();
    tagged.insert(KIND_FIELD.to_owned(), Value::String(kind.to_owned()));
    if !body.is_null() {
        tagged.insert(DATA_FIELD.to_owned(), body);
    }
    serde_json::from_value(Value::Object(tagged)).map_err(deserialization)
}

fn untagged() -> CourierError {
    CourierError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
        "event payload must be an adjacently tagged enum with a string `type` field",
    ))
}

/// Subscriber callback for one event type.
///
/// Implemented for any `Fn(Event<E>) -> Result<(), BoxError>` closure.
#[async_trait]
pub trait EventProcessor<E: DomainEvent>: Send + Sync {
    /// Handles one delivered event.
    async fn process(&self, event: Event<E>) -> Result<(), BoxError>;
}

#[async_trait]
impl<E, F> EventProcessor<E> for F
where
    E: DomainEvent,
    F: Fn(Event<E>) -> Result<(), BoxError> + Send + Sync,
{
    async fn process(&self, event: Event<E>) -> Result<(), BoxError> {
        self(event)
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::{Credited, LedgerEvent};
    use super::*;

    #[test]
    fn test_encode_moves_kind_out_of_band() {
        // Arrange
        let event = LedgerEvent::Credited(Credited { amount: 42 });

        // Act
        let encoded = encode(&event).unwrap();

        // Assert
        assert_eq!(encoded.kind, "ledger.credited");
        let body: Value = serde_json::from_slice(&encoded.data).unwrap();
        assert_eq!(body, serde_json::json!({ "amount": 42 }));
    }

    #[test]
    fn test_decode_rebuilds_newtype_and_unit_variants() {
        let credited: LedgerEvent = decode("ledger.credited", br#"{"amount":7}"#).unwrap();
        let frozen: LedgerEvent = decode("ledger.frozen", b"null").unwrap();

        assert_eq!(credited, LedgerEvent::Credited(Credited { amount: 7 }));
        assert_eq!(frozen, LedgerEvent::Frozen);
    }

    #[test]
    fn test_unit_variant_encodes_null_body() {
        let encoded = encode(&LedgerEvent::Frozen).unwrap();

        assert_eq!(encoded.kind, "ledger.frozen");
        assert_eq!(encoded.data, b"null");
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let result: Result<LedgerEvent, _> = decode("ledger.debited", br#"{"amount":7}"#);

        match result {
            Err(CourierError::Deserialization { kind, .. }) => assert_eq!(kind, "ledger.debited"),
            other => panic!("expected Deserialization, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_mismatched_body() {
        let result: Result<LedgerEvent, _> = decode("ledger.credited", br#"{"amount":"lots"}"#);

        assert!(matches!(
            result,
            Err(CourierError::Deserialization { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_untagged_payloads() {
        #[derive(Serialize)]
        struct Plain {
            amount: u64,
        }

        let result = encode(&Plain { amount: 1 });

        assert!(matches!(result, Err(CourierError::Serialization(_))));
    }

    #[test]
    fn test_event_versions() {
        let mut event = Event::new(LedgerEvent::Frozen);
        assert_eq!(event.version(), 0);

        event.stamp(4);

        assert_eq!(event.version(), 4);
        assert_eq!(Event::with_version(LedgerEvent::Frozen, 9).version(), 9);
    }

    #[tokio::test]
    async fn test_closures_are_event_processors() {
        let processor = |event: Event<LedgerEvent>| -> Result<(), BoxError> {
            if event.version() == 0 {
                return Err("unversioned".into());
            }
            Ok(())
        };

        let versioned = Event::with_version(LedgerEvent::Frozen, 1);
        let unversioned = Event::new(LedgerEvent::Frozen);

        assert!(EventProcessor::<LedgerEvent>::process(&processor, versioned).await.is_ok());
        assert!(EventProcessor::<LedgerEvent>::process(&processor, unversioned).await.is_err());
    }
}
