//! Event-kind type registry.
//!
//! Maps an event kind to a descriptor able to rebuild the concrete payload
//! type from serialized bytes. Brokers consult it for every inbound message.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::CourierError;
use crate::event::{self, DomainEvent};

/// Type-erased payload produced by a [`TypeDescriptor`].
pub type ErasedPayload = Box<dyn Any + Send>;

type DecodeFn = fn(&str, &[u8]) -> Result<ErasedPayload, CourierError>;

/// Reusable description of the type registered under an event kind.
#[derive(Clone)]
pub struct TypeDescriptor {
    kind: String,
    type_name: &'static str,
    type_id: TypeId,
    decode: DecodeFn,
}

impl TypeDescriptor {
    /// Describes `E` under the given kind.
    #[must_use]
    pub fn of<E: DomainEvent>(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            type_name: std::any::type_name::<E>(),
            type_id: TypeId::of::<E>(),
            decode: decode_erased::<E>,
        }
    }

    /// The event kind this descriptor is bound to.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Rust type name of the payload, for diagnostics only.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type id of the payload.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if this descriptor rebuilds values of type `E`.
    #[must_use]
    pub fn is<E: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Rebuilds a payload from its serialized body.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Deserialization` if `data` does not match the
    /// registered type.
    pub fn decode(&self, data: &[u8]) -> Result<ErasedPayload, CourierError> {
        (self.decode)(&self.kind, data)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

fn decode_erased<E: DomainEvent>(kind: &str, data: &[u8]) -> Result<ErasedPayload, CourierError> {
    let payload: E = event::decode(kind, data)?;
    Ok(Box::new(payload))
}

/// Thread-safe map from event kind to [`TypeDescriptor`].
///
/// A single lock guards the map: writes happen once per registration and
/// reads once per inbound message.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    items: Mutex<HashMap<String, TypeDescriptor>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `E` to `kind`, returning the previous binding if one existed.
    pub fn put<E: DomainEvent>(&self, kind: impl Into<String>) -> Option<TypeDescriptor> {
        self.insert(TypeDescriptor::of::<E>(kind))
    }

    /// Binds the type of `sample` to the kind it serializes with.
    ///
    /// # Errors
    ///
    /// Returns `CourierError::Serialization` if the sample cannot be encoded.
    pub fn put_sample<E: DomainEvent>(
        &self,
        sample: &E,
    ) -> Result<Option<TypeDescriptor>, CourierError> {
        let encoded = event::encode(sample)?;
        Ok(self.put::<E>(encoded.kind))
    }

    /// Inserts a prepared descriptor, overwriting any binding for its kind.
    pub fn insert(&self, descriptor: TypeDescriptor) -> Option<TypeDescriptor> {
        let previous = self
            .lock()
            .insert(descriptor.kind.clone(), descriptor.clone());
        if let Some(previous) = &previous {
            if previous.type_id != descriptor.type_id {
                tracing::debug!(
                    kind = %descriptor.kind,
                    previous = previous.type_name,
                    current = descriptor.type_name,
                    "event kind rebound to a different type"
                );
            }
        }
        previous
    }

    /// Resolves a kind to its descriptor.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<TypeDescriptor> {
        self.lock().get(kind).cloned()
    }

    /// Returns `true` if `kind` is bound.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.lock().contains_key(kind)
    }

    /// All bound kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.lock().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Number of bound kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The map stays consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, TypeDescriptor>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
