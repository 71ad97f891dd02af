//! Payload encodings: how typed items become queue bodies and back.
//!
//! Every type carried by a hybrid queue implements [`QueuePayload`]. The trait's
//! [`PayloadKind`] drives routing statically:
//!
//! - [`PayloadKind::Text`] (`String`) travels as-is.
//! - [`PayloadKind::Scalar`] (integers, floats, `bool`, `char`, [`Decimal`]) travels
//!   as its `Display` form and is read back with `FromStr`.
//! - [`PayloadKind::Structured`] types travel as JSON and are read back with
//!   case-insensitive field matching.
//!
//! Structured types opt in through the [`Json`] wrapper or the
//! [`structured_payload!`](crate::structured_payload) macro.

use crate::error::HybridQueueError;
use rust_decimal::Decimal;
use serde::de::value::StringDeserializer;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, EnumAccess, IntoDeserializer,
    MapAccess, SeqAccess, Unexpected, VariantAccess, Visitor,
};
use serde::{forward_to_deserialize_any, Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;

/// Error produced while reading JSON payloads
pub type JsonError = serde_json::Error;

/// How a payload type is carried on the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Plain text, sent without any transformation
    Text,
    /// A primitive value in its canonical text form
    Scalar,
    /// A JSON document
    Structured,
}

impl PayloadKind {
    /// Text and scalars are "simple": read back with a native conversion, not JSON
    pub fn is_simple(self) -> bool {
        !matches!(self, Self::Structured)
    }
}

/// A type that can be carried by a hybrid queue
pub trait QueuePayload: Sized + Send + Sync {
    /// Routing class of the type
    const KIND: PayloadKind;

    /// Natural inline form: the text itself, a scalar's `Display` form or JSON
    fn to_inline(&self) -> Result<Cow<'_, str>, HybridQueueError>;

    /// JSON form, used for every overflow object
    ///
    /// Fails with [`HybridQueueError::InvalidArgument`] when the item encodes to
    /// JSON `null`.
    fn to_json(&self) -> Result<String, HybridQueueError>;

    /// Rebuild a value from an inline queue body
    fn from_inline(body: String) -> Result<Self, HybridQueueError>;

    /// Rebuild a value from a JSON document, matching field names case-insensitively
    fn from_json(json: &[u8]) -> Result<Self, JsonError>;
}

// ============================================================================
// JSON Helpers
// ============================================================================

/// Serialize `value` to JSON, treating `null` as an absent item
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HybridQueueError> {
    let json = serde_json::to_string(value).map_err(HybridQueueError::Serialization)?;
    if json == "null" {
        return Err(HybridQueueError::invalid_argument(
            "item",
            "item is absent (it encodes to JSON null)",
        ));
    }
    Ok(json)
}

/// Deserialize a JSON document into `T` with case-insensitive struct fields
///
/// A document that is JSON `null` is rejected even when `T` could represent it.
pub fn decode_json<T: DeserializeOwned>(json: &[u8]) -> Result<T, JsonError> {
    let value: Value = serde_json::from_slice(json)?;
    if value.is_null() {
        return Err(de::Error::custom("payload is JSON null"));
    }
    T::deserialize(CaseInsensitive(value))
}

/// [`decode_json`] for an inline body, reporting failures as conversion errors
pub fn decode_json_text<T: DeserializeOwned>(body: &str) -> Result<T, HybridQueueError> {
    decode_json(body.as_bytes()).map_err(|e| {
        HybridQueueError::conversion(std::any::type_name::<T>(), body, e.to_string())
    })
}

// ============================================================================
// Text and Scalar Payloads
// ============================================================================

impl QueuePayload for String {
    const KIND: PayloadKind = PayloadKind::Text;

    fn to_inline(&self) -> Result<Cow<'_, str>, HybridQueueError> {
        Ok(Cow::Borrowed(self.as_str()))
    }

    fn to_json(&self) -> Result<String, HybridQueueError> {
        encode_json(self)
    }

    fn from_inline(body: String) -> Result<Self, HybridQueueError> {
        Ok(body)
    }

    fn from_json(json: &[u8]) -> Result<Self, JsonError> {
        decode_json(json)
    }
}

macro_rules! scalar_payload {
    ($($ty:ty),* $(,)?) => {$(
        impl QueuePayload for $ty {
            const KIND: PayloadKind = PayloadKind::Scalar;

            fn to_inline(&self) -> Result<Cow<'_, str>, HybridQueueError> {
                Ok(Cow::Owned(self.to_string()))
            }

            fn to_json(&self) -> Result<String, HybridQueueError> {
                encode_json(self)
            }

            fn from_inline(body: String) -> Result<Self, HybridQueueError> {
                body.parse::<$ty>().map_err(|e| {
                    HybridQueueError::conversion(stringify!($ty), &body, e.to_string())
                })
            }

            fn from_json(json: &[u8]) -> Result<Self, JsonError> {
                decode_json(json)
            }
        }
    )*};
}

scalar_payload!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, char, Decimal);

// ============================================================================
// Structured Payloads
// ============================================================================

/// Implement [`QueuePayload`] as a structured (JSON) payload for one or more types
///
/// The types must implement `Serialize` and `DeserializeOwned`.
///
/// ```rust
/// use hybrid_queue_core::structured_payload;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Order {
///     id: u64,
///     sku: String,
/// }
///
/// structured_payload!(Order);
/// ```
#[macro_export]
macro_rules! structured_payload {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::payload::QueuePayload for $ty {
            const KIND: $crate::payload::PayloadKind = $crate::payload::PayloadKind::Structured;

            fn to_inline(
                &self,
            ) -> ::std::result::Result<::std::borrow::Cow<'_, str>, $crate::HybridQueueError> {
                $crate::payload::encode_json(self).map(::std::borrow::Cow::Owned)
            }

            fn to_json(&self) -> ::std::result::Result<::std::string::String, $crate::HybridQueueError> {
                $crate::payload::encode_json(self)
            }

            fn from_inline(
                body: ::std::string::String,
            ) -> ::std::result::Result<Self, $crate::HybridQueueError> {
                $crate::payload::decode_json_text(&body)
            }

            fn from_json(json: &[u8]) -> ::std::result::Result<Self, $crate::payload::JsonError> {
                $crate::payload::decode_json(json)
            }
        }
    )*};
}

structured_payload!(Value);

/// Wrapper carrying any serde type as a structured payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the carried value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for Json<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> QueuePayload for Json<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    const KIND: PayloadKind = PayloadKind::Structured;

    fn to_inline(&self) -> Result<Cow<'_, str>, HybridQueueError> {
        encode_json(&self.0).map(Cow::Owned)
    }

    fn to_json(&self) -> Result<String, HybridQueueError> {
        encode_json(&self.0)
    }

    fn from_inline(body: String) -> Result<Self, HybridQueueError> {
        decode_json_text(&body).map(Json)
    }

    fn from_json(json: &[u8]) -> Result<Self, JsonError> {
        decode_json(json).map(Json)
    }
}

// ============================================================================
// Case-Insensitive Deserialization
// ============================================================================

/// A JSON value whose object keys are matched against struct fields ignoring ASCII case
///
/// An exact match wins over a case-insensitive one. Keys of maps (as opposed to
/// structs) are passed through untouched. Variant names and the content of
/// externally tagged enum variants are matched the same way. Fields reached
/// through `#[serde(flatten)]`, an internally tagged enum or an untagged enum are
/// buffered by serde without their field list and must match exactly.
struct CaseInsensitive(Value);

impl<'de> Deserializer<'de> for CaseInsensitive {
    type Error = JsonError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => visitor.visit_map(FieldMap::new(map, &[])),
            Value::Array(items) => visitor.visit_seq(Elements(items.into_iter())),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Object(map) => visitor.visit_map(FieldMap::new(map, fields)),
            other => CaseInsensitive(other).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let (variant, content) = match self.0 {
            Value::String(variant) => (variant, None),
            Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
                Some((variant, content)) => (variant, Some(content)),
                None => return Err(de::Error::invalid_length(0, &"one variant key")),
            },
            Value::Object(map) => {
                return Err(de::Error::invalid_length(map.len(), &"one variant key"))
            }
            other => return Err(de::Error::invalid_type(unexpected(&other), &"enum")),
        };

        visitor.visit_enum(Variant {
            name: canonical_name(variants, variant),
            content,
        })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier ignored_any
    }
}

struct FieldMap {
    entries: serde_json::map::IntoIter,
    fields: &'static [&'static str],
    pending: Option<Value>,
}

impl FieldMap {
    fn new(map: serde_json::Map<String, Value>, fields: &'static [&'static str]) -> Self {
        Self {
            entries: map.into_iter(),
            fields,
            pending: None,
        }
    }

    fn canonical_key(&self, key: String) -> String {
        canonical_name(self.fields, key)
    }
}

fn canonical_name(names: &'static [&'static str], key: String) -> String {
    if names.contains(&key.as_str()) {
        return key;
    }
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(&key))
        .map(|name| name.to_string())
        .unwrap_or(key)
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

impl<'de> MapAccess<'de> for FieldMap {
    type Error = JsonError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        let Some((key, value)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some(value);

        let key: StringDeserializer<JsonError> = self.canonical_key(key).into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, Self::Error> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| de::Error::custom("map value requested before its key"))?;
        seed.deserialize(CaseInsensitive(value))
    }
}

struct Elements(std::vec::IntoIter<Value>);

impl<'de> SeqAccess<'de> for Elements {
    type Error = JsonError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        self.0
            .next()
            .map(|value| seed.deserialize(CaseInsensitive(value)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

/// An externally tagged enum value: the variant name and its content, if any
struct Variant {
    name: String,
    content: Option<Value>,
}

impl<'de> EnumAccess<'de> for Variant {
    type Error = JsonError;
    type Variant = VariantContent;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let name: StringDeserializer<JsonError> = self.name.into_deserializer();
        let variant = seed.deserialize(name)?;
        Ok((variant, VariantContent(self.content)))
    }
}

struct VariantContent(Option<Value>);

impl<'de> VariantAccess<'de> for VariantContent {
    type Error = JsonError;

    fn unit_variant(self) -> Result<(), Self::Error> {
        match self.0 {
            None | Some(Value::Null) => Ok(()),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, Self::Error> {
        match self.0 {
            Some(value) => seed.deserialize(CaseInsensitive(value)),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"newtype variant",
            )),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.0 {
            Some(Value::Array(items)) => visitor.visit_seq(Elements(items.into_iter())),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"tuple variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"tuple variant",
            )),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.0 {
            Some(Value::Object(map)) => visitor.visit_map(FieldMap::new(map, fields)),
            Some(other) => Err(de::Error::invalid_type(unexpected(&other), &"struct variant")),
            None => Err(de::Error::invalid_type(
                Unexpected::UnitVariant,
                &"struct variant",
            )),
        }
    }
}
