//! JSON body policy.
//!
//! Field naming and enum encoding are carried by the models themselves
//! (`#[serde(rename_all = "camelCase")]` on structs, variant names on
//! enums). The options here cover what serde leaves open: dropping nulls on
//! write and lenient reading.
//!
//! Case-insensitive reading only touches struct members: a member is
//! renamed to the declared field it matches ignoring ASCII case. Keys of
//! maps (metadata, balances keyed by currency)
//! are data and come through unchanged.

use std::borrow::Cow;

use serde::de::{self, DeserializeOwned, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::forward_to_deserialize_any;
use serde::Serialize;
use serde_json::{Map, Value};

/// Fixed serialization contract shared by every request a client issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Drop object members whose value is `null` when writing.
    pub omit_nulls: bool,

    /// Match incoming member names against declared fields regardless of case.
    pub case_insensitive: bool,

    /// Accept `[1, 2,]` and `{"a": 1,}` when reading.
    pub allow_trailing_commas: bool,

    /// Accept `//` and `/* */` comments when reading.
    pub skip_comments: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            omit_nulls: true,
            case_insensitive: true,
            allow_trailing_commas: true,
            skip_comments: true,
        }
    }
}

/// Serializer applying [`SerializerOptions`].
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    options: SerializerOptions,
}

impl JsonSerializer {
    pub fn new(options: SerializerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    pub fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error> {
        if !self.options.omit_nulls {
            return serde_json::to_vec(value);
        }
        let mut value = serde_json::to_value(value)?;
        strip_nulls(&mut value);
        serde_json::to_vec(&value)
    }

    /// Deserialize a body. An empty body reads as `null`.
    pub fn from_slice<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, serde_json::Error> {
        let mut text: Cow<'_, [u8]> = Cow::Borrowed(bytes);
        if self.options.skip_comments {
            text = Cow::Owned(strip_comments(&text));
        }
        if self.options.allow_trailing_commas {
            text = Cow::Owned(strip_trailing_commas(&text));
        }
        if text.iter().all(u8::is_ascii_whitespace) {
            text = Cow::Borrowed(b"null");
        }

        if !self.options.case_insensitive {
            return serde_json::from_slice(&text);
        }
        let value: Value = serde_json::from_slice(&text)?;
        T::deserialize(CaseInsensitive(value))
    }
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Deserializer over a parsed [`Value`] that matches struct members against
/// the declared field names ignoring ASCII case.
///
/// serde hands the field list to `deserialize_struct`, so only those keys
/// are ever renamed. Maps go through `deserialize_map` untouched. Enum
/// payloads are read by `serde_json` directly.
struct CaseInsensitive(Value);

impl<'de> Deserializer<'de> for CaseInsensitive {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Array(items) => visitor.visit_seq(SeqAccessor(items.into_iter())),
            Value::Object(map) => visitor.visit_map(MapAccessor::new(map)),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(CaseInsensitive(other)),
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
            Value::Object(map) => {
                let map: Map<String, Value> = map
                    .into_iter()
                    .map(|(key, value)| (match_field(key, fields), value))
                    .collect();
                visitor.visit_map(MapAccessor::new(map))
            }
            other => CaseInsensitive(other).deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_enum(name, variants, visitor)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier
        ignored_any
    }
}

/// The declared field `key` stands for, or `key` itself when none matches.
fn match_field(key: String, fields: &'static [&'static str]) -> String {
    if fields.iter().any(|field| *field == key) {
        return key;
    }
    match fields.iter().find(|field| field.eq_ignore_ascii_case(&key)) {
        Some(field) => (*field).to_string(),
        None => key,
    }
}

struct SeqAccessor(std::vec::IntoIter<Value>);

impl<'de> SeqAccess<'de> for SeqAccessor {
    type Error = serde_json::Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error> {
        self.0
            .next()
            .map(|value| seed.deserialize(CaseInsensitive(value)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.0.len())
    }
}

struct MapAccessor {
    entries: serde_json::map::IntoIter,
    value: Option<Value>,
}

impl MapAccessor {
    fn new(map: Map<String, Value>) -> Self {
        Self {
            entries: map.into_iter(),
            value: None,
        }
    }
}

impl<'de> MapAccess<'de> for MapAccessor {
    type Error = serde_json::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error> {
        match self.entries.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(Value::String(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        match self.value.take() {
            Some(value) => seed.deserialize(CaseInsensitive(value)),
            None => Err(de::Error::custom("map value requested before its key")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// Remove `//` and `/* */` comments outside of string literals.
fn strip_comments(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    let mut in_string = false;

    while i < input.len() {
        let b = input[i];
        if in_string {
            out.push(b);
            if b == b'\\' && i + 1 < input.len() {
                out.push(input[i + 1]);
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (b, input.get(i + 1)) {
            (b'"', _) => {
                in_string = true;
                out.push(b);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < input.len() && input[i] != b'\n' {
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                i += 2;
                while i < input.len() && !(input[i] == b'*' && input.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
                out.push(b' ');
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Remove commas directly followed (ignoring whitespace) by `]` or `}`.
fn strip_trailing_commas(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in input.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            out.push(b);
            continue;
        }

        if b == b'"' {
            in_string = true;
        } else if b == b',' {
            let next = input[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
            if matches!(next, Some(b']') | Some(b'}')) {
                continue;
            }
        }
        out.push(b);
    }
    out
}
