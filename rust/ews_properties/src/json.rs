/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The legacy JSON representation of EWS objects.
//!
//! Objects are plain JSON maps. Polymorphic values carry their type under the
//! [`TYPE_KEY`] key, in the form `TypeName:#Exchange`.

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// The key under which an object's type discriminator is stored.
pub const TYPE_KEY: &str = "__type";

const TYPE_NAMESPACE_SUFFIX: &str = ":#Exchange";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JsonObject(Map<String, Value>);

impl JsonObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document whose root is an object.
    pub fn parse(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)?;

        Self::try_from(value)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn add(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_owned(), value.into());
    }

    /// Sets `key` to `value` unless `value` is `None`.
    pub fn add_optional(&mut self, key: &str, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.add(key, value);
        }
    }

    pub fn add_base64(&mut self, key: &str, content: &[u8]) {
        self.add(key, STANDARD.encode(content));
    }

    /// Records the type of this object.
    pub fn add_type_parameter(&mut self, type_name: &str) {
        self.add(TYPE_KEY, format!("{type_name}{TYPE_NAMESPACE_SUFFIX}"));
    }

    /// The type name recorded in this object, without its namespace suffix.
    pub fn read_type_string(&self) -> Option<&str> {
        let type_string = self.0.get(TYPE_KEY)?.as_str()?;

        Some(
            type_string
                .split_once(':')
                .map_or(type_string, |(name, _)| name),
        )
    }

    pub fn read_as_string(&self, key: &str) -> Result<&str> {
        let value = self.get(key)?;

        value.as_str().ok_or_else(|| unexpected_type(key, value))
    }

    /// Reads a string value, treating a missing key or `null` as absent.
    pub fn read_as_optional_string(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| unexpected_type(key, value)),
        }
    }

    pub fn read_as_bool(&self, key: &str) -> Result<bool> {
        let value = self.get(key)?;

        value.as_bool().ok_or_else(|| unexpected_type(key, value))
    }

    pub fn read_as_int(&self, key: &str) -> Result<i64> {
        let value = self.get(key)?;

        value.as_i64().ok_or_else(|| unexpected_type(key, value))
    }

    pub fn read_as_double(&self, key: &str) -> Result<f64> {
        let value = self.get(key)?;

        value.as_f64().ok_or_else(|| unexpected_type(key, value))
    }

    pub fn read_as_json_object(&self, key: &str) -> Result<JsonObject> {
        let value = self.get(key)?;

        match value {
            Value::Object(map) => Ok(JsonObject(map.clone())),
            _ => Err(unexpected_type(key, value)),
        }
    }

    pub fn read_as_array(&self, key: &str) -> Result<&[Value]> {
        let value = self.get(key)?;

        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| unexpected_type(key, value))
    }

    /// Reads a string value and parses it into an enumeration.
    pub fn read_enum_value<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self.read_as_string(key)?;

        value.parse().map_err(|_| Error::InvalidValue {
            name: key.to_owned(),
            value: value.to_owned(),
        })
    }

    pub fn read_as_base64(&self, key: &str) -> Result<Vec<u8>> {
        let value = self.read_as_string(key)?;

        Ok(STANDARD.decode(value)?)
    }

    fn get(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| Error::MissingJsonKey(key.to_owned()))
    }
}

impl TryFrom<Value> for JsonObject {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(JsonObject(map)),
            other => Err(Error::UnexpectedJsonType {
                key: String::new(),
                value: other.to_string(),
            }),
        }
    }
}

impl From<JsonObject> for Value {
    fn from(value: JsonObject) -> Self {
        Value::Object(value.0)
    }
}

fn unexpected_type(key: &str, value: &Value) -> Error {
    Error::UnexpectedJsonType {
        key: key.to_owned(),
        value: value.to_string(),
    }
}
