/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Change-tracking complex properties for Exchange Web Services.
//!
//! EWS items and folders are made of "complex properties": structured values
//! which know how to read themselves from and write themselves to the EWS XML
//! schema (and the legacy JSON format), and which track their own mutations
//! so that an update request only carries what actually changed.
//!
//! The crate is organized around three generic building blocks:
//!
//! - [`ComplexProperty`] and [`WireCodec`], the node of the object graph and
//!   the hooks through which it is (de)serialized.
//! - [`ComplexPropertyCollection`], an ordered collection of nodes which
//!   records added, modified and removed members.
//! - [`DictionaryProperty`], a keyed collection of entries with the same
//!   change log, addressed in updates through indexed field URIs.
//!
//! Update requests are produced through the [`update`] module, which emits
//! `SetItemField`, `AppendToItemField` and `DeleteItemField` fragments (or
//! their folder equivalents) for a property on behalf of its owner.
//!
//! Node types are single-threaded: change notification is built
//! on `Rc`, and an object graph must only be mutated by one writer at a time.

use thiserror::Error;

mod change;
mod collection;
mod dictionary;
mod property;
mod property_bag;
mod server_version;
mod types;

pub mod json;
pub mod schema;
pub mod update;
pub mod xml;

#[cfg(test)]
mod test_utils;

pub use change::*;
pub use collection::*;
pub use dictionary::*;
pub use property::*;
pub use property_bag::*;
pub use server_version::*;
pub use types::*;

/// A specialized `Result` type for property operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("error manipulating XML data")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to write XML data")]
    Io(#[from] std::io::Error),

    #[error("an error occurred while (de)serializing JSON")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 content")]
    Base64(#[from] base64::DecodeError),

    #[error("expected {expected}, found {found}")]
    UnexpectedNode { expected: String, found: String },

    #[error("unexpected end of XML document")]
    UnexpectedEof,

    #[error("invalid value `{value}` for `{name}`")]
    InvalidValue { name: String, value: String },

    #[error("JSON object has no `{0}` key")]
    MissingJsonKey(String),

    #[error("JSON value for `{key}` has an unexpected type: {value}")]
    UnexpectedJsonType { key: String, value: String },

    #[error("the type of the collection member at index {index} is incompatible with the update")]
    PropertyTypeIncompatible { index: usize },

    #[error(
        "collection size mismatch when updating: expected {expected} members, got {actual}"
    )]
    CollectionSizeMismatch { expected: usize, actual: usize },

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("property `{property}` requires {required:?} or later, but {requested:?} was requested")]
    UnsupportedServerVersion {
        property: &'static str,
        required: ExchangeServerVersion,
        requested: ExchangeServerVersion,
    },

    #[error("an entry with key `{0}` already exists")]
    DuplicateKey(String),

    #[error("unknown Exchange server version `{0}`")]
    UnknownServerVersion(String),

    #[error("invalid XML writer state: {0}")]
    WriterState(&'static str),
}
