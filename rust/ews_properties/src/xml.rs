/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Streaming XML access for complex properties.
//!
//! [`EwsXmlReader`] is a forward-only cursor over an EWS document and
//! [`EwsXmlWriter`] writes prefixed EWS elements. Both are thin layers over
//! `quick_xml` that expose the small set of operations the property
//! traversal algorithms rely on.

mod reader;
mod writer;

pub use reader::{EwsXmlReader, XmlNode};
pub use writer::EwsXmlWriter;

pub const MESSAGES_NS_URI: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";
pub const SOAP_NS_URI: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const TYPES_NS_URI: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
pub const ERRORS_NS_URI: &str = "http://schemas.microsoft.com/exchange/services/2006/errors";

/// The XML namespaces elements can be written to or read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum XmlNamespace {
    /// No namespace, or one this crate does not know about.
    NotSpecified,
    Messages,
    Types,
    Errors,
    Soap,
}

impl XmlNamespace {
    /// The prefix used for elements written in this namespace.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            XmlNamespace::NotSpecified => None,
            XmlNamespace::Messages => Some("m"),
            XmlNamespace::Types => Some("t"),
            XmlNamespace::Errors => Some("e"),
            XmlNamespace::Soap => Some("soap"),
        }
    }

    pub fn uri(self) -> Option<&'static str> {
        match self {
            XmlNamespace::NotSpecified => None,
            XmlNamespace::Messages => Some(MESSAGES_NS_URI),
            XmlNamespace::Types => Some(TYPES_NS_URI),
            XmlNamespace::Errors => Some(ERRORS_NS_URI),
            XmlNamespace::Soap => Some(SOAP_NS_URI),
        }
    }

    /// Maps a resolved namespace URI onto a known namespace.
    pub fn from_uri(uri: &[u8]) -> Self {
        match uri {
            uri if uri == MESSAGES_NS_URI.as_bytes() => XmlNamespace::Messages,
            uri if uri == TYPES_NS_URI.as_bytes() => XmlNamespace::Types,
            uri if uri == ERRORS_NS_URI.as_bytes() => XmlNamespace::Errors,
            uri if uri == SOAP_NS_URI.as_bytes() => XmlNamespace::Soap,
            _ => XmlNamespace::NotSpecified,
        }
    }
}

/// Writes an element name with the prefix of its namespace, e.g. `t:Mailbox`.
pub(crate) fn qualified_name(namespace: XmlNamespace, local_name: &str) -> String {
    match namespace.prefix() {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_owned(),
    }
}
