/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::{
    events::{BytesStart, Event},
    name::ResolveResult,
    NsReader,
};

use super::{qualified_name, XmlNamespace};
use crate::{Error, Result};

/// The node an [`EwsXmlReader`] is currently positioned on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum XmlNode {
    /// The reader has not been advanced yet.
    #[default]
    None,

    StartElement {
        namespace: XmlNamespace,
        local_name: String,
        attributes: Vec<(String, String)>,

        /// Whether the element was written in its self-closing form. The
        /// reader still reports a matching end element for it.
        is_empty: bool,
    },

    EndElement {
        namespace: XmlNamespace,
        local_name: String,
    },

    /// Unescaped character data. Whitespace-only text is never reported.
    Text(String),

    Eof,
}

/// A forward-only cursor over an EWS XML document.
///
/// Self-closing elements are reported as a start element immediately followed
/// by a matching end element, so that callers can always rely on finding the
/// end element of anything they start reading.
pub struct EwsXmlReader<'a> {
    xml: NsReader<&'a [u8]>,
    node: XmlNode,
    pending_end: Option<(XmlNamespace, String)>,
}

impl<'a> EwsXmlReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            xml: NsReader::from_str(input),
            node: XmlNode::None,
            pending_end: None,
        }
    }

    /// Advances to the next element, end element or text node.
    ///
    /// Declarations, comments and processing instructions are skipped.
    pub fn read(&mut self) -> Result<()> {
        if let Some((namespace, local_name)) = self.pending_end.take() {
            self.node = XmlNode::EndElement {
                namespace,
                local_name,
            };
            return Ok(());
        }

        loop {
            let (resolve_result, event) = self.xml.read_resolved_event()?;
            let node = match event {
                Event::Start(tag) => start_node(resolve_result, &tag, false)?,
                Event::Empty(tag) => {
                    let node = start_node(resolve_result, &tag, true)?;
                    if let XmlNode::StartElement {
                        namespace,
                        local_name,
                        ..
                    } = &node
                    {
                        self.pending_end = Some((*namespace, local_name.clone()));
                    }
                    node
                }
                Event::End(tag) => XmlNode::EndElement {
                    namespace: resolve_namespace(resolve_result)?,
                    local_name: decode_name(tag.local_name().as_ref()),
                },
                Event::Text(text) => {
                    let text = text.unescape()?;
                    if text.is_empty() {
                        continue;
                    }
                    XmlNode::Text(text.into_owned())
                }
                Event::CData(data) => {
                    XmlNode::Text(String::from_utf8_lossy(&data.into_inner()).into_owned())
                }
                Event::Eof => XmlNode::Eof,
                _ => continue,
            };

            self.node = node;
            return Ok(());
        }
    }

    pub fn node(&self) -> &XmlNode {
        &self.node
    }

    /// The local name of the current start or end element.
    pub fn local_name(&self) -> Option<&str> {
        match &self.node {
            XmlNode::StartElement { local_name, .. } | XmlNode::EndElement { local_name, .. } => {
                Some(local_name)
            }
            _ => None,
        }
    }

    /// The namespace of the current start or end element.
    pub fn namespace(&self) -> Option<XmlNamespace> {
        match &self.node {
            XmlNode::StartElement { namespace, .. } | XmlNode::EndElement { namespace, .. } => {
                Some(*namespace)
            }
            _ => None,
        }
    }

    /// The content of the current text node.
    pub fn text(&self) -> Option<&str> {
        match &self.node {
            XmlNode::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_start_element(&self) -> bool {
        matches!(self.node, XmlNode::StartElement { .. })
    }

    pub fn is_start_element_named(&self, namespace: XmlNamespace, local_name: &str) -> bool {
        matches!(
            &self.node,
            XmlNode::StartElement { namespace: ns, local_name: name, .. }
                if *ns == namespace && name == local_name
        )
    }

    pub fn is_end_element(&self, namespace: XmlNamespace, local_name: &str) -> bool {
        matches!(
            &self.node,
            XmlNode::EndElement { namespace: ns, local_name: name }
                if *ns == namespace && name == local_name
        )
    }

    pub fn is_empty_element(&self) -> bool {
        matches!(self.node, XmlNode::StartElement { is_empty: true, .. })
    }

    /// Whether the current node is text made only of whitespace, such as the
    /// indentation between elements.
    pub fn is_whitespace(&self) -> bool {
        matches!(&self.node, XmlNode::Text(text) if text.trim().is_empty())
    }

    /// Advances the reader past any whitespace and requires it to land on the
    /// given start element.
    pub fn read_start_element(&mut self, namespace: XmlNamespace, local_name: &str) -> Result<()> {
        self.read()?;
        while self.is_whitespace() {
            self.read()?;
        }

        self.ensure_current_node_is_start_element(namespace, local_name)
    }

    pub fn ensure_current_node_is_start_element(
        &self,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        if self.is_start_element_named(namespace, local_name) {
            Ok(())
        } else {
            Err(self.unexpected(format!(
                "start element `{}`",
                qualified_name(namespace, local_name)
            )))
        }
    }

    pub fn ensure_current_node_is_end_element(
        &self,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        if self.is_end_element(namespace, local_name) {
            Ok(())
        } else {
            Err(self.unexpected(format!(
                "end element `{}`",
                qualified_name(namespace, local_name)
            )))
        }
    }

    /// Looks up an attribute of the current start element by local name.
    pub fn read_attribute_value(&self, name: &str) -> Option<&str> {
        match &self.node {
            XmlNode::StartElement { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    /// Looks up an attribute of the current start element and parses it.
    pub fn read_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.read_attribute_value(name)
            .map(|value| {
                value.parse().map_err(|_| Error::InvalidValue {
                    name: name.to_owned(),
                    value: value.to_owned(),
                })
            })
            .transpose()
    }

    /// Reads the text content of the current element.
    ///
    /// The reader must be positioned on a start element and is left on the
    /// matching end element. Text nested in child elements is ignored.
    pub fn read_element_value(&mut self) -> Result<String> {
        if !self.is_start_element() {
            return Err(self.unexpected("start element".to_owned()));
        }

        let mut value = String::new();
        let mut depth = 0usize;
        loop {
            self.read()?;
            match &self.node {
                XmlNode::Text(text) if depth == 0 => value.push_str(text),
                XmlNode::StartElement { .. } => depth += 1,
                XmlNode::EndElement { .. } if depth == 0 => break,
                XmlNode::EndElement { .. } => depth -= 1,
                XmlNode::Eof => return Err(Error::UnexpectedEof),
                _ => {}
            }
        }

        Ok(value)
    }

    /// Reads the text content of the current element and parses it.
    pub fn read_element_value_as<T: FromStr>(&mut self) -> Result<T> {
        let name = self.local_name().unwrap_or_default().to_owned();
        let value = self.read_element_value()?;

        value
            .parse()
            .map_err(|_| Error::InvalidValue { name, value })
    }

    /// Reads and decodes the base64 content of the current element.
    pub fn read_base64_element_value(&mut self) -> Result<Vec<u8>> {
        let value = self.read_element_value()?;

        Ok(STANDARD.decode(value.trim())?)
    }

    /// Discards the subtree of the current element.
    ///
    /// The reader must be positioned on a start element and is left on the
    /// matching end element.
    pub fn skip_current_element(&mut self) -> Result<()> {
        if !self.is_start_element() {
            return Err(self.unexpected("start element".to_owned()));
        }

        let mut depth = 0usize;
        loop {
            self.read()?;
            match &self.node {
                XmlNode::StartElement { .. } => depth += 1,
                XmlNode::EndElement { .. } if depth == 0 => return Ok(()),
                XmlNode::EndElement { .. } => depth -= 1,
                XmlNode::Eof => return Err(Error::UnexpectedEof),
                _ => {}
            }
        }
    }

    fn unexpected(&self, expected: String) -> Error {
        let found = match &self.node {
            XmlNode::None => "nothing".to_owned(),
            XmlNode::StartElement {
                namespace,
                local_name,
                ..
            } => format!("start element `{}`", qualified_name(*namespace, local_name)),
            XmlNode::EndElement {
                namespace,
                local_name,
            } => format!("end element `{}`", qualified_name(*namespace, local_name)),
            XmlNode::Text(_) => "text".to_owned(),
            XmlNode::Eof => return Error::UnexpectedEof,
        };

        Error::UnexpectedNode { expected, found }
    }
}

fn start_node(
    resolve_result: ResolveResult<'_>,
    tag: &BytesStart<'_>,
    is_empty: bool,
) -> Result<XmlNode> {
    let namespace = resolve_namespace(resolve_result)?;

    let mut attributes = Vec::new();
    for attribute in tag.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;

        // Namespace declarations are resolved by the underlying reader.
        if attribute.key.as_namespace_binding().is_some() {
            continue;
        }

        let name = decode_name(attribute.key.local_name().as_ref());
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((name, value));
    }

    Ok(XmlNode::StartElement {
        namespace,
        local_name: decode_name(tag.local_name().as_ref()),
        attributes,
        is_empty,
    })
}

fn resolve_namespace(resolve_result: ResolveResult<'_>) -> Result<XmlNamespace> {
    match resolve_result {
        ResolveResult::Bound(namespace) => Ok(XmlNamespace::from_uri(namespace.as_ref())),
        ResolveResult::Unbound => Ok(XmlNamespace::NotSpecified),
        ResolveResult::Unknown(prefix) => Err(Error::InvalidValue {
            name: "namespace prefix".to_owned(),
            value: String::from_utf8_lossy(&prefix).into_owned(),
        }),
    }
}

fn decode_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::TYPES_NS_URI;

    fn document(body: &str) -> String {
        format!(r#"<t:Root xmlns:t="{TYPES_NS_URI}">{body}</t:Root>"#)
    }

    #[test]
    fn empty_elements_report_matching_end() {
        let xml = document(r#"<t:Empty Key="Home"/>"#);
        let mut reader = EwsXmlReader::new(&xml);

        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .expect("root should be the first element");
        reader
            .read_start_element(XmlNamespace::Types, "Empty")
            .expect("child should follow the root");

        assert!(reader.is_empty_element());
        assert_eq!(reader.read_attribute_value("Key"), Some("Home"));

        reader.read().expect("reading should succeed");
        assert!(
            reader.is_end_element(XmlNamespace::Types, "Empty"),
            "self-closing element should be followed by its end, got {:?}",
            reader.node()
        );
    }

    #[test]
    fn element_values_are_unescaped_and_typed() {
        let xml = document("<t:Name>Fish &amp; Chips</t:Name><t:Size>42</t:Size>");
        let mut reader = EwsXmlReader::new(&xml);
        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .unwrap();

        reader.read_start_element(XmlNamespace::Types, "Name").unwrap();
        assert_eq!(reader.read_element_value().unwrap(), "Fish & Chips");
        assert!(reader.is_end_element(XmlNamespace::Types, "Name"));

        reader.read_start_element(XmlNamespace::Types, "Size").unwrap();
        let size: u32 = reader.read_element_value_as().unwrap();
        assert_eq!(size, 42);
    }

    #[test]
    fn whitespace_is_kept_inside_values() {
        let xml = document("\n  <t:Name> </t:Name>\n  <t:Size>\t42 </t:Size>\n");
        let mut reader = EwsXmlReader::new(&xml);
        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .unwrap();

        reader
            .read_start_element(XmlNamespace::Types, "Name")
            .expect("indentation before the element should be skipped");
        assert_eq!(reader.read_element_value().unwrap(), " ");

        reader.read_start_element(XmlNamespace::Types, "Size").unwrap();
        assert_eq!(reader.read_element_value().unwrap(), "\t42 ");

        reader.read().unwrap();
        assert!(reader.is_whitespace());
    }

    #[test]
    fn end_element_must_match() {
        let xml = document("<t:Name>value</t:Name>");
        let mut reader = EwsXmlReader::new(&xml);
        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .unwrap();
        reader.read_start_element(XmlNamespace::Types, "Name").unwrap();
        reader.read_element_value().unwrap();

        reader
            .ensure_current_node_is_end_element(XmlNamespace::Types, "Name")
            .expect("reader should be on the end of the value");
        let err = reader
            .ensure_current_node_is_end_element(XmlNamespace::Messages, "Name")
            .expect_err("namespace differs");
        assert!(
            matches!(err, Error::UnexpectedNode { .. }),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn invalid_typed_value_is_reported() {
        let xml = document("<t:Size>lots</t:Size>");
        let mut reader = EwsXmlReader::new(&xml);
        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .unwrap();
        reader.read_start_element(XmlNamespace::Types, "Size").unwrap();

        let err = reader
            .read_element_value_as::<u32>()
            .expect_err("non-numeric value should fail to parse");
        assert!(
            matches!(err, Error::InvalidValue { ref name, ref value } if name == "Size" && value == "lots"),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn skip_discards_whole_subtree() {
        let xml = document(
            "<t:Unknown><t:Nested><t:Deeper/>text</t:Nested></t:Unknown><t:Known>yes</t:Known>",
        );
        let mut reader = EwsXmlReader::new(&xml);
        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .unwrap();
        reader
            .read_start_element(XmlNamespace::Types, "Unknown")
            .unwrap();

        reader.skip_current_element().expect("skip should succeed");
        assert!(reader.is_end_element(XmlNamespace::Types, "Unknown"));

        reader
            .read_start_element(XmlNamespace::Types, "Known")
            .expect("sibling should follow the skipped element");
    }

    #[test]
    fn base64_values_are_decoded() {
        let xml = document("<t:Content>aGVsbG8=</t:Content>");
        let mut reader = EwsXmlReader::new(&xml);
        reader
            .read_start_element(XmlNamespace::Types, "Root")
            .unwrap();
        reader
            .read_start_element(XmlNamespace::Types, "Content")
            .unwrap();

        assert_eq!(reader.read_base64_element_value().unwrap(), b"hello");
    }

    #[test]
    fn unexpected_start_element_is_an_error() {
        let xml = document("");
        let mut reader = EwsXmlReader::new(&xml);

        let err = reader
            .read_start_element(XmlNamespace::Messages, "Root")
            .expect_err("root is in the types namespace");
        assert!(
            matches!(err, Error::UnexpectedNode { .. }),
            "unexpected error {err:?}"
        );
    }
}
