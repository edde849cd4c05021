/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{fmt::Display, io::Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use quick_xml::{
    events::{BytesEnd, BytesStart, BytesText, Event},
    Writer,
};

use super::{qualified_name, XmlNamespace, MESSAGES_NS_URI, TYPES_NS_URI};
use crate::{Error, Result};

/// Writes prefixed EWS elements to an underlying writer.
///
/// Start tags are held back until content or an end tag follows, so that
/// attributes can be added after [`write_start_element`] and elements without
/// content are written in their self-closing form.
///
/// [`write_start_element`]: Self::write_start_element
pub struct EwsXmlWriter<W: Write> {
    inner: Writer<W>,
    pending: Option<BytesStart<'static>>,
    open_elements: Vec<String>,
    declare_namespaces: bool,
}

impl<W: Write> EwsXmlWriter<W> {
    /// Creates a writer for a fragment whose namespace prefixes are declared
    /// by an enclosing document.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Writer::new(inner),
            pending: None,
            open_elements: Vec::new(),
            declare_namespaces: false,
        }
    }

    /// Creates a writer which declares the `m` and `t` prefixes on the first
    /// element it writes.
    pub fn with_namespace_declarations(inner: W) -> Self {
        Self {
            declare_namespaces: true,
            ..Self::new(inner)
        }
    }

    pub fn write_start_element(&mut self, namespace: XmlNamespace, local_name: &str) -> Result<()> {
        self.flush_pending()?;

        let name = qualified_name(namespace, local_name);
        let mut start = BytesStart::new(name.clone());
        if self.declare_namespaces && self.open_elements.is_empty() {
            start.push_attribute(("xmlns:m", MESSAGES_NS_URI));
            start.push_attribute(("xmlns:t", TYPES_NS_URI));
        }

        self.pending = Some(start);
        self.open_elements.push(name);

        Ok(())
    }

    /// Adds an attribute to the element most recently started.
    ///
    /// Fails if content has already been written to that element.
    pub fn write_attribute_value(&mut self, name: &str, value: impl Display) -> Result<()> {
        let start = self.pending.as_mut().ok_or(Error::WriterState(
            "attributes must directly follow a start element",
        ))?;
        start.push_attribute((name, value.to_string().as_str()));

        Ok(())
    }

    /// Writes escaped text into the current element.
    pub fn write_value(&mut self, value: &str) -> Result<()> {
        self.flush_pending()?;
        if !value.is_empty() {
            self.inner.write_event(Event::Text(BytesText::new(value)))?;
        }

        Ok(())
    }

    pub fn write_end_element(&mut self) -> Result<()> {
        let name = self
            .open_elements
            .pop()
            .ok_or(Error::WriterState("no element is open"))?;

        match self.pending.take() {
            Some(start) => self.inner.write_event(Event::Empty(start))?,
            None => self.inner.write_event(Event::End(BytesEnd::new(name)))?,
        }

        Ok(())
    }

    /// Writes an element containing only the given text.
    pub fn write_element_value(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
        value: impl Display,
    ) -> Result<()> {
        self.write_start_element(namespace, local_name)?;
        self.write_value(&value.to_string())?;
        self.write_end_element()
    }

    pub fn write_base64_element_value(
        &mut self,
        namespace: XmlNamespace,
        local_name: &str,
        content: &[u8],
    ) -> Result<()> {
        self.write_element_value(namespace, local_name, STANDARD.encode(content))
    }

    /// Returns the underlying writer once every element has been closed.
    pub fn into_inner(self) -> Result<W> {
        if !self.open_elements.is_empty() {
            return Err(Error::WriterState("elements are still open"));
        }

        Ok(self.inner.into_inner())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.inner.write_event(Event::Start(start))?;
        }

        Ok(())
    }
}
