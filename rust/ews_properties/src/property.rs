/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use serde_json::Value;

use crate::{
    json::JsonObject,
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNode},
    ChangeEvent, Error, Result, ServiceContext,
};

/// A node of an EWS object graph.
///
/// Every node owns a [`ChangeEvent`] through which it reports mutations to
/// whatever contains it. Mutating setters must funnel through [`changed`],
/// and only when the observable state of the node actually differs.
///
/// [`changed`]: ComplexProperty::changed
pub trait ComplexProperty {
    fn change_event(&self) -> &ChangeEvent;

    /// Notifies the owner of this node that it changed.
    fn changed(&self) {
        self.change_event().notify();
    }

    /// Forgets any pending change records, making the current state the new
    /// baseline. Nodes without a change log of their own have nothing to do.
    fn clear_change_log(&mut self) {}

    /// Checks domain constraints of this node specifically.
    fn internal_validate(&self) -> Result<()> {
        Ok(())
    }

    /// Checks that this node can be sent to the server.
    fn validate(&self) -> Result<()> {
        self.internal_validate()
    }
}

/// The wire (de)serialization hooks of a property node.
///
/// Implementors only supply the hooks for the content they carry; the
/// provided `load_from_xml`, `update_from_xml` and `write_to_xml` methods
/// drive the traversal of the enclosing element.
pub trait WireCodec: ComplexProperty {
    /// The namespace the element of this node is written in.
    fn namespace(&self) -> XmlNamespace {
        XmlNamespace::Types
    }

    fn read_attributes_from_xml(&mut self, _reader: &EwsXmlReader<'_>) -> Result<()> {
        Ok(())
    }

    /// Reads the child element the reader is positioned on.
    ///
    /// Returns `false`, without advancing the reader, if the element is not
    /// one this node knows about. On `true`, the reader must be left on the
    /// end of the child element.
    fn try_read_element_from_xml(&mut self, _reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        Ok(false)
    }

    /// Like [`try_read_element_from_xml`], for elements of a server response
    /// applied on top of an already loaded node.
    ///
    /// [`try_read_element_from_xml`]: WireCodec::try_read_element_from_xml
    fn try_read_element_from_xml_to_patch(
        &mut self,
        _reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Reads the text node the reader is positioned on.
    fn read_text_value_from_xml(&mut self, _reader: &EwsXmlReader<'_>) -> Result<()> {
        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, _writer: &mut EwsXmlWriter<W>) -> Result<()> {
        Ok(())
    }

    fn write_elements_to_xml<W: Write>(&self, _writer: &mut EwsXmlWriter<W>) -> Result<()> {
        Ok(())
    }

    fn load_from_json(&mut self, _json: &JsonObject, _ctx: &ServiceContext) -> Result<()> {
        Err(Error::NotImplemented("load_from_json"))
    }

    fn internal_to_json(&self, _ctx: &ServiceContext) -> Result<Value> {
        Err(Error::NotImplemented("internal_to_json"))
    }

    /// Loads this node from the element the reader is positioned on, in the
    /// node's own namespace.
    fn load_from_xml(&mut self, reader: &mut EwsXmlReader<'_>, local_name: &str) -> Result<()> {
        let namespace = self.namespace();
        self.load_from_xml_ns(reader, namespace, local_name)
    }

    /// Loads this node from the element the reader is positioned on.
    ///
    /// Unrecognized child elements are skipped. The reader is left on the end
    /// of the element.
    fn load_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        read_from_xml(self, reader, namespace, local_name, ReadMode::Load)
    }

    fn update_from_xml(&mut self, reader: &mut EwsXmlReader<'_>, local_name: &str) -> Result<()> {
        let namespace = self.namespace();
        self.update_from_xml_ns(reader, namespace, local_name)
    }

    /// Applies the element the reader is positioned on to this node, only
    /// overwriting what the element explicitly carries.
    fn update_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        read_from_xml(self, reader, namespace, local_name, ReadMode::Patch)
    }

    fn write_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>, local_name: &str) -> Result<()> {
        self.write_to_xml_ns(writer, self.namespace(), local_name)
    }

    /// Writes this node as an element with the given name.
    fn write_to_xml_ns<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        write_property_to_xml(self, writer, namespace, local_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadMode {
    Load,
    Patch,
}

fn read_from_xml<P: WireCodec + ?Sized>(
    property: &mut P,
    reader: &mut EwsXmlReader<'_>,
    namespace: XmlNamespace,
    local_name: &str,
    mode: ReadMode,
) -> Result<()> {
    reader.ensure_current_node_is_start_element(namespace, local_name)?;
    property.read_attributes_from_xml(reader)?;

    loop {
        reader.read()?;

        if reader.is_start_element() {
            let recognized = match mode {
                ReadMode::Load => property.try_read_element_from_xml(reader)?,
                ReadMode::Patch => property.try_read_element_from_xml_to_patch(reader)?,
            };

            if !recognized {
                log::debug!(
                    "skipping unrecognized element `{}` in `{local_name}`",
                    reader.local_name().unwrap_or_default()
                );
                reader.skip_current_element()?;
            }
        } else if matches!(reader.node(), XmlNode::EndElement { .. }) {
            return reader.ensure_current_node_is_end_element(namespace, local_name);
        } else if matches!(reader.node(), XmlNode::Text(_)) {
            property.read_text_value_from_xml(reader)?;
        } else if matches!(reader.node(), XmlNode::Eof) {
            return Err(Error::UnexpectedEof);
        }
    }
}

/// Writes the start tag, attributes, child elements and end tag of a node.
pub(crate) fn write_property_to_xml<P: WireCodec + ?Sized, W: Write>(
    property: &P,
    writer: &mut EwsXmlWriter<W>,
    namespace: XmlNamespace,
    local_name: &str,
) -> Result<()> {
    writer.write_start_element(namespace, local_name)?;
    property.write_attributes_to_xml(writer)?;
    property.write_elements_to_xml(writer)?;
    writer.write_end_element()
}
