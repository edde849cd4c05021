/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Update fragments: the per-field `Set`, `AppendTo` and `Delete` operations
//! of `UpdateItem` and `UpdateFolder` requests.
//!
//! See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/updates-item>

use std::io::Write;

use serde_json::Value;

use crate::{
    json::JsonObject,
    xml::{EwsXmlWriter, XmlNamespace},
    Error, ExchangeServerVersion, ExtendedPropertyDefinition, Result, ServiceContext, WireCodec,
};

/// The JSON key under which an update fragment stores its field path.
pub const PATH_JSON_KEY: &str = "Path";

/// The object an update fragment applies to.
///
/// The update serializers are schema-agnostic: every element name they emit
/// around a property comes from its owner.
pub trait ServiceObject {
    /// The element wrapping property values, e.g. `Message` or `Contact`.
    fn xml_element_name(&self) -> &str;
    fn set_field_xml_element_name(&self) -> &str;
    fn append_field_xml_element_name(&self) -> &str;
    fn delete_field_xml_element_name(&self) -> &str;

    /// The key under which a JSON update fragment stores the property values.
    fn update_item_json_name(&self) -> &str;
}

/// The owners known to EWS: items and folders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceObjectKind {
    Item { xml_element_name: &'static str },
    Folder { xml_element_name: &'static str },
}

impl ServiceObject for ServiceObjectKind {
    fn xml_element_name(&self) -> &str {
        match self {
            ServiceObjectKind::Item { xml_element_name }
            | ServiceObjectKind::Folder { xml_element_name } => xml_element_name,
        }
    }

    fn set_field_xml_element_name(&self) -> &str {
        match self {
            ServiceObjectKind::Item { .. } => "SetItemField",
            ServiceObjectKind::Folder { .. } => "SetFolderField",
        }
    }

    fn append_field_xml_element_name(&self) -> &str {
        match self {
            ServiceObjectKind::Item { .. } => "AppendToItemField",
            ServiceObjectKind::Folder { .. } => "AppendToFolderField",
        }
    }

    fn delete_field_xml_element_name(&self) -> &str {
        match self {
            ServiceObjectKind::Item { .. } => "DeleteItemField",
            ServiceObjectKind::Folder { .. } => "DeleteFolderField",
        }
    }

    fn update_item_json_name(&self) -> &str {
        match self {
            ServiceObjectKind::Item { .. } => "Item",
            ServiceObjectKind::Folder { .. } => "Folder",
        }
    }
}

/// An identifier for a property on an Exchange entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathToElement {
    /// An identifier for a property given by a well-known string.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/fielduri>
    FieldURI { field_uri: String },

    /// An identifier for a specific element of a dictionary-based property.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/indexedfielduri>
    IndexedFieldURI {
        /// The well-known string identifier of the property.
        field_uri: String,

        /// The member within the dictionary to access.
        field_index: String,
    },

    /// An identifier for an extended MAPI property.
    ///
    /// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/extendedfielduri>
    ExtendedFieldURI(ExtendedPropertyDefinition),
}

impl PathToElement {
    pub fn write_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        match self {
            PathToElement::FieldURI { field_uri } => {
                writer.write_start_element(XmlNamespace::Types, "FieldURI")?;
                writer.write_attribute_value("FieldURI", field_uri)?;
            }
            PathToElement::IndexedFieldURI {
                field_uri,
                field_index,
            } => {
                writer.write_start_element(XmlNamespace::Types, "IndexedFieldURI")?;
                writer.write_attribute_value("FieldURI", field_uri)?;
                writer.write_attribute_value("FieldIndex", field_index)?;
            }
            PathToElement::ExtendedFieldURI(definition) => {
                writer.write_start_element(XmlNamespace::Types, "ExtendedFieldURI")?;
                definition.write_attributes_to_xml(writer)?;
            }
        }

        writer.write_end_element()
    }

    pub fn to_json(&self) -> Value {
        match self {
            PathToElement::FieldURI { field_uri } => {
                let mut json = JsonObject::new();
                json.add_type_parameter("PropertyUri");
                json.add("FieldURI", field_uri.as_str());
                json.into()
            }
            PathToElement::IndexedFieldURI {
                field_uri,
                field_index,
            } => {
                let mut json = JsonObject::new();
                json.add_type_parameter("DictionaryPropertyUri");
                json.add("FieldURI", field_uri.as_str());
                json.add("FieldIndex", field_index.as_str());
                json.into()
            }
            PathToElement::ExtendedFieldURI(definition) => definition.to_json(),
        }
    }
}

/// Schema metadata of a property of an item or folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyDefinition {
    /// The name of the element holding the property value.
    pub xml_element_name: &'static str,

    /// The field URI addressing the property in updates.
    pub uri: &'static str,

    /// The first server version knowing about the property.
    pub version: ExchangeServerVersion,
}

impl PropertyDefinition {
    pub const fn new(
        xml_element_name: &'static str,
        uri: &'static str,
        version: ExchangeServerVersion,
    ) -> Self {
        Self {
            xml_element_name,
            uri,
            version,
        }
    }

    pub fn path(&self) -> PathToElement {
        PathToElement::FieldURI {
            field_uri: self.uri.to_owned(),
        }
    }

    /// Fails if the property cannot be sent to the requested server version.
    pub fn ensure_supported(&self, ctx: &ServiceContext) -> Result<()> {
        if ctx.supports(self.version) {
            return Ok(());
        }

        Err(Error::UnsupportedServerVersion {
            property: self.xml_element_name,
            required: self.version,
            requested: ctx.requested_server_version,
        })
    }
}

/// Lets a property replace the generic update fragments written for it.
///
/// Every method returns whether it wrote the fragments itself. When it did
/// not, the generic serializer writes the fragment instead.
pub trait CustomUpdateSerializer {
    fn write_set_update_to_xml<W: Write>(
        &self,
        _writer: &mut EwsXmlWriter<W>,
        _owner: &dyn ServiceObject,
        _definition: &PropertyDefinition,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Writes fragments appending to the existing value of the property,
    /// when that fully describes the pending changes.
    fn write_append_update_to_xml<W: Write>(
        &self,
        _writer: &mut EwsXmlWriter<W>,
        _owner: &dyn ServiceObject,
        _definition: &PropertyDefinition,
    ) -> Result<bool> {
        Ok(false)
    }

    fn write_delete_update_to_xml<W: Write>(
        &self,
        _writer: &mut EwsXmlWriter<W>,
        _owner: &dyn ServiceObject,
    ) -> Result<bool> {
        Ok(false)
    }

    fn set_update_to_json(
        &self,
        _ctx: &ServiceContext,
        _owner: &dyn ServiceObject,
        _definition: &PropertyDefinition,
        _updates: &mut Vec<Value>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn append_update_to_json(
        &self,
        _ctx: &ServiceContext,
        _owner: &dyn ServiceObject,
        _definition: &PropertyDefinition,
        _updates: &mut Vec<Value>,
    ) -> Result<bool> {
        Ok(false)
    }

    fn delete_update_to_json(
        &self,
        _ctx: &ServiceContext,
        _owner: &dyn ServiceObject,
        _updates: &mut Vec<Value>,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Writes the update fragments setting `property` on `owner`.
///
/// The property is validated first. An append fragment is preferred when the
/// property can express its changes that way.
pub fn write_set_update<P, W>(
    writer: &mut EwsXmlWriter<W>,
    ctx: &ServiceContext,
    owner: &dyn ServiceObject,
    definition: &PropertyDefinition,
    property: &P,
) -> Result<()>
where
    P: WireCodec + CustomUpdateSerializer,
    W: Write,
{
    definition.ensure_supported(ctx)?;
    property.validate()?;

    if property.write_append_update_to_xml(writer, owner, definition)? {
        return Ok(());
    }
    if property.write_set_update_to_xml(writer, owner, definition)? {
        return Ok(());
    }

    write_field_update(
        writer,
        owner.set_field_xml_element_name(),
        owner,
        &definition.path(),
        |writer| property.write_to_xml(writer, definition.xml_element_name),
    )
}

/// Writes the update fragments deleting a property from `owner`.
pub fn write_delete_update<P, W>(
    writer: &mut EwsXmlWriter<W>,
    ctx: &ServiceContext,
    owner: &dyn ServiceObject,
    definition: &PropertyDefinition,
    property: Option<&P>,
) -> Result<()>
where
    P: CustomUpdateSerializer,
    W: Write,
{
    definition.ensure_supported(ctx)?;

    if let Some(property) = property {
        if property.write_delete_update_to_xml(writer, owner)? {
            return Ok(());
        }
    }

    write_delete_field(writer, owner, &definition.path())
}

/// Appends the JSON update fragments setting `property` on `owner`.
pub fn set_update_to_json<P>(
    ctx: &ServiceContext,
    owner: &dyn ServiceObject,
    definition: &PropertyDefinition,
    property: &P,
    updates: &mut Vec<Value>,
) -> Result<()>
where
    P: WireCodec + CustomUpdateSerializer,
{
    definition.ensure_supported(ctx)?;
    property.validate()?;

    if property.append_update_to_json(ctx, owner, definition, updates)? {
        return Ok(());
    }
    if property.set_update_to_json(ctx, owner, definition, updates)? {
        return Ok(());
    }

    let mut service_object = JsonObject::new();
    service_object.add(definition.xml_element_name, property.internal_to_json(ctx)?);
    updates.push(json_field_update(
        owner.set_field_xml_element_name(),
        owner,
        &definition.path(),
        Some(service_object),
    ));

    Ok(())
}

/// Appends the JSON update fragments deleting a property from `owner`.
pub fn delete_update_to_json<P>(
    ctx: &ServiceContext,
    owner: &dyn ServiceObject,
    definition: &PropertyDefinition,
    property: Option<&P>,
    updates: &mut Vec<Value>,
) -> Result<()>
where
    P: CustomUpdateSerializer,
{
    definition.ensure_supported(ctx)?;

    if let Some(property) = property {
        if property.delete_update_to_json(ctx, owner, updates)? {
            return Ok(());
        }
    }

    updates.push(json_delete_field(owner, &definition.path()));

    Ok(())
}

/// Writes `<{update}>{path}<{owner}>{content}</{owner}></{update}>`.
pub(crate) fn write_field_update<W, F>(
    writer: &mut EwsXmlWriter<W>,
    update_element_name: &str,
    owner: &dyn ServiceObject,
    path: &PathToElement,
    write_content: F,
) -> Result<()>
where
    W: Write,
    F: FnOnce(&mut EwsXmlWriter<W>) -> Result<()>,
{
    writer.write_start_element(XmlNamespace::Types, update_element_name)?;
    path.write_to_xml(writer)?;
    writer.write_start_element(XmlNamespace::Types, owner.xml_element_name())?;
    write_content(writer)?;
    writer.write_end_element()?;
    writer.write_end_element()
}

pub(crate) fn write_delete_field<W: Write>(
    writer: &mut EwsXmlWriter<W>,
    owner: &dyn ServiceObject,
    path: &PathToElement,
) -> Result<()> {
    writer.write_start_element(XmlNamespace::Types, owner.delete_field_xml_element_name())?;
    path.write_to_xml(writer)?;
    writer.write_end_element()
}

/// Builds a JSON set or append fragment. The owner's type is added to
/// `service_object`.
pub(crate) fn json_field_update(
    update_type: &str,
    owner: &dyn ServiceObject,
    path: &PathToElement,
    service_object: Option<JsonObject>,
) -> Value {
    let mut service_object = service_object.unwrap_or_default();
    service_object.add_type_parameter(owner.xml_element_name());

    let mut update = JsonObject::new();
    update.add_type_parameter(update_type);
    update.add(PATH_JSON_KEY, path.to_json());
    update.add(owner.update_item_json_name(), service_object);

    update.into()
}

pub(crate) fn json_delete_field(owner: &dyn ServiceObject, path: &PathToElement) -> Value {
    let mut update = JsonObject::new();
    update.add_type_parameter(owner.delete_field_xml_element_name());
    update.add(PATH_JSON_KEY, path.to_json());

    update.into()
}
