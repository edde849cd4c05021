/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{fmt, io::Write, str::FromStr};

use serde_json::Value;
use strum::{Display, EnumString};

use crate::{
    json::JsonObject,
    set_field_value,
    update::{
        json_delete_field, json_field_update, write_delete_field, write_field_update,
        CustomUpdateSerializer, PathToElement, PropertyDefinition, ServiceObject,
    },
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNode},
    ChangeEvent, CollectionItem, ComplexProperty, ComplexPropertyCollection, Error, Result,
    ServiceContext, WireCodec,
};

const EXTENDED_PROPERTY: &str = "ExtendedProperty";
const EXTENDED_FIELD_URI: &str = "ExtendedFieldURI";

/// A well-known MAPI property set identifier.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/extendedfielduri#distinguishedpropertysetid-attribute>
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
pub enum DistinguishedPropertySet {
    Address,
    Appointment,
    CalendarAssistant,
    Common,
    InternetHeaders,
    Meeting,
    PublicStrings,
    Sharing,
    Task,
    UnifiedMessaging,
}

/// The type of the value of a MAPI property.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/extendedfielduri#propertytype-attribute>
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
pub enum PropertyType {
    ApplicationTime,
    ApplicationTimeArray,
    Binary,
    BinaryArray,
    Boolean,
    CLSID,
    CLSIDArray,
    Currency,
    CurrencyArray,
    Double,
    DoubleArray,
    Float,
    FloatArray,
    Integer,
    IntegerArray,
    Long,
    LongArray,
    Short,
    ShortArray,
    SystemTime,
    SystemTimeArray,
    String,
    StringArray,
}

/// The identifier for an extended MAPI property.
///
/// A property is identified either by its tag, or by a property set together
/// with a name or dispatch ID within that set.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/extendedfielduri>
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtendedPropertyDefinition {
    /// A well-known identifier for a property set.
    pub distinguished_property_set_id: Option<DistinguishedPropertySet>,

    /// A GUID representing a property set.
    pub property_set_id: Option<String>,

    /// Specifies a property by integer tag, in hex.
    pub property_tag: Option<String>,

    /// The name of a property within a specified property set.
    pub property_name: Option<String>,

    /// The dispatch ID of a property within a specified property set.
    pub property_id: Option<String>,

    /// The value type of the property.
    pub property_type: Option<PropertyType>,
}

impl ExtendedPropertyDefinition {
    /// A property identified by its tag, e.g. `0x1081`.
    pub fn tagged(property_tag: &str, property_type: PropertyType) -> Self {
        Self {
            property_tag: Some(property_tag.to_owned()),
            property_type: Some(property_type),
            ..Default::default()
        }
    }

    /// A property identified by name within a well-known property set.
    pub fn named(
        property_set: DistinguishedPropertySet,
        property_name: &str,
        property_type: PropertyType,
    ) -> Self {
        Self {
            distinguished_property_set_id: Some(property_set),
            property_name: Some(property_name.to_owned()),
            property_type: Some(property_type),
            ..Default::default()
        }
    }

    pub fn read_attributes_from_xml(reader: &EwsXmlReader<'_>) -> Result<Self> {
        Ok(Self {
            distinguished_property_set_id: reader.read_attribute("DistinguishedPropertySetId")?,
            property_set_id: reader.read_attribute("PropertySetId")?,
            property_tag: reader.read_attribute("PropertyTag")?,
            property_name: reader.read_attribute("PropertyName")?,
            property_id: reader.read_attribute("PropertyId")?,
            property_type: reader.read_attribute("PropertyType")?,
        })
    }

    pub fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        if let Some(set) = self.distinguished_property_set_id {
            writer.write_attribute_value("DistinguishedPropertySetId", set)?;
        }
        if let Some(set_id) = &self.property_set_id {
            writer.write_attribute_value("PropertySetId", set_id)?;
        }
        if let Some(tag) = &self.property_tag {
            writer.write_attribute_value("PropertyTag", tag)?;
        }
        if let Some(name) = &self.property_name {
            writer.write_attribute_value("PropertyName", name)?;
        }
        if let Some(id) = &self.property_id {
            writer.write_attribute_value("PropertyId", id)?;
        }
        if let Some(property_type) = self.property_type {
            writer.write_attribute_value("PropertyType", property_type)?;
        }

        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut json = JsonObject::new();
        json.add_type_parameter("ExtendedPropertyUri");
        json.add_optional(
            "DistinguishedPropertySetId",
            self.distinguished_property_set_id.map(|set| set.to_string()),
        );
        json.add_optional("PropertySetId", self.property_set_id.as_deref());
        json.add_optional("PropertyTag", self.property_tag.as_deref());
        json.add_optional("PropertyName", self.property_name.as_deref());
        json.add_optional("PropertyId", self.property_id.as_deref());
        json.add_optional(
            "PropertyType",
            self.property_type.map(|property_type| property_type.to_string()),
        );

        json.into()
    }

    pub fn from_json(json: &JsonObject) -> Result<Self> {
        Ok(Self {
            distinguished_property_set_id: read_optional_enum(json, "DistinguishedPropertySetId")?,
            property_set_id: json.read_as_optional_string("PropertySetId")?.map(str::to_owned),
            property_tag: json.read_as_optional_string("PropertyTag")?.map(str::to_owned),
            property_name: json.read_as_optional_string("PropertyName")?.map(str::to_owned),
            property_id: json.read_as_optional_string("PropertyId")?.map(str::to_owned),
            property_type: read_optional_enum(json, "PropertyType")?,
        })
    }

    pub fn path(&self) -> PathToElement {
        PathToElement::ExtendedFieldURI(self.clone())
    }

    /// Checks that the definition identifies exactly one property.
    pub fn validate(&self) -> Result<()> {
        let has_set =
            self.distinguished_property_set_id.is_some() || self.property_set_id.is_some();
        let has_member = self.property_name.is_some() || self.property_id.is_some();

        let valid = match &self.property_tag {
            Some(_) => !has_set && !has_member,
            None => {
                has_set
                    && has_member
                    && !(self.property_name.is_some() && self.property_id.is_some())
            }
        };

        if !valid {
            return Err(Error::Validation(format!(
                "extended property definition {self} must have either a tag or a property set with a name or an ID"
            )));
        }
        if self.property_type.is_none() {
            return Err(Error::Validation(format!(
                "extended property definition {self} has no type"
            )));
        }

        Ok(())
    }
}

fn read_optional_enum<T: FromStr>(json: &JsonObject, key: &str) -> Result<Option<T>> {
    if json.contains_key(key) {
        json.read_enum_value(key).map(Some)
    } else {
        Ok(None)
    }
}

impl fmt::Display for ExtendedPropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self
            .distinguished_property_set_id
            .map(|set| set.to_string())
            .or_else(|| self.property_set_id.clone());

        match (&self.property_tag, set) {
            (Some(tag), _) => write!(f, "`{tag}`"),
            (None, Some(set)) => write!(
                f,
                "`{set}:{}`",
                self.property_name
                    .as_deref()
                    .or(self.property_id.as_deref())
                    .unwrap_or_default()
            ),
            (None, None) => f.write_str("`<unidentified>`"),
        }
    }
}

/// The value of an extended property, single or multi-valued depending on
/// its type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtendedPropertyValue {
    Single(String),
    Multiple(Vec<String>),
}

/// An extended MAPI property of an Exchange item or folder.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/extendedproperty>
#[derive(Clone, Debug, Default)]
pub struct ExtendedProperty {
    definition: ExtendedPropertyDefinition,
    value: Option<ExtendedPropertyValue>,
    on_change: ChangeEvent,
}

impl ExtendedProperty {
    pub fn new(definition: ExtendedPropertyDefinition, value: ExtendedPropertyValue) -> Self {
        Self {
            definition,
            value: Some(value),
            on_change: ChangeEvent::new(),
        }
    }

    pub fn definition(&self) -> &ExtendedPropertyDefinition {
        &self.definition
    }

    pub fn value(&self) -> Option<&ExtendedPropertyValue> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: Option<ExtendedPropertyValue>) {
        if set_field_value(&mut self.value, value) {
            self.changed();
        }
    }
}

impl PartialEq for ExtendedProperty {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition && self.value == other.value
    }
}

impl ComplexProperty for ExtendedProperty {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }

    fn internal_validate(&self) -> Result<()> {
        self.definition.validate()
    }
}

fn read_values(reader: &mut EwsXmlReader<'_>) -> Result<Vec<String>> {
    let mut values = Vec::new();

    loop {
        reader.read()?;

        if reader.is_start_element_named(XmlNamespace::Types, "Value") {
            values.push(reader.read_element_value()?);
        } else if reader.is_start_element() {
            reader.skip_current_element()?;
        } else if matches!(reader.node(), XmlNode::EndElement { .. }) {
            reader.ensure_current_node_is_end_element(XmlNamespace::Types, "Values")?;
            return Ok(values);
        } else if matches!(reader.node(), XmlNode::Eof) {
            return Err(Error::UnexpectedEof);
        }
    }
}

impl WireCodec for ExtendedProperty {
    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        match reader.local_name() {
            Some(EXTENDED_FIELD_URI) => {
                self.definition = ExtendedPropertyDefinition::read_attributes_from_xml(reader)?;
                reader.skip_current_element()?;
            }
            Some("Value") => {
                self.value = Some(ExtendedPropertyValue::Single(reader.read_element_value()?));
            }
            Some("Values") => {
                self.value = Some(ExtendedPropertyValue::Multiple(read_values(reader)?));
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        writer.write_start_element(XmlNamespace::Types, EXTENDED_FIELD_URI)?;
        self.definition.write_attributes_to_xml(writer)?;
        writer.write_end_element()?;

        match &self.value {
            Some(ExtendedPropertyValue::Single(value)) => {
                writer.write_element_value(XmlNamespace::Types, "Value", value)?;
            }
            Some(ExtendedPropertyValue::Multiple(values)) => {
                writer.write_start_element(XmlNamespace::Types, "Values")?;
                for value in values {
                    writer.write_element_value(XmlNamespace::Types, "Value", value)?;
                }
                writer.write_end_element()?;
            }
            None => {}
        }

        Ok(())
    }

    fn load_from_json(&mut self, json: &JsonObject, _ctx: &ServiceContext) -> Result<()> {
        if json.contains_key(EXTENDED_FIELD_URI) {
            self.definition =
                ExtendedPropertyDefinition::from_json(&json.read_as_json_object(EXTENDED_FIELD_URI)?)?;
        }

        if let Some(value) = json.read_as_optional_string("Value")? {
            self.value = Some(ExtendedPropertyValue::Single(value.to_owned()));
        } else if json.contains_key("Values") {
            let values: Vec<String> = json
                .read_as_array("Values")?
                .iter()
                .map(|value| match value {
                    Value::String(value) => Ok(value.clone()),
                    other => Err(Error::UnexpectedJsonType {
                        key: String::from("Values"),
                        value: other.to_string(),
                    }),
                })
                .collect::<Result<_>>()?;
            self.value = Some(ExtendedPropertyValue::Multiple(values));
        }

        Ok(())
    }

    fn internal_to_json(&self, _ctx: &ServiceContext) -> Result<Value> {
        let mut json = JsonObject::new();
        json.add(EXTENDED_FIELD_URI, self.definition.to_json());

        match &self.value {
            Some(ExtendedPropertyValue::Single(value)) => json.add("Value", value.as_str()),
            Some(ExtendedPropertyValue::Multiple(values)) => json.add("Values", values.clone()),
            None => {}
        }

        Ok(json.into())
    }
}

impl CollectionItem for ExtendedProperty {
    fn create_from_xml_element_name(local_name: &str) -> Option<Self> {
        (local_name == EXTENDED_PROPERTY).then(ExtendedProperty::default)
    }

    fn create_default() -> Option<Self> {
        Some(ExtendedProperty::default())
    }

    fn xml_element_name(&self) -> &'static str {
        EXTENDED_PROPERTY
    }
}

/// The extended properties of an item or folder.
///
/// Extended properties are not wrapped in an element of their own: each one
/// is an `ExtendedProperty` child of the item. Loading reads one property at
/// a time, and writing writes each property as a sibling.
#[derive(Debug, Default)]
pub struct ExtendedPropertyCollection {
    properties: ComplexPropertyCollection<ExtendedProperty>,
}

impl ExtendedPropertyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtendedProperty> {
        self.properties.iter()
    }

    pub fn has_changes(&self) -> bool {
        self.properties.has_changes()
    }

    fn position(&self, definition: &ExtendedPropertyDefinition) -> Option<usize> {
        self.properties
            .iter()
            .position(|property| property.definition() == definition)
    }

    /// Sets the value of a property, adding the property if it is not set.
    ///
    /// Setting a property which is pending removal brings it back, so that
    /// the update sets it instead of deleting it.
    pub fn set_extended_property(
        &mut self,
        definition: &ExtendedPropertyDefinition,
        value: ExtendedPropertyValue,
    ) {
        let index = self.position(definition).or_else(|| {
            let id = self
                .properties
                .find_removed(|property| property.definition() == definition)?;
            self.properties.restore(id);

            self.properties.position(id)
        });

        match index {
            Some(index) => {
                self.properties
                    .modify(index, |property| property.set_value(Some(value)));
            }
            None => {
                self.properties
                    .add(ExtendedProperty::new(definition.clone(), value));
            }
        }
    }

    /// Removes a property. Returns whether it was set.
    pub fn remove_extended_property(&mut self, definition: &ExtendedPropertyDefinition) -> bool {
        match self.position(definition) {
            Some(index) => self.properties.remove_at(index),
            None => false,
        }
    }

    pub fn try_get_value(
        &self,
        definition: &ExtendedPropertyDefinition,
    ) -> Option<&ExtendedPropertyValue> {
        self.position(definition)
            .and_then(|index| self.properties.get(index))
            .and_then(ExtendedProperty::value)
    }

    /// Properties to set in an update: added properties, then modified
    /// properties.
    fn properties_to_set(&self) -> impl Iterator<Item = &ExtendedProperty> {
        self.properties
            .added_items()
            .chain(self.properties.modified_items())
    }
}

impl ComplexProperty for ExtendedPropertyCollection {
    fn change_event(&self) -> &ChangeEvent {
        self.properties.change_event()
    }

    fn clear_change_log(&mut self) {
        self.properties.clear_change_log();
    }

    fn internal_validate(&self) -> Result<()> {
        self.properties.internal_validate()
    }
}

impl WireCodec for ExtendedPropertyCollection {
    /// Loads the single property the reader is positioned on and adds it to
    /// the baseline.
    fn load_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        let mut property = ExtendedProperty::default();
        property.load_from_xml_ns(reader, namespace, local_name)?;
        self.properties.add_loaded(property);

        Ok(())
    }

    /// Applies the single property the reader is positioned on to the
    /// property with the same definition, adding it if there is none.
    fn update_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        let mut update = ExtendedProperty::default();
        update.load_from_xml_ns(reader, namespace, local_name)?;

        match self.position(&update.definition) {
            Some(index) => {
                self.properties
                    .modify(index, move |property| property.value = update.value);
            }
            None => {
                self.properties.add_loaded(update);
            }
        }

        Ok(())
    }

    fn write_to_xml_ns<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        self.properties
            .iter()
            .try_for_each(|property| property.write_to_xml_ns(writer, namespace, local_name))
    }

    fn internal_to_json(&self, ctx: &ServiceContext) -> Result<Value> {
        self.properties.internal_to_json(ctx)
    }
}

impl CustomUpdateSerializer for ExtendedPropertyCollection {
    /// Sets each added or modified property, then deletes each removed
    /// property, all addressed by extended field URI.
    fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
    ) -> Result<bool> {
        for property in self.properties_to_set() {
            write_field_update(
                writer,
                owner.set_field_xml_element_name(),
                owner,
                &property.definition.path(),
                |writer| property.write_to_xml(writer, definition.xml_element_name),
            )?;
        }

        for property in self.properties.removed_items() {
            write_delete_field(writer, owner, &property.definition.path())?;
        }

        Ok(true)
    }

    fn write_delete_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
    ) -> Result<bool> {
        for property in self.properties.iter() {
            write_delete_field(writer, owner, &property.definition.path())?;
        }

        Ok(true)
    }

    fn set_update_to_json(
        &self,
        ctx: &ServiceContext,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
        updates: &mut Vec<Value>,
    ) -> Result<bool> {
        for property in self.properties_to_set() {
            let mut service_object = JsonObject::new();
            service_object.add(
                definition.xml_element_name,
                Value::Array(vec![property.internal_to_json(ctx)?]),
            );
            updates.push(json_field_update(
                owner.set_field_xml_element_name(),
                owner,
                &property.definition.path(),
                Some(service_object),
            ));
        }

        for property in self.properties.removed_items() {
            updates.push(json_delete_field(owner, &property.definition.path()));
        }

        Ok(true)
    }

    fn delete_update_to_json(
        &self,
        _ctx: &ServiceContext,
        owner: &dyn ServiceObject,
        updates: &mut Vec<Value>,
    ) -> Result<bool> {
        for property in self.properties.iter() {
            updates.push(json_delete_field(owner, &property.definition.path()));
        }

        Ok(true)
    }
}
