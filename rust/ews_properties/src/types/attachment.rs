/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use serde_json::Value;

use crate::{
    json::JsonObject,
    set_field_value, set_incomparable_field_value,
    update::CustomUpdateSerializer,
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace},
    ChangeEvent, CollectionItem, ComplexProperty, ComplexPropertyCollection, Error, MemberId,
    Result, ServiceContext, WireCodec,
};

const FILE_ATTACHMENT: &str = "FileAttachment";
const ITEM_ATTACHMENT: &str = "ItemAttachment";

/// Properties shared by every kind of attachment.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/fileattachment>
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct AttachmentProperties {
    /// Assigned by the server.
    attachment_id: Option<String>,
    name: Option<String>,
    content_type: Option<String>,
    content_id: Option<String>,

    /// Computed by the server.
    size: Option<u64>,
    is_inline: Option<bool>,
}

impl AttachmentProperties {
    fn try_read_element_from_xml(
        &mut self,
        local_name: &str,
        reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool> {
        match local_name {
            "AttachmentId" => {
                self.attachment_id = reader.read_attribute("Id")?;
                reader.skip_current_element()?;
            }
            "Name" => self.name = Some(reader.read_element_value()?),
            "ContentType" => self.content_type = Some(reader.read_element_value()?),
            "ContentId" => self.content_id = Some(reader.read_element_value()?),
            "Size" => self.size = Some(reader.read_element_value_as()?),
            "IsInline" => self.is_inline = Some(reader.read_element_value_as()?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    /// Writes the properties clients may set. Server-assigned properties are
    /// never sent back.
    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        if let Some(name) = &self.name {
            writer.write_element_value(XmlNamespace::Types, "Name", name)?;
        }
        if let Some(content_type) = &self.content_type {
            writer.write_element_value(XmlNamespace::Types, "ContentType", content_type)?;
        }
        if let Some(content_id) = &self.content_id {
            writer.write_element_value(XmlNamespace::Types, "ContentId", content_id)?;
        }
        if let Some(is_inline) = self.is_inline {
            writer.write_element_value(XmlNamespace::Types, "IsInline", is_inline)?;
        }

        Ok(())
    }

    fn load_from_json(&mut self, json: &JsonObject) -> Result<()> {
        if json.contains_key("AttachmentId") {
            let attachment_id = json.read_as_json_object("AttachmentId")?;
            self.attachment_id = Some(attachment_id.read_as_string("Id")?.to_owned());
        }
        if let Some(name) = json.read_as_optional_string("Name")? {
            self.name = Some(name.to_owned());
        }
        if let Some(content_type) = json.read_as_optional_string("ContentType")? {
            self.content_type = Some(content_type.to_owned());
        }
        if let Some(content_id) = json.read_as_optional_string("ContentId")? {
            self.content_id = Some(content_id.to_owned());
        }
        if json.contains_key("Size") {
            let size = json.read_as_int("Size")?;
            self.size = Some(u64::try_from(size).map_err(|_| Error::InvalidValue {
                name: String::from("Size"),
                value: size.to_string(),
            })?);
        }
        if json.contains_key("IsInline") {
            self.is_inline = Some(json.read_as_bool("IsInline")?);
        }

        Ok(())
    }

    fn add_to_json(&self, json: &mut JsonObject) {
        json.add_optional("Name", self.name.as_deref());
        json.add_optional("ContentType", self.content_type.as_deref());
        json.add_optional("ContentId", self.content_id.as_deref());
        json.add_optional("IsInline", self.is_inline);
    }

    fn validate(&self) -> Result<()> {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(Error::Validation(String::from("attachment must have a name"))),
        }
    }
}

/// An attachment carrying the content of a file.
#[derive(Clone, Debug, Default)]
pub struct FileAttachment {
    properties: AttachmentProperties,
    content: Option<Vec<u8>>,
    on_change: ChangeEvent,
}

impl FileAttachment {
    pub fn new(name: &str, content: Vec<u8>) -> Self {
        Self {
            properties: AttachmentProperties {
                name: Some(name.to_owned()),
                ..Default::default()
            },
            content: Some(content),
            on_change: ChangeEvent::new(),
        }
    }

    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Replaces the content of the attachment. Contents are not compared, so
    /// any new content counts as a change.
    pub fn set_content(&mut self, content: Option<Vec<u8>>) {
        if set_incomparable_field_value(&mut self.content, content) {
            self.changed();
        }
    }
}

impl PartialEq for FileAttachment {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties && self.content == other.content
    }
}

/// An attachment carrying an Exchange item.
#[derive(Clone, Debug, Default)]
pub struct ItemAttachment {
    properties: AttachmentProperties,
    on_change: ChangeEvent,
}

impl ItemAttachment {
    pub fn new(name: &str) -> Self {
        Self {
            properties: AttachmentProperties {
                name: Some(name.to_owned()),
                ..Default::default()
            },
            on_change: ChangeEvent::new(),
        }
    }
}

impl PartialEq for ItemAttachment {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }
}

/// An attachment of an item.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/attachments-ex15websvcsotherref>
#[derive(Clone, Debug, PartialEq)]
pub enum Attachment {
    File(FileAttachment),
    Item(ItemAttachment),
}

impl Attachment {
    fn properties(&self) -> &AttachmentProperties {
        match self {
            Attachment::File(file) => &file.properties,
            Attachment::Item(item) => &item.properties,
        }
    }

    fn properties_mut(&mut self) -> &mut AttachmentProperties {
        match self {
            Attachment::File(file) => &mut file.properties,
            Attachment::Item(item) => &mut item.properties,
        }
    }

    pub fn attachment_id(&self) -> Option<&str> {
        self.properties().attachment_id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.properties().name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        if set_field_value(&mut self.properties_mut().name, name) {
            self.changed();
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.properties().content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        if set_field_value(&mut self.properties_mut().content_type, content_type) {
            self.changed();
        }
    }

    pub fn size(&self) -> Option<u64> {
        self.properties().size
    }

    pub fn is_inline(&self) -> Option<bool> {
        self.properties().is_inline
    }

    pub fn set_is_inline(&mut self, is_inline: Option<bool>) {
        if set_field_value(&mut self.properties_mut().is_inline, is_inline) {
            self.changed();
        }
    }

    pub fn as_file(&self) -> Option<&FileAttachment> {
        match self {
            Attachment::File(file) => Some(file),
            Attachment::Item(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileAttachment> {
        match self {
            Attachment::File(file) => Some(file),
            Attachment::Item(_) => None,
        }
    }
}

impl ComplexProperty for FileAttachment {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }
}

impl ComplexProperty for ItemAttachment {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }
}

impl ComplexProperty for Attachment {
    fn change_event(&self) -> &ChangeEvent {
        match self {
            Attachment::File(file) => file.change_event(),
            Attachment::Item(item) => item.change_event(),
        }
    }

    fn internal_validate(&self) -> Result<()> {
        self.properties().validate()?;

        match self {
            Attachment::File(file) if file.content.is_none() => Err(Error::Validation(format!(
                "file attachment `{}` has no content",
                self.name().unwrap_or_default()
            ))),
            _ => Ok(()),
        }
    }
}

impl WireCodec for Attachment {
    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        let Some(local_name) = reader.local_name().map(str::to_owned) else {
            return Ok(false);
        };

        if self
            .properties_mut()
            .try_read_element_from_xml(&local_name, reader)?
        {
            return Ok(true);
        }

        match self {
            Attachment::File(file) if local_name == "Content" => {
                file.content = Some(reader.read_base64_element_value()?);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn try_read_element_from_xml_to_patch(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool> {
        self.try_read_element_from_xml(reader)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        self.properties().write_elements_to_xml(writer)?;

        if let Attachment::File(FileAttachment {
            content: Some(content),
            ..
        }) = self
        {
            writer.write_base64_element_value(XmlNamespace::Types, "Content", content)?;
        }

        Ok(())
    }

    fn load_from_json(&mut self, json: &JsonObject, _ctx: &ServiceContext) -> Result<()> {
        self.properties_mut().load_from_json(json)?;

        if let Attachment::File(file) = self {
            if json.contains_key("Content") {
                file.content = Some(json.read_as_base64("Content")?);
            }
        }

        Ok(())
    }

    fn internal_to_json(&self, _ctx: &ServiceContext) -> Result<Value> {
        let mut json = JsonObject::new();
        json.add_type_parameter(self.xml_element_name());
        self.properties().add_to_json(&mut json);

        if let Attachment::File(FileAttachment {
            content: Some(content),
            ..
        }) = self
        {
            json.add_base64("Content", content);
        }

        Ok(json.into())
    }
}

impl CollectionItem for Attachment {
    fn create_from_xml_element_name(local_name: &str) -> Option<Self> {
        match local_name {
            FILE_ATTACHMENT => Some(Attachment::File(FileAttachment::default())),
            ITEM_ATTACHMENT => Some(Attachment::Item(ItemAttachment::default())),
            _ => None,
        }
    }

    fn xml_element_name(&self) -> &'static str {
        match self {
            Attachment::File(_) => FILE_ATTACHMENT,
            Attachment::Item(_) => ITEM_ATTACHMENT,
        }
    }
}

impl CustomUpdateSerializer for Attachment {}

/// The attachments of an item.
pub type AttachmentCollection = ComplexPropertyCollection<Attachment>;

impl ComplexPropertyCollection<Attachment> {
    pub fn add_file_attachment(&mut self, name: &str, content: Vec<u8>) -> MemberId {
        self.add(Attachment::File(FileAttachment::new(name, content)))
    }

    pub fn add_item_attachment(&mut self, name: &str) -> MemberId {
        self.add(Attachment::Item(ItemAttachment::new(name)))
    }
}
