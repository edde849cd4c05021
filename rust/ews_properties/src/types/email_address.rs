/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use serde_json::Value;
use strum::{Display, EnumString};

use crate::{
    json::JsonObject,
    set_field_value,
    update::CustomUpdateSerializer,
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace},
    ChangeEvent, CollectionItem, ComplexProperty, ComplexPropertyCollection, MemberId, Result,
    ServiceContext, WireCodec,
};

/// The type of a mailbox.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/mailboxtype>
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
pub enum MailboxType {
    Unknown,
    OneOff,
    Mailbox,
    PublicDL,
    PrivateDL,
    Contact,
    PublicFolder,
    GroupMailbox,
    ImplicitContact,
    User,
}

/// The identifier of an item, with the change key of the version it
/// identifies.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/itemid>
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemId {
    pub id: String,
    pub change_key: Option<String>,
}

impl ItemId {
    fn read_from_xml(reader: &mut EwsXmlReader<'_>) -> Result<Self> {
        let item_id = ItemId {
            id: reader.read_attribute("Id")?.unwrap_or_default(),
            change_key: reader.read_attribute("ChangeKey")?,
        };
        reader.skip_current_element()?;

        Ok(item_id)
    }

    fn write_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        writer.write_start_element(XmlNamespace::Types, "ItemId")?;
        writer.write_attribute_value("Id", &self.id)?;
        if let Some(change_key) = &self.change_key {
            writer.write_attribute_value("ChangeKey", change_key)?;
        }
        writer.write_end_element()
    }

    fn to_json(&self) -> Value {
        let mut json = JsonObject::new();
        json.add_type_parameter("ItemId");
        json.add("Id", self.id.as_str());
        json.add_optional("ChangeKey", self.change_key.as_deref());

        json.into()
    }

    fn from_json(json: &JsonObject) -> Result<Self> {
        Ok(ItemId {
            id: json.read_as_string("Id")?.to_owned(),
            change_key: json.read_as_optional_string("ChangeKey")?.map(str::to_owned),
        })
    }
}

/// A mailbox, as the sender or a recipient of a message.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/mailbox>
#[derive(Clone, Debug, Default)]
pub struct EmailAddress {
    name: Option<String>,
    address: Option<String>,
    routing_type: Option<String>,
    mailbox_type: Option<MailboxType>,
    item_id: Option<ItemId>,
    on_change: ChangeEvent,
}

impl EmailAddress {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailbox addressed by SMTP address.
    pub fn smtp(name: Option<&str>, address: &str) -> Self {
        Self {
            name: name.map(str::to_owned),
            address: Some(address.to_owned()),
            routing_type: Some(String::from("SMTP")),
            ..Default::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        if set_field_value(&mut self.name, name) {
            self.changed();
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: Option<String>) {
        if set_field_value(&mut self.address, address) {
            self.changed();
        }
    }

    pub fn routing_type(&self) -> Option<&str> {
        self.routing_type.as_deref()
    }

    pub fn set_routing_type(&mut self, routing_type: Option<String>) {
        if set_field_value(&mut self.routing_type, routing_type) {
            self.changed();
        }
    }

    pub fn mailbox_type(&self) -> Option<MailboxType> {
        self.mailbox_type
    }

    pub fn set_mailbox_type(&mut self, mailbox_type: Option<MailboxType>) {
        if set_field_value(&mut self.mailbox_type, mailbox_type) {
            self.changed();
        }
    }

    pub fn item_id(&self) -> Option<&ItemId> {
        self.item_id.as_ref()
    }

    pub fn set_item_id(&mut self, item_id: Option<ItemId>) {
        if set_field_value(&mut self.item_id, item_id) {
            self.changed();
        }
    }

    // The setters below bypass change notification: they are used when
    // reading from the wire, possibly on top of an already loaded mailbox.

    pub(crate) fn load_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    pub(crate) fn load_address(&mut self, address: Option<String>) {
        self.address = address;
    }

    pub(crate) fn load_routing_type(&mut self, routing_type: Option<String>) {
        self.routing_type = routing_type;
    }

    pub(crate) fn load_mailbox_type(&mut self, mailbox_type: Option<MailboxType>) {
        self.mailbox_type = mailbox_type;
    }
}

impl PartialEq for EmailAddress {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.address == other.address
            && self.routing_type == other.routing_type
            && self.mailbox_type == other.mailbox_type
            && self.item_id == other.item_id
    }
}

impl ComplexProperty for EmailAddress {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }
}

impl WireCodec for EmailAddress {
    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        let Some(local_name) = reader.local_name().map(str::to_owned) else {
            return Ok(false);
        };

        match local_name.as_str() {
            "Name" => self.name = Some(reader.read_element_value()?),
            "EmailAddress" => self.address = Some(reader.read_element_value()?),
            "RoutingType" => self.routing_type = Some(reader.read_element_value()?),
            "MailboxType" => self.mailbox_type = Some(reader.read_element_value_as()?),
            "ItemId" => self.item_id = Some(ItemId::read_from_xml(reader)?),
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn try_read_element_from_xml_to_patch(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool> {
        self.try_read_element_from_xml(reader)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        if let Some(name) = &self.name {
            writer.write_element_value(XmlNamespace::Types, "Name", name)?;
        }
        if let Some(address) = &self.address {
            writer.write_element_value(XmlNamespace::Types, "EmailAddress", address)?;
        }
        if let Some(routing_type) = &self.routing_type {
            writer.write_element_value(XmlNamespace::Types, "RoutingType", routing_type)?;
        }
        if let Some(mailbox_type) = self.mailbox_type {
            writer.write_element_value(XmlNamespace::Types, "MailboxType", mailbox_type)?;
        }
        if let Some(item_id) = &self.item_id {
            item_id.write_to_xml(writer)?;
        }

        Ok(())
    }

    /// Only the keys present in `json` are applied.
    fn load_from_json(&mut self, json: &JsonObject, _ctx: &ServiceContext) -> Result<()> {
        if let Some(name) = json.read_as_optional_string("Name")? {
            self.name = Some(name.to_owned());
        }
        if let Some(address) = json.read_as_optional_string("EmailAddress")? {
            self.address = Some(address.to_owned());
        }
        if let Some(routing_type) = json.read_as_optional_string("RoutingType")? {
            self.routing_type = Some(routing_type.to_owned());
        }
        if json.contains_key("MailboxType") {
            self.mailbox_type = Some(json.read_enum_value("MailboxType")?);
        }
        if json.contains_key("ItemId") {
            self.item_id = Some(ItemId::from_json(&json.read_as_json_object("ItemId")?)?);
        }

        Ok(())
    }

    fn internal_to_json(&self, _ctx: &ServiceContext) -> Result<Value> {
        let mut json = JsonObject::new();
        json.add_type_parameter("EmailAddress");
        json.add_optional("Name", self.name.as_deref());
        json.add_optional("EmailAddress", self.address.as_deref());
        json.add_optional("RoutingType", self.routing_type.as_deref());
        json.add_optional(
            "MailboxType",
            self.mailbox_type.map(|mailbox_type| mailbox_type.to_string()),
        );
        json.add_optional("ItemId", self.item_id.as_ref().map(ItemId::to_json));

        Ok(json.into())
    }
}

impl CollectionItem for EmailAddress {
    fn create_from_xml_element_name(local_name: &str) -> Option<Self> {
        (local_name == "Mailbox").then(EmailAddress::new)
    }

    fn create_default() -> Option<Self> {
        Some(EmailAddress::new())
    }

    fn create_from_json_type(type_name: &str) -> Option<Self> {
        (type_name == "EmailAddress").then(EmailAddress::new)
    }

    fn xml_element_name(&self) -> &'static str {
        "Mailbox"
    }
}

impl CustomUpdateSerializer for EmailAddress {}

/// A list of mailboxes, such as the recipients of a message.
pub type EmailAddressCollection = ComplexPropertyCollection<EmailAddress>;

impl ComplexPropertyCollection<EmailAddress> {
    /// Adds a mailbox addressed by SMTP address.
    pub fn add_smtp_address(&mut self, name: Option<&str>, address: &str) -> MemberId {
        self.add(EmailAddress::smtp(name, address))
    }

    /// Removes the first mailbox with the given address, ignoring case.
    /// Returns whether one was found.
    pub fn remove_smtp_address(&mut self, address: &str) -> bool {
        let position = self.iter().position(|mailbox| {
            mailbox
                .address()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(address))
        });

        match position {
            Some(index) => self.remove_at(index),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use serde_json::json;

    use super::*;
    use crate::{
        test_utils::{assert_serialized_content, reader_on_root, write_to_string},
        ChangeState, Error,
    };

    fn full_mailbox() -> EmailAddress {
        let mut mailbox = EmailAddress::smtp(Some("Alice"), "alice@example.com");
        mailbox.set_mailbox_type(Some(MailboxType::Contact));
        mailbox.set_item_id(Some(ItemId {
            id: String::from("AAMkAD"),
            change_key: Some(String::from("EQAAAB")),
        }));

        mailbox
    }

    #[test]
    fn serialize_mailbox() {
        assert_serialized_content(
            &full_mailbox(),
            "Mailbox",
            r#"<t:Mailbox><t:Name>Alice</t:Name><t:EmailAddress>alice@example.com</t:EmailAddress><t:RoutingType>SMTP</t:RoutingType><t:MailboxType>Contact</t:MailboxType><t:ItemId Id="AAMkAD" ChangeKey="EQAAAB"/></t:Mailbox>"#,
        );
    }

    #[test]
    fn write_then_load_round_trip() {
        let mailbox = full_mailbox();

        let xml = write_to_string(|writer| mailbox.write_to_xml(writer, "Mailbox"));
        let mut reader = reader_on_root(&xml, "Mailbox");
        let mut loaded = EmailAddress::new();
        loaded.load_from_xml(&mut reader, "Mailbox").unwrap();

        assert_eq!(loaded, mailbox);
    }

    #[test]
    fn json_round_trip() {
        let ctx = ServiceContext::default();
        let mailbox = full_mailbox();

        let value = mailbox.internal_to_json(&ctx).unwrap();
        assert_eq!(value["__type"], json!("EmailAddress:#Exchange"));
        assert_eq!(value["MailboxType"], json!("Contact"));

        let mut loaded = EmailAddress::new();
        loaded
            .load_from_json(&JsonObject::try_from(value).unwrap(), &ctx)
            .unwrap();
        assert_eq!(loaded, mailbox);
    }

    #[test]
    fn unknown_mailbox_type_is_invalid() {
        let ctx = ServiceContext::default();
        let json = JsonObject::parse(r#"{"MailboxType": "Robot"}"#).unwrap();

        let err = EmailAddress::new()
            .load_from_json(&json, &ctx)
            .expect_err("unknown mailbox type should be rejected");
        assert!(matches!(err, Error::InvalidValue { .. }), "unexpected error {err:?}");
    }

    #[test]
    fn setters_only_notify_on_change() {
        let mut mailbox = EmailAddress::smtp(None, "alice@example.com");
        let calls = Rc::new(Cell::new(0));
        {
            let calls = Rc::clone(&calls);
            mailbox
                .change_event()
                .subscribe(move || calls.set(calls.get() + 1));
        }

        mailbox.set_address(Some(String::from("alice@example.com")));
        mailbox.set_routing_type(Some(String::from("SMTP")));
        assert_eq!(calls.get(), 0, "reassigning equal values is not a change");

        mailbox.set_name(Some(String::from("Alice")));
        mailbox.set_name(None);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn smtp_helpers_on_collection() {
        let mut recipients = EmailAddressCollection::new();
        let id = recipients.add_smtp_address(Some("Alice"), "alice@example.com");
        recipients.add_smtp_address(None, "bob@example.com");

        assert_eq!(recipients.state_of(id), Some(ChangeState::Added));
        assert!(recipients.remove_smtp_address("ALICE@example.com"));
        assert!(!recipients.remove_smtp_address("carol@example.com"));
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients.get(0).and_then(EmailAddress::address), Some("bob@example.com"));
    }
}
