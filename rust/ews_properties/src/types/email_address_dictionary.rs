/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use serde_json::Value;
use strum::{Display, EnumString};

use crate::{
    change::Subscription,
    dictionary::KEY_ATTRIBUTE_NAME,
    json::JsonObject,
    xml::{EwsXmlReader, EwsXmlWriter},
    ChangeEvent, ComplexProperty, DictionaryEntry, DictionaryProperty, EmailAddress, Result,
    ServiceContext, WireCodec,
};

/// The slots of a contact's email address dictionary.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/entry-emailaddress>
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EmailAddressKey {
    EmailAddress1,
    EmailAddress2,
    EmailAddress3,
}

/// An email address of a contact.
///
/// The entry wraps an [`EmailAddress`], and any change to the address is a
/// change to the entry. On the wire, the address is the text of the entry
/// and the other mailbox properties are attributes.
#[derive(Debug)]
pub struct EmailAddressEntry {
    key: EmailAddressKey,
    email_address: EmailAddress,
    email_address_subscription: Subscription,
    on_change: ChangeEvent,
}

impl EmailAddressEntry {
    pub fn new(key: EmailAddressKey, email_address: EmailAddress) -> Self {
        let on_change = ChangeEvent::new();
        let email_address_subscription = forward_changes(&email_address, &on_change);

        Self {
            key,
            email_address,
            email_address_subscription,
            on_change,
        }
    }

    pub fn email_address(&self) -> &EmailAddress {
        &self.email_address
    }

    /// Runs `f` on the address and returns its result. Changes made through
    /// the address's setters are changes to the entry, and so is swapping
    /// the address for another one.
    pub fn modify_email_address<R>(&mut self, f: impl FnOnce(&mut EmailAddress) -> R) -> R {
        let result = f(&mut self.email_address);

        if !self
            .email_address_subscription
            .is_on(self.email_address.change_event())
        {
            self.email_address_subscription.cancel();
            self.email_address_subscription =
                forward_changes(&self.email_address, &self.on_change);
            self.changed();
        }

        result
    }

    pub fn set_email_address(&mut self, email_address: EmailAddress) {
        if self.email_address == email_address {
            return;
        }

        self.email_address_subscription.cancel();
        self.email_address_subscription = forward_changes(&email_address, &self.on_change);
        self.email_address = email_address;

        self.changed();
    }
}

fn forward_changes(email_address: &EmailAddress, on_change: &ChangeEvent) -> Subscription {
    let entry_event = on_change.downgrade();
    Subscription::new(email_address.change_event(), move || entry_event.notify())
}

impl Clone for EmailAddressEntry {
    fn clone(&self) -> Self {
        Self::new(self.key, self.email_address.clone())
    }
}

impl PartialEq for EmailAddressEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.email_address == other.email_address
    }
}

impl ComplexProperty for EmailAddressEntry {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }
}

impl WireCodec for EmailAddressEntry {
    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<()> {
        if let Some(key) = reader.read_attribute(KEY_ATTRIBUTE_NAME)? {
            self.key = key;
        }

        self.email_address.load_name(reader.read_attribute("Name")?);
        self.email_address
            .load_routing_type(reader.read_attribute("RoutingType")?);
        self.email_address
            .load_mailbox_type(reader.read_attribute("MailboxType")?);

        Ok(())
    }

    fn read_text_value_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<()> {
        self.email_address
            .load_address(reader.text().map(str::to_owned));

        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        writer.write_attribute_value(KEY_ATTRIBUTE_NAME, self.key)?;

        if let Some(name) = self.email_address.name() {
            writer.write_attribute_value("Name", name)?;
        }
        if let Some(routing_type) = self.email_address.routing_type() {
            writer.write_attribute_value("RoutingType", routing_type)?;
        }
        if let Some(mailbox_type) = self.email_address.mailbox_type() {
            writer.write_attribute_value("MailboxType", mailbox_type)?;
        }

        Ok(())
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        if let Some(address) = self.email_address.address() {
            writer.write_value(address)?;
        }

        Ok(())
    }

    fn load_from_json(&mut self, json: &JsonObject, ctx: &ServiceContext) -> Result<()> {
        if json.contains_key(KEY_ATTRIBUTE_NAME) {
            self.key = json.read_enum_value(KEY_ATTRIBUTE_NAME)?;
        }

        self.email_address.load_from_json(json, ctx)
    }

    fn internal_to_json(&self, _ctx: &ServiceContext) -> Result<Value> {
        let mut json = JsonObject::new();
        json.add(KEY_ATTRIBUTE_NAME, self.key.to_string());
        json.add_optional("Name", self.email_address.name());
        json.add_optional("EmailAddress", self.email_address.address());
        json.add_optional("RoutingType", self.email_address.routing_type());
        json.add_optional(
            "MailboxType",
            self.email_address
                .mailbox_type()
                .map(|mailbox_type| mailbox_type.to_string()),
        );

        Ok(json.into())
    }
}

impl DictionaryEntry for EmailAddressEntry {
    type Key = EmailAddressKey;

    const FIELD_URI: &'static str = "contacts:EmailAddress";

    fn key(&self) -> EmailAddressKey {
        self.key
    }

    fn with_key(key: EmailAddressKey) -> Self {
        Self::new(key, EmailAddress::new())
    }
}

/// The email addresses of a contact.
pub type EmailAddressDictionary = DictionaryProperty<EmailAddressEntry>;

impl DictionaryProperty<EmailAddressEntry> {
    pub fn email_address(&self, key: EmailAddressKey) -> Option<&EmailAddress> {
        self.get(key).map(EmailAddressEntry::email_address)
    }

    /// Sets the address in the given slot, adding an entry if the slot is
    /// empty.
    pub fn set_email_address(&mut self, key: EmailAddressKey, email_address: EmailAddress) {
        if !self.contains_key(key) {
            self.add_or_replace(EmailAddressEntry::new(key, email_address));
            return;
        }

        self.modify(key, |entry| entry.set_email_address(email_address));
    }
}
