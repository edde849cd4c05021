/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::Write;

use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
    dictionary::{ENTRY_ELEMENT_NAME, KEY_ATTRIBUTE_NAME},
    json::JsonObject,
    update::{
        json_delete_field, json_field_update, write_delete_field, write_field_update,
        PathToElement, ServiceObject,
    },
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace},
    ChangeEvent, ComplexProperty, DictionaryEntry, DictionaryProperty, Result, ServiceContext,
    SimplePropertyBag, WireCodec,
};

/// The slots of a contact's physical address dictionary.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/entry-physicaladdress>
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhysicalAddressKey {
    Business,
    Home,
    Other,
}

/// The fields of a physical address, in schema order.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PhysicalAddressField {
    Street,
    City,
    State,
    CountryOrRegion,
    PostalCode,
}

/// A physical address of a contact.
///
/// Each field is addressed individually in updates, so that only the fields
/// which changed are sent to the server.
#[derive(Debug)]
pub struct PhysicalAddressEntry {
    key: PhysicalAddressKey,
    fields: SimplePropertyBag<PhysicalAddressField, String>,
    on_change: ChangeEvent,
}

impl PhysicalAddressEntry {
    pub fn new(key: PhysicalAddressKey) -> Self {
        Self {
            key,
            fields: SimplePropertyBag::new(),
            on_change: ChangeEvent::new(),
        }
    }

    pub fn field(&self, field: PhysicalAddressField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Sets or, with `None`, clears a field.
    pub fn set_field(&mut self, field: PhysicalAddressField, value: Option<String>) {
        if self.fields.set(field, value) {
            self.changed();
        }
    }

    pub fn street(&self) -> Option<&str> {
        self.field(PhysicalAddressField::Street)
    }

    pub fn set_street(&mut self, street: Option<String>) {
        self.set_field(PhysicalAddressField::Street, street);
    }

    pub fn city(&self) -> Option<&str> {
        self.field(PhysicalAddressField::City)
    }

    pub fn set_city(&mut self, city: Option<String>) {
        self.set_field(PhysicalAddressField::City, city);
    }

    pub fn state(&self) -> Option<&str> {
        self.field(PhysicalAddressField::State)
    }

    pub fn set_state(&mut self, state: Option<String>) {
        self.set_field(PhysicalAddressField::State, state);
    }

    pub fn country_or_region(&self) -> Option<&str> {
        self.field(PhysicalAddressField::CountryOrRegion)
    }

    pub fn set_country_or_region(&mut self, country_or_region: Option<String>) {
        self.set_field(PhysicalAddressField::CountryOrRegion, country_or_region);
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.field(PhysicalAddressField::PostalCode)
    }

    pub fn set_postal_code(&mut self, postal_code: Option<String>) {
        self.set_field(PhysicalAddressField::PostalCode, postal_code);
    }

    fn field_path(&self, field: PhysicalAddressField) -> PathToElement {
        PathToElement::IndexedFieldURI {
            field_uri: format!("{}:{field}", Self::FIELD_URI),
            field_index: self.key.to_string(),
        }
    }

    /// Fields to set in an update: added fields, then modified fields.
    fn fields_to_set(&self) -> impl Iterator<Item = (PhysicalAddressField, &str)> {
        self.fields
            .added_keys()
            .chain(self.fields.modified_keys())
            .filter_map(|field| Some((*field, self.field(*field)?)))
    }
}

impl Clone for PhysicalAddressEntry {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            fields: self.fields.clone(),
            on_change: ChangeEvent::new(),
        }
    }
}

impl PartialEq for PhysicalAddressEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.fields.iter().eq(other.fields.iter())
    }
}

impl ComplexProperty for PhysicalAddressEntry {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }

    fn clear_change_log(&mut self) {
        self.fields.clear_change_log();
    }
}

impl WireCodec for PhysicalAddressEntry {
    fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<()> {
        if let Some(key) = reader.read_attribute(KEY_ATTRIBUTE_NAME)? {
            self.key = key;
        }

        Ok(())
    }

    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        let Some(field) = reader
            .local_name()
            .and_then(|local_name| local_name.parse::<PhysicalAddressField>().ok())
        else {
            return Ok(false);
        };

        self.fields.load(field, reader.read_element_value()?);

        Ok(true)
    }

    fn try_read_element_from_xml_to_patch(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool> {
        self.try_read_element_from_xml(reader)
    }

    fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        writer.write_attribute_value(KEY_ATTRIBUTE_NAME, self.key)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        for (field, value) in self.fields.iter() {
            writer.write_element_value(XmlNamespace::Types, &field.to_string(), value)?;
        }

        Ok(())
    }

    fn load_from_json(&mut self, json: &JsonObject, _ctx: &ServiceContext) -> Result<()> {
        if json.contains_key(KEY_ATTRIBUTE_NAME) {
            self.key = json.read_enum_value(KEY_ATTRIBUTE_NAME)?;
        }

        for field in PhysicalAddressField::iter() {
            if let Some(value) = json.read_as_optional_string(&field.to_string())? {
                self.fields.load(field, value.to_owned());
            }
        }

        Ok(())
    }

    fn internal_to_json(&self, _ctx: &ServiceContext) -> Result<Value> {
        let mut json = JsonObject::new();
        json.add(KEY_ATTRIBUTE_NAME, self.key.to_string());
        for (field, value) in self.fields.iter() {
            json.add(&field.to_string(), value.as_str());
        }

        Ok(json.into())
    }
}

impl DictionaryEntry for PhysicalAddressEntry {
    type Key = PhysicalAddressKey;

    const FIELD_URI: &'static str = "contacts:PhysicalAddress";

    fn key(&self) -> PhysicalAddressKey {
        self.key
    }

    fn with_key(key: PhysicalAddressKey) -> Self {
        Self::new(key)
    }

    /// Sets each added or modified field, then deletes each cleared field.
    fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
        dictionary_element_name: &str,
    ) -> Result<bool> {
        for (field, value) in self.fields_to_set() {
            write_field_update(
                writer,
                owner.set_field_xml_element_name(),
                owner,
                &self.field_path(field),
                |writer| {
                    writer.write_start_element(XmlNamespace::Types, dictionary_element_name)?;
                    writer.write_start_element(XmlNamespace::Types, ENTRY_ELEMENT_NAME)?;
                    writer.write_attribute_value(KEY_ATTRIBUTE_NAME, self.key)?;
                    writer.write_element_value(XmlNamespace::Types, &field.to_string(), value)?;
                    writer.write_end_element()?;
                    writer.write_end_element()
                },
            )?;
        }

        for field in self.fields.removed_keys() {
            write_delete_field(writer, owner, &self.field_path(*field))?;
        }

        Ok(true)
    }

    /// Deletes every field of the address.
    fn write_delete_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
    ) -> Result<bool> {
        for field in PhysicalAddressField::iter() {
            write_delete_field(writer, owner, &self.field_path(field))?;
        }

        Ok(true)
    }

    fn set_update_to_json(
        &self,
        _ctx: &ServiceContext,
        owner: &dyn ServiceObject,
        dictionary_element_name: &str,
        updates: &mut Vec<Value>,
    ) -> Result<bool> {
        for (field, value) in self.fields_to_set() {
            let mut entry = JsonObject::new();
            entry.add(KEY_ATTRIBUTE_NAME, self.key.to_string());
            entry.add(&field.to_string(), value);

            let mut service_object = JsonObject::new();
            service_object.add(dictionary_element_name, Value::Array(vec![entry.into()]));
            updates.push(json_field_update(
                owner.set_field_xml_element_name(),
                owner,
                &self.field_path(field),
                Some(service_object),
            ));
        }

        for field in self.fields.removed_keys() {
            updates.push(json_delete_field(owner, &self.field_path(*field)));
        }

        Ok(true)
    }

    fn delete_update_to_json(
        &self,
        _ctx: &ServiceContext,
        owner: &dyn ServiceObject,
        updates: &mut Vec<Value>,
    ) -> Result<bool> {
        for field in PhysicalAddressField::iter() {
            updates.push(json_delete_field(owner, &self.field_path(field)));
        }

        Ok(true)
    }
}

/// The physical addresses of a contact.
pub type PhysicalAddressDictionary = DictionaryProperty<PhysicalAddressEntry>;

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use serde_json::json;

    use super::*;
    use crate::{
        schema,
        test_utils::{reader_on_root, types_document, write_fragment, write_to_string},
        update::{set_update_to_json, write_set_update, ServiceObjectKind},
        ChangeState,
    };

    const CONTACT: ServiceObjectKind = ServiceObjectKind::Item {
        xml_element_name: "Contact",
    };

    const ADDRESSES: &str = concat!(
        r#"<t:Entry Key="Business"><t:Street>1 Main St</t:Street><t:City>Springfield</t:City><t:Suburb>ignored</t:Suburb></t:Entry>"#,
        r#"<t:Entry Key="Other"><t:PostalCode>12345</t:PostalCode></t:Entry>"#,
    );

    fn loaded() -> PhysicalAddressDictionary {
        let xml = types_document("PhysicalAddresses", ADDRESSES);
        let mut reader = reader_on_root(&xml, "PhysicalAddresses");

        let mut dictionary = PhysicalAddressDictionary::new();
        dictionary
            .load_from_xml(&mut reader, "PhysicalAddresses")
            .expect("loading should succeed");

        dictionary
    }

    fn set_field(field: &str, key: &str, value: &str) -> String {
        format!(
            r#"<t:SetItemField><t:IndexedFieldURI FieldURI="contacts:PhysicalAddress:{field}" FieldIndex="{key}"/><t:Contact><t:PhysicalAddresses><t:Entry Key="{key}"><t:{field}>{value}</t:{field}></t:Entry></t:PhysicalAddresses></t:Contact></t:SetItemField>"#
        )
    }

    fn delete_field(field: &str, key: &str) -> String {
        format!(
            r#"<t:DeleteItemField><t:IndexedFieldURI FieldURI="contacts:PhysicalAddress:{field}" FieldIndex="{key}"/></t:DeleteItemField>"#
        )
    }

    #[test]
    fn load_fields() {
        let dictionary = loaded();

        let business = dictionary.get(PhysicalAddressKey::Business).unwrap();
        assert_eq!(business.street(), Some("1 Main St"));
        assert_eq!(business.city(), Some("Springfield"));
        assert_eq!(business.state(), None);
        assert_eq!(
            dictionary
                .get(PhysicalAddressKey::Other)
                .and_then(PhysicalAddressEntry::postal_code),
            Some("12345")
        );
        assert!(!dictionary.has_changes());
    }

    #[test]
    fn write_then_load_round_trip() {
        let dictionary = loaded();

        let xml = write_to_string(|writer| dictionary.write_to_xml(writer, "PhysicalAddresses"));
        let mut reader = reader_on_root(&xml, "PhysicalAddresses");
        let mut reloaded = PhysicalAddressDictionary::new();
        reloaded.load_from_xml(&mut reader, "PhysicalAddresses").unwrap();

        assert_eq!(
            reloaded.iter().collect::<Vec<_>>(),
            dictionary.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn field_changes_notify_once_per_change() {
        let mut entry = PhysicalAddressEntry::new(PhysicalAddressKey::Home);
        let calls = Rc::new(Cell::new(0));
        {
            let calls = Rc::clone(&calls);
            entry
                .change_event()
                .subscribe(move || calls.set(calls.get() + 1));
        }

        entry.set_city(Some(String::from("Lyon")));
        entry.set_city(Some(String::from("Lyon")));
        entry.set_state(None);
        entry.set_city(None);

        assert_eq!(calls.get(), 2);
        assert!(
            entry.fields.removed_keys().next().is_none(),
            "a field added and cleared leaves no record"
        );
    }

    #[test]
    fn update_fragments_per_field() {
        let ctx = ServiceContext::default();
        let mut dictionary = loaded();

        dictionary.modify(PhysicalAddressKey::Business, |business| {
            business.set_city(Some(String::from("Shelbyville")));
            business.set_street(None);
            business.set_postal_code(Some(String::from("54321")));
        });

        let mut home = PhysicalAddressEntry::new(PhysicalAddressKey::Home);
        home.set_city(Some(String::from("Lyon")));
        dictionary.add(home).unwrap();

        dictionary.remove(PhysicalAddressKey::Other);

        assert_eq!(
            dictionary.entry_state(PhysicalAddressKey::Business),
            Some(ChangeState::Modified)
        );

        let xml = write_fragment(|writer| {
            write_set_update(
                writer,
                &ctx,
                &CONTACT,
                &schema::contact::PHYSICAL_ADDRESSES,
                &dictionary,
            )
        });

        let expected = [
            set_field("City", "Home", "Lyon"),
            set_field("PostalCode", "Business", "54321"),
            set_field("City", "Business", "Shelbyville"),
            delete_field("Street", "Business"),
            delete_field("Street", "Other"),
            delete_field("City", "Other"),
            delete_field("State", "Other"),
            delete_field("CountryOrRegion", "Other"),
            delete_field("PostalCode", "Other"),
        ]
        .concat();
        assert_eq!(xml, expected);
    }

    #[test]
    fn json_update_fragments() {
        let ctx = ServiceContext::default();
        let mut dictionary = loaded();
        dictionary.modify(PhysicalAddressKey::Other, |other| other.set_postal_code(None));
        dictionary.modify(PhysicalAddressKey::Business, |business| {
            business.set_state(Some(String::from("IL")))
        });

        let mut updates = Vec::new();
        set_update_to_json(
            &ctx,
            &CONTACT,
            &schema::contact::PHYSICAL_ADDRESSES,
            &dictionary,
            &mut updates,
        )
        .unwrap();

        assert_eq!(
            updates,
            [
                json!({
                    "__type": "SetItemField:#Exchange",
                    "Path": {
                        "__type": "DictionaryPropertyUri:#Exchange",
                        "FieldURI": "contacts:PhysicalAddress:State",
                        "FieldIndex": "Business",
                    },
                    "Item": {
                        "__type": "Contact:#Exchange",
                        "PhysicalAddresses": [{"Key": "Business", "State": "IL"}],
                    },
                }),
                json!({
                    "__type": "DeleteItemField:#Exchange",
                    "Path": {
                        "__type": "DictionaryPropertyUri:#Exchange",
                        "FieldURI": "contacts:PhysicalAddress:PostalCode",
                        "FieldIndex": "Other",
                    },
                }),
            ]
        );
    }

    #[test]
    fn json_load() {
        let ctx = ServiceContext::default();
        let values = [json!({"Key": "Home", "Street": "2 Rue Neuve", "City": "Lyon"})];

        let mut dictionary = PhysicalAddressDictionary::new();
        dictionary.load_from_json_collection(&values, &ctx).unwrap();

        let home = dictionary.get(PhysicalAddressKey::Home).unwrap();
        assert_eq!(home.street(), Some("2 Rue Neuve"));
        assert_eq!(home.city(), Some("Lyon"));
        assert_eq!(
            home.internal_to_json(&ctx).unwrap(),
            json!({"Key": "Home", "Street": "2 Rue Neuve", "City": "Lyon"})
        );
    }
}
