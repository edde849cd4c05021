/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{cell::Cell, collections::BTreeMap, fmt, io::Write, rc::Rc, str::FromStr};

use serde_json::Value;

use crate::{
    change::{track_member, Subscription},
    json::JsonObject,
    property::write_property_to_xml,
    update::{
        json_delete_field, json_field_update, write_delete_field, write_field_update,
        CustomUpdateSerializer, PathToElement, PropertyDefinition, ServiceObject,
    },
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace},
    ChangeEvent, ChangeState, ComplexProperty, Error, Result, ServiceContext, WireCodec,
};

/// The element name of dictionary entries.
pub const ENTRY_ELEMENT_NAME: &str = "Entry";

/// The attribute (and JSON key) holding the key of a dictionary entry.
pub const KEY_ATTRIBUTE_NAME: &str = "Key";

/// A node type which can be an entry of a [`DictionaryProperty`].
pub trait DictionaryEntry: WireCodec + Sized {
    type Key: Copy + Ord + fmt::Display + fmt::Debug + FromStr;

    /// The field URI addressing entries of this kind in updates, e.g.
    /// `contacts:EmailAddress`.
    const FIELD_URI: &'static str;

    fn key(&self) -> Self::Key;

    /// Creates an empty entry for the given key.
    fn with_key(key: Self::Key) -> Self;

    /// The index addressing the entry with the given key in updates.
    fn field_index(key: Self::Key) -> String {
        key.to_string()
    }

    /// Writes the update fragments setting this entry, if it must be
    /// addressed differently than as a whole. Returns whether it did.
    fn write_set_update_to_xml<W: Write>(
        &self,
        _writer: &mut EwsXmlWriter<W>,
        _owner: &dyn ServiceObject,
        _dictionary_element_name: &str,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Writes the update fragments deleting this entry, if it must be
    /// addressed differently than as a whole. Returns whether it did.
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
        _dictionary_element_name: &str,
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

/// The indexed field path of the entry of kind `E` with the given key.
pub fn entry_path<E: DictionaryEntry>(key: E::Key) -> PathToElement {
    PathToElement::IndexedFieldURI {
        field_uri: E::FIELD_URI.to_owned(),
        field_index: E::field_index(key),
    }
}

struct Slot<E> {
    entry: E,
    state: Rc<Cell<ChangeState>>,
    subscription: Subscription,

    /// Whether the entry was added in place of an entry pending removal.
    replaces_removed: bool,
}

/// A keyed collection of property nodes with a change log.
///
/// Entries are ordered by key. Removed entries are kept, with their last
/// value, until the change log is cleared, so that their deletion can be
/// addressed in an update.
pub struct DictionaryProperty<E: DictionaryEntry> {
    entries: BTreeMap<E::Key, Slot<E>>,
    removed_entries: BTreeMap<E::Key, E>,
    on_change: ChangeEvent,
}

impl<E: DictionaryEntry> Default for DictionaryProperty<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            removed_entries: BTreeMap::new(),
            on_change: ChangeEvent::new(),
        }
    }
}

impl<E: DictionaryEntry> DictionaryProperty<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: E::Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn get(&self, key: E::Key) -> Option<&E> {
        self.entries.get(&key).map(|slot| &slot.entry)
    }

    /// Runs `f` on the entry with the given key, returning its result, or
    /// `None` if there is no such entry.
    ///
    /// Changes made through the entry's setters are recorded by the
    /// dictionary. If `f` swaps the entry for another node, the dictionary
    /// tracks the new node from then on and the entry counts as modified. If
    /// the new node has another key, the entry moves to that key: the old key
    /// is removed and the entry replaces whatever the new key held.
    pub fn modify<R>(&mut self, key: E::Key, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        let slot = self.entries.get_mut(&key)?;
        let result = f(&mut slot.entry);

        if slot.entry.key() != key {
            self.move_entry(key);
            return Some(result);
        }

        if slot.subscription.is_on(slot.entry.change_event()) {
            return Some(result);
        }

        slot.subscription.cancel();
        slot.subscription = track_member(slot.entry.change_event(), &slot.state, &self.on_change);

        if slot.state.get() == ChangeState::Unchanged {
            slot.state.set(ChangeState::Modified);
            self.changed();
        }

        Some(result)
    }

    pub fn keys(&self) -> impl Iterator<Item = E::Key> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (E::Key, &E)> {
        self.entries.iter().map(|(key, slot)| (*key, &slot.entry))
    }

    /// The state of the entry with the given key, including entries pending
    /// removal.
    pub fn entry_state(&self, key: E::Key) -> Option<ChangeState> {
        match self.entries.get(&key) {
            Some(slot) => Some(slot.state.get()),
            None => self
                .removed_entries
                .contains_key(&key)
                .then_some(ChangeState::Removed),
        }
    }

    /// Adds a new entry. Adding an entry whose key is pending removal cancels
    /// the removal.
    pub fn add(&mut self, entry: E) -> Result<()> {
        let key = entry.key();
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }

        let replaces_removed = self.removed_entries.remove(&key).is_some();
        let slot = self.attach(entry, ChangeState::Added, replaces_removed);
        self.entries.insert(key, slot);
        self.changed();

        Ok(())
    }

    /// Adds an entry, replacing any existing entry with the same key. Returns
    /// the replaced entry.
    pub fn add_or_replace(&mut self, entry: E) -> Option<E> {
        let key = entry.key();

        let Some(old) = self.entries.remove(&key) else {
            let replaces_removed = self.removed_entries.remove(&key).is_some();
            let slot = self.attach(entry, ChangeState::Added, replaces_removed);
            self.entries.insert(key, slot);
            self.changed();

            return None;
        };

        old.subscription.cancel();
        let state = match old.state.get() {
            ChangeState::Added => ChangeState::Added,
            _ => ChangeState::Modified,
        };

        let slot = self.attach(entry, state, old.replaces_removed);
        self.entries.insert(key, slot);
        self.changed();

        Some(old.entry)
    }

    /// Removes the entry with the given key. Returns whether there was one.
    ///
    /// The removed entry is kept pending removal, unless it was added since
    /// the baseline.
    pub fn remove(&mut self, key: E::Key) -> bool {
        let Some(slot) = self.entries.remove(&key) else {
            return false;
        };

        slot.subscription.cancel();

        let added_since_baseline =
            slot.state.get() == ChangeState::Added && !slot.replaces_removed;
        if !added_since_baseline {
            slot.state.set(ChangeState::Removed);
            self.removed_entries.insert(key, slot.entry);
        }

        self.changed();
        true
    }

    /// The last value of an entry pending removal.
    pub fn removed_entry(&self, key: E::Key) -> Option<&E> {
        self.removed_entries.get(&key)
    }

    pub fn added_keys(&self) -> impl Iterator<Item = E::Key> + '_ {
        self.keys_in_state(ChangeState::Added)
    }

    pub fn modified_keys(&self) -> impl Iterator<Item = E::Key> + '_ {
        self.keys_in_state(ChangeState::Modified)
    }

    pub fn removed_keys(&self) -> impl Iterator<Item = E::Key> + '_ {
        self.removed_entries.keys().copied()
    }

    pub fn has_changes(&self) -> bool {
        !self.removed_entries.is_empty()
            || self
                .entries
                .values()
                .any(|slot| slot.state.get() != ChangeState::Unchanged)
    }

    /// Loads entries from a JSON array. Entries without a valid key are
    /// skipped.
    pub fn load_from_json_collection(&mut self, values: &[Value], ctx: &ServiceContext) -> Result<()> {
        for value in values {
            let json = JsonObject::try_from(value.clone())?;
            let Some(key) = parse_key::<E>(json.read_as_optional_string(KEY_ATTRIBUTE_NAME)?) else {
                continue;
            };

            let mut entry = E::with_key(key);
            entry.load_from_json(&json, ctx)?;
            self.insert_loaded(entry);
        }

        Ok(())
    }

    pub fn update_from_json_collection(
        &mut self,
        _values: &[Value],
        _ctx: &ServiceContext,
    ) -> Result<()> {
        Err(Error::NotImplemented("DictionaryProperty::update_from_json_collection"))
    }

    /// Inserts an entry of the baseline, without recording a change.
    fn insert_loaded(&mut self, mut entry: E) {
        let key = entry.key();
        entry.clear_change_log();

        if let Some(old) = self.entries.remove(&key) {
            old.subscription.cancel();
        }
        self.removed_entries.remove(&key);

        let slot = self.attach(entry, ChangeState::Unchanged, false);
        self.entries.insert(key, slot);
        self.changed();
    }

    /// Moves the entry stored under `old_key` to the key it now reports.
    fn move_entry(&mut self, old_key: E::Key) {
        let Some(slot) = self.entries.remove(&old_key) else {
            return;
        };
        slot.subscription.cancel();

        let added_since_baseline =
            slot.state.get() == ChangeState::Added && !slot.replaces_removed;
        if !added_since_baseline {
            // Only the key of the previous value is left to delete it by.
            let mut removed = E::with_key(old_key);
            removed.clear_change_log();
            self.removed_entries.insert(old_key, removed);
        }

        log::debug!(
            "dictionary entry {old_key} now has key {}",
            slot.entry.key()
        );
        self.add_or_replace(slot.entry);
    }

    fn attach(&self, entry: E, state: ChangeState, replaces_removed: bool) -> Slot<E> {
        let state = Rc::new(Cell::new(state));
        let subscription = track_member(entry.change_event(), &state, &self.on_change);

        Slot {
            entry,
            state,
            subscription,
            replaces_removed,
        }
    }

    fn keys_in_state(&self, state: ChangeState) -> impl Iterator<Item = E::Key> + '_ {
        self.entries
            .iter()
            .filter(move |(_, slot)| slot.state.get() == state)
            .map(|(key, _)| *key)
    }

    /// Entries to set in an update: added entries, then modified entries.
    fn entries_to_set(&self) -> impl Iterator<Item = &E> {
        let added = self
            .entries
            .values()
            .filter(|slot| slot.state.get() == ChangeState::Added);
        let modified = self
            .entries
            .values()
            .filter(|slot| slot.state.get() == ChangeState::Modified);

        added.chain(modified).map(|slot| &slot.entry)
    }
}

fn parse_key<E: DictionaryEntry>(value: Option<&str>) -> Option<E::Key> {
    let Some(value) = value else {
        log::warn!("dropping dictionary entry without a key");
        return None;
    };

    match value.parse() {
        Ok(key) => Some(key),
        Err(_) => {
            log::warn!("dropping dictionary entry with unknown key `{value}`");
            None
        }
    }
}

impl<E: DictionaryEntry + fmt::Debug> fmt::Debug for DictionaryProperty<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionaryProperty")
            .field(
                "entries",
                &self
                    .entries
                    .iter()
                    .map(|(key, slot)| (key, slot.state.get(), &slot.entry))
                    .collect::<Vec<_>>(),
            )
            .field("removed_entries", &self.removed_entries)
            .finish()
    }
}

impl<E: DictionaryEntry> ComplexProperty for DictionaryProperty<E> {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }

    fn clear_change_log(&mut self) {
        for slot in self.entries.values_mut() {
            slot.state.set(ChangeState::Unchanged);
            slot.replaces_removed = false;
            slot.entry.clear_change_log();
        }

        self.removed_entries.clear();
    }

    fn internal_validate(&self) -> Result<()> {
        self.entries
            .values()
            .try_for_each(|slot| slot.entry.validate())
    }
}

impl<E: DictionaryEntry> WireCodec for DictionaryProperty<E> {
    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        if reader.local_name() != Some(ENTRY_ELEMENT_NAME) {
            return Ok(false);
        }

        let Some(key) = parse_key::<E>(reader.read_attribute_value(KEY_ATTRIBUTE_NAME)) else {
            return Ok(false);
        };

        let namespace = reader.namespace().unwrap_or(XmlNamespace::Types);
        let mut entry = E::with_key(key);
        entry.load_from_xml_ns(reader, namespace, ENTRY_ELEMENT_NAME)?;
        self.insert_loaded(entry);

        Ok(true)
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        self.entries
            .values()
            .try_for_each(|slot| slot.entry.write_to_xml(writer, ENTRY_ELEMENT_NAME))
    }

    /// Writes nothing at all for an empty dictionary.
    fn write_to_xml_ns<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        write_property_to_xml(self, writer, namespace, local_name)
    }

    fn internal_to_json(&self, ctx: &ServiceContext) -> Result<Value> {
        let entries = self
            .entries
            .values()
            .map(|slot| slot.entry.internal_to_json(ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(Value::Array(entries))
    }
}

impl<E: DictionaryEntry> CustomUpdateSerializer for DictionaryProperty<E> {
    /// Sets each added or modified entry, then deletes each removed entry,
    /// all addressed by indexed field URI.
    fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
    ) -> Result<bool> {
        for entry in self.entries_to_set() {
            if entry.write_set_update_to_xml(writer, owner, definition.xml_element_name)? {
                continue;
            }

            write_field_update(
                writer,
                owner.set_field_xml_element_name(),
                owner,
                &entry_path::<E>(entry.key()),
                |writer| {
                    writer.write_start_element(XmlNamespace::Types, definition.xml_element_name)?;
                    entry.write_to_xml(writer, ENTRY_ELEMENT_NAME)?;
                    writer.write_end_element()
                },
            )?;
        }

        for entry in self.removed_entries.values() {
            if !entry.write_delete_update_to_xml(writer, owner)? {
                write_delete_field(writer, owner, &entry_path::<E>(entry.key()))?;
            }
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
        for entry in self.entries_to_set() {
            if entry.set_update_to_json(ctx, owner, definition.xml_element_name, updates)? {
                continue;
            }

            let mut service_object = JsonObject::new();
            service_object.add(
                definition.xml_element_name,
                Value::Array(vec![entry.internal_to_json(ctx)?]),
            );
            updates.push(json_field_update(
                owner.set_field_xml_element_name(),
                owner,
                &entry_path::<E>(entry.key()),
                Some(service_object),
            ));
        }

        for entry in self.removed_entries.values() {
            if !entry.delete_update_to_json(ctx, owner, updates)? {
                updates.push(json_delete_field(owner, &entry_path::<E>(entry.key())));
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        schema,
        test_utils::{reader_on_root, types_document, write_fragment},
        update::{set_update_to_json, write_delete_update, write_set_update, ServiceObjectKind},
        EmailAddress, EmailAddressDictionary, EmailAddressEntry, EmailAddressKey,
    };

    const CONTACT: ServiceObjectKind = ServiceObjectKind::Item {
        xml_element_name: "Contact",
    };

    fn address(value: &str) -> EmailAddress {
        let mut address = EmailAddress::new();
        address.set_address(Some(value.to_owned()));

        address
    }

    fn loaded() -> EmailAddressDictionary {
        let xml = types_document(
            "EmailAddresses",
            r#"<t:Entry Key="EmailAddress1">alice@example.com</t:Entry><t:Entry Key="EmailAddress2" Name="Alice Work">alice@work.example</t:Entry>"#,
        );
        let mut reader = reader_on_root(&xml, "EmailAddresses");

        let mut dictionary = EmailAddressDictionary::new();
        dictionary
            .load_from_xml(&mut reader, "EmailAddresses")
            .expect("loading should succeed");

        dictionary
    }

    fn address_of(dictionary: &EmailAddressDictionary, key: EmailAddressKey) -> Option<&str> {
        dictionary
            .get(key)
            .and_then(|entry| entry.email_address().address())
    }

    #[test]
    fn load_establishes_baseline() {
        let dictionary = loaded();

        assert_eq!(dictionary.len(), 2);
        assert_eq!(
            address_of(&dictionary, EmailAddressKey::EmailAddress1),
            Some("alice@example.com")
        );
        assert_eq!(
            dictionary
                .get(EmailAddressKey::EmailAddress2)
                .and_then(|entry| entry.email_address().name()),
            Some("Alice Work")
        );
        assert!(!dictionary.has_changes());
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let xml = types_document(
            "EmailAddresses",
            r#"<t:Entry Key="EmailAddress9">nobody@example.com</t:Entry><t:Entry>keyless@example.com</t:Entry><t:Entry Key="EmailAddress3">carol@example.com</t:Entry>"#,
        );
        let mut reader = reader_on_root(&xml, "EmailAddresses");

        let mut dictionary = EmailAddressDictionary::new();
        dictionary
            .load_from_xml(&mut reader, "EmailAddresses")
            .expect("unknown keys should not be an error");

        assert_eq!(
            dictionary.keys().collect::<Vec<_>>(),
            [EmailAddressKey::EmailAddress3]
        );
    }

    #[test]
    fn mutate_twice_then_remove() {
        let mut dictionary = loaded();
        let key = EmailAddressKey::EmailAddress1;

        dictionary.modify(key, |entry| {
            entry.modify_email_address(|address| {
                address.set_address(Some(String::from("first@example.com")));
                address.set_address(Some(String::from("second@example.com")));
            })
        });
        assert_eq!(dictionary.modified_keys().collect::<Vec<_>>(), [key]);

        assert!(dictionary.remove(key));

        assert_eq!(
            dictionary
                .removed_entry(key)
                .and_then(|entry| entry.email_address().address()),
            Some("second@example.com")
        );
        assert_eq!(dictionary.modified_keys().count(), 0);
        assert_eq!(dictionary.added_keys().count(), 0);
        assert_eq!(dictionary.entry_state(key), Some(ChangeState::Removed));
    }

    #[test]
    fn repeated_mutation_notifies_once() {
        let mut dictionary = loaded();
        let calls = Rc::new(Cell::new(0));
        {
            let calls = Rc::clone(&calls);
            dictionary
                .change_event()
                .subscribe(move || calls.set(calls.get() + 1));
        }

        dictionary.modify(EmailAddressKey::EmailAddress2, |entry| {
            for name in ["A", "B", "C"] {
                entry.modify_email_address(|address| address.set_name(Some(name.to_owned())));
            }
        });

        assert_eq!(calls.get(), 1);
        assert_eq!(dictionary.modified_keys().count(), 1);
    }

    #[test]
    fn add_then_remove_leaves_no_record() {
        let mut dictionary = loaded();
        let key = EmailAddressKey::EmailAddress3;

        dictionary
            .add(EmailAddressEntry::new(key, address("carol@example.com")))
            .unwrap();
        assert_eq!(dictionary.added_keys().collect::<Vec<_>>(), [key]);

        assert!(dictionary.remove(key));
        assert!(!dictionary.has_changes());
        assert!(!dictionary.remove(key), "entry should only be removed once");
    }

    #[test]
    fn re_adding_removed_key_keeps_deletion_on_second_removal() {
        let mut dictionary = loaded();
        let key = EmailAddressKey::EmailAddress1;

        dictionary.remove(key);
        dictionary
            .add(EmailAddressEntry::new(key, address("new@example.com")))
            .unwrap();
        assert_eq!(dictionary.removed_keys().count(), 0);
        assert_eq!(dictionary.entry_state(key), Some(ChangeState::Added));

        dictionary.remove(key);
        assert_eq!(
            dictionary
                .removed_entry(key)
                .and_then(|entry| entry.email_address().address()),
            Some("new@example.com"),
            "the baseline entry still needs deleting"
        );
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut dictionary = loaded();

        let err = dictionary
            .add(EmailAddressEntry::new(
                EmailAddressKey::EmailAddress1,
                address("dup@example.com"),
            ))
            .expect_err("key is already present");
        assert!(
            matches!(err, Error::DuplicateKey(ref key) if key == "EmailAddress1"),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn replace_marks_existing_key_modified() {
        let mut dictionary = loaded();
        let key = EmailAddressKey::EmailAddress1;

        let old = dictionary
            .add_or_replace(EmailAddressEntry::new(key, address("new@example.com")))
            .expect("an entry should have been replaced");
        assert_eq!(old.email_address().address(), Some("alice@example.com"));
        assert_eq!(dictionary.entry_state(key), Some(ChangeState::Modified));

        // The replaced entry is detached from the dictionary.
        let mut old = old;
        old.modify_email_address(|address| {
            address.set_address(Some(String::from("ignored@example.com")))
        });
        assert_eq!(address_of(&dictionary, key), Some("new@example.com"));

        let none = dictionary.add_or_replace(EmailAddressEntry::new(
            EmailAddressKey::EmailAddress3,
            address("carol@example.com"),
        ));
        assert!(none.is_none());
        assert_eq!(
            dictionary.entry_state(EmailAddressKey::EmailAddress3),
            Some(ChangeState::Added)
        );
    }

    #[test]
    fn swapped_entry_is_tracked() {
        let mut dictionary = loaded();
        let key = EmailAddressKey::EmailAddress1;

        let old = dictionary
            .modify(key, |entry| {
                std::mem::replace(entry, EmailAddressEntry::new(key, address("new@example.com")))
            })
            .expect("the entry exists");
        assert_eq!(old.change_event().listener_count(), 0);
        assert_eq!(dictionary.entry_state(key), Some(ChangeState::Modified));

        dictionary.clear_change_log();
        dictionary.modify(key, |entry| {
            entry.modify_email_address(|address| {
                address.set_address(Some(String::from("z@example.com")))
            })
        });
        assert_eq!(dictionary.modified_keys().collect::<Vec<_>>(), [key]);
        assert_eq!(address_of(&dictionary, key), Some("z@example.com"));
    }

    #[test]
    fn entry_given_another_key_moves() {
        let mut dictionary = loaded();
        let from = EmailAddressKey::EmailAddress1;
        let to = EmailAddressKey::EmailAddress3;

        dictionary.modify(from, |entry| {
            *entry = EmailAddressEntry::new(to, address("carol@example.com"));
        });

        assert_eq!(
            dictionary.keys().collect::<Vec<_>>(),
            [EmailAddressKey::EmailAddress2, to]
        );
        assert!(dictionary.iter().all(|(key, entry)| entry.key() == key));
        assert_eq!(dictionary.removed_keys().collect::<Vec<_>>(), [from]);
        assert_eq!(dictionary.added_keys().collect::<Vec<_>>(), [to]);

        let err = dictionary
            .add(EmailAddressEntry::new(to, address("dup@example.com")))
            .expect_err("the moved entry holds the key");
        assert!(matches!(err, Error::DuplicateKey(_)), "unexpected error {err:?}");
    }

    #[test]
    fn clear_change_log_is_idempotent() {
        let mut dictionary = loaded();
        dictionary.remove(EmailAddressKey::EmailAddress1);
        dictionary.modify(EmailAddressKey::EmailAddress2, |entry| {
            entry.modify_email_address(|address| address.set_name(None))
        });

        dictionary.clear_change_log();
        assert!(!dictionary.has_changes());
        dictionary.clear_change_log();
        assert!(!dictionary.has_changes());
        assert!(dictionary
            .removed_entry(EmailAddressKey::EmailAddress1)
            .is_none());
    }

    #[test]
    fn update_fragments_in_order() {
        let ctx = ServiceContext::default();
        let mut dictionary = loaded();

        dictionary.modify(EmailAddressKey::EmailAddress2, |entry| {
            entry.modify_email_address(|address| {
                address.set_address(Some(String::from("alice@new-work.example")))
            })
        });
        dictionary
            .add(EmailAddressEntry::new(
                EmailAddressKey::EmailAddress3,
                address("carol@example.com"),
            ))
            .unwrap();
        dictionary.remove(EmailAddressKey::EmailAddress1);

        let xml = write_fragment(|writer| {
            write_set_update(
                writer,
                &ctx,
                &CONTACT,
                &schema::contact::EMAIL_ADDRESSES,
                &dictionary,
            )
        });

        let expected = concat!(
            r#"<t:SetItemField><t:IndexedFieldURI FieldURI="contacts:EmailAddress" FieldIndex="EmailAddress3"/>"#,
            r#"<t:Contact><t:EmailAddresses><t:Entry Key="EmailAddress3">carol@example.com</t:Entry></t:EmailAddresses></t:Contact></t:SetItemField>"#,
            r#"<t:SetItemField><t:IndexedFieldURI FieldURI="contacts:EmailAddress" FieldIndex="EmailAddress2"/>"#,
            r#"<t:Contact><t:EmailAddresses><t:Entry Key="EmailAddress2" Name="Alice Work">alice@new-work.example</t:Entry></t:EmailAddresses></t:Contact></t:SetItemField>"#,
            r#"<t:DeleteItemField><t:IndexedFieldURI FieldURI="contacts:EmailAddress" FieldIndex="EmailAddress1"/></t:DeleteItemField>"#,
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn deleting_the_whole_dictionary_uses_the_generic_fragment() {
        let ctx = ServiceContext::default();
        let dictionary = loaded();

        let xml = write_fragment(|writer| {
            write_delete_update(
                writer,
                &ctx,
                &CONTACT,
                &schema::contact::EMAIL_ADDRESSES,
                Some(&dictionary),
            )
        });
        assert_eq!(
            xml,
            r#"<t:DeleteItemField><t:FieldURI FieldURI="contacts:EmailAddresses"/></t:DeleteItemField>"#
        );
    }

    #[test]
    fn json_round_trip_and_updates() {
        let ctx = ServiceContext::default();
        let values = [
            json!({"Key": "EmailAddress1", "EmailAddress": "alice@example.com"}),
            json!({"Key": "EmailAddress7", "EmailAddress": "nobody@example.com"}),
        ];

        let mut dictionary = EmailAddressDictionary::new();
        dictionary.load_from_json_collection(&values, &ctx).unwrap();
        assert_eq!(
            address_of(&dictionary, EmailAddressKey::EmailAddress1),
            Some("alice@example.com")
        );
        assert_eq!(dictionary.len(), 1);

        assert!(matches!(
            dictionary.update_from_json_collection(&values, &ctx),
            Err(Error::NotImplemented(_))
        ));

        dictionary.remove(EmailAddressKey::EmailAddress1);
        let mut updates = Vec::new();
        set_update_to_json(
            &ctx,
            &CONTACT,
            &schema::contact::EMAIL_ADDRESSES,
            &dictionary,
            &mut updates,
        )
        .unwrap();
        assert_eq!(
            updates,
            [json!({
                "__type": "DeleteItemField:#Exchange",
                "Path": {
                    "__type": "DictionaryPropertyUri:#Exchange",
                    "FieldURI": "contacts:EmailAddress",
                    "FieldIndex": "EmailAddress1",
                },
            })]
        );
    }
}
