/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{cell::Cell, fmt, io::Write, rc::Rc};

use serde_json::Value;

use crate::{
    change::{track_member, Subscription},
    json::JsonObject,
    property::write_property_to_xml,
    update::{
        json_delete_field, json_field_update, write_delete_field, write_field_update,
        CustomUpdateSerializer, PropertyDefinition, ServiceObject,
    },
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNode},
    ChangeEvent, ChangeState, ComplexProperty, Error, Result, ServiceContext, WireCodec,
};

/// A node type which can be a member of a [`ComplexPropertyCollection`].
pub trait CollectionItem: WireCodec + Sized {
    /// Creates an empty member for an element of the given name, or `None`
    /// if the collection does not hold such elements.
    fn create_from_xml_element_name(local_name: &str) -> Option<Self>;

    /// Creates an empty member for a JSON object without a type
    /// discriminator.
    fn create_default() -> Option<Self> {
        None
    }

    /// Creates an empty member for a JSON object with the given type
    /// discriminator.
    fn create_from_json_type(type_name: &str) -> Option<Self> {
        Self::create_from_xml_element_name(type_name)
    }

    /// The name of the element this member is written as.
    fn xml_element_name(&self) -> &'static str;

    /// Identifies the concrete kind of this member. Positional updates
    /// require the member at each position to keep its kind.
    fn type_tag(&self) -> &'static str {
        self.xml_element_name()
    }
}

/// A stable handle to a member of a [`ComplexPropertyCollection`], valid
/// for as long as the member is in the collection or pending removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberId(u64);

struct Member<T> {
    item: T,
    id: MemberId,
    state: Rc<Cell<ChangeState>>,
    subscription: Subscription,

    /// Whether the member was part of the baseline before it was (re-)added.
    baseline: bool,
}

struct Tombstone<T> {
    item: T,
    id: MemberId,
}

/// An ordered collection of property nodes with a change log.
///
/// Members loaded from the wire form the baseline. Since then, each member is
/// either unchanged, added or modified, and baseline members taken out of the
/// collection are kept as removed until the change log is cleared.
pub struct ComplexPropertyCollection<T: CollectionItem> {
    members: Vec<Member<T>>,
    removed: Vec<Tombstone<T>>,
    on_change: ChangeEvent,
    next_id: u64,
}

impl<T: CollectionItem> Default for ComplexPropertyCollection<T> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            removed: Vec::new(),
            on_change: ChangeEvent::new(),
            next_id: 0,
        }
    }
}

impl<T: CollectionItem> ComplexPropertyCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.members.get(index).map(|member| &member.item)
    }

    /// Runs `f` on the member at `index`, returning its result, or `None` if
    /// there is no such member.
    ///
    /// Changes made through the member's setters are recorded by the
    /// collection. If `f` swaps the member for another node, the collection
    /// tracks the new node from then on and the member counts as modified.
    pub fn modify<R>(&mut self, index: usize, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let member = self.members.get_mut(index)?;
        let result = f(&mut member.item);

        if member.subscription.is_on(member.item.change_event()) {
            return Some(result);
        }

        member.subscription.cancel();
        member.subscription =
            track_member(member.item.change_event(), &member.state, &self.on_change);

        if member.state.get() == ChangeState::Unchanged {
            member.state.set(ChangeState::Modified);
            self.changed();
        }

        Some(result)
    }

    /// Puts `item` in place of the member at `index` and returns the previous
    /// member. Returns `None` if there is no such member.
    pub fn replace(&mut self, index: usize, item: T) -> Option<T> {
        self.modify(index, move |member| std::mem::replace(member, item))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.members.iter().map(|member| &member.item)
    }

    pub fn id_at(&self, index: usize) -> Option<MemberId> {
        self.members.get(index).map(|member| member.id)
    }

    pub fn position(&self, id: MemberId) -> Option<usize> {
        self.members.iter().position(|member| member.id == id)
    }

    pub fn state_at(&self, index: usize) -> Option<ChangeState> {
        self.members.get(index).map(|member| member.state.get())
    }

    /// The state of a member, including members pending removal.
    pub fn state_of(&self, id: MemberId) -> Option<ChangeState> {
        match self.position(id) {
            Some(index) => self.state_at(index),
            None => self
                .removed
                .iter()
                .any(|tombstone| tombstone.id == id)
                .then_some(ChangeState::Removed),
        }
    }

    /// Appends a new member.
    pub fn add(&mut self, item: T) -> MemberId {
        self.internal_add(item, false)
    }

    /// Appends a member of the baseline, without recording a change.
    pub(crate) fn add_loaded(&mut self, item: T) -> MemberId {
        self.internal_add(item, true)
    }

    fn internal_add(&mut self, mut item: T, loading: bool) -> MemberId {
        let id = MemberId(self.next_id);
        self.next_id += 1;

        let state = if loading {
            item.clear_change_log();
            ChangeState::Unchanged
        } else {
            ChangeState::Added
        };

        let member = self.attach(item, id, state, loading);
        self.members.push(member);
        self.changed();

        id
    }

    fn attach(&self, item: T, id: MemberId, state: ChangeState, baseline: bool) -> Member<T> {
        let state = Rc::new(Cell::new(state));
        let subscription = track_member(item.change_event(), &state, &self.on_change);

        Member {
            item,
            id,
            state,
            subscription,
            baseline,
        }
    }

    /// The handle of the first member pending removal which matches
    /// `predicate`.
    pub fn find_removed(&self, predicate: impl Fn(&T) -> bool) -> Option<MemberId> {
        self.removed
            .iter()
            .find(|tombstone| predicate(&tombstone.item))
            .map(|tombstone| tombstone.id)
    }

    /// Re-adds a member pending removal. The member is appended and recorded
    /// as added. Returns `false` if no such member is pending removal.
    pub fn restore(&mut self, id: MemberId) -> bool {
        let Some(position) = self.removed.iter().position(|tombstone| tombstone.id == id) else {
            return false;
        };

        let Tombstone { item, id } = self.removed.remove(position);
        let member = self.attach(item, id, ChangeState::Added, true);
        self.members.push(member);
        self.changed();

        true
    }

    pub fn remove(&mut self, id: MemberId) -> bool {
        match self.position(id) {
            Some(index) => self.remove_at(index),
            None => false,
        }
    }

    /// Takes the member at `index` out of the collection. Returns `false` if
    /// there is no such member.
    ///
    /// A member added since the baseline is dropped without a trace; any other
    /// member is kept as removed.
    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.members.len() {
            return false;
        }

        let member = self.members.remove(index);
        member.subscription.cancel();

        let added_since_baseline = member.state.get() == ChangeState::Added && !member.baseline;
        if !added_since_baseline {
            member.state.set(ChangeState::Removed);
            self.removed.push(Tombstone {
                item: member.item,
                id: member.id,
            });
        }

        self.changed();
        true
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        while self.remove_at(0) {}
    }

    pub fn added_items(&self) -> impl Iterator<Item = &T> {
        self.items_in_state(ChangeState::Added)
    }

    pub fn modified_items(&self) -> impl Iterator<Item = &T> {
        self.items_in_state(ChangeState::Modified)
    }

    pub fn removed_items(&self) -> impl Iterator<Item = &T> {
        self.removed.iter().map(|tombstone| &tombstone.item)
    }

    /// Every pending change: added members first, then modified members,
    /// then removed members.
    pub fn changes(&self) -> impl Iterator<Item = (ChangeState, &T)> {
        self.added_items()
            .map(|item| (ChangeState::Added, item))
            .chain(
                self.modified_items()
                    .map(|item| (ChangeState::Modified, item)),
            )
            .chain(
                self.removed_items()
                    .map(|item| (ChangeState::Removed, item)),
            )
    }

    pub fn has_changes(&self) -> bool {
        !self.removed.is_empty()
            || self
                .members
                .iter()
                .any(|member| member.state.get() != ChangeState::Unchanged)
    }

    /// Loads members from a JSON array. Values which are not objects, or
    /// whose type is unknown, are skipped.
    pub fn load_from_json_collection(&mut self, values: &[Value], ctx: &ServiceContext) -> Result<()> {
        for value in values {
            let Ok(json) = JsonObject::try_from(value.clone()) else {
                log::debug!("skipping non-object collection member {value}");
                continue;
            };

            let Some(mut item) = create_from_json::<T>(&json) else {
                log::debug!(
                    "skipping collection member of unknown type {:?}",
                    json.read_type_string()
                );
                continue;
            };

            item.load_from_json(&json, ctx)?;
            self.add_loaded(item);
        }

        Ok(())
    }

    /// Applies a JSON array to the members at the same positions.
    pub fn update_from_json_collection(
        &mut self,
        values: &[Value],
        ctx: &ServiceContext,
    ) -> Result<()> {
        if values.len() != self.members.len() {
            log::error!(
                "cannot update collection of {} members from {} JSON values",
                self.members.len(),
                values.len()
            );
            return Err(Error::CollectionSizeMismatch {
                expected: self.members.len(),
                actual: values.len(),
            });
        }

        for (index, value) in values.iter().enumerate() {
            let json = JsonObject::try_from(value.clone())?;
            let probe = create_from_json::<T>(&json);
            let member = self.compatible_member_mut(index, probe)?;

            member.item.load_from_json(&json, ctx)?;
        }

        Ok(())
    }

    fn items_in_state(&self, state: ChangeState) -> impl Iterator<Item = &T> {
        self.members
            .iter()
            .filter(move |member| member.state.get() == state)
            .map(|member| &member.item)
    }

    /// Looks up the member at `index`, requiring it to be of the same kind as
    /// `probe`.
    fn compatible_member_mut(&mut self, index: usize, probe: Option<T>) -> Result<&mut Member<T>> {
        match (probe, self.members.get_mut(index)) {
            (Some(probe), Some(member)) if probe.type_tag() == member.item.type_tag() => Ok(member),
            (probe, member) => {
                log::error!(
                    "collection member {index} of kind {:?} cannot be updated from {:?}",
                    member.map(|member| member.item.type_tag()),
                    probe.map(|probe| probe.type_tag())
                );
                Err(Error::PropertyTypeIncompatible { index })
            }
        }
    }

    /// Whether the pending changes only append new members to a non-empty
    /// baseline.
    fn is_append_only(&self) -> bool {
        let mut has_added = false;
        let mut has_baseline = false;

        for member in &self.members {
            match member.state.get() {
                ChangeState::Added if !member.baseline => has_added = true,
                ChangeState::Unchanged => has_baseline = true,
                _ => return false,
            }
        }

        self.removed.is_empty() && has_added && has_baseline
    }

    fn added_items_to_json(&self, ctx: &ServiceContext) -> Result<Value> {
        let items = self
            .added_items()
            .map(|item| item.internal_to_json(ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(Value::Array(items))
    }
}

fn create_from_json<T: CollectionItem>(json: &JsonObject) -> Option<T> {
    match json.read_type_string() {
        Some(type_name) => T::create_from_json_type(type_name),
        None => T::create_default(),
    }
}

impl<T: CollectionItem + fmt::Debug> fmt::Debug for ComplexPropertyCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplexPropertyCollection")
            .field(
                "members",
                &self
                    .members
                    .iter()
                    .map(|member| (member.state.get(), &member.item))
                    .collect::<Vec<_>>(),
            )
            .field("removed", &self.removed_items().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: CollectionItem> ComplexProperty for ComplexPropertyCollection<T> {
    fn change_event(&self) -> &ChangeEvent {
        &self.on_change
    }

    fn clear_change_log(&mut self) {
        for member in &mut self.members {
            member.state.set(ChangeState::Unchanged);
            member.baseline = true;
            member.item.clear_change_log();
        }

        self.removed.clear();
    }

    fn internal_validate(&self) -> Result<()> {
        self.iter().try_for_each(|item| item.validate())
    }
}

impl<T: CollectionItem> WireCodec for ComplexPropertyCollection<T> {
    fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool> {
        let (Some(namespace), Some(local_name)) = (reader.namespace(), reader.local_name()) else {
            return Ok(false);
        };
        let local_name = local_name.to_owned();

        let Some(mut item) = T::create_from_xml_element_name(&local_name) else {
            return Ok(false);
        };

        item.load_from_xml_ns(reader, namespace, &local_name)?;
        self.add_loaded(item);

        Ok(true)
    }

    /// Applies each child element to the member at the same position.
    fn update_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<()> {
        reader.ensure_current_node_is_start_element(namespace, local_name)?;

        let mut index = 0;
        loop {
            reader.read()?;

            if reader.is_start_element() {
                let member_namespace = reader.namespace().unwrap_or(XmlNamespace::NotSpecified);
                let member_name = reader.local_name().unwrap_or_default().to_owned();

                let probe = T::create_from_xml_element_name(&member_name);
                let member = self.compatible_member_mut(index, probe)?;
                member
                    .item
                    .update_from_xml_ns(reader, member_namespace, &member_name)?;

                index += 1;
            } else if matches!(reader.node(), XmlNode::EndElement { .. }) {
                return reader.ensure_current_node_is_end_element(namespace, local_name);
            } else if matches!(reader.node(), XmlNode::Eof) {
                return Err(Error::UnexpectedEof);
            }
        }
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<()> {
        self.iter()
            .try_for_each(|item| item.write_to_xml(writer, item.xml_element_name()))
    }

    /// Writes nothing at all for an empty collection.
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
        let items = self
            .iter()
            .map(|item| item.internal_to_json(ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(Value::Array(items))
    }
}

impl<T: CollectionItem> CustomUpdateSerializer for ComplexPropertyCollection<T> {
    /// An emptied collection is deleted rather than set.
    fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
    ) -> Result<bool> {
        if !self.is_empty() {
            return Ok(false);
        }

        write_delete_field(writer, owner, &definition.path())?;
        Ok(true)
    }

    fn write_append_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
    ) -> Result<bool> {
        if !self.is_append_only() {
            return Ok(false);
        }

        write_field_update(
            writer,
            owner.append_field_xml_element_name(),
            owner,
            &definition.path(),
            |writer| {
                writer.write_start_element(XmlNamespace::Types, definition.xml_element_name)?;
                for item in self.added_items() {
                    item.write_to_xml(writer, item.xml_element_name())?;
                }
                writer.write_end_element()
            },
        )?;

        Ok(true)
    }

    fn set_update_to_json(
        &self,
        _ctx: &ServiceContext,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
        updates: &mut Vec<Value>,
    ) -> Result<bool> {
        if !self.is_empty() {
            return Ok(false);
        }

        updates.push(json_delete_field(owner, &definition.path()));
        Ok(true)
    }

    fn append_update_to_json(
        &self,
        ctx: &ServiceContext,
        owner: &dyn ServiceObject,
        definition: &PropertyDefinition,
        updates: &mut Vec<Value>,
    ) -> Result<bool> {
        if !self.is_append_only() {
            return Ok(false);
        }

        let mut service_object = JsonObject::new();
        service_object.add(definition.xml_element_name, self.added_items_to_json(ctx)?);
        updates.push(json_field_update(
            owner.append_field_xml_element_name(),
            owner,
            &definition.path(),
            Some(service_object),
        ));

        Ok(true)
    }
}
