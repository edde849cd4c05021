/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

/// The state of a member of a collection or dictionary relative to the last
/// committed baseline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChangeState {
    /// Part of the baseline and not mutated since.
    #[default]
    Unchanged,

    /// Inserted since the baseline. Added members are written in full, so
    /// later mutations do not turn them into modified members.
    Added,

    /// Part of the baseline and mutated since.
    Modified,

    /// Taken out of the baseline.
    Removed,
}

/// Identifies a listener registered with a [`ChangeEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Rc<dyn Fn()>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

/// The change notification sink of a property node.
///
/// Listeners run synchronously, in registration order, each time the node
/// reports a change. Cloning an event produces a new event without any
/// listeners: a cloned node has no owner yet.
#[derive(Default)]
pub struct ChangeEvent {
    listeners: Rc<RefCell<Listeners>>,
}

impl ChangeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn() + 'static) -> SubscriptionId {
        let mut listeners = self.listeners.borrow_mut();

        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Rc::new(listener)));

        id
    }

    /// Removes a listener, returning whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let count = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);

        listeners.entries.len() != count
    }

    /// Invokes every registered listener.
    pub fn notify(&self) {
        // Listeners may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        for listener in listeners {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }

    /// A handle which can notify this event's listeners without keeping the
    /// event alive.
    pub fn downgrade(&self) -> WeakChangeEvent {
        WeakChangeEvent(Rc::downgrade(&self.listeners))
    }
}

impl Clone for ChangeEvent {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEvent")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// A non-owning handle to a [`ChangeEvent`].
#[derive(Clone, Debug, Default)]
pub struct WeakChangeEvent(Weak<RefCell<Listeners>>);

impl WeakChangeEvent {
    /// Notifies the listeners of the event, if it still exists.
    pub fn notify(&self) {
        if let Some(listeners) = self.0.upgrade() {
            ChangeEvent { listeners }.notify();
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}

/// A listener registered with the change event of a particular node.
///
/// Owners hold one of these for each node they listen to. Because it
/// remembers which event it was registered with, an owner can tell when the
/// node behind a `&mut` has been swapped for another one.
#[derive(Debug)]
pub(crate) struct Subscription {
    event: WeakChangeEvent,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(event: &ChangeEvent, listener: impl Fn() + 'static) -> Self {
        Self {
            event: event.downgrade(),
            id: event.subscribe(listener),
        }
    }

    /// Whether this subscription was registered with `event`.
    pub(crate) fn is_on(&self, event: &ChangeEvent) -> bool {
        Weak::ptr_eq(&self.event.0, &Rc::downgrade(&event.listeners))
    }

    /// Removes the listener from the event it was registered with, if that
    /// event still exists.
    pub(crate) fn cancel(&self) {
        if let Some(listeners) = self.event.0.upgrade() {
            ChangeEvent { listeners }.unsubscribe(self.id);
        }
    }
}

/// Subscribes a container to the change event of one of its members.
///
/// The first change of an unchanged member marks it as modified and notifies
/// the container. Changes to members that are already added or modified are
/// absorbed. The listener only holds weak references, so it never keeps the
/// member state or the container alive.
pub(crate) fn track_member(
    member_event: &ChangeEvent,
    state: &Rc<Cell<ChangeState>>,
    container_event: &ChangeEvent,
) -> Subscription {
    let state = Rc::downgrade(state);
    let container_event = container_event.downgrade();

    Subscription::new(member_event, move || {
        let Some(state) = state.upgrade() else {
            return;
        };

        if state.get() == ChangeState::Unchanged {
            state.set(ChangeState::Modified);
            container_event.notify();
        }
    })
}

/// Assigns `value` to `field` if they differ, returning whether the field
/// changed.
///
/// Callers report a change through [`ComplexProperty::changed`] when this
/// returns `true`.
///
/// [`ComplexProperty::changed`]: crate::ComplexProperty::changed
pub fn set_field_value<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }

    *field = value;
    true
}

/// Assigns `value` to a field whose type cannot be compared for equality.
///
/// Clearing an empty field is not a change. Any other assignment is, even if
/// the new value happens to be identical to the old one.
pub fn set_incomparable_field_value<T>(field: &mut Option<T>, value: Option<T>) -> bool {
    if field.is_none() && value.is_none() {
        return false;
    }

    *field = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_run_until_unsubscribed() {
        let event = ChangeEvent::new();
        let calls = Rc::new(Cell::new(0));

        let id = {
            let calls = Rc::clone(&calls);
            event.subscribe(move || calls.set(calls.get() + 1))
        };

        event.notify();
        event.notify();
        assert_eq!(calls.get(), 2);

        assert!(event.unsubscribe(id));
        assert!(!event.unsubscribe(id), "listener should only be removed once");

        event.notify();
        assert_eq!(calls.get(), 2, "removed listener should not run");
    }

    #[test]
    fn cloned_event_has_no_listeners() {
        let event = ChangeEvent::new();
        event.subscribe(|| {});

        assert_eq!(event.listener_count(), 1);
        assert_eq!(event.clone().listener_count(), 0);
    }

    #[test]
    fn weak_event_does_not_keep_listeners_alive() {
        let calls = Rc::new(Cell::new(0));
        let weak = {
            let event = ChangeEvent::new();
            let calls = Rc::clone(&calls);
            event.subscribe(move || calls.set(calls.get() + 1));

            let weak = event.downgrade();
            weak.notify();
            weak
        };

        weak.notify();
        assert_eq!(calls.get(), 1, "dropped event should not be notified");
    }

    #[test]
    fn tracked_member_is_flagged_once() {
        let member = ChangeEvent::new();
        let container = ChangeEvent::new();
        let state = Rc::new(Cell::new(ChangeState::Unchanged));

        let container_calls = Rc::new(Cell::new(0));
        {
            let container_calls = Rc::clone(&container_calls);
            container.subscribe(move || container_calls.set(container_calls.get() + 1));
        }

        track_member(&member, &state, &container);
        for _ in 0..3 {
            member.notify();
        }

        assert_eq!(state.get(), ChangeState::Modified);
        assert_eq!(
            container_calls.get(),
            1,
            "only the first change should reach the container"
        );
    }

    #[test]
    fn subscription_knows_its_event() {
        let first = ChangeEvent::new();
        let second = ChangeEvent::new();
        let calls = Rc::new(Cell::new(0));

        let subscription = {
            let calls = Rc::clone(&calls);
            Subscription::new(&first, move || calls.set(calls.get() + 1))
        };

        assert!(subscription.is_on(&first));
        assert!(!subscription.is_on(&second));
        assert!(
            !subscription.is_on(&first.clone()),
            "a cloned event is a different event"
        );

        subscription.cancel();
        first.notify();
        assert_eq!(calls.get(), 0);
        assert_eq!(first.listener_count(), 0);

        // Cancelling after the event is gone does nothing.
        drop(first);
        subscription.cancel();
    }

    #[test]
    fn tracked_added_member_stays_added() {
        let member = ChangeEvent::new();
        let container = ChangeEvent::new();
        let state = Rc::new(Cell::new(ChangeState::Added));

        track_member(&member, &state, &container);
        member.notify();

        assert_eq!(state.get(), ChangeState::Added);
    }

    #[test]
    fn comparable_fields_ignore_equal_values() {
        let mut field = String::from("a");

        assert!(!set_field_value(&mut field, String::from("a")));
        assert!(set_field_value(&mut field, String::from("b")));
        assert_eq!(field, "b");

        let mut optional: Option<u32> = None;
        assert!(!set_field_value(&mut optional, None));
        assert!(set_field_value(&mut optional, Some(1)));
        assert!(set_field_value(&mut optional, None));
    }

    #[test]
    fn incomparable_fields_always_change_unless_both_empty() {
        struct Opaque;

        let mut field: Option<Opaque> = None;
        assert!(!set_incomparable_field_value(&mut field, None));
        assert!(set_incomparable_field_value(&mut field, Some(Opaque)));

        // Reassigning an equivalent value still counts as a change.
        assert!(set_incomparable_field_value(&mut field, Some(Opaque)));
        assert!(set_incomparable_field_value(&mut field, None));
        assert!(field.is_none());
    }
}
