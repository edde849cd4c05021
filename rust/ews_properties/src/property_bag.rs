/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::collections::BTreeMap;

use crate::ChangeState;

/// A keyed set of scalar values tracking which keys were added, modified or
/// removed since the last baseline.
///
/// Multi-field dictionary entries use this to address each of their fields
/// individually in update requests. The bag has no change event of its own:
/// [`set`](Self::set) reports whether anything changed and the owning node
/// notifies on its behalf.
#[derive(Clone, Debug, PartialEq)]
pub struct SimplePropertyBag<K: Ord + Clone, V: PartialEq> {
    values: BTreeMap<K, V>,

    /// Keys absent from this map are unchanged.
    states: BTreeMap<K, ChangeState>,
}

impl<K: Ord + Clone, V: PartialEq> Default for SimplePropertyBag<K, V> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            states: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: PartialEq> SimplePropertyBag<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sets or, with `None`, removes the value of `key`. Returns whether the
    /// bag changed.
    ///
    /// Setting a key that is pending removal turns the removal into a
    /// modification. Removing a key added since the baseline leaves no record.
    pub fn set(&mut self, key: K, value: Option<V>) -> bool {
        let Some(value) = value else {
            if self.values.remove(&key).is_none() {
                return false;
            }

            if self.states.get(&key) == Some(&ChangeState::Added) {
                self.states.remove(&key);
            } else {
                self.states.insert(key, ChangeState::Removed);
            }

            return true;
        };

        if self.values.get(&key) == Some(&value) {
            return false;
        }

        let state = match self.states.get(&key) {
            Some(ChangeState::Added) => ChangeState::Added,
            None if !self.values.contains_key(&key) => ChangeState::Added,
            _ => ChangeState::Modified,
        };
        self.states.insert(key.clone(), state);
        self.values.insert(key, value);

        true
    }

    /// Inserts a baseline value, without recording a change.
    pub fn load(&mut self, key: K, value: V) {
        self.states.remove(&key);
        self.values.insert(key, value);
    }

    pub fn state(&self, key: &K) -> Option<ChangeState> {
        match self.states.get(key) {
            Some(state) => Some(*state),
            None if self.values.contains_key(key) => Some(ChangeState::Unchanged),
            None => None,
        }
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &K> {
        self.keys_in_state(ChangeState::Added)
    }

    pub fn modified_keys(&self) -> impl Iterator<Item = &K> {
        self.keys_in_state(ChangeState::Modified)
    }

    pub fn removed_keys(&self) -> impl Iterator<Item = &K> {
        self.keys_in_state(ChangeState::Removed)
    }

    pub fn has_changes(&self) -> bool {
        !self.states.is_empty()
    }

    pub fn clear_change_log(&mut self) {
        self.states.clear();
    }

    fn keys_in_state(&self, state: ChangeState) -> impl Iterator<Item = &K> {
        self.states
            .iter()
            .filter(move |(_, key_state)| **key_state == state)
            .map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> SimplePropertyBag<&'static str, String> {
        let mut bag = SimplePropertyBag::new();
        bag.load("City", String::from("Paris"));
        bag.load("Street", String::from("Rue de Rivoli"));

        bag
    }

    #[test]
    fn loaded_values_are_unchanged() {
        let bag = loaded();

        assert!(!bag.has_changes());
        assert_eq!(bag.state(&"City"), Some(ChangeState::Unchanged));
        assert_eq!(bag.state(&"State"), None);
    }

    #[test]
    fn set_records_added_and_modified() {
        let mut bag = loaded();

        assert!(bag.set("State", Some(String::from("IDF"))));
        assert!(bag.set("City", Some(String::from("Lyon"))));
        assert!(
            !bag.set("Street", Some(String::from("Rue de Rivoli"))),
            "equal value should not be a change"
        );

        assert_eq!(bag.added_keys().collect::<Vec<_>>(), [&"State"]);
        assert_eq!(bag.modified_keys().collect::<Vec<_>>(), [&"City"]);
        assert_eq!(bag.removed_keys().count(), 0);
    }

    #[test]
    fn removal_of_added_key_leaves_no_record() {
        let mut bag = loaded();

        bag.set("State", Some(String::from("IDF")));
        assert!(bag.set("State", None));

        assert!(!bag.has_changes());
        assert!(!bag.set("State", None), "absent key cannot be removed");
    }

    #[test]
    fn setting_removed_key_becomes_modification() {
        let mut bag = loaded();

        assert!(bag.set("City", None));
        assert_eq!(bag.removed_keys().collect::<Vec<_>>(), [&"City"]);

        assert!(bag.set("City", Some(String::from("Paris"))));
        assert_eq!(bag.state(&"City"), Some(ChangeState::Modified));
        assert_eq!(bag.removed_keys().count(), 0);
    }

    #[test]
    fn clear_change_log_is_idempotent() {
        let mut bag = loaded();
        bag.set("City", None);
        bag.set("State", Some(String::from("IDF")));

        bag.clear_change_log();
        assert!(!bag.has_changes());
        bag.clear_change_log();
        assert!(!bag.has_changes());

        assert_eq!(bag.get(&"State").map(String::as_str), Some("IDF"));
        assert!(!bag.contains_key(&"City"));
    }
}
