//! Setting List / Diff Engine
//!
//! A name-sorted, name-unique collection of settings plus the merge walk
//! that turns two snapshots into NEW/CHANGED/DELETED events. Snapshots are
//! replaced wholesale on every update cycle, never mutated in place, which
//! keeps diffing side-effect-free.

use tracing::warn;

use crate::setting::Setting;

/// What happened to a setting between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingAction {
    New,
    Changed,
    Deleted,
}

/// Ordered collection of settings, sorted by name. Both the manager's
/// authoritative list and the client's cached snapshot use this; sorted
/// order is what makes the linear diff walk valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingList {
    items: Vec<Setting>,
}

impl SettingList {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.items.iter()
    }

    pub fn find(&self, name: &str) -> Option<&Setting> {
        self.index_of(name).ok().map(|i| &self.items[i])
    }

    /// Replace the entry with the same name, or insert at its sorted
    /// position. Returns false when an equal-valued entry was already
    /// present and nothing changed.
    pub fn upsert(&mut self, setting: Setting) -> bool {
        match self.index_of(&setting.name) {
            Ok(i) => {
                if self.items[i].value_eq(&setting) {
                    return false;
                }
                self.items[i] = setting;
                true
            }
            Err(i) => {
                self.items.insert(i, setting);
                true
            }
        }
    }

    /// Insert only if the name is not already present; decode uses this so
    /// a malformed buffer with duplicate names keeps the first occurrence.
    pub(crate) fn insert_new(&mut self, setting: Setting) -> bool {
        match self.index_of(&setting.name) {
            Ok(_) => {
                warn!("duplicate setting entry '{}', keeping first", setting.name);
                false
            }
            Err(i) => {
                self.items.insert(i, setting);
                true
            }
        }
    }

    /// Remove the named entry. Does nothing if it is not present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.index_of(name) {
            Ok(i) => {
                self.items.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    fn index_of(&self, name: &str) -> Result<usize, usize> {
        self.items.binary_search_by(|s| s.name.as_str().cmp(name))
    }
}

impl<'a> IntoIterator for &'a SettingList {
    type Item = &'a Setting;
    type IntoIter = std::slice::Iter<'a, Setting>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Walk two snapshots in name order and report each difference exactly
/// once: a name only in `old` is DELETED (no setting payload), a name only
/// in `new` is NEW, a name in both with a different value is CHANGED.
/// Equal values produce no event.
pub fn diff<'a>(
    old: &'a SettingList,
    new: &'a SettingList,
    mut f: impl FnMut(&'a str, SettingAction, Option<&'a Setting>),
) {
    let mut old_iter = old.iter().peekable();
    let mut new_iter = new.iter().peekable();

    loop {
        match (old_iter.peek().copied(), new_iter.peek().copied()) {
            (Some(o), Some(n)) => match o.name.cmp(&n.name) {
                std::cmp::Ordering::Less => {
                    f(&o.name, SettingAction::Deleted, None);
                    old_iter.next();
                }
                std::cmp::Ordering::Greater => {
                    f(&n.name, SettingAction::New, Some(n));
                    new_iter.next();
                }
                std::cmp::Ordering::Equal => {
                    if !o.value_eq(n) {
                        f(&n.name, SettingAction::Changed, Some(n));
                    }
                    old_iter.next();
                    new_iter.next();
                }
            },
            (Some(o), None) => {
                f(&o.name, SettingAction::Deleted, None);
                old_iter.next();
            }
            (None, Some(n)) => {
                f(&n.name, SettingAction::New, Some(n));
                new_iter.next();
            }
            (None, None) => break,
        }
    }
}
