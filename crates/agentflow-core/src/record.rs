//! Id-keyed, insertion-ordered record.
//!
//! [`OrderedRecord`] is the container every definition uses for named,
//! user-editable, ordered lists: agent inputs and outputs, pipeline steps,
//! decision cases, memory bindings, chat messages.
//!
//! The record is backed by an [`IndexMap`], so the id-to-item map and the
//! id order can never drift apart.  All mutation goes through the methods
//! below; there is no way to reorder or rename an entry in place.
//!
//! # Example
//!
//! ```rust
//! # use agentflow_core::record::{Identified, OrderedRecord};
//! #[derive(Clone)]
//! struct Step { id: String }
//! impl Identified for Step {
//!     fn id(&self) -> &str { &self.id }
//! }
//!
//! let mut steps = OrderedRecord::new();
//! steps.push(Step { id: "a".into() }).unwrap();
//! assert!(steps.push(Step { id: "a".into() }).is_err());
//! assert_eq!(steps.at(0).unwrap().id, "a");
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// Anything stored in an [`OrderedRecord`] must expose a stable id.
pub trait Identified {
    /// The unique id of this item within its record.
    fn id(&self) -> &str;
}

/// An id-keyed map that remembers insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedRecord<T> {
    entries: IndexMap<String, T>,
}

impl<T> Default for OrderedRecord<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T: Identified> OrderedRecord<T> {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from items in order.
    ///
    /// Fails with [`CoreError::DuplicateId`] if two items share an id.
    pub fn from_array(items: impl IntoIterator<Item = T>) -> Result<Self> {
        let mut record = Self::new();
        for item in items {
            record.push(item)?;
        }
        Ok(record)
    }

    /// Append an item; the id must not already be present.
    pub fn push(&mut self, item: T) -> Result<()> {
        let id = item.id().to_owned();
        if self.entries.contains_key(&id) {
            return Err(CoreError::DuplicateId { id });
        }
        self.entries.insert(id, item);
        Ok(())
    }

    /// Insert or replace an item.
    ///
    /// A replaced item keeps its original position.
    pub fn push_or_update(&mut self, item: T) {
        let id = item.id().to_owned();
        self.entries.insert(id, item);
    }

    /// Remove an item by id, shifting later items down by one.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.entries.shift_remove(id)
    }
}

impl<T: Identified + Clone> OrderedRecord<T> {
    /// Merge any number of records.
    ///
    /// For an id present in several records the item from the last record
    /// wins, while the id keeps the position where it was first seen.
    pub fn merge<'a>(records: impl IntoIterator<Item = &'a OrderedRecord<T>>) -> Self
    where
        T: 'a,
    {
        let mut merged = Self::new();
        for record in records {
            for item in record.iter() {
                merged.push_or_update(item.clone());
            }
        }
        merged
    }

    /// Copy the items out in order.
    pub fn to_array(&self) -> Vec<T> {
        self.entries.values().cloned().collect()
    }
}

impl<T> OrderedRecord<T> {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record holds no items.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look an item up by id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    /// Whether an item with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// The item at a position.
    pub fn at(&self, index: usize) -> Option<&T> {
        self.entries.get_index(index).map(|(_, item)| item)
    }

    /// Position of an id, if present.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.entries.get_index_of(id)
    }

    /// Ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Items in order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    /// Consume the record, yielding items in order.
    pub fn into_array(self) -> Vec<T> {
        self.entries.into_values().collect()
    }

    /// Map every item together with its position.
    pub fn map<U>(&self, mut f: impl FnMut(&T, usize) -> U) -> Vec<U> {
        self.entries
            .values()
            .enumerate()
            .map(|(index, item)| f(item, index))
            .collect()
    }

    /// Keep the items for which `f(item, index)` holds.
    pub fn filter(&self, mut f: impl FnMut(&T, usize) -> bool) -> Vec<&T> {
        self.entries
            .values()
            .enumerate()
            .filter(|(index, item)| f(item, *index))
            .map(|(_, item)| item)
            .collect()
    }

    /// The first item for which `f(item, index)` holds.
    pub fn find(&self, mut f: impl FnMut(&T, usize) -> bool) -> Option<&T> {
        self.entries
            .values()
            .enumerate()
            .find(|(index, item)| f(item, *index))
            .map(|(_, item)| item)
    }
}

impl<'a, T> IntoIterator for &'a OrderedRecord<T> {
    type Item = &'a T;
    type IntoIter = indexmap::map::Values<'a, String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

impl<T> IntoIterator for OrderedRecord<T> {
    type Item = T;
    type IntoIter = indexmap::map::IntoValues<String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

// ---------------------------------------------------------------------------
// Serde: a record travels as a plain array of items.
// ---------------------------------------------------------------------------

impl<T: Serialize> Serialize for OrderedRecord<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.values())
    }
}

impl<'de, T: Identified + Deserialize<'de>> Deserialize<'de> for OrderedRecord<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let items = Vec::<T>::deserialize(deserializer)?;
        Self::from_array(items).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
