//! Name interning dictionaries.
//!
//! Each dictionary maps strings to dense sequential ids and back. The id
//! width is fixed by the container layout: type names use 16-bit ids, state
//! names and state values use 8-bit ids. Running out of ids is a hard
//! [`BcfError::CapacityExceeded`] error; the id space is never widened.

use std::collections::{HashMap, HashSet};

use crate::error::{BcfError, Result};
use crate::model::{StateNameId, StateValueId, TypeId};

/// Fixed-width integer usable as a dictionary id.
pub trait DictionaryId: Copy + Ord + std::hash::Hash + std::fmt::Debug {
    /// Number of distinct ids the width can address.
    const CAPACITY: usize;

    /// Encoded width in bytes.
    const BYTES: usize;

    /// Converts a dense index into an id. `index` is always `< CAPACITY`.
    fn from_index(index: usize) -> Self;

    /// Converts the id back into a dense index.
    fn index(self) -> usize;
}

impl DictionaryId for u8 {
    const CAPACITY: usize = 1 << 8;
    const BYTES: usize = 1;

    #[inline]
    fn from_index(index: usize) -> Self {
        index as u8
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

impl DictionaryId for u16 {
    const CAPACITY: usize = 1 << 16;
    const BYTES: usize = 2;

    #[inline]
    fn from_index(index: usize) -> Self {
        index as u16
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// A bidirectional string interning table.
#[derive(Debug, Clone)]
pub struct NameDictionary<I: DictionaryId> {
    table: &'static str,
    forward: HashMap<String, I>,
    reverse: Vec<String>,
}

impl<I: DictionaryId> NameDictionary<I> {
    /// Creates an empty dictionary. `table` names it in capacity errors.
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            forward: HashMap::new(),
            reverse: Vec::new(),
        }
    }

    /// Returns the id for `name`, allocating the next sequential id on first
    /// sight.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] if `name` is new and the id
    /// space is exhausted. Existing entries are left untouched.
    pub fn intern(&mut self, name: &str) -> Result<I> {
        if let Some(&id) = self.forward.get(name) {
            return Ok(id);
        }
        if self.reverse.len() >= I::CAPACITY {
            return Err(BcfError::CapacityExceeded {
                table: self.table,
                limit: I::CAPACITY,
            });
        }
        let id = I::from_index(self.reverse.len());
        self.forward.insert(name.to_owned(), id);
        self.reverse.push(name.to_owned());
        Ok(id)
    }

    /// Checks that every name in `names` could be interned.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] if the distinct new names do
    /// not fit the remaining id space.
    pub fn check_room<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let new: HashSet<&str> = names
            .into_iter()
            .filter(|name| !self.forward.contains_key(*name))
            .collect();
        if self.reverse.len() + new.len() > I::CAPACITY {
            return Err(BcfError::CapacityExceeded {
                table: self.table,
                limit: I::CAPACITY,
            });
        }
        Ok(())
    }

    /// Looks up an existing id without interning.
    pub fn get(&self, name: &str) -> Option<I> {
        self.forward.get(name).copied()
    }

    /// Returns the name for `id`, if allocated.
    pub fn name(&self, id: I) -> Option<&str> {
        self.reverse.get(id.index()).map(String::as_str)
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Returns true if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Iterates `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &str)> + '_ {
        self.reverse
            .iter()
            .enumerate()
            .map(|(i, name)| (I::from_index(i), name.as_str()))
    }
}

/// The three name dictionaries owned by one write session.
#[derive(Debug, Clone)]
pub struct Dictionaries {
    /// Type names.
    pub types: NameDictionary<TypeId>,
    /// State names.
    pub state_names: NameDictionary<StateNameId>,
    /// State values.
    pub state_values: NameDictionary<StateValueId>,
}

impl Default for Dictionaries {
    fn default() -> Self {
        Self {
            types: NameDictionary::new("type"),
            state_names: NameDictionary::new("state name"),
            state_values: NameDictionary::new("state value"),
        }
    }
}

impl Dictionaries {
    /// Creates empty dictionaries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that a type name and its state pairs could all be interned,
    /// so a failing cell leaves every dictionary untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] naming the first table that
    /// would overflow.
    pub fn check_room<N, V>(&self, type_name: &str, states: &[(N, V)]) -> Result<()>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        self.types.check_room([type_name])?;
        self.state_names
            .check_room(states.iter().map(|(name, _)| name.as_ref()))?;
        self.state_values
            .check_room(states.iter().map(|(_, value)| value.as_ref()))
    }

    /// Interns a type name.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] past 65536 distinct types.
    pub fn intern_type(&mut self, name: &str) -> Result<TypeId> {
        self.types.intern(name)
    }

    /// Interns a state name.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] past 256 distinct names.
    pub fn intern_state_name(&mut self, name: &str) -> Result<StateNameId> {
        self.state_names.intern(name)
    }

    /// Interns a state value.
    ///
    /// # Errors
    ///
    /// Returns [`BcfError::CapacityExceeded`] past 256 distinct values.
    pub fn intern_state_value(&mut self, name: &str) -> Result<StateValueId> {
        self.state_values.intern(name)
    }
}
