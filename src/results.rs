//! Result collection
//!
//! The tree reports one [`ResultSlot`] per sink; [`ResultCollector`] turns
//! them into the [`IoContainer`] returned by a run.

use tracing::debug;

use crate::operator::IoObject;

/// One named process result, `data: None` when the sink received nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSlot {
    pub name: String,
    pub data: Option<IoObject>,
}

impl ResultSlot {
    pub fn new(name: impl Into<String>, data: Option<IoObject>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Ordered collection of data objects. Entries may be explicit empty markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoContainer {
    entries: Vec<Option<IoObject>>,
}

impl IoContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects(objects: impl IntoIterator<Item = IoObject>) -> Self {
        Self {
            entries: objects.into_iter().map(Some).collect(),
        }
    }

    pub fn push(&mut self, entry: Option<IoObject>) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object at `index`; `None` for out-of-range indices and empty markers.
    pub fn get(&self, index: usize) -> Option<&IoObject> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// True if `index` holds an explicit empty marker.
    pub fn is_empty_marker(&self, index: usize) -> bool {
        matches!(self.entries.get(index), Some(None))
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&IoObject>> {
        self.entries.iter().map(Option::as_ref)
    }

    /// Present objects only, skipping empty markers.
    pub fn objects(&self) -> impl Iterator<Item = &IoObject> {
        self.entries.iter().flatten()
    }
}

/// Applies the null-omission policy to raw result slots.
#[derive(Debug, Clone, Copy)]
pub struct ResultCollector {
    omit_nulls: bool,
}

impl ResultCollector {
    pub fn new(omit_nulls: bool) -> Self {
        Self { omit_nulls }
    }

    pub fn collect(&self, slots: Vec<ResultSlot>) -> IoContainer {
        let mut container = IoContainer::new();
        for slot in slots {
            match slot.data {
                Some(data) => container.push(Some(data)),
                None if self.omit_nulls => {
                    debug!(slot = %slot.name, "omitting empty result");
                }
                None => container.push(None),
            }
        }
        container
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new(true)
    }
}
