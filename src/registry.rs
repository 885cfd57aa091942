//! Directory of live sources, used to pick a remote to compare against.
//!
//! Sources live in an arena of slots. A [`SourceHandle`] names a slot and
//! the generation it was issued for, so a handle to a removed source stays
//! detectably stale after its slot is reused.

use std::sync::Arc;

use crate::error::{Result, ScopeError};
use crate::source::SourceShared;

/// Names handed out to new sources, first unused one wins.
pub const GIVEN_NAMES: [&str; 16] = [
    "Athelstan", "Quentin", "Jenson", "Winston", "Gilbert", "Bernard", "Theodore", "Cedric",
    "Dorian", "Edmund", "Hector", "Neville", "Percival", "Rueben", "Sheldon", "Vincent",
];

/// Generation-checked reference to a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    index: u32,
    generation: u32,
}

impl SourceHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Observer for registry changes.
///
/// Called synchronously from the mutating call, on the caller's thread.
pub trait RegistryListener: Send {
    fn source_added(&mut self, _handle: SourceHandle, _name: &str) {}
    fn source_removed(&mut self, _handle: SourceHandle) {}
    fn name_changed(&mut self, _handle: SourceHandle, _name: &str) {}
}

struct Entry {
    source: Arc<SourceShared>,
    name: String,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Owned registry of sources.
#[derive(Default)]
pub struct SourceRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    listeners: Vec<Box<dyn RegistryListener>>,
    next_id: u64,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Box<dyn RegistryListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `source` under the first given name nobody is using.
    pub fn add(&mut self, source: Arc<SourceShared>) -> SourceHandle {
        let name = self.unused_name();
        self.insert(source, name)
    }

    /// Register `source` under a specific name, e.g. one restored from
    /// saved state.
    pub fn add_named(&mut self, source: Arc<SourceShared>, name: impl Into<String>) -> SourceHandle {
        self.insert(source, name.into())
    }

    fn insert(&mut self, source: Arc<SourceShared>, name: String) -> SourceHandle {
        self.next_id += 1;
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let handle = SourceHandle {
            index,
            generation: slot.generation,
        };

        log::info!("Registered source {} as {}", index, name);
        for listener in &mut self.listeners {
            listener.source_added(handle, &name);
        }
        slot.entry = Some(Entry { source, name });
        handle
    }

    /// Remove a source. Every handle to it goes stale.
    pub fn remove(&mut self, handle: SourceHandle) -> Result<Arc<SourceShared>> {
        let slot = self.slot_mut(handle)?;
        let entry = slot.entry.take().ok_or(ScopeError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        log::info!("Removed source {} ({})", handle.index, entry.name);
        for listener in &mut self.listeners {
            listener.source_removed(handle);
        }
        Ok(entry.source)
    }

    pub fn get(&self, handle: SourceHandle) -> Result<Arc<SourceShared>> {
        self.entry(handle).map(|e| Arc::clone(&e.source))
    }

    pub fn contains(&self, handle: SourceHandle) -> bool {
        self.entry(handle).is_ok()
    }

    pub fn name(&self, handle: SourceHandle) -> Result<&str> {
        self.entry(handle).map(|e| e.name.as_str())
    }

    /// Rename a source and notify listeners.
    pub fn rename(&mut self, handle: SourceHandle, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let slot = self.slot_mut(handle)?;
        let entry = slot.entry.as_mut().ok_or(ScopeError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        })?;
        if entry.name == name {
            return Ok(());
        }
        entry.name.clone_from(&name);
        for listener in &mut self.listeners {
            listener.name_changed(handle, &name);
        }
        Ok(())
    }

    /// Live sources in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceHandle, &str, &Arc<SourceShared>)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    SourceHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry.name.as_str(),
                    &entry.source,
                )
            })
        })
    }

    /// Live sources other than `exclude`, for a remote picker.
    pub fn others(&self, exclude: SourceHandle) -> Vec<(SourceHandle, String)> {
        self.iter()
            .filter(|(handle, _, _)| *handle != exclude)
            .map(|(handle, name, _)| (handle, name.to_string()))
            .collect()
    }

    fn unused_name(&self) -> String {
        GIVEN_NAMES
            .iter()
            .find(|&&candidate| self.iter().all(|(_, name, _)| name != candidate))
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("source-{}", self.next_id + 1))
    }

    fn entry(&self, handle: SourceHandle) -> Result<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(ScopeError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            })
    }

    fn slot_mut(&mut self, handle: SourceHandle) -> Result<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(ScopeError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            })
    }
}
