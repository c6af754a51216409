//! In-memory board store
//!
//! The store is the single source of truth of the running session. It has
//! exactly one writer; every mutation marks it dirty and bumps its revision.

use std::collections::HashMap;

use tracing::debug;

use super::allocator::IdAllocator;
use super::snapshot::Snapshot;
use crate::error::Error;
use crate::resource::{Card, Preference, PreferenceUpdate, ResourceId, Task};
use crate::Result;

trait Positioned {
    fn set_position(&mut self, position: usize);
}

impl Positioned for Card {
    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

impl Positioned for Task {
    fn set_position(&mut self, position: usize) {
        self.position = position;
    }
}

/// Rewrite positions of `items[from..]` to match their index
fn renumber<T: Positioned>(items: &mut [T], from: usize) {
    for (idx, item) in items.iter_mut().enumerate().skip(from) {
        item.set_position(idx);
    }
}

/// Move `items[from]` to `to`, shifting everything in between by one slot
fn shift<T: Positioned>(items: &mut [T], from: usize, to: usize) {
    if from < to {
        items[from..=to].rotate_left(1);
    } else {
        items[to..=from].rotate_right(1);
    }
    let (low, high) = (from.min(to), from.max(to));
    for (idx, item) in items.iter_mut().enumerate().take(high + 1).skip(low) {
        item.set_position(idx);
    }
}

/// Authoritative in-memory state of the board
#[derive(Debug, Default)]
pub struct LocalStore {
    cards: Vec<Card>,
    /// Ordered task list per card id
    tasks: HashMap<ResourceId, Vec<Task>>,
    /// Preference per card id
    preferences: HashMap<ResourceId, Preference>,
    card_ids: IdAllocator,
    task_ids: IdAllocator,
    preference_ids: IdAllocator,
    token: Option<String>,
    dirty: bool,
    revision: u64,
}

impl LocalStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store populated from a snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        Self::build(snapshot)
    }

    /// Replace all state with the snapshot's.
    ///
    /// The snapshot is validated first; on error the store is left untouched.
    pub fn load(&mut self, snapshot: Snapshot) -> Result<()> {
        let mut loaded = Self::build(snapshot)?;
        loaded.revision = self.revision + 1;
        *self = loaded;
        debug!(
            "Loaded {} cards, {} preferences",
            self.cards.len(),
            self.preferences.len()
        );
        Ok(())
    }

    /// Replace cards, tasks and preferences with the server's, keeping the token
    pub fn replace_with_remote(
        &mut self,
        cards: Vec<Card>,
        tasks: Vec<Task>,
        preferences: Vec<Preference>,
    ) -> Result<()> {
        let snapshot = Snapshot {
            cards,
            tasks,
            preferences,
            token: self.token.clone(),
        };
        self.load(snapshot)
    }

    fn build(snapshot: Snapshot) -> Result<Self> {
        let mut store = Self {
            token: snapshot.token,
            ..Self::default()
        };

        let mut cards = snapshot.cards;
        cards.sort_by_key(|card| card.position);
        for card in cards {
            if !store.card_ids.insert(card.id) {
                return Err(Error::CorruptSnapshot(format!("duplicate card id {}", card.id)));
            }
            store.tasks.insert(card.id, Vec::new());
            store.cards.push(card);
        }
        renumber(&mut store.cards, 0);

        for task in snapshot.tasks {
            if !store.task_ids.insert(task.id) {
                return Err(Error::CorruptSnapshot(format!("duplicate task id {}", task.id)));
            }
            let list = store.tasks.get_mut(&task.card_id).ok_or_else(|| {
                Error::CorruptSnapshot(format!(
                    "task {} references missing card {}",
                    task.id, task.card_id
                ))
            })?;
            list.push(task);
        }

        for (card_id, list) in store.tasks.iter_mut() {
            list.sort_by_key(|task| task.position);
            if list.iter().enumerate().any(|(idx, task)| task.position != idx) {
                return Err(Error::CorruptSnapshot(format!(
                    "task positions of card {} are not contiguous",
                    card_id
                )));
            }
        }

        for preference in snapshot.preferences {
            if !store.preference_ids.insert(preference.id) {
                return Err(Error::CorruptSnapshot(format!(
                    "duplicate preference id {}",
                    preference.id
                )));
            }
            if !store.card_ids.contains(preference.card_id) {
                return Err(Error::CorruptSnapshot(format!(
                    "preference {} references missing card {}",
                    preference.id, preference.card_id
                )));
            }
            let card_id = preference.card_id;
            if store.preferences.insert(card_id, preference).is_some() {
                return Err(Error::CorruptSnapshot(format!(
                    "card {} has more than one preference",
                    card_id
                )));
            }
        }

        if let Some(card) = store
            .cards
            .iter()
            .find(|card| !store.preferences.contains_key(&card.id))
        {
            return Err(Error::CorruptSnapshot(format!(
                "card {} has no preference",
                card.id
            )));
        }

        Ok(store)
    }

    /// Keep the ids of a previously synced snapshot out of circulation.
    ///
    /// Used when the store was loaded from a working copy whose deletions
    /// have not reached the server yet.
    pub fn reserve_synced_ids(&mut self, synced: &Snapshot) {
        for card in &synced.cards {
            self.card_ids.reserve(card.id);
        }
        for task in &synced.tasks {
            self.task_ids.reserve(task.id);
        }
        for preference in &synced.preferences {
            self.preference_ids.reserve(preference.id);
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    fn card_index(&self, card_id: ResourceId) -> Result<usize> {
        self.cards
            .iter()
            .position(|card| card.id == card_id)
            .ok_or(Error::CardNotFound(card_id))
    }

    fn task_list_mut(&mut self, card_id: ResourceId) -> Result<&mut Vec<Task>> {
        self.tasks
            .get_mut(&card_id)
            .ok_or(Error::CardNotFound(card_id))
    }

    fn check_index(card_id: ResourceId, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(Error::TaskIndexOutOfRange {
                card_id,
                index,
                len,
            })
        }
    }

    // ---- cards ----

    /// Add a card at the end of the board, together with its preference
    pub fn add_card(&mut self, name: impl Into<String>) -> ResourceId {
        let card_id = self.card_ids.allocate();
        let preference_id = self.preference_ids.allocate();

        let position = self.cards.len();
        self.cards.push(Card::new(card_id, name).with_position(position));
        self.tasks.insert(card_id, Vec::new());
        self.preferences
            .insert(card_id, Preference::new(preference_id, card_id));

        self.touch();
        card_id
    }

    /// Remove a card with its tasks and preference
    pub fn remove_card(&mut self, card_id: ResourceId) -> Result<Card> {
        let index = self.card_index(card_id)?;
        let card = self.cards.remove(index);
        renumber(&mut self.cards, index);
        self.card_ids.release(card_id);

        for task in self.tasks.remove(&card_id).unwrap_or_default() {
            self.task_ids.release(task.id);
        }
        if let Some(preference) = self.preferences.remove(&card_id) {
            self.preference_ids.release(preference.id);
        }

        debug!("Removed card {} and its tasks", card_id);
        self.touch();
        Ok(card)
    }

    pub fn rename_card(&mut self, card_id: ResourceId, name: impl Into<String>) -> Result<()> {
        let index = self.card_index(card_id)?;
        self.cards[index].name = name.into();
        self.touch();
        Ok(())
    }

    /// Reorder cards on the board
    pub fn move_card(&mut self, from_index: usize, to_index: usize) -> Result<()> {
        let len = self.cards.len();
        for index in [from_index, to_index] {
            if index >= len {
                return Err(Error::InvalidInput(format!(
                    "Card index {} out of range ({} cards)",
                    index, len
                )));
            }
        }
        if from_index == to_index {
            return Ok(());
        }
        shift(&mut self.cards, from_index, to_index);
        self.touch();
        Ok(())
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card(&self, card_id: ResourceId) -> Result<&Card> {
        let index = self.card_index(card_id)?;
        Ok(&self.cards[index])
    }

    // ---- tasks ----

    /// Append a task to a card
    pub fn add_task(
        &mut self,
        card_id: ResourceId,
        description: impl Into<String>,
    ) -> Result<ResourceId> {
        let list = self
            .tasks
            .get_mut(&card_id)
            .ok_or(Error::CardNotFound(card_id))?;
        let task_id = self.task_ids.allocate();
        let position = list.len();
        list.push(Task::new(task_id, card_id, description).with_position(position));

        self.touch();
        Ok(task_id)
    }

    pub fn remove_task(&mut self, card_id: ResourceId, index: usize) -> Result<Task> {
        let list = self
            .tasks
            .get_mut(&card_id)
            .ok_or(Error::CardNotFound(card_id))?;
        Self::check_index(card_id, index, list.len())?;
        let task = list.remove(index);
        renumber(list, index);
        self.task_ids.release(task.id);

        self.touch();
        Ok(task)
    }

    /// Move a task within its card; positions between the two indexes shift by one
    pub fn move_task(&mut self, card_id: ResourceId, from_index: usize, to_index: usize) -> Result<()> {
        let list = self.task_list_mut(card_id)?;
        let len = list.len();
        Self::check_index(card_id, from_index, len)?;
        Self::check_index(card_id, to_index, len)?;
        if from_index == to_index {
            return Ok(());
        }
        shift(list, from_index, to_index);

        self.touch();
        Ok(())
    }

    pub fn update_task(
        &mut self,
        card_id: ResourceId,
        index: usize,
        description: impl Into<String>,
    ) -> Result<()> {
        let list = self.task_list_mut(card_id)?;
        Self::check_index(card_id, index, list.len())?;
        list[index].description = description.into();

        self.touch();
        Ok(())
    }

    /// Move a task to another card.
    ///
    /// Both lists are rebuilt before either is committed, so a failure leaves
    /// the store unchanged. `to_index` may equal the destination length.
    pub fn transfer_task(
        &mut self,
        from_card: ResourceId,
        to_card: ResourceId,
        from_index: usize,
        to_index: usize,
    ) -> Result<()> {
        if from_card == to_card {
            return self.move_task(from_card, from_index, to_index);
        }

        let mut source = self
            .tasks
            .get(&from_card)
            .ok_or(Error::CardNotFound(from_card))?
            .clone();
        let mut destination = self
            .tasks
            .get(&to_card)
            .ok_or(Error::CardNotFound(to_card))?
            .clone();
        Self::check_index(from_card, from_index, source.len())?;
        Self::check_index(to_card, to_index, destination.len() + 1)?;

        let mut task = source.remove(from_index);
        task.card_id = to_card;
        destination.insert(to_index, task);
        renumber(&mut source, from_index);
        renumber(&mut destination, to_index);

        self.tasks.insert(from_card, source);
        self.tasks.insert(to_card, destination);
        self.touch();
        Ok(())
    }

    pub fn tasks(&self, card_id: ResourceId) -> Result<&[Task]> {
        self.tasks
            .get(&card_id)
            .map(Vec::as_slice)
            .ok_or(Error::CardNotFound(card_id))
    }

    pub fn task(&self, card_id: ResourceId, index: usize) -> Result<&Task> {
        let list = self.tasks(card_id)?;
        Self::check_index(card_id, index, list.len())?;
        Ok(&list[index])
    }

    /// Index of a task inside its card
    pub fn find_task(&self, card_id: ResourceId, task_id: ResourceId) -> Result<usize> {
        self.tasks(card_id)?
            .iter()
            .position(|task| task.id == task_id)
            .ok_or(Error::TaskNotFound { card_id, task_id })
    }

    // ---- preferences ----

    pub fn get_preference(&self, card_id: ResourceId) -> Result<&Preference> {
        self.preferences
            .get(&card_id)
            .ok_or(Error::CardNotFound(card_id))
    }

    pub fn set_preference_field(&mut self, card_id: ResourceId, update: PreferenceUpdate) -> Result<()> {
        let preference = self
            .preferences
            .get_mut(&card_id)
            .ok_or(Error::CardNotFound(card_id))?;
        preference.apply(update);

        self.touch();
        Ok(())
    }

    // ---- session ----

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
        self.touch();
    }

    /// Serializable view of the current state, positions recomputed from list order
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            token: self.token.clone(),
            ..Snapshot::default()
        };

        for (position, card) in self.cards.iter().enumerate() {
            snapshot.cards.push(card.clone().with_position(position));
            if let Some(list) = self.tasks.get(&card.id) {
                snapshot.tasks.extend(
                    list.iter()
                        .enumerate()
                        .map(|(position, task)| task.clone().with_position(position)),
                );
            }
            if let Some(preference) = self.preferences.get(&card.id) {
                snapshot.preferences.push(preference.clone());
            }
        }

        snapshot
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record a successful persist; retired ids become reusable
    pub fn mark_saved(&mut self) {
        self.dirty = false;
        self.card_ids.clear_retired();
        self.task_ids.clear_retired();
        self.preference_ids.clear_retired();
    }

    /// Counter bumped by every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
