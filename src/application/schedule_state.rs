use crate::domain::models::{
    EntryKey, ParsedSchedule, ScheduledBlock, Tracked, UnscheduledItem,
};
use crate::domain::time::ScheduleDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryList {
    Scheduled,
    Unscheduled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleSnapshot {
    pub date: String,
    pub scheduled: Vec<Tracked<ScheduledBlock>>,
    pub unscheduled_items: Vec<Tracked<UnscheduledItem>>,
    pub pending: Vec<EntryKey>,
}

/// Scheduled blocks are kept ordered by start time. Every entry carries an
/// [`EntryKey`] that stays valid until the next [`ScheduleState::replace`].
/// Pending writes outlive a replace and follow their remote id.
#[derive(Debug, Default)]
pub struct ScheduleState {
    date: ScheduleDate,
    scheduled: Vec<Tracked<ScheduledBlock>>,
    unscheduled: Vec<Tracked<UnscheduledItem>>,
    pending: HashMap<EntryKey, Option<String>>,
    next_key: u64,
}

impl ScheduleState {
    pub fn new(date: ScheduleDate) -> Self {
        Self {
            date,
            ..Self::default()
        }
    }

    pub fn date(&self) -> ScheduleDate {
        self.date
    }

    /// Swaps in a freshly parsed day. Entries sharing a remote id keep the
    /// first occurrence, scheduled list first.
    pub fn replace(&mut self, date: ScheduleDate, parsed: ParsedSchedule) {
        self.date = date;
        self.scheduled.clear();
        self.unscheduled.clear();

        let mut seen_ids = HashSet::new();
        let mut is_first = |id: &Option<String>| match id {
            Some(id) => seen_ids.insert(id.clone()),
            None => true,
        };

        for block in parsed.scheduled {
            if is_first(&block.id) {
                let key = self.allocate_key();
                self.scheduled.push(Tracked { key, item: block });
            } else {
                tracing::debug!(id = ?block.id, "dropping duplicate scheduled entry");
            }
        }
        for item in parsed.unscheduled_items {
            if is_first(&item.id) {
                let key = self.allocate_key();
                self.unscheduled.push(Tracked { key, item });
            } else {
                tracing::debug!(id = ?item.id, "dropping duplicate unscheduled entry");
            }
        }
        self.sort_scheduled();
    }

    fn allocate_key(&mut self) -> EntryKey {
        self.next_key += 1;
        EntryKey(self.next_key)
    }

    fn sort_scheduled(&mut self) {
        self.scheduled
            .sort_by(|left, right| left.item.start.total_cmp(&right.item.start));
    }

    pub fn scheduled(&self) -> &[Tracked<ScheduledBlock>] {
        &self.scheduled
    }

    pub fn unscheduled(&self) -> &[Tracked<UnscheduledItem>] {
        &self.unscheduled
    }

    pub fn locate(&self, key: EntryKey) -> Option<EntryList> {
        if self.block(key).is_some() {
            Some(EntryList::Scheduled)
        } else if self.item(key).is_some() {
            Some(EntryList::Unscheduled)
        } else {
            None
        }
    }

    /// Remote id of either kind of entry; `Some(None)` while a create is in flight.
    pub fn remote_id(&self, key: EntryKey) -> Option<Option<&str>> {
        match self.locate(key)? {
            EntryList::Scheduled => self.block(key).map(|block| block.id.as_deref()),
            EntryList::Unscheduled => self.item(key).map(|item| item.id.as_deref()),
        }
    }

    pub fn block(&self, key: EntryKey) -> Option<&ScheduledBlock> {
        self.scheduled
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.item)
    }

    pub fn item(&self, key: EntryKey) -> Option<&UnscheduledItem> {
        self.unscheduled
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.item)
    }

    pub fn update_block<R>(
        &mut self,
        key: EntryKey,
        edit: impl FnOnce(&mut ScheduledBlock) -> R,
    ) -> Option<R> {
        let entry = self.scheduled.iter_mut().find(|entry| entry.key == key)?;
        let result = edit(&mut entry.item);
        self.sort_scheduled();
        Some(result)
    }

    pub fn update_item<R>(
        &mut self,
        key: EntryKey,
        edit: impl FnOnce(&mut UnscheduledItem) -> R,
    ) -> Option<R> {
        let entry = self.unscheduled.iter_mut().find(|entry| entry.key == key)?;
        Some(edit(&mut entry.item))
    }

    pub fn insert_block(&mut self, block: ScheduledBlock) -> EntryKey {
        let key = self.allocate_key();
        self.insert_tracked_block(Tracked { key, item: block });
        key
    }

    pub fn insert_tracked_block(&mut self, entry: Tracked<ScheduledBlock>) {
        let position = self
            .scheduled
            .partition_point(|existing| existing.item.start <= entry.item.start);
        self.scheduled.insert(position, entry);
    }

    pub fn insert_item(&mut self, item: UnscheduledItem) -> EntryKey {
        let key = self.allocate_key();
        self.unscheduled.push(Tracked { key, item });
        key
    }

    /// Re-inserts a previously removed item at `index` (clamped) under its old key.
    pub fn insert_tracked_item(&mut self, index: usize, entry: Tracked<UnscheduledItem>) {
        let index = index.min(self.unscheduled.len());
        self.unscheduled.insert(index, entry);
    }

    pub fn remove_block(&mut self, key: EntryKey) -> Option<Tracked<ScheduledBlock>> {
        let position = self.scheduled.iter().position(|entry| entry.key == key)?;
        Some(self.scheduled.remove(position))
    }

    pub fn remove_item(&mut self, key: EntryKey) -> Option<(usize, Tracked<UnscheduledItem>)> {
        let position = self.unscheduled.iter().position(|entry| entry.key == key)?;
        Some((position, self.unscheduled.remove(position)))
    }

    /// True when a write is in flight for `key` or for any entry sharing
    /// its remote id.
    pub fn is_pending(&self, key: EntryKey) -> bool {
        if self.pending.contains_key(&key) {
            return true;
        }
        match self.remote_id(key) {
            Some(Some(id)) => self
                .pending
                .values()
                .any(|pending_id| pending_id.as_deref() == Some(id)),
            _ => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns `false` when a write for `key` was already pending.
    pub fn mark_pending(&mut self, key: EntryKey) -> bool {
        if self.is_pending(key) {
            return false;
        }
        let id = self.remote_id(key).flatten().map(ToOwned::to_owned);
        self.pending.insert(key, id);
        true
    }

    pub fn clear_pending(&mut self, key: EntryKey) {
        self.pending.remove(&key);
    }

    pub fn snapshot(&self) -> ScheduleSnapshot {
        let mut pending: Vec<EntryKey> = self
            .scheduled
            .iter()
            .map(|entry| entry.key)
            .chain(self.unscheduled.iter().map(|entry| entry.key))
            .filter(|key| self.is_pending(*key))
            .collect();
        pending.sort();
        ScheduleSnapshot {
            date: self.date.api_param(),
            scheduled: self.scheduled.clone(),
            unscheduled_items: self.unscheduled.clone(),
            pending,
        }
    }
}
