use crate::application::schedule_state::{EntryList, ScheduleState};
use crate::domain::models::{validate_range, EntryKey, ScheduledBlock, Tracked, UnscheduledItem};
use crate::domain::time::clamp_to_last_minute;
use crate::infrastructure::block_markdown;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notes_client::CreatedBlock;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionLabels {
    pub pending: &'static str,
    pub done: &'static str,
    pub failed: &'static str,
}

const MOVE_LABELS: ActionLabels = ActionLabels {
    pending: "Moving...",
    done: "Moved",
    failed: "Move failed",
};
const RESIZE_LABELS: ActionLabels = ActionLabels {
    pending: "Syncing...",
    done: "Saved",
    failed: "Sync failed",
};
const UPDATE_LABELS: ActionLabels = ActionLabels {
    pending: "Updating...",
    done: "Updated",
    failed: "Update failed",
};
const CREATE_LABELS: ActionLabels = ActionLabels {
    pending: "Creating...",
    done: "Created",
    failed: "Create failed",
};
const SCHEDULE_LABELS: ActionLabels = ActionLabels {
    pending: "Scheduling...",
    done: "Scheduled",
    failed: "Schedule failed",
};
const UNSCHEDULE_LABELS: ActionLabels = ActionLabels {
    pending: "Unscheduling...",
    done: "Unscheduled",
    failed: "Unschedule failed",
};
const DELETE_LABELS: ActionLabels = ActionLabels {
    pending: "Deleting...",
    done: "Deleted",
    failed: "Delete failed",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    MissingId,
    Busy,
    Unchanged,
    EmptyText,
    InvalidRange,
    NotATask,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "entry not found",
            Self::MissingId => "entry has no remote id yet",
            Self::Busy => "a write for this entry is already pending",
            Self::Unchanged => "markdown is unchanged",
            Self::EmptyText => "text must not be empty",
            Self::InvalidRange => "time range is invalid",
            Self::NotATask => "block is not a task",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum MutationOutcome {
    Applied,
    RolledBack { error: InfraError },
    Skipped(SkipReason),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    Create { markdown: String, date_param: String },
    Update { id: String, markdown: String },
    Delete { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteReceipt {
    Created(CreatedBlock),
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedWrite {
    pub key: EntryKey,
    pub write: RemoteWrite,
}

pub trait OptimisticMutation: Send {
    fn labels(&self) -> ActionLabels;

    /// Existing entry the action targets; `None` for creates.
    fn target(&self) -> Option<EntryKey>;

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason>;

    fn commit(self, state: &mut ScheduleState, receipt: WriteReceipt);

    fn revert(self, state: &mut ScheduleState);
}

fn require_id(id: Option<&str>, key: EntryKey) -> Result<String, SkipReason> {
    match id {
        Some(id) => Ok(id.to_string()),
        None => {
            tracing::warn!(%key, "cannot update entry without a remote id");
            Err(SkipReason::MissingId)
        }
    }
}

fn ensure_changed(markdown: &str, original: &str) -> Result<(), SkipReason> {
    if markdown == original {
        Err(SkipReason::Unchanged)
    } else {
        Ok(())
    }
}

fn block_markdown_for(block: &ScheduledBlock, start: f64, end: f64, checked: bool) -> String {
    if block.is_task {
        block_markdown::scheduled_task(start, end, &block.title, checked)
    } else {
        block_markdown::scheduled_block(start, end, &block.title)
    }
}

fn record_block_markdown(state: &mut ScheduleState, key: EntryKey, markdown: Option<String>) {
    if let Some(markdown) = markdown {
        state.update_block(key, |block| block.original_markdown = markdown);
    }
}

fn record_item_markdown(state: &mut ScheduleState, key: EntryKey, markdown: Option<String>) {
    if let Some(markdown) = markdown {
        state.update_item(key, |item| item.original_markdown = markdown);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleKind {
    Move,
    Resize,
}

#[derive(Debug)]
pub struct RescheduleBlock {
    key: EntryKey,
    start: f64,
    end: f64,
    kind: RescheduleKind,
    previous: Option<(f64, f64)>,
    sent: Option<String>,
}

impl RescheduleBlock {
    pub fn new(key: EntryKey, start: f64, end: f64, kind: RescheduleKind) -> Self {
        Self {
            key,
            start,
            end: clamp_to_last_minute(end),
            kind,
            previous: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for RescheduleBlock {
    fn labels(&self) -> ActionLabels {
        match self.kind {
            RescheduleKind::Move => MOVE_LABELS,
            RescheduleKind::Resize => RESIZE_LABELS,
        }
    }

    fn target(&self) -> Option<EntryKey> {
        Some(self.key)
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let block = state.block(self.key).ok_or(SkipReason::NotFound)?;
        let id = require_id(block.id.as_deref(), self.key)?;
        validate_range(self.start, self.end).map_err(|_| SkipReason::InvalidRange)?;
        let markdown = block_markdown_for(block, self.start, self.end, block.checked);
        ensure_changed(&markdown, &block.original_markdown)?;

        self.previous = Some((block.start, block.end));
        let (start, end) = (self.start, self.end);
        state.update_block(self.key, |block| {
            block.start = start;
            block.end = end;
        });
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key: self.key,
            write: RemoteWrite::Update { id, markdown },
        })
    }

    fn commit(self, state: &mut ScheduleState, _receipt: WriteReceipt) {
        record_block_markdown(state, self.key, self.sent);
    }

    fn revert(self, state: &mut ScheduleState) {
        if let Some((start, end)) = self.previous {
            state.update_block(self.key, |block| {
                block.start = start;
                block.end = end;
            });
        }
    }
}

#[derive(Debug)]
pub struct ToggleTask {
    key: EntryKey,
    checked: bool,
    previous: Option<bool>,
    sent: Option<String>,
}

impl ToggleTask {
    pub fn new(key: EntryKey, checked: bool) -> Self {
        Self {
            key,
            checked,
            previous: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for ToggleTask {
    fn labels(&self) -> ActionLabels {
        UPDATE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        Some(self.key)
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let block = state.block(self.key).ok_or(SkipReason::NotFound)?;
        let id = require_id(block.id.as_deref(), self.key)?;
        if !block.is_task {
            return Err(SkipReason::NotATask);
        }
        let markdown =
            block_markdown::scheduled_task(block.start, block.end, &block.title, self.checked);
        ensure_changed(&markdown, &block.original_markdown)?;

        self.previous = Some(block.checked);
        let checked = self.checked;
        state.update_block(self.key, |block| block.checked = checked);
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key: self.key,
            write: RemoteWrite::Update { id, markdown },
        })
    }

    fn commit(self, state: &mut ScheduleState, _receipt: WriteReceipt) {
        record_block_markdown(state, self.key, self.sent);
    }

    fn revert(self, state: &mut ScheduleState) {
        if let Some(checked) = self.previous {
            state.update_block(self.key, |block| block.checked = checked);
        }
    }
}

#[derive(Debug)]
pub struct ToggleItem {
    key: EntryKey,
    checked: bool,
    previous: Option<bool>,
    sent: Option<String>,
}

impl ToggleItem {
    pub fn new(key: EntryKey, checked: bool) -> Self {
        Self {
            key,
            checked,
            previous: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for ToggleItem {
    fn labels(&self) -> ActionLabels {
        UPDATE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        Some(self.key)
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let item = state.item(self.key).ok_or(SkipReason::NotFound)?;
        let id = require_id(item.id.as_deref(), self.key)?;
        let markdown = block_markdown::unscheduled_item(&item.text, self.checked);
        ensure_changed(&markdown, &item.original_markdown)?;

        self.previous = Some(item.checked);
        let checked = self.checked;
        state.update_item(self.key, |item| item.checked = checked);
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key: self.key,
            write: RemoteWrite::Update { id, markdown },
        })
    }

    fn commit(self, state: &mut ScheduleState, _receipt: WriteReceipt) {
        record_item_markdown(state, self.key, self.sent);
    }

    fn revert(self, state: &mut ScheduleState) {
        if let Some(checked) = self.previous {
            state.update_item(self.key, |item| item.checked = checked);
        }
    }
}

/// New time block on the viewed day. The entry is visible immediately with
/// no id; the id arrives with the create response.
#[derive(Debug)]
pub struct CreateBlock {
    start: f64,
    end: f64,
    title: String,
    key: Option<EntryKey>,
    sent: Option<String>,
}

impl CreateBlock {
    pub fn new(start: f64, end: f64, title: impl Into<String>) -> Self {
        Self {
            start,
            end: clamp_to_last_minute(end),
            title: title.into(),
            key: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for CreateBlock {
    fn labels(&self) -> ActionLabels {
        CREATE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        None
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(SkipReason::EmptyText);
        }
        validate_range(self.start, self.end).map_err(|_| SkipReason::InvalidRange)?;

        let markdown = block_markdown::scheduled_block(self.start, self.end, title);
        let key = state.insert_block(ScheduledBlock::new(self.start, self.end, title));
        self.key = Some(key);
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key,
            write: RemoteWrite::Create {
                markdown,
                date_param: state.date().api_param(),
            },
        })
    }

    fn commit(self, state: &mut ScheduleState, receipt: WriteReceipt) {
        let Some(key) = self.key else {
            return;
        };
        let id = match receipt {
            WriteReceipt::Created(created) => created.id,
            _ => None,
        };
        let markdown = self.sent.unwrap_or_default();
        state.update_block(key, |block| {
            block.id = id;
            block.original_markdown = markdown;
        });
    }

    fn revert(self, state: &mut ScheduleState) {
        if let Some(key) = self.key {
            state.remove_block(key);
        }
    }
}

#[derive(Debug)]
pub struct CreateItem {
    text: String,
    key: Option<EntryKey>,
    sent: Option<String>,
}

impl CreateItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            key: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for CreateItem {
    fn labels(&self) -> ActionLabels {
        CREATE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        None
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(SkipReason::EmptyText);
        }

        let markdown = block_markdown::unscheduled_item(text, false);
        let key = state.insert_item(UnscheduledItem::new(text));
        self.key = Some(key);
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key,
            write: RemoteWrite::Create {
                markdown,
                date_param: state.date().api_param(),
            },
        })
    }

    fn commit(self, state: &mut ScheduleState, receipt: WriteReceipt) {
        let Some(key) = self.key else {
            return;
        };
        let id = match receipt {
            WriteReceipt::Created(created) => created.id,
            _ => None,
        };
        let markdown = self.sent.unwrap_or_default();
        state.update_item(key, |item| {
            item.id = id;
            item.original_markdown = markdown;
        });
    }

    fn revert(self, state: &mut ScheduleState) {
        if let Some(key) = self.key {
            state.remove_item(key);
        }
    }
}

/// Drops an unscheduled item onto the timeline. The entry keeps its key and
/// checked state and becomes a task block.
#[derive(Debug)]
pub struct ScheduleItem {
    key: EntryKey,
    start: f64,
    end: f64,
    removed: Option<(usize, Tracked<UnscheduledItem>)>,
    sent: Option<String>,
}

impl ScheduleItem {
    pub fn new(key: EntryKey, start: f64, end: f64) -> Self {
        Self {
            key,
            start,
            end: clamp_to_last_minute(end),
            removed: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for ScheduleItem {
    fn labels(&self) -> ActionLabels {
        SCHEDULE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        Some(self.key)
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let item = state.item(self.key).ok_or(SkipReason::NotFound)?;
        let id = require_id(item.id.as_deref(), self.key)?;
        validate_range(self.start, self.end).map_err(|_| SkipReason::InvalidRange)?;
        let markdown =
            block_markdown::scheduled_task(self.start, self.end, &item.text, item.checked);

        let (index, entry) = state.remove_item(self.key).ok_or(SkipReason::NotFound)?;
        let mut block = ScheduledBlock::new(self.start, self.end, entry.item.text.clone());
        block.id = entry.item.id.clone();
        block.is_task = true;
        block.checked = entry.item.checked;
        block.original_markdown = entry.item.original_markdown.clone();
        state.insert_tracked_block(Tracked {
            key: self.key,
            item: block,
        });

        self.removed = Some((index, entry));
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key: self.key,
            write: RemoteWrite::Update { id, markdown },
        })
    }

    fn commit(self, state: &mut ScheduleState, _receipt: WriteReceipt) {
        record_block_markdown(state, self.key, self.sent);
    }

    fn revert(self, state: &mut ScheduleState) {
        let Some((index, entry)) = self.removed else {
            return;
        };
        if state.remove_block(self.key).is_some() {
            state.insert_tracked_item(index, entry);
        }
    }
}

#[derive(Debug)]
pub struct UnscheduleBlock {
    key: EntryKey,
    removed: Option<Tracked<ScheduledBlock>>,
    sent: Option<String>,
}

impl UnscheduleBlock {
    pub fn new(key: EntryKey) -> Self {
        Self {
            key,
            removed: None,
            sent: None,
        }
    }
}

impl OptimisticMutation for UnscheduleBlock {
    fn labels(&self) -> ActionLabels {
        UNSCHEDULE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        Some(self.key)
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let block = state.block(self.key).ok_or(SkipReason::NotFound)?;
        let id = require_id(block.id.as_deref(), self.key)?;
        let markdown = block_markdown::unscheduled_item(&block.title, block.checked);

        let entry = state.remove_block(self.key).ok_or(SkipReason::NotFound)?;
        let item = UnscheduledItem {
            id: entry.item.id.clone(),
            text: entry.item.title.clone(),
            checked: entry.item.checked,
            original_markdown: entry.item.original_markdown.clone(),
        };
        let end = state.unscheduled().len();
        state.insert_tracked_item(end, Tracked { key: self.key, item });

        self.removed = Some(entry);
        self.sent = Some(markdown.clone());
        Ok(PreparedWrite {
            key: self.key,
            write: RemoteWrite::Update { id, markdown },
        })
    }

    fn commit(self, state: &mut ScheduleState, _receipt: WriteReceipt) {
        record_item_markdown(state, self.key, self.sent);
    }

    fn revert(self, state: &mut ScheduleState) {
        let Some(entry) = self.removed else {
            return;
        };
        if state.remove_item(self.key).is_some() {
            state.insert_tracked_block(entry);
        }
    }
}

#[derive(Debug)]
pub struct DeleteEntry {
    key: EntryKey,
}

impl DeleteEntry {
    pub fn new(key: EntryKey) -> Self {
        Self { key }
    }
}

impl OptimisticMutation for DeleteEntry {
    fn labels(&self) -> ActionLabels {
        DELETE_LABELS
    }

    fn target(&self) -> Option<EntryKey> {
        Some(self.key)
    }

    fn prepare(&mut self, state: &mut ScheduleState) -> Result<PreparedWrite, SkipReason> {
        let id = state.remote_id(self.key).ok_or(SkipReason::NotFound)?;
        let id = require_id(id, self.key)?;
        Ok(PreparedWrite {
            key: self.key,
            write: RemoteWrite::Delete { id },
        })
    }

    fn commit(self, state: &mut ScheduleState, _receipt: WriteReceipt) {
        match state.locate(self.key) {
            Some(EntryList::Scheduled) => {
                state.remove_block(self.key);
            }
            Some(EntryList::Unscheduled) => {
                state.remove_item(self.key);
            }
            None => {}
        }
    }

    fn revert(self, _state: &mut ScheduleState) {}
}
