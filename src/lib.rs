pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, init_logging, BootstrapResult};
pub use application::mutations::{MutationOutcome, OptimisticMutation, SkipReason};
pub use application::schedule_state::{ScheduleSnapshot, ScheduleState};
pub use application::sync_engine::{
    spawn_periodic_sync, spawn_periodic_sync_with, InteractionGuard, InteractionKind,
    LoadSummary, PeriodicSync, RefreshOutcome, RefreshSkip, SyncEngine,
};
pub use application::sync_status::{SyncStatus, SyncStatusKind, SyncStatusSignal};
pub use domain::models::{
    categorize_task, Category, EntryKey, Highlight, ParsedSchedule, ScheduledBlock, Tracked,
    UnscheduledItem,
};
pub use domain::time::{decimal_to_time_string, ScheduleDate, TimeWindow, UnmarkedHourPolicy};
pub use infrastructure::error::InfraError;
pub use infrastructure::notes_client::{NotesApiClient, ReqwestNotesApiClient};
pub use infrastructure::schedule_parser::{parse_blocks, ParserOptions, RawPayload, ScheduleParser};
