pub mod bootstrap;
pub mod mutations;
pub mod schedule_state;
pub mod sync_engine;
pub mod sync_status;
