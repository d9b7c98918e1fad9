use crate::application::mutations::{
    CreateBlock, CreateItem, DeleteEntry, MutationOutcome, OptimisticMutation, RemoteWrite,
    RescheduleBlock, RescheduleKind, ScheduleItem, SkipReason, ToggleItem, ToggleTask,
    UnscheduleBlock, WriteReceipt,
};
use crate::application::schedule_state::{ScheduleSnapshot, ScheduleState};
use crate::application::sync_status::SyncStatusSignal;
use crate::domain::models::EntryKey;
use crate::domain::time::ScheduleDate;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notes_client::{fetch_schedule, NotesApiClient};
use crate::infrastructure::schedule_parser::ScheduleParser;
use chrono::{Local, NaiveDate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

type TodayProvider = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Dragging,
    Resizing,
    Editing,
}

/// Held for the duration of a drag, resize or inline edit. Background
/// refreshes are skipped while any guard is alive.
#[derive(Debug)]
pub struct InteractionGuard {
    active: Arc<AtomicUsize>,
    kind: InteractionKind,
}

impl InteractionGuard {
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }
}

impl Drop for InteractionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub date: String,
    pub scheduled: usize,
    pub unscheduled: usize,
    /// Set for initial loads and day changes; background refreshes never move the viewport.
    pub scroll_to_now: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSkip {
    Interacting,
    WritePending,
    /// The viewed day changed while the fetch was in flight.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Loaded(LoadSummary),
    Skipped(RefreshSkip),
}

pub struct SyncEngine<C>
where
    C: NotesApiClient,
{
    client: Arc<C>,
    parser: ScheduleParser,
    state: Mutex<ScheduleState>,
    status: SyncStatusSignal,
    active_interactions: Arc<AtomicUsize>,
    today_provider: TodayProvider,
}

impl<C> SyncEngine<C>
where
    C: NotesApiClient,
{
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            parser: ScheduleParser::default(),
            state: Mutex::new(ScheduleState::default()),
            status: SyncStatusSignal::new(),
            active_interactions: Arc::new(AtomicUsize::new(0)),
            today_provider: Arc::new(|| Local::now().date_naive()),
        }
    }

    pub fn with_parser(mut self, parser: ScheduleParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_today_provider(mut self, today_provider: TodayProvider) -> Self {
        self.today_provider = today_provider;
        self
    }

    pub fn status(&self) -> &SyncStatusSignal {
        &self.status
    }

    pub fn today(&self) -> NaiveDate {
        (self.today_provider)()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ScheduleState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::State(format!("schedule lock poisoned: {error}")))
    }

    pub fn snapshot(&self) -> Result<ScheduleSnapshot, InfraError> {
        Ok(self.lock_state()?.snapshot())
    }

    pub fn current_date(&self) -> Result<NaiveDate, InfraError> {
        let date = self.lock_state()?.date();
        Ok(date.resolve(self.today()))
    }

    pub fn begin_interaction(&self, kind: InteractionKind) -> InteractionGuard {
        self.active_interactions.fetch_add(1, Ordering::SeqCst);
        InteractionGuard {
            active: Arc::clone(&self.active_interactions),
            kind,
        }
    }

    pub fn is_interacting(&self) -> bool {
        self.active_interactions.load(Ordering::SeqCst) > 0
    }

    pub async fn load_schedule(&self) -> Result<LoadSummary, InfraError> {
        let date = self.lock_state()?.date();
        self.load_date(date).await
    }

    pub async fn change_day(&self, delta_days: i64) -> Result<LoadSummary, InfraError> {
        let date = self.lock_state()?.date().shift(delta_days, self.today());
        self.load_date(date).await
    }

    pub async fn go_to_date(&self, date: NaiveDate) -> Result<LoadSummary, InfraError> {
        self.load_date(ScheduleDate::for_date(date, self.today())).await
    }

    pub async fn go_to_today(&self) -> Result<LoadSummary, InfraError> {
        self.load_date(ScheduleDate::Today).await
    }

    /// Explicit load: failures leave the current state untouched.
    async fn load_date(&self, date: ScheduleDate) -> Result<LoadSummary, InfraError> {
        let date_param = date.api_param();
        let payload = fetch_schedule(self.client.as_ref(), &date_param)
            .await
            .inspect_err(|error| {
                tracing::error!(date = %date_param, %error, "failed to load schedule");
            })?;
        let parsed = self.parser.parse(&payload);

        let mut state = self.lock_state()?;
        state.replace(date, parsed);
        let summary = summarize(&state, true);
        tracing::info!(
            date = %summary.date,
            scheduled = summary.scheduled,
            unscheduled = summary.unscheduled,
            "loaded schedule"
        );
        Ok(summary)
    }

    fn refresh_blocker(&self) -> Result<Option<RefreshSkip>, InfraError> {
        if self.is_interacting() {
            return Ok(Some(RefreshSkip::Interacting));
        }
        if self.lock_state()?.has_pending() {
            return Ok(Some(RefreshSkip::WritePending));
        }
        Ok(None)
    }

    /// Re-fetches the viewed day unless the user is mid-interaction or a
    /// write is in flight. A skipped refresh is dropped, not deferred.
    pub async fn refresh_in_background(&self) -> Result<RefreshOutcome, InfraError> {
        if let Some(reason) = self.refresh_blocker()? {
            tracing::debug!(?reason, "skipping background refresh");
            return Ok(RefreshOutcome::Skipped(reason));
        }

        let date = self.lock_state()?.date();
        let payload = fetch_schedule(self.client.as_ref(), &date.api_param()).await?;
        let parsed = self.parser.parse(&payload);

        if let Some(reason) = self.refresh_blocker()? {
            tracing::debug!(?reason, "discarding background refresh");
            return Ok(RefreshOutcome::Skipped(reason));
        }
        let mut state = self.lock_state()?;
        if state.date() != date {
            return Ok(RefreshOutcome::Skipped(RefreshSkip::Superseded));
        }
        state.replace(date, parsed);
        Ok(RefreshOutcome::Loaded(summarize(&state, false)))
    }

    async fn send(&self, write: &RemoteWrite) -> Result<WriteReceipt, InfraError> {
        match write {
            RemoteWrite::Create {
                markdown,
                date_param,
            } => self
                .client
                .create_block(markdown, date_param)
                .await
                .map(WriteReceipt::Created),
            RemoteWrite::Update { id, markdown } => self
                .client
                .update_block(id, markdown)
                .await
                .map(|()| WriteReceipt::Updated),
            RemoteWrite::Delete { id } => self
                .client
                .delete_blocks(std::slice::from_ref(id))
                .await
                .map(|()| WriteReceipt::Deleted),
        }
    }

    /// Applies `mutation` locally, issues its single remote write, then
    /// commits or rolls back. Remote failures are reported through the
    /// outcome and the status signal, never as `Err`.
    pub async fn perform_optimistic_mutation<M>(
        &self,
        mut mutation: M,
    ) -> Result<MutationOutcome, InfraError>
    where
        M: OptimisticMutation,
    {
        let labels = mutation.labels();
        let prepared = {
            let mut state = self.lock_state()?;
            if let Some(key) = mutation.target() {
                if state.is_pending(key) {
                    tracing::warn!(%key, "write already pending; ignoring action");
                    return Ok(MutationOutcome::Skipped(SkipReason::Busy));
                }
            }
            match mutation.prepare(&mut state) {
                Ok(prepared) => {
                    state.mark_pending(prepared.key);
                    prepared
                }
                Err(reason) => {
                    tracing::debug!(%reason, action = labels.pending, "skipped mutation");
                    return Ok(MutationOutcome::Skipped(reason));
                }
            }
        };

        self.status.saving(labels.pending);
        let result = self.send(&prepared.write).await;

        let mut state = self.lock_state()?;
        state.clear_pending(prepared.key);
        match result {
            Ok(receipt) => {
                mutation.commit(&mut state, receipt);
                drop(state);
                tracing::info!(
                    key = %prepared.key,
                    action = labels.done,
                    "remote write confirmed"
                );
                self.status.saved(labels.done);
                Ok(MutationOutcome::Applied)
            }
            Err(error) => {
                mutation.revert(&mut state);
                drop(state);
                tracing::warn!(
                    key = %prepared.key,
                    %error,
                    action = labels.failed,
                    "remote write failed; rolled back"
                );
                self.status.error(labels.failed);
                Ok(MutationOutcome::RolledBack { error })
            }
        }
    }

    pub async fn move_block(
        &self,
        key: EntryKey,
        start: f64,
        end: f64,
    ) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(RescheduleBlock::new(
            key,
            start,
            end,
            RescheduleKind::Move,
        ))
        .await
    }

    pub async fn resize_block(
        &self,
        key: EntryKey,
        start: f64,
        end: f64,
    ) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(RescheduleBlock::new(
            key,
            start,
            end,
            RescheduleKind::Resize,
        ))
        .await
    }

    pub async fn toggle_task(
        &self,
        key: EntryKey,
        checked: bool,
    ) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(ToggleTask::new(key, checked))
            .await
    }

    pub async fn toggle_unscheduled(
        &self,
        key: EntryKey,
        checked: bool,
    ) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(ToggleItem::new(key, checked))
            .await
    }

    pub async fn create_block(
        &self,
        start: f64,
        end: f64,
        title: &str,
    ) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(CreateBlock::new(start, end, title))
            .await
    }

    pub async fn create_unscheduled(&self, text: &str) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(CreateItem::new(text))
            .await
    }

    pub async fn schedule_item(
        &self,
        key: EntryKey,
        start: f64,
        end: f64,
    ) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(ScheduleItem::new(key, start, end))
            .await
    }

    pub async fn unschedule_block(&self, key: EntryKey) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(UnscheduleBlock::new(key))
            .await
    }

    pub async fn delete_entry(&self, key: EntryKey) -> Result<MutationOutcome, InfraError> {
        self.perform_optimistic_mutation(DeleteEntry::new(key))
            .await
    }
}

fn summarize(state: &ScheduleState, scroll_to_now: bool) -> LoadSummary {
    LoadSummary {
        date: state.date().api_param(),
        scheduled: state.scheduled().len(),
        unscheduled: state.unscheduled().len(),
        scroll_to_now,
    }
}

pub struct PeriodicSync {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicSync {
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        let _ = (&mut self.handle).await;
    }
}

impl Drop for PeriodicSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn spawn_periodic_sync<C>(engine: Arc<SyncEngine<C>>, period: Duration) -> PeriodicSync
where
    C: NotesApiClient + 'static,
{
    spawn_periodic_sync_with(engine, period, |result| {
        if let Err(error) = result {
            tracing::warn!(%error, "background refresh failed");
        }
    })
}

/// Like [`spawn_periodic_sync`], reporting every tick's result to `on_tick`.
/// The first tick fires one `period` after spawning; missed ticks are skipped.
pub fn spawn_periodic_sync_with<C, F>(
    engine: Arc<SyncEngine<C>>,
    period: Duration,
    on_tick: F,
) -> PeriodicSync
where
    C: NotesApiClient + 'static,
    F: Fn(Result<RefreshOutcome, InfraError>) + Send + 'static,
{
    let (stop, mut stopped) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = engine.refresh_in_background().await;
                    on_tick(result);
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("periodic sync stopped");
    });
    PeriodicSync { stop, handle }
}
