//! Per-note debounced autosave.
//!
//! # Responsibility
//! - Coalesce a burst of edits to one note into a single repository write.
//! - Let explicit save and delete preempt any pending debounced write.
//!
//! # Invariants
//! - Every arm, save, delete and detach moves the lane to a fresh generation
//!   drawn from one scheduler-wide counter; a timer writes only while its
//!   captured generation is still current.
//! - Fired writes, saves and deletes for one id are serialized by that id's
//!   ordering lock. A delete marks the lane terminal before waiting on it, so
//!   no write queued behind the delete can resurrect the note.
//! - A detached lane's ordering lock is handed to the next `attach` of the
//!   same id while old work still holds it.
//! - Deleted ids keep only an id-sized tombstone.
//! - The lane map lock is never held across an `.await` or repository call.
//! - Background write failures are logged and broadcast, never returned to
//!   the `notify_edit` caller.

use crate::autosave::draft::NoteDraft;
use crate::config::{AutosaveConfig, ConfigError};
use crate::model::note::{Note, NoteId};
use crate::repo::note_repo::{NoteRepository, RepoError};
use crate::service::note_service::{on_blocking_pool, NoteService};
use log::{debug, error, info, log, Level};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER_SIZE: usize = 64;

pub type AutosaveResult<T> = Result<T, AutosaveError>;

#[derive(Debug)]
pub enum AutosaveError {
    /// No draft is attached for this id.
    NotTracked(NoteId),
    /// A draft for this id is already attached.
    AlreadyTracked(NoteId),
    /// The note was deleted; the id is terminal for this scheduler.
    Deleted(NoteId),
    Repo(RepoError),
    /// Blocking worker running the repository call did not complete.
    Worker(String),
}

impl Display for AutosaveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotTracked(id) => write!(f, "note is not attached to autosave: {id}"),
            Self::AlreadyTracked(id) => write!(f, "note is already attached to autosave: {id}"),
            Self::Deleted(id) => write!(f, "note was deleted: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Worker(message) => write!(f, "autosave worker failed: {message}"),
        }
    }
}

impl Error for AutosaveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AutosaveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// What caused a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTrigger {
    /// Debounce timer elapsed without being superseded.
    Debounce,
    /// Explicit `save` or `flush_all`.
    Explicit,
}

impl WriteTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debounce => "debounce",
            Self::Explicit => "explicit",
        }
    }
}

/// Observability events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    Written {
        id: NoteId,
        trigger: WriteTrigger,
        updated_at: i64,
    },
    Failed {
        id: NoteId,
        trigger: WriteTrigger,
        message: String,
    },
    Deleted {
        id: NoteId,
    },
}

/// Externally visible lane state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    Idle,
    PendingTimer,
    Writing,
    Deleted,
}

/// Outcome of `flush_all`.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub saved: usize,
    pub failed: Vec<(NoteId, AutosaveError)>,
}

type OrderLock = Arc<tokio::sync::Mutex<()>>;

struct Lane {
    draft: NoteDraft,
    generation: u64,
    pending: Option<CancellationToken>,
    writing: bool,
    deleted: bool,
    order: OrderLock,
}

impl Lane {
    fn new(draft: NoteDraft, generation: u64, order: OrderLock) -> Self {
        Self {
            draft,
            generation,
            pending: None,
            writing: false,
            deleted: false,
            order,
        }
    }

    /// Invalidates the armed timer, if any.
    fn supersede(&mut self, generation: u64) {
        self.generation = generation;
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    fn state(&self) -> LaneState {
        if self.deleted {
            LaneState::Deleted
        } else if self.writing {
            LaneState::Writing
        } else if self.pending.is_some() {
            LaneState::PendingTimer
        } else {
            LaneState::Idle
        }
    }
}

#[derive(Default)]
struct LaneTable {
    lanes: HashMap<NoteId, Lane>,
    /// Ordering locks of detached lanes still held by in-flight work.
    retired: HashMap<NoteId, OrderLock>,
    deleted: HashSet<NoteId>,
}

impl LaneTable {
    fn is_deleted(&self, id: NoteId) -> bool {
        self.deleted.contains(&id) || self.lanes.get(&id).is_some_and(|lane| lane.deleted)
    }

    /// Returns the live lane for `id`.
    fn live_mut(&mut self, id: NoteId) -> AutosaveResult<&mut Lane> {
        if self.deleted.contains(&id) {
            return Err(AutosaveError::Deleted(id));
        }
        match self.lanes.get_mut(&id) {
            Some(lane) if lane.deleted => Err(AutosaveError::Deleted(id)),
            Some(lane) => Ok(lane),
            None => Err(AutosaveError::NotTracked(id)),
        }
    }

    fn lane_error(&self, id: NoteId) -> AutosaveError {
        if self.is_deleted(id) {
            AutosaveError::Deleted(id)
        } else {
            AutosaveError::NotTracked(id)
        }
    }
}

struct Inner<R: NoteRepository + 'static> {
    service: Arc<NoteService<R>>,
    debounce: Duration,
    runtime: Handle,
    generations: AtomicU64,
    table: Mutex<LaneTable>,
    events: broadcast::Sender<AutosaveEvent>,
}

/// Debounced autosave scheduler shared by all editing sessions.
///
/// Cheap to clone; clones share state.
pub struct AutosaveScheduler<R: NoteRepository + 'static> {
    inner: Arc<Inner<R>>,
}

impl<R: NoteRepository + 'static> Clone for AutosaveScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: NoteRepository + 'static> AutosaveScheduler<R> {
    /// Creates a scheduler whose timers run on `runtime`.
    ///
    /// # Errors
    /// - `ConfigError::ZeroDebounce` when `config` would never coalesce edits.
    pub fn new(
        service: Arc<NoteService<R>>,
        config: &AutosaveConfig,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Ok(Self {
            inner: Arc::new(Inner {
                service,
                debounce: config.debounce(),
                runtime,
                generations: AtomicU64::new(0),
                table: Mutex::new(LaneTable::default()),
                events,
            }),
        })
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Receives write, failure and delete events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AutosaveEvent> {
        self.inner.events.subscribe()
    }

    /// Registers an editing session's working copy.
    pub fn attach(&self, note: Note) -> AutosaveResult<NoteDraft> {
        let id = note.id();
        let generation = self.inner.next_generation();
        let mut table = self.inner.table();
        if table.is_deleted(id) {
            return Err(AutosaveError::Deleted(id));
        }
        if table.lanes.contains_key(&id) {
            return Err(AutosaveError::AlreadyTracked(id));
        }
        let order = table.retired.remove(&id).unwrap_or_default();
        let draft = NoteDraft::new(note);
        table
            .lanes
            .insert(id, Lane::new(draft.clone(), generation, order));
        Ok(draft)
    }

    /// Returns the attached draft for `id`.
    pub fn draft(&self, id: NoteId) -> Option<NoteDraft> {
        self.inner
            .table()
            .lanes
            .get(&id)
            .filter(|lane| !lane.deleted)
            .map(|lane| lane.draft.clone())
    }

    pub fn state(&self, id: NoteId) -> Option<LaneState> {
        let table = self.inner.table();
        if table.deleted.contains(&id) {
            return Some(LaneState::Deleted);
        }
        table.lanes.get(&id).map(Lane::state)
    }

    /// Re-arms the debounce timer for `id` after an in-memory edit.
    ///
    /// Never performs I/O.
    pub fn notify_edit(&self, id: NoteId) -> AutosaveResult<()> {
        let generation = self.inner.next_generation();
        let token = {
            let mut table = self.inner.table();
            let lane = table.live_mut(id)?;
            lane.supersede(generation);
            let token = CancellationToken::new();
            lane.pending = Some(token.clone());
            token
        };

        debug!("event=autosave_arm module=autosave status=ok note_id={id} generation={generation}");
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.fire_after_delay(id, generation, token).await });
        Ok(())
    }

    /// Applies `edit` to the attached draft and re-arms its timer.
    pub fn edit<T>(&self, id: NoteId, edit: impl FnOnce(&mut Note) -> T) -> AutosaveResult<T> {
        let draft = self.inner.table().live_mut(id)?.draft.clone();
        let output = draft.edit(edit);
        self.notify_edit(id)?;
        Ok(output)
    }

    /// Cancels any pending timer and writes the current draft now.
    ///
    /// # Errors
    /// - Repository failures are returned so the caller can inform the user.
    pub async fn save(&self, id: NoteId) -> AutosaveResult<Note> {
        let generation = self.inner.next_generation();
        let order = {
            let mut table = self.inner.table();
            let lane = table.live_mut(id)?;
            lane.supersede(generation);
            Arc::clone(&lane.order)
        };

        let _turn = order.lock().await;
        let draft = self
            .inner
            .begin_write(id, None, &order)
            .ok_or_else(|| self.inner.table().lane_error(id))?;
        self.inner.write(id, draft, WriteTrigger::Explicit).await
    }

    /// Cancels any pending timer, makes `id` terminal and deletes it.
    ///
    /// A write that is already executing finishes first; the delete then
    /// commits after it. Deleting an id that was never attached forwards the
    /// delete to the repository directly.
    pub async fn delete(&self, id: NoteId) -> AutosaveResult<()> {
        let generation = self.inner.next_generation();
        let (order, tracked) = {
            let mut guard = self.inner.table();
            let table = &mut *guard;
            match table.lanes.get_mut(&id) {
                Some(lane) => {
                    lane.supersede(generation);
                    lane.deleted = true;
                    (Some(Arc::clone(&lane.order)), true)
                }
                // Work from a detached lane may still be writing this id.
                None => (table.retired.get(&id).cloned(), false),
            }
        };

        let _turn = match order.as_ref() {
            Some(order) => Some(order.lock().await),
            None => None,
        };

        let started_at = Instant::now();
        let result = on_blocking_pool(&self.inner.service, move |service| {
            service.delete_note(id)
        })
        .await
        .map_err(|err| AutosaveError::Worker(err.to_string()))
        .and_then(|result| result.map_err(AutosaveError::from));

        if tracked {
            self.inner.retire_deleted(id);
        }

        match &result {
            Ok(()) => {
                info!(
                    "event=autosave_delete module=autosave status=ok note_id={id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                let _ = self.inner.events.send(AutosaveEvent::Deleted { id });
            }
            Err(err) => error!(
                "event=autosave_delete module=autosave status=error note_id={id} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    /// Cancels pending work and forgets the draft without writing.
    ///
    /// Deleted ids keep their terminal marker and return `None`. A write
    /// already executing for the lane still completes, and a later `attach`
    /// of the same id queues behind it.
    pub fn detach(&self, id: NoteId) -> Option<NoteDraft> {
        let generation = self.inner.next_generation();
        let mut table = self.inner.table();
        let lane = table.lanes.get_mut(&id)?;
        lane.supersede(generation);
        if lane.deleted {
            return None;
        }
        let lane = table.lanes.remove(&id)?;
        table
            .retired
            .retain(|_, order| Arc::strong_count(order) > 1);
        // Timers or writes of this lane still hold the lock.
        if Arc::strong_count(&lane.order) > 1 {
            table.retired.insert(id, lane.order);
        }
        Some(lane.draft)
    }

    /// Saves every note with a pending timer, e.g. before shutdown.
    pub async fn flush_all(&self) -> FlushReport {
        let pending: Vec<NoteId> = self
            .inner
            .table()
            .lanes
            .iter()
            .filter(|(_, lane)| lane.pending.is_some() && !lane.deleted)
            .map(|(id, _)| *id)
            .collect();

        let mut report = FlushReport::default();
        for id in pending {
            match self.save(id).await {
                Ok(_) => report.saved += 1,
                Err(AutosaveError::Deleted(_)) | Err(AutosaveError::NotTracked(_)) => {}
                Err(err) => report.failed.push((id, err)),
            }
        }
        report
    }
}

impl<R: NoteRepository + 'static> Inner<R> {
    // Lane bookkeeping stays consistent under every early return, so a
    // poisoned lock is still safe to use.
    fn table(&self) -> MutexGuard<'_, LaneTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Replaces a deleted lane with its tombstone.
    fn retire_deleted(&self, id: NoteId) {
        let mut table = self.table();
        if table.lanes.get(&id).is_some_and(|lane| lane.deleted) {
            table.lanes.remove(&id);
        }
        table.deleted.insert(id);
    }

    async fn fire_after_delay(&self, id: NoteId, generation: u64, token: CancellationToken) {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("event=autosave_cancel module=autosave status=ok note_id={id} generation={generation}");
                return;
            }
            _ = tokio::time::sleep(self.debounce) => {}
        }

        let Some(order) = self.current_order(id, generation) else {
            return;
        };
        let _turn = order.lock().await;
        let Some(draft) = self.begin_write(id, Some(generation), &order) else {
            debug!("event=autosave_cancel module=autosave status=ok note_id={id} generation={generation} reason=superseded");
            return;
        };

        // Failures are reported through the log and the event channel only.
        let _ = self.write(id, draft, WriteTrigger::Debounce).await;
    }

    fn current_order(&self, id: NoteId, generation: u64) -> Option<OrderLock> {
        let table = self.table();
        let lane = table.lanes.get(&id)?;
        (lane.generation == generation && !lane.deleted).then(|| Arc::clone(&lane.order))
    }

    /// Marks the lane as writing when it may still write.
    ///
    /// Must be called while holding `order`, which must be the current
    /// lane's lock. `expected` is the timer generation; explicit saves pass
    /// `None`.
    fn begin_write(&self, id: NoteId, expected: Option<u64>, order: &OrderLock) -> Option<NoteDraft> {
        let mut table = self.table();
        let lane = table.lanes.get_mut(&id)?;
        if lane.deleted || !Arc::ptr_eq(&lane.order, order) {
            return None;
        }
        if let Some(generation) = expected {
            if lane.generation != generation {
                return None;
            }
            lane.pending = None;
        }
        lane.writing = true;
        Some(lane.draft.clone())
    }

    fn end_write(&self, id: NoteId) {
        if let Some(lane) = self.table().lanes.get_mut(&id) {
            lane.writing = false;
        }
    }

    async fn write(
        &self,
        id: NoteId,
        draft: NoteDraft,
        trigger: WriteTrigger,
    ) -> AutosaveResult<Note> {
        let started_at = Instant::now();
        let snapshot = draft.snapshot();
        let result = on_blocking_pool(&self.service, move |service| service.save_note(&snapshot))
            .await
            .map_err(|err| AutosaveError::Worker(err.to_string()))
            .and_then(|result| result.map_err(AutosaveError::from));
        self.end_write(id);

        match &result {
            Ok(persisted) => {
                draft.record_persisted(persisted.updated_at());
                info!(
                    "event=autosave_write module=autosave status=ok note_id={id} trigger={} duration_ms={} items={}",
                    trigger.as_str(),
                    started_at.elapsed().as_millis(),
                    persisted.items.len()
                );
                let _ = self.events.send(AutosaveEvent::Written {
                    id,
                    trigger,
                    updated_at: persisted.updated_at(),
                });
            }
            Err(err) => {
                // Explicit callers receive the error themselves.
                let level = match trigger {
                    WriteTrigger::Debounce => Level::Error,
                    WriteTrigger::Explicit => Level::Warn,
                };
                log!(
                    level,
                    "event=autosave_write module=autosave status=error note_id={id} trigger={} duration_ms={} error={err}",
                    trigger.as_str(),
                    started_at.elapsed().as_millis()
                );
                let _ = self.events.send(AutosaveEvent::Failed {
                    id,
                    trigger,
                    message: err.to_string(),
                });
            }
        }
        result
    }
}
