#![allow(dead_code)]

use async_trait::async_trait;
use notekeep_core::{
    AutosaveEvent, Note, NoteId, NoteRepository, RepoError, RepoResult, SyncBridge, SyncError,
    SyncResult, SyncStage,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Repository wrapper that records writes and can slow down or fail them.
pub struct RecordingRepository<R: NoteRepository> {
    inner: R,
    writes: Mutex<Vec<Note>>,
    write_delay: Duration,
    fail_writes: AtomicBool,
    writes_started: AtomicUsize,
}

impl<R: NoteRepository> RecordingRepository<R> {
    pub fn new(inner: R) -> Self {
        Self::with_write_delay(inner, Duration::ZERO)
    }

    pub fn with_write_delay(inner: R, write_delay: Duration) -> Self {
        Self {
            inner,
            writes: Mutex::new(Vec::new()),
            write_delay,
            fail_writes: AtomicBool::new(false),
            writes_started: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Notes passed to successful `add`/`update` calls, in call order.
    pub fn writes(&self) -> Vec<Note> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }

    fn before_write(&self) -> RepoResult<()> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::InvalidData("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl<R: NoteRepository> NoteRepository for RecordingRepository<R> {
    fn list(&self) -> RepoResult<Vec<Note>> {
        self.inner.list()
    }

    fn get(&self, id: NoteId) -> RepoResult<Option<Note>> {
        self.inner.get(id)
    }

    fn add(&self, note: &Note) -> RepoResult<Note> {
        self.before_write()?;
        let persisted = self.inner.add(note)?;
        self.writes.lock().unwrap().push(note.clone());
        Ok(persisted)
    }

    fn update(&self, note: &Note) -> RepoResult<Note> {
        self.before_write()?;
        let persisted = self.inner.update(note)?;
        self.writes.lock().unwrap().push(note.clone());
        Ok(persisted)
    }

    fn delete(&self, id: NoteId) -> RepoResult<()> {
        self.inner.delete(id)
    }

    fn import(&self, note: &Note) -> RepoResult<bool> {
        self.inner.import(note)
    }
}

/// Remote party held in memory.
#[derive(Default)]
pub struct FakeBridge {
    remote: Mutex<Vec<Note>>,
    pushed: Mutex<Option<Vec<Note>>>,
    pull_delay: Duration,
    push_delay: Duration,
    fail_pull: AtomicBool,
    fail_push: AtomicBool,
}

impl FakeBridge {
    pub fn with_remote(remote: Vec<Note>) -> Self {
        Self {
            remote: Mutex::new(remote),
            ..Self::default()
        }
    }

    pub fn with_pull_delay(pull_delay: Duration) -> Self {
        Self {
            pull_delay,
            ..Self::default()
        }
    }

    pub fn with_push_delay(push_delay: Duration) -> Self {
        Self {
            push_delay,
            ..Self::default()
        }
    }

    pub fn set_fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn pushed(&self) -> Option<Vec<Note>> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncBridge for FakeBridge {
    fn bridge_id(&self) -> &str {
        "fake"
    }

    async fn pull(&self) -> SyncResult<Vec<Note>> {
        if !self.pull_delay.is_zero() {
            tokio::time::sleep(self.pull_delay).await;
        }
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(SyncError::unavailable(SyncStage::Pull, "remote offline"));
        }
        Ok(self.remote.lock().unwrap().clone())
    }

    async fn push(&self, notes: &[Note]) -> SyncResult<()> {
        if !self.push_delay.is_zero() {
            tokio::time::sleep(self.push_delay).await;
        }
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(SyncError::unavailable(SyncStage::Push, "remote rejected push"));
        }
        *self.pushed.lock().unwrap() = Some(notes.to_vec());
        *self.remote.lock().unwrap() = notes.to_vec();
        Ok(())
    }
}

/// Waits for the next autosave event, failing the test after two seconds.
pub async fn next_event(events: &mut broadcast::Receiver<AutosaveEvent>) -> AutosaveEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("autosave event should arrive in time")
        .expect("autosave channel should stay open")
}

/// Polls `condition` every 5 ms for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within two seconds");
}
