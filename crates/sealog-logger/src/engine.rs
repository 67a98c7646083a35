//! The single-writer audit engine.
//!
//! Any number of producers submit drafts concurrently; a bounded intake
//! queue feeds exactly one worker thread that assigns serials, signs,
//! commits and advances the chain tail. All engine state mutation happens
//! on that worker under one lock, so serial order, commit order and queue
//! arrival order are the same order.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use sealog_core::{Attribute, Certification, ErrorEvent, Event, Level};
use sealog_crypto::{ChainSigner, CryptoError, PublicKey};
use sealog_storage::EventStore;

use crate::chain::verify_chain;
use crate::error::LoggerError;

/// Capacity of the intake queue between producers and the worker.
const INTAKE_CAPACITY: usize = 16;

/// The actor name the engine uses for its own trail events.
const ENGINE_ACTOR: &str = "auditlog";

/// A human-readable output stream for committed events.
pub type Sink = Box<dyn Write + Send>;

/// Construction options for [`AuditLogger`].
///
/// The sinks receive one formatted line per committed event: DEBUG and
/// INFO events go to the informational sink, everything else to the error
/// sink, which also receives failure lines. Both default to `None`
/// (silent).
#[derive(Default)]
pub struct LoggerOptions {
    /// Sink for DEBUG and INFO event lines.
    pub info_sink: Option<Sink>,
    /// Sink for WARNING, ERROR and CRITICAL event lines and engine
    /// failures.
    pub error_sink: Option<Sink>,
}

impl LoggerOptions {
    /// Route the informational stream to stdout and the error stream to
    /// stderr.
    #[must_use]
    pub fn with_standard_sinks() -> Self {
        Self {
            info_sink: Some(Box::new(std::io::stdout())),
            error_sink: Some(Box::new(std::io::stderr())),
        }
    }
}

impl std::fmt::Debug for LoggerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerOptions")
            .field("info_sink", &self.info_sink.is_some())
            .field("error_sink", &self.error_sink.is_some())
            .finish()
    }
}

/// A draft travelling from a producer to the worker.
struct Submission {
    event: Event,
    done: Option<oneshot::Sender<()>>,
}

/// Engine state owned by the worker (and briefly by readers).
struct Shared {
    /// Dropped on shutdown or on a fatal store failure; `None` means the
    /// engine can no longer commit.
    store: Option<Box<dyn EventStore>>,
    /// Signature of the most recently committed event; input binding for
    /// the next event's digest. Advanced only after the commit succeeds.
    tail: Vec<u8>,
    /// The next serial to reserve.
    counter: u64,
    info_sink: Option<Sink>,
    error_sink: Option<Sink>,
}

/// The append-only, tamper-evident audit logger.
///
/// Construction re-verifies the entire stored chain; [`start`] must be
/// called before events are accepted. Submission methods are cheap to call
/// from any task; the asynchronous forms return once the draft is queued,
/// the `_sync` forms once the event is durably committed (or recorded as
/// an error event).
///
/// [`start`]: Self::start
pub struct AuditLogger {
    signer: Arc<dyn ChainSigner>,
    shared: Arc<Mutex<Shared>>,
    intake: RwLock<Option<mpsc::Sender<Submission>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl AuditLogger {
    /// Construct an engine over an existing store.
    ///
    /// Loads the event count, re-verifies the whole chain and recovers the
    /// tail signature. The signing key must be the one whose public half
    /// verifies the stored chain.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::BrokenChain`] naming the offending serial if
    /// any stored event fails verification, or a store error.
    pub fn open(
        store: Box<dyn EventStore>,
        signer: Arc<dyn ChainSigner>,
        options: LoggerOptions,
    ) -> Result<Self, LoggerError> {
        let counter = store.count()?;
        let tail = verify_chain(store.as_ref(), &signer.public_key())?;
        debug!(events = counter, "audit chain verified");

        Ok(Self {
            signer,
            shared: Arc::new(Mutex::new(Shared {
                store: Some(store),
                tail,
                counter,
                info_sink: options.info_sink,
                error_sink: options.error_sink,
            })),
            intake: RwLock::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Start the worker. Must be called before events are accepted;
    /// calling it on a running engine is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Worker`] if the worker thread cannot be
    /// spawned.
    pub fn start(&self) -> Result<(), LoggerError> {
        let mut intake = write_lock(&self.intake);
        if intake.as_ref().is_some_and(|sender| !sender.is_closed()) {
            return Ok(());
        }

        let (sender, receiver) = mpsc::channel(INTAKE_CAPACITY);
        let shared = Arc::clone(&self.shared);
        let signer = Arc::clone(&self.signer);
        let handle = thread::Builder::new()
            .name("sealog-worker".into())
            .spawn(move || worker_loop(receiver, &shared, signer.as_ref()))
            .map_err(|e| LoggerError::Worker(e.to_string()))?;

        *intake = Some(sender);
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    /// Stop the engine: close the intake queue, wait for the worker to
    /// drain it and exit, then release the store handle. Submissions
    /// issued after this are silent no-ops.
    pub async fn stop(&self) {
        // Dropping the stored sender closes the queue once in-flight
        // producer clones are gone; the worker drains what is buffered.
        drop(write_lock(&self.intake).take());

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        lock(&self.shared).store = None;
    }

    /// Record a debug event. Intended only for debugging the audit logger
    /// itself. Returns once the draft is queued.
    pub async fn debug(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit(Level::Debug, actor, event, attributes, None)
            .await;
    }

    /// Record an informational event. Returns once the draft is queued.
    pub async fn info(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit(Level::Info, actor, event, attributes, None)
            .await;
    }

    /// Record a warning event. Returns once the draft is queued.
    pub async fn warning(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit(Level::Warning, actor, event, attributes, None)
            .await;
    }

    /// Record an error event. Returns once the draft is queued.
    pub async fn error(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit(Level::Error, actor, event, attributes, None)
            .await;
    }

    /// Record an informational event and wait until it is committed or
    /// recorded as an error event.
    pub async fn info_sync(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit_sync(Level::Info, actor, event, attributes).await;
    }

    /// Record a warning event and wait until it is committed or recorded
    /// as an error event.
    pub async fn warning_sync(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit_sync(Level::Warning, actor, event, attributes)
            .await;
    }

    /// Record an error event and wait until it is committed or recorded as
    /// an error event.
    pub async fn error_sync(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit_sync(Level::Error, actor, event, attributes)
            .await;
    }

    /// Record a critical event and wait until it is committed or recorded
    /// as an error event. Critical events almost always precede a
    /// shutdown, so only a synchronous form exists.
    pub async fn critical_sync(&self, actor: &str, event: &str, attributes: Vec<Attribute>) {
        self.submit_sync(Level::Critical, actor, event, attributes)
            .await;
    }

    /// Number of committed events. Reports 0 once the engine has been
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn count(&self) -> Result<u64, LoggerError> {
        let guard = lock(&self.shared);
        match guard.store.as_ref() {
            Some(store) => Ok(store.count()?),
            None => Ok(0),
        }
    }

    /// The public half of the signing key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    /// The signature of the most recently committed event (empty when the
    /// chain is empty).
    #[must_use]
    pub fn tail_signature(&self) -> Vec<u8> {
        lock(&self.shared).tail.clone()
    }

    /// Build a certification for the inclusive serial range
    /// `[start, end]`, returned as a JSON document.
    ///
    /// An `end` of 0 normalises to the current tail serial. The
    /// certification itself is recorded as a synchronous `certify` trail
    /// event before the range is read; the recorded event falls outside
    /// the certified range.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::NotRunning`] after the engine has stopped,
    /// or a store/encoding error.
    pub async fn certify(&self, start: u64, end: u64) -> Result<Vec<u8>, LoggerError> {
        // Normalise against the chain as it stood before the trail event
        // below advances it. On an empty chain there is nothing to certify
        // and the exported range stays empty.
        let committed = lock(&self.shared).counter;
        let end = if end == 0 { committed.saturating_sub(1) } else { end };
        let empty = committed == 0 && end == 0;

        let attributes = vec![
            Attribute::new("start", start.to_string()),
            Attribute::new("end", end.to_string()),
        ];
        self.info_sync(ENGINE_ACTOR, "certify", attributes).await;

        let certification = {
            let guard = lock(&self.shared);
            let store = guard.store.as_ref().ok_or(LoggerError::NotRunning)?;
            Certification {
                when: now_nanos(),
                chain: if empty {
                    Vec::new()
                } else {
                    store.load_range(start, end)?
                },
                errors: if empty {
                    Vec::new()
                } else {
                    store.load_errors_in_range(start, end)?
                },
                public: self.signer.public_key().to_spki_der()?,
            }
        };

        Ok(serde_json::to_vec(&certification)?)
    }

    async fn submit(
        &self,
        level: Level,
        actor: &str,
        event: &str,
        attributes: Vec<Attribute>,
        done: Option<oneshot::Sender<()>>,
    ) {
        let sender = read_lock(&self.intake).clone();
        let Some(sender) = sender else {
            release(done);
            return;
        };

        let submission = Submission {
            event: Event::draft(now_nanos(), level, actor, event, attributes),
            done,
        };
        if let Err(mpsc::error::SendError(rejected)) = sender.send(submission).await {
            // The worker is gone (fatal store failure or shutdown race).
            release(rejected.done);
        }
    }

    async fn submit_sync(&self, level: Level, actor: &str, event: &str, attributes: Vec<Attribute>) {
        let (done, released) = oneshot::channel();
        self.submit(level, actor, event, attributes, Some(done))
            .await;
        // A dropped sender also counts as released: the worker terminated
        // without committing, and nothing further will happen to the draft.
        let _ = released.await;
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("key_id", &self.signer.public_key().key_id_hex())
            .finish_non_exhaustive()
    }
}

/// Drain the intake queue, processing each draft in arrival order. Exits
/// when the queue closes or a fatal store failure occurs.
fn worker_loop(
    mut intake: mpsc::Receiver<Submission>,
    shared: &Mutex<Shared>,
    signer: &dyn ChainSigner,
) {
    while let Some(submission) = intake.blocking_recv() {
        if !process(shared, signer, submission) {
            error!("audit worker terminating after store failure");
            break;
        }
    }

    // Release any waiters still queued behind a fatal failure.
    intake.close();
    while let Ok(submission) = intake.try_recv() {
        release(submission.done);
    }
}

/// Serialise one draft: stamp, reserve a serial, sign against the tail,
/// commit, publish. Returns `false` when the engine must terminate.
fn process(shared: &Mutex<Shared>, signer: &dyn ChainSigner, submission: Submission) -> bool {
    let Submission { mut event, done } = submission;
    let mut guard = lock(shared);
    let state = &mut *guard;

    // stop() may have won the race after this draft was queued.
    let Some(mut store) = state.store.take() else {
        drop(guard);
        release(done);
        return true;
    };

    event.received = now_nanos();
    event.serial = state.counter;
    state.counter += 1;

    // Thread the previous signature through the signature field so the
    // digest binds this event to the chain tail.
    event.signature = state.tail.clone();
    let digest = event.digest();
    let signed = signer.sign_digest(&digest);
    event.signature.clear();

    let keep_running = match signed {
        Ok(signature) => {
            event.signature = signature;
            match store.insert(&event) {
                Ok(()) => {
                    state.tail = event.signature.clone();
                    state.store = Some(store);
                    let sink = if event.level.is_routine() {
                        state.info_sink.as_mut()
                    } else {
                        state.error_sink.as_mut()
                    };
                    if let Some(sink) = sink {
                        let _ = writeln!(sink, "{event}");
                    }
                    true
                },
                Err(err) => {
                    // The commit outcome is unknown; the chain must not
                    // advance past it. Dropping the store closes it.
                    error!(serial = event.serial, "event insert failed: {err}");
                    if let Some(sink) = state.error_sink.as_mut() {
                        let _ = writeln!(sink, "audit store failure: {err}");
                    }
                    false
                },
            }
        },
        Err(err) => {
            let stage = match &err {
                CryptoError::SignatureEncoding(_) => "marshal signature",
                _ => "signature",
            };
            let error_event = ErrorEvent {
                when: now_nanos(),
                message: format!("{stage}: {err}"),
                event,
            };
            match store.insert_error(&error_event) {
                Ok(()) => {
                    // Release the reserved serial for the next draft.
                    state.counter -= 1;
                    state.store = Some(store);
                    if let Some(sink) = state.error_sink.as_mut() {
                        let _ = writeln!(sink, "logger failure: {}", error_event.message);
                    }
                    true
                },
                Err(store_err) => {
                    error!("error event insert failed: {store_err}");
                    if let Some(sink) = state.error_sink.as_mut() {
                        let _ = writeln!(sink, "audit store failure: {store_err}");
                    }
                    false
                },
            }
        },
    };

    drop(guard);
    release(done);
    keep_running
}

fn release(done: Option<oneshot::Sender<()>>) {
    if let Some(done) = done {
        let _ = done.send(());
    }
}

/// Nanoseconds since the Unix epoch (saturating far past 2200).
fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(rwlock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(PoisonError::into_inner)
}
