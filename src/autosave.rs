use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::draft::{self, SaveOutcome};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing knobs for one worker. Injected at spawn so the setup sections (and
/// tests, with millisecond windows) control the real intervals.
#[derive(Debug, Clone, Copy)]
pub struct AutosaveTuning {
    pub debounce_ms: u64,
    pub expiry_ms: i64,
    pub safety_tick_ms: u64,
}

impl Default for AutosaveTuning {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            expiry_ms: draft::DEFAULT_EXPIRY_MS,
            safety_tick_ms: 60_000,
        }
    }
}

/// Snapshot of worker state for `wizard.status`. Updated only by the worker;
/// readers take a clone.
#[derive(Debug, Clone, Default)]
pub struct AutosaveStatus {
    pub pending_save: bool,
    pub last_saved_at: Option<String>,
    pub last_saved_at_ms: Option<i64>,
    pub last_error: Option<String>,
    pub armed: bool,
    pub expired_count: u64,
}

enum Command {
    ScheduleSave {
        fields: Map<String, Value>,
        step: String,
    },
    SaveNow {
        fields: Map<String, Value>,
        step: String,
        reply: Sender<SaveOutcome>,
    },
    Load {
        reply: Sender<anyhow::Result<Option<Map<String, Value>>>>,
    },
    Clear {
        reply: Sender<anyhow::Result<bool>>,
    },
    CancelPending,
}

/// Owning handle for the autosave worker. All draft-slot writes go through the
/// worker's queue so the slot has exactly one writer. Dropping the handle ends
/// the worker; `shutdown` additionally waits for its connection to close.
pub struct AutosaveHandle {
    tx: Sender<Command>,
    status: Arc<Mutex<AutosaveStatus>>,
    tuning: AutosaveTuning,
    join: JoinHandle<()>,
}

impl AutosaveHandle {
    pub fn schedule_save(&self, fields: Map<String, Value>, step: &str) -> bool {
        self.tx
            .send(Command::ScheduleSave {
                fields,
                step: step.to_string(),
            })
            .is_ok()
    }

    /// Synchronous save, bypassing the debounce window. `None` means the worker
    /// is gone or took too long.
    pub fn save_now(&self, fields: Map<String, Value>, step: &str) -> Option<SaveOutcome> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(Command::SaveNow {
                fields,
                step: step.to_string(),
                reply,
            })
            .ok()?;
        rx.recv_timeout(REPLY_TIMEOUT).ok()
    }

    pub fn load(&self) -> Option<anyhow::Result<Option<Map<String, Value>>>> {
        let (reply, rx) = mpsc::channel();
        self.tx.send(Command::Load { reply }).ok()?;
        rx.recv_timeout(REPLY_TIMEOUT).ok()
    }

    pub fn clear(&self) -> Option<anyhow::Result<bool>> {
        let (reply, rx) = mpsc::channel();
        self.tx.send(Command::Clear { reply }).ok()?;
        rx.recv_timeout(REPLY_TIMEOUT).ok()
    }

    pub fn cancel_pending(&self) {
        let _ = self.tx.send(Command::CancelPending);
    }

    pub fn status(&self) -> AutosaveStatus {
        lock_status(&self.status).clone()
    }

    pub fn tuning(&self) -> AutosaveTuning {
        self.tuning
    }

    /// Stops the worker and waits until its database connection is closed. Used
    /// before the workspace database file is replaced.
    pub fn shutdown(self) {
        let AutosaveHandle { tx, join, .. } = self;
        drop(tx);
        let _ = join.join();
    }
}

/// Opens a dedicated connection and starts the worker. If a draft record is
/// already persisted, the expiry timer re-arms from its saved timestamp, so a
/// restart never leaves a stale draft without a deadline.
pub fn spawn(workspace: &Path, tuning: AutosaveTuning) -> anyhow::Result<AutosaveHandle> {
    let conn = crate::db::open_db(workspace)?;
    let status = Arc::new(Mutex::new(AutosaveStatus::default()));
    let (tx, rx) = mpsc::channel();

    let worker_status = Arc::clone(&status);
    let join = thread::spawn(move || {
        let mut worker = AutosaveWorker {
            conn,
            tuning,
            status: worker_status,
            rx,
            pending: None,
            armed_saved_at_ms: None,
        };
        worker.rearm_from_db();
        worker.run();
    });

    Ok(AutosaveHandle {
        tx,
        status,
        tuning,
        join,
    })
}

struct PendingSave {
    fields: Map<String, Value>,
    step: String,
    due: Instant,
}

struct AutosaveWorker {
    conn: Connection,
    tuning: AutosaveTuning,
    status: Arc<Mutex<AutosaveStatus>>,
    rx: Receiver<Command>,
    pending: Option<PendingSave>,
    armed_saved_at_ms: Option<i64>,
}

impl AutosaveWorker {
    fn run(&mut self) {
        loop {
            let received = match self.next_wake() {
                Some(timeout) => match self.rx.recv_timeout(timeout) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.rx.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => break,
                },
            };

            if let Some(cmd) = received {
                self.handle_command(cmd);
            }
            self.flush_if_due();
            self.expire_if_due();
        }
        debug!("autosave worker stopped");
    }

    /// Sleep until the earliest of: pending flush, expiry deadline, safety
    /// tick. The tick bounds every sleep while armed so wall-clock expiry is
    /// re-checked even if the process slept through the deadline.
    fn next_wake(&self) -> Option<Duration> {
        let mut wake: Option<Duration> = None;
        if let Some(pending) = &self.pending {
            wake = Some(pending.due.saturating_duration_since(Instant::now()));
        }
        if let Some(saved_at_ms) = self.armed_saved_at_ms {
            let deadline = saved_at_ms + self.tuning.expiry_ms;
            let remaining_ms = (deadline - draft::now_ms()).max(0) as u64;
            let next = Duration::from_millis(remaining_ms.min(self.tuning.safety_tick_ms));
            wake = Some(match wake {
                Some(current) => current.min(next),
                None => next,
            });
        }
        wake
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::ScheduleSave { fields, step } => {
                self.pending = Some(PendingSave {
                    fields,
                    step,
                    due: Instant::now() + Duration::from_millis(self.tuning.debounce_ms),
                });
                lock_status(&self.status).pending_save = true;
            }
            Command::SaveNow { fields, step, reply } => {
                self.pending = None;
                let outcome = self.persist(&fields, &step);
                let _ = reply.send(outcome);
            }
            Command::Load { reply } => {
                match draft::expire_if_stale(&self.conn, self.tuning.expiry_ms) {
                    Ok(true) => {
                        info!("stale draft removed on load");
                        lock_status(&self.status).expired_count += 1;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "expiry check failed on load"),
                }
                let result = draft::load_draft(&self.conn, self.tuning.expiry_ms);
                self.rearm_from_db();
                let _ = reply.send(result);
            }
            Command::Clear { reply } => {
                self.pending = None;
                let result = draft::clear_draft(&self.conn);
                self.armed_saved_at_ms = None;
                {
                    let mut st = lock_status(&self.status);
                    st.pending_save = false;
                    st.armed = false;
                    st.last_saved_at = None;
                    st.last_saved_at_ms = None;
                }
                let _ = reply.send(result);
            }
            Command::CancelPending => {
                self.pending = None;
                lock_status(&self.status).pending_save = false;
            }
        }
    }

    fn flush_if_due(&mut self) {
        let due = self
            .pending
            .as_ref()
            .map(|p| p.due <= Instant::now())
            .unwrap_or(false);
        if !due {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        let outcome = self.persist(&pending.fields, &pending.step);
        if let SaveOutcome::Saved { .. } = outcome {
            debug!(step = %pending.step, "debounced draft flushed");
        }
    }

    fn persist(&mut self, fields: &Map<String, Value>, step: &str) -> SaveOutcome {
        let outcome = draft::save_draft(&self.conn, fields, step);
        let mut st = lock_status(&self.status);
        st.pending_save = false;
        match &outcome {
            SaveOutcome::Saved { saved_at, saved_at_ms } => {
                st.last_saved_at = Some(saved_at.clone());
                st.last_saved_at_ms = Some(*saved_at_ms);
                st.last_error = None;
                st.armed = true;
                drop(st);
                // Saving re-arms: the deadline tracks the newest record.
                self.armed_saved_at_ms = Some(*saved_at_ms);
            }
            SaveOutcome::RejectedStep => {}
            SaveOutcome::Failed { message } => {
                st.last_error = Some(message.clone());
                drop(st);
                warn!(step = %step, "draft save failed");
            }
        }
        outcome
    }

    fn expire_if_due(&mut self) {
        let Some(saved_at_ms) = self.armed_saved_at_ms else {
            return;
        };
        if draft::now_ms() < saved_at_ms + self.tuning.expiry_ms {
            return;
        }
        match draft::expire_if_stale(&self.conn, self.tuning.expiry_ms) {
            Ok(deleted) => {
                if deleted {
                    info!("draft expired and was cleared");
                    lock_status(&self.status).expired_count += 1;
                }
                // Normally disarms; if a fresher record landed between the
                // deadline and the guarded delete, this re-arms from it.
                self.rearm_from_db();
            }
            Err(e) => {
                // Lazy expiry on the next load still covers the record.
                warn!(error = %e, "expiry delete failed");
                self.armed_saved_at_ms = None;
                lock_status(&self.status).armed = false;
            }
        }
    }

    fn rearm_from_db(&mut self) {
        self.armed_saved_at_ms = match draft::saved_at_ms(&self.conn) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "could not read draft timestamp");
                None
            }
        };
        lock_status(&self.status).armed = self.armed_saved_at_ms.is_some();
    }
}

fn lock_status(status: &Mutex<AutosaveStatus>) -> MutexGuard<'_, AutosaveStatus> {
    match status.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
