use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use host_loop::HostLoop;

use crate::delegate::UiDelegate;
use crate::signal::Signal;
use crate::{Capabilities, JobOutcome, KillVerbosity, Unit, KILLED_JOB_ERROR, NO_ERROR};

/// The work behind a [`Job`].
///
/// `start` is invoked exactly once, synchronously from [`Job::start`]; it is
/// expected to post the actual processing to the host loop and to eventually
/// call [`Job::emit_result`]. The other hooks report whether the operation is
/// supported and succeeded; the defaults decline.
pub trait JobDriver {
    fn start(&mut self, job: &Job);

    /// Attempt to abort. Returning `false` leaves the job running.
    fn do_kill(&mut self, _job: &Job) -> bool {
        false
    }

    fn do_suspend(&mut self, _job: &Job) -> bool {
        false
    }

    fn do_resume(&mut self, _job: &Job) -> bool {
        false
    }
}

struct JobState {
    error: i32,
    error_text: String,
    processed: [u64; Unit::COUNT],
    totals: [u64; Unit::COUNT],
    percent: u32,
    progress_unit: Unit,
    capabilities: Capabilities,
    auto_delete: bool,
    started: bool,
    finished: bool,
    result_emitted: bool,
    suspended: bool,
    ui_delegate: Option<UiDelegate>,
    // Keeps the job alive while it is running, released on the turn after
    // the terminal notifications when auto-delete is on.
    self_ref: Option<Job>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            error: NO_ERROR,
            error_text: String::new(),
            processed: [0; Unit::COUNT],
            totals: [0; Unit::COUNT],
            percent: 0,
            progress_unit: Unit::Bytes,
            capabilities: Capabilities::NONE,
            auto_delete: true,
            started: false,
            finished: false,
            result_emitted: false,
            suspended: false,
            ui_delegate: None,
            self_ref: None,
        }
    }
}

#[derive(Default)]
struct Signals {
    result: Signal<JobOutcome>,
    finished: Signal<JobOutcome>,
    suspended: Signal<()>,
    resumed: Signal<()>,
    percent: Signal<u32>,
    processed_amount: Signal<(Unit, u64)>,
    total_amount: Signal<(Unit, u64)>,
    destroyed: RefCell<Vec<Box<dyn FnOnce()>>>,
}

struct JobInner {
    host: HostLoop,
    driver: RefCell<Option<Box<dyn JobDriver>>>,
    state: RefCell<JobState>,
    signals: Signals,
}

impl Drop for JobInner {
    fn drop(&mut self) {
        let outcome = {
            let mut state = self.state.borrow_mut();
            if state.finished {
                None
            } else {
                // Torn down before completion: `finished` still fires once,
                // `result` never does.
                state.finished = true;
                Some(JobOutcome {
                    error: state.error,
                    error_text: state.error_text.clone(),
                })
            }
        };
        if let Some(outcome) = outcome {
            self.signals.finished.emit(&outcome);
        }
        let destroyed = std::mem::take(&mut *self.signals.destroyed.borrow_mut());
        for slot in destroyed {
            slot();
        }
    }
}

/// An asynchronous operation with lifecycle, progress and cancellation.
///
/// `Job` is a cheap cloneable handle; all state lives on the host-loop
/// thread and every notification is delivered there.
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

/// Non-owning handle, used by observers that must not keep a finished job
/// alive past its deferred destruction.
#[derive(Clone)]
pub struct WeakJob {
    inner: Weak<JobInner>,
}

impl WeakJob {
    pub fn upgrade(&self) -> Option<Job> {
        self.inner.upgrade().map(|inner| Job { inner })
    }
}

impl Job {
    pub fn new(host: &HostLoop, driver: impl JobDriver + 'static) -> Self {
        Job {
            inner: Rc::new(JobInner {
                host: host.clone(),
                driver: RefCell::new(Some(Box::new(driver))),
                state: RefCell::new(JobState::default()),
                signals: Signals::default(),
            }),
        }
    }

    pub fn host(&self) -> &HostLoop {
        &self.inner.host
    }

    pub fn downgrade(&self) -> WeakJob {
        WeakJob {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // --- observer registration ---

    pub fn on_result(&self, slot: impl Fn(&JobOutcome) + 'static) {
        self.inner.signals.result.connect(slot);
    }

    pub fn on_finished(&self, slot: impl Fn(&JobOutcome) + 'static) {
        self.inner.signals.finished.connect(slot);
    }

    pub fn on_suspended(&self, slot: impl Fn() + 'static) {
        self.inner.signals.suspended.connect(move |()| slot());
    }

    pub fn on_resumed(&self, slot: impl Fn() + 'static) {
        self.inner.signals.resumed.connect(move |()| slot());
    }

    pub fn on_percent(&self, slot: impl Fn(u32) + 'static) {
        self.inner.signals.percent.connect(move |p| slot(*p));
    }

    pub fn on_processed_amount(&self, slot: impl Fn(Unit, u64) + 'static) {
        self.inner
            .signals
            .processed_amount
            .connect(move |&(unit, amount)| slot(unit, amount));
    }

    pub fn on_total_amount(&self, slot: impl Fn(Unit, u64) + 'static) {
        self.inner
            .signals
            .total_amount
            .connect(move |&(unit, amount)| slot(unit, amount));
    }

    /// Fires when the job object itself is torn down, strictly after any
    /// `finished` delivery.
    pub fn on_destroyed(&self, slot: impl FnOnce() + 'static) {
        self.inner
            .signals
            .destroyed
            .borrow_mut()
            .push(Box::new(slot));
    }

    // --- accessors ---

    pub fn error(&self) -> i32 {
        self.inner.state.borrow().error
    }

    pub fn error_text(&self) -> String {
        self.inner.state.borrow().error_text.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.borrow().finished
    }

    pub fn result_emitted(&self) -> bool {
        self.inner.state.borrow().result_emitted
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.borrow().suspended
    }

    pub fn percent(&self) -> u32 {
        self.inner.state.borrow().percent
    }

    pub fn processed_amount(&self, unit: Unit) -> u64 {
        self.inner.state.borrow().processed[unit.index()]
    }

    pub fn total_amount(&self, unit: Unit) -> u64 {
        self.inner.state.borrow().totals[unit.index()]
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.state.borrow().capabilities
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.inner.state.borrow_mut().capabilities = capabilities;
    }

    pub fn is_auto_delete(&self) -> bool {
        self.inner.state.borrow().auto_delete
    }

    pub fn set_auto_delete(&self, auto_delete: bool) {
        self.inner.state.borrow_mut().auto_delete = auto_delete;
    }

    pub fn progress_unit(&self) -> Unit {
        self.inner.state.borrow().progress_unit
    }

    /// Select which unit drives the automatic percent computation.
    pub fn set_progress_unit(&self, unit: Unit) {
        self.inner.state.borrow_mut().progress_unit = unit;
    }

    // --- error reporting ---

    pub fn set_error(&self, error: i32) {
        let mut state = self.inner.state.borrow_mut();
        if state.finished {
            return;
        }
        state.error = error;
    }

    pub fn set_error_text(&self, error_text: impl Into<String>) {
        let mut state = self.inner.state.borrow_mut();
        if state.finished {
            return;
        }
        state.error_text = error_text.into();
    }

    // --- lifecycle ---

    /// Hand control to the driver. Meaningful exactly once; repeated calls
    /// and calls on a finished job are no-ops.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.started || state.finished {
                return;
            }
            state.started = true;
            state.self_ref = Some(self.clone());
        }
        self.with_driver(|driver, job| driver.start(job));
    }

    /// Start the job and run a nested host loop until it finishes. Returns
    /// whether the job completed without error. Nested `exec` calls unwind
    /// correctly because each one waits on its own completion flag.
    pub fn exec(&self) -> bool {
        let done = Rc::new(Cell::new(false));
        {
            let done = done.clone();
            self.on_finished(move |_| done.set(true));
        }
        self.start();
        if !self.is_finished() {
            let host = self.inner.host.clone();
            host.run_while(|| !done.get());
        }
        self.error() == NO_ERROR
    }

    /// Abort the job. On success the job is finished before this returns:
    /// the error is [`KILLED_JOB_ERROR`](crate::KILLED_JOB_ERROR), `finished`
    /// has fired, and `result` has fired iff `verbosity` asked for it. A job
    /// that is already finished reports success without doing anything.
    pub fn kill(&self, verbosity: KillVerbosity) -> bool {
        if self.is_finished() {
            return true;
        }
        let killed = self
            .with_driver(|driver, job| driver.do_kill(job))
            .unwrap_or(false);
        if !killed {
            tracing::debug!("kill request declined by the driver");
            return false;
        }
        {
            let mut state = self.inner.state.borrow_mut();
            if state.finished {
                // The driver finished the job from inside do_kill.
                return true;
            }
            state.error = KILLED_JOB_ERROR;
        }
        self.finish(verbosity == KillVerbosity::EmitResult);
        true
    }

    pub fn suspend(&self) -> bool {
        {
            let state = self.inner.state.borrow();
            if state.suspended || state.finished {
                return false;
            }
        }
        let suspended = self
            .with_driver(|driver, job| driver.do_suspend(job))
            .unwrap_or(false);
        if !suspended {
            return false;
        }
        self.inner.state.borrow_mut().suspended = true;
        self.inner.signals.suspended.emit(&());
        true
    }

    pub fn resume(&self) -> bool {
        {
            let state = self.inner.state.borrow();
            if !state.suspended || state.finished {
                return false;
            }
        }
        let resumed = self
            .with_driver(|driver, job| driver.do_resume(job))
            .unwrap_or(false);
        if !resumed {
            return false;
        }
        self.inner.state.borrow_mut().suspended = false;
        self.inner.signals.resumed.emit(&());
        true
    }

    // --- progress accounting ---

    /// Record progress for `unit`. Emits a notification only when the value
    /// actually changed, then refreshes the percent if `unit` is the
    /// designated progress unit.
    pub fn set_processed_amount(&self, unit: Unit, amount: u64) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.finished || state.processed[unit.index()] == amount {
                return;
            }
            state.processed[unit.index()] = amount;
        }
        self.inner.signals.processed_amount.emit(&(unit, amount));
        self.refresh_percent(unit);
    }

    pub fn set_total_amount(&self, unit: Unit, amount: u64) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.finished || state.totals[unit.index()] == amount {
                return;
            }
            state.totals[unit.index()] = amount;
        }
        self.inner.signals.total_amount.emit(&(unit, amount));
        self.refresh_percent(unit);
    }

    /// Manually override the percent. Values above 100 pass through
    /// unchanged; callers may legitimately overshoot.
    pub fn set_percent(&self, percent: u32) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.finished || state.percent == percent {
                return;
            }
            state.percent = percent;
        }
        self.inner.signals.percent.emit(&percent);
    }

    fn refresh_percent(&self, unit: Unit) {
        let percent;
        {
            let mut state = self.inner.state.borrow_mut();
            if unit != state.progress_unit {
                return;
            }
            let total = state.totals[unit.index()];
            if total == 0 {
                return;
            }
            let computed = state.processed[unit.index()].saturating_mul(100) / total;
            percent = computed.min(u64::from(u32::MAX)) as u32;
            if state.percent == percent {
                return;
            }
            state.percent = percent;
        }
        self.inner.signals.percent.emit(&percent);
    }

    // --- completion ---

    /// The single internal path to successful completion. Drivers call this
    /// once their work is done (after setting an error code if any).
    pub fn emit_result(&self) {
        if self.is_finished() {
            return;
        }
        self.finish(true);
    }

    fn finish(&self, emit_result: bool) {
        let outcome;
        let auto_delete;
        {
            let mut state = self.inner.state.borrow_mut();
            if state.finished {
                return;
            }
            state.finished = true;
            state.result_emitted = emit_result;
            outcome = JobOutcome {
                error: state.error,
                error_text: state.error_text.clone(),
            };
            auto_delete = state.auto_delete;
        }
        if emit_result {
            self.inner.signals.result.emit(&outcome);
        }
        self.inner.signals.finished.emit(&outcome);
        if auto_delete {
            // The job must outlive its own notifications so observers can
            // still read the terminal state; release the self-reference on
            // the next loop turn instead of here.
            let this = self.clone();
            self.inner.host.post(move || {
                this.inner.state.borrow_mut().self_ref = None;
            });
        } else {
            self.inner.state.borrow_mut().self_ref = None;
        }
    }

    // --- delegate ---

    /// Associate a delegate. Refused when this job already has one or when
    /// the delegate is already bound to another job; the previous ownership
    /// wins silently.
    pub fn set_ui_delegate(&self, delegate: &UiDelegate) -> bool {
        if self.inner.state.borrow().ui_delegate.is_some() {
            return false;
        }
        if !delegate.bind() {
            return false;
        }
        self.inner.state.borrow_mut().ui_delegate = Some(delegate.clone());
        delegate.connected(self);
        true
    }

    pub fn ui_delegate(&self) -> Option<UiDelegate> {
        self.inner.state.borrow().ui_delegate.clone()
    }

    fn with_driver<R>(&self, f: impl FnOnce(&mut dyn JobDriver, &Job) -> R) -> Option<R> {
        // Taken out for the duration of the call so a hook that re-enters the
        // job cannot alias the driver borrow.
        let driver = self.inner.driver.borrow_mut().take();
        match driver {
            Some(mut driver) => {
                let out = f(driver.as_mut(), self);
                *self.inner.driver.borrow_mut() = Some(driver);
                Some(out)
            }
            None => None,
        }
    }
}
