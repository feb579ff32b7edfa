// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    event::{
        Callback,
        Event,
        Resumer,
    },
    runtime::{
        config::Config,
        fail::Fail,
        result::{
            self,
            Outcome,
            Sinks,
        },
        value::Value,
        SharedObject,
        WeakObject,
    },
    scheduler::coroutine::{
        Coroutine,
        Step,
    },
};
use ::libc::{
    ECANCELED,
    ELOOP,
};
use ::std::{
    cell::RefMut,
    mem,
    panic::{
        self,
        AssertUnwindSafe,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Deepest frame stack a thread builds when no configuration is given.
pub const DEFAULT_MAX_FRAME_DEPTH: usize = 1024;

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    /// Frames are being stepped.
    Running,
    /// Waiting on exactly one armed event.
    Suspended,
    /// The frame stack is empty.
    Done,
}

struct ThreadInner {
    /// Innermost frame last.
    frames: Vec<Box<dyn Coroutine>>,
    state: ThreadState,
    /// Event the innermost frame is suspended on.
    event: Option<Box<dyn Event>>,
    joinable: bool,
    /// Final outcome, kept for joinable threads only.
    result: Option<Outcome>,
    /// Callbacks of coroutines joining this thread.
    reapers: Vec<Callback>,
    sinks: Sinks,
    max_frame_depth: usize,
}

/// Work left over when a thread finishes, carried out once the thread is no longer borrowed.
struct Completion {
    report: Option<(Outcome, Sinks)>,
    reapers: Vec<Callback>,
}

/// Logical thread: a stack of coroutine frames driven by the events they suspend on.
///
/// Creating a thread runs its coroutine right away up to the first suspension. From then on, the thread only makes
/// progress when the event it waits on fires. Events hold a weak reference to the thread, so the thread lives as long
/// as some [Thread] handle does. Dropping the last handle of an unfinished thread is reported as a leak and closes it.
#[derive(Clone)]
pub struct Thread(SharedObject<ThreadInner>);

/// Coroutine returned by [Thread::join].
pub struct Join {
    thread: Thread,
    reaper: Option<Callback>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Thread {
    /// Starts a thread whose final outcome is reported through the default sinks.
    pub fn new(coroutine: impl Coroutine + 'static) -> Self {
        Self::spawn(Box::new(coroutine), false, Sinks::default(), DEFAULT_MAX_FRAME_DEPTH)
    }

    /// Starts a thread whose final outcome is kept for [Thread::join].
    pub fn joinable(coroutine: impl Coroutine + 'static) -> Self {
        Self::spawn(Box::new(coroutine), true, Sinks::default(), DEFAULT_MAX_FRAME_DEPTH)
    }

    pub fn with_sinks(coroutine: impl Coroutine + 'static, joinable: bool, sinks: Sinks) -> Self {
        Self::spawn(Box::new(coroutine), joinable, sinks, DEFAULT_MAX_FRAME_DEPTH)
    }

    /// Starts a thread with limits and reporting taken from `config`.
    pub fn with_config(coroutine: impl Coroutine + 'static, joinable: bool, config: &Config) -> Result<Self, Fail> {
        let max_frame_depth: usize = config.max_frame_depth()?;
        let sinks: Sinks = if config.report_values()? {
            Sinks::default()
        } else {
            Sinks::quiet()
        };
        Ok(Self::spawn(Box::new(coroutine), joinable, sinks, max_frame_depth))
    }

    fn spawn(coroutine: Box<dyn Coroutine>, joinable: bool, sinks: Sinks, max_frame_depth: usize) -> Self {
        debug!("spawn(): starting thread (coroutine={:?}, joinable={:?})", coroutine.name(), joinable);
        let thread: Thread = Thread(SharedObject::new(ThreadInner {
            frames: vec![coroutine],
            state: ThreadState::Running,
            event: None,
            joinable,
            result: None,
            reapers: Vec::new(),
            sinks,
            max_frame_depth,
        }));

        // Tear the thread down before a panic raised while starting escapes to the caller.
        let started = panic::catch_unwind(AssertUnwindSafe(|| Self::step(&thread.0, Ok(Value::None))));
        if let Err(payload) = started {
            error!("spawn(): thread panicked while starting");
            thread.close();
            panic::resume_unwind(payload);
        }
        thread
    }

    /// Delivers `outcome` to the frame waiting on the active event.
    ///
    /// This is what the resumer armed on the active event does. Resuming a thread that is not suspended panics.
    pub fn resume(&self, outcome: Outcome) {
        Self::resume_inner(&self.0, outcome)
    }

    fn resume_inner(thread: &SharedObject<ThreadInner>, outcome: Outcome) {
        let event: Option<Box<dyn Event>> = {
            let mut inner: RefMut<ThreadInner> = Self::enter(thread);
            if inner.state != ThreadState::Suspended {
                panic!("resumed a thread that is not suspended (state={:?})", inner.state);
            }
            inner.event.take()
        };
        if let Some(event) = event {
            event.close();
        }
        Self::step(thread, outcome)
    }

    fn resumer(thread: WeakObject<ThreadInner>) -> Resumer {
        Box::new(move |outcome: Outcome| match thread.upgrade() {
            Some(thread) => Thread::resume_inner(&thread, outcome),
            None => debug!("resumer(): thread is gone, dropping outcome"),
        })
    }

    fn enter(thread: &SharedObject<ThreadInner>) -> RefMut<'_, ThreadInner> {
        match thread.try_borrow_mut() {
            Some(inner) => inner,
            None => panic!("thread re-entered while it is running"),
        }
    }

    fn step(thread: &SharedObject<ThreadInner>, outcome: Outcome) {
        let completion: Option<Completion> = {
            let mut inner: RefMut<ThreadInner> = Self::enter(thread);
            inner.run(thread.downgrade(), outcome)
        };
        if let Some(completion) = completion {
            completion.deliver();
        }
    }

    /// Cancels the thread.
    ///
    /// Closes the active event, then every remaining frame innermost first so their cleanup runs. A joinable thread
    /// stores an `ECANCELED` failure for its joiners. Closing a finished thread does nothing.
    pub fn close(&self) {
        let (event, frames, reapers) = {
            let mut inner: RefMut<ThreadInner> = Self::enter(&self.0);
            if inner.state == ThreadState::Done {
                return;
            }
            debug!("close(): cancelling thread (depth={:?})", inner.frames.len());
            inner.state = ThreadState::Done;
            if inner.joinable {
                inner.result = Some(Err(Fail::new(ECANCELED, "thread closed")));
            }
            (
                inner.event.take(),
                mem::take(&mut inner.frames),
                mem::take(&mut inner.reapers),
            )
        };
        if let Some(event) = event {
            event.close();
        }
        for mut frame in frames.into_iter().rev() {
            trace!("close(): closing frame {:?}", frame.name());
            frame.close();
        }
        Completion { report: None, reapers }.deliver();
    }

    /// Returns a coroutine that waits for this thread to finish and produces its final outcome.
    ///
    /// A thread that is not joinable produces [Value::None].
    pub fn join(&self) -> Join {
        Join {
            thread: self.clone(),
            reaper: None,
        }
    }

    pub fn state(&self) -> ThreadState {
        self.0.borrow().state
    }

    pub fn is_done(&self) -> bool {
        self.state() == ThreadState::Done
    }

    /// Number of live frames.
    pub fn depth(&self) -> usize {
        self.0.borrow().frames.len()
    }

    /// Names of the live frames, outermost first.
    pub fn extract_stack(&self) -> Vec<String> {
        self.0
            .borrow()
            .frames
            .iter()
            .map(|frame: &Box<dyn Coroutine>| frame.name().to_string())
            .collect()
    }

    /// Final outcome of a finished joinable thread.
    pub fn result(&self) -> Option<Outcome> {
        self.0.borrow().result.clone()
    }
}

impl ThreadInner {
    /// Trampoline: feeds `outcome` into the innermost frame and follows the steps it asks for until a frame suspends
    /// or the stack runs empty.
    fn run(&mut self, thread: WeakObject<ThreadInner>, mut outcome: Outcome) -> Option<Completion> {
        self.state = ThreadState::Running;
        loop {
            let frame: &mut Box<dyn Coroutine> = match self.frames.last_mut() {
                Some(frame) => frame,
                None => return Some(self.finish(outcome)),
            };
            outcome = match result::resume(&mut **frame, outcome) {
                Err(mut fail) => {
                    let frame: Box<dyn Coroutine> = self.frames.pop().expect("frame should be live");
                    fail.push_frame(frame.name());
                    trace!("run(): frame {:?} failed (errno={:?})", frame.name(), fail.errno);
                    Err(fail)
                },
                Ok(Step::Return(value)) => {
                    self.frames.pop();
                    Ok(value)
                },
                Ok(Step::Produce(value)) => {
                    let mut frame: Box<dyn Coroutine> = self.frames.pop().expect("frame should be live");
                    frame.close();
                    Ok(value)
                },
                Ok(Step::Delegate(coroutine)) => {
                    if self.frames.len() >= self.max_frame_depth {
                        let cause: String = format!("frame stack exceeds {:?} frames", self.max_frame_depth);
                        warn!("run(): {} (coroutine={:?})", cause, coroutine.name());
                        Err(Fail::new(ELOOP, &cause))
                    } else {
                        trace!("run(): delegating to {:?}", coroutine.name());
                        self.frames.push(coroutine);
                        Ok(Value::None)
                    }
                },
                Ok(Step::Suspend(event)) => match event.arm(Thread::resumer(thread.clone())) {
                    Ok(()) => {
                        trace!("run(): suspended (depth={:?})", self.frames.len());
                        self.event = Some(event);
                        self.state = ThreadState::Suspended;
                        return None;
                    },
                    Err(fail) => {
                        event.close();
                        Err(fail)
                    },
                },
            };
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Completion {
        debug!("finish(): thread done (ok={:?})", outcome.is_ok());
        self.state = ThreadState::Done;
        let reapers: Vec<Callback> = mem::take(&mut self.reapers);
        if self.joinable {
            self.result = Some(outcome);
            Completion { report: None, reapers }
        } else {
            Completion {
                report: Some((outcome, self.sinks.clone())),
                reapers,
            }
        }
    }
}

impl Completion {
    fn deliver(self) {
        if let Some((outcome, sinks)) = self.report {
            result::finalize(outcome, &sinks);
        }
        for reaper in self.reapers {
            // Joiners that were cancelled in the meantime closed their reaper.
            if reaper.is_armed() {
                reaper.send(());
            }
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Coroutine for Join {
    fn name(&self) -> &str {
        "join"
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        if self.reaper.is_some() {
            input?;
        }
        let inner = self.thread.0.borrow();
        if inner.state != ThreadState::Done {
            let reaper: Callback = Callback::new();
            drop(inner);
            self.thread.0.borrow_mut().reapers.push(reaper.clone());
            let step: Step = Step::suspend(&reaper);
            self.reaper = Some(reaper);
            return Ok(step);
        }
        match &inner.result {
            Some(outcome) => outcome.clone().map(Step::Return),
            None => Ok(Step::Return(Value::None)),
        }
    }
}

impl Drop for ThreadInner {
    fn drop(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        let stack: Vec<&str> = self.frames.iter().map(|frame: &Box<dyn Coroutine>| frame.name()).collect();
        warn!("drop(): thread abandoned before finishing (stack={:?})", stack);
        if let Some(event) = self.event.take() {
            event.close();
        }
        while let Some(mut frame) = self.frames.pop() {
            frame.close();
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
