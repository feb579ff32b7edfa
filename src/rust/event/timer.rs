// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    event::{
        Arming,
        Event,
        Resumer,
    },
    runtime::{
        fail::Fail,
        timer::{
            TimerBackend,
            TimerKey,
        },
        value::Value,
        SharedObject,
        WeakObject,
    },
};
use ::std::{
    rc::Rc,
    time::Duration,
};

//======================================================================================================================
// Structures
//======================================================================================================================

struct TimerState {
    backend: Rc<dyn TimerBackend>,
    arming: Arming,
    /// Set while a wake up is scheduled with the backend.
    key: Option<TimerKey>,
    /// Latched when the timer expired with nobody waiting on it.
    expired: bool,
}

/// One-shot timer event. Fires with [Value::None] once the started duration has elapsed.
///
/// Closing the event does not stop the timer. A timer that expires while nobody is armed on it records the fact in
/// [Timer::has_expired] instead, and stays stopped: suspending on it afterwards waits until the next [Timer::start].
/// Callers that wait on the same timer more than once, such as a deadline raced through a
/// [crate::event::Select], should check [Timer::has_expired] before suspending on it again.
#[derive(Clone)]
pub struct Timer(SharedObject<TimerState>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Timer {
    pub fn new(backend: impl TimerBackend + 'static) -> Self {
        Self::with_backend(Rc::new(backend))
    }

    pub fn with_backend(backend: Rc<dyn TimerBackend>) -> Self {
        Self(SharedObject::new(TimerState {
            backend,
            arming: Arming::default(),
            key: None,
            expired: false,
        }))
    }

    /// Starts the timer. A running timer is restarted.
    pub fn start(&self, duration: Duration) {
        self.stop();
        let weak: WeakObject<TimerState> = self.0.downgrade();
        let backend: Rc<dyn TimerBackend> = self.0.borrow().backend.clone();
        let key: TimerKey = backend.schedule(duration, Box::new(move || Timer::expire(&weak)));
        let mut state = self.0.borrow_mut();
        state.key = Some(key);
        state.expired = false;
        trace!("start(): timer started (duration={:?})", duration);
    }

    /// Stops the timer. Stopping a timer that is not running does nothing.
    pub fn stop(&self) {
        let (backend, key) = {
            let mut state = self.0.borrow_mut();
            match state.key.take() {
                Some(key) => (state.backend.clone(), key),
                None => return,
            }
        };
        backend.cancel(key);
        trace!("stop(): timer stopped (key={:?})", key);
    }

    pub fn is_running(&self) -> bool {
        self.0.borrow().key.is_some()
    }

    /// Whether the timer expired while nobody was waiting on it.
    pub fn has_expired(&self) -> bool {
        self.0.borrow().expired
    }

    fn expire(timer: &WeakObject<TimerState>) {
        let timer: SharedObject<TimerState> = match timer.upgrade() {
            Some(timer) => timer,
            None => return,
        };
        let resumer: Option<Resumer> = {
            let mut state = timer.borrow_mut();
            state.key = None;
            let resumer: Option<Resumer> = state.arming.take();
            if resumer.is_none() {
                state.expired = true;
            }
            resumer
        };
        match resumer {
            Some(resumer) => resumer(Ok(Value::None)),
            None => warn!("expire(): timer expired while not armed"),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Event for Timer {
    fn arm(&self, resumer: Resumer) -> Result<(), Fail> {
        let mut state = self.0.borrow_mut();
        if state.expired && state.key.is_none() {
            warn!("arm(): waiting on a timer that already expired and was not restarted");
        }
        state.arming.arm(resumer);
        Ok(())
    }

    fn close(&self) {
        self.0.borrow_mut().arming.close();
    }
}

impl Drop for TimerState {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!("drop(): timer left running (key={:?})", key);
            self.backend.cancel(key);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
