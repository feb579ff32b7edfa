// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    event::Callback,
    runtime::{
        fail::Fail,
        result::Outcome,
        value::Value,
        SharedObject,
    },
    scheduler::coroutine::{
        Coroutine,
        Step,
    },
};
use ::std::collections::VecDeque;

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Default)]
struct LockState {
    held: bool,
    /// Oldest waiter first.
    waiters: VecDeque<Callback>,
}

/// Lock for ensuring exclusive access to a resource across threads.
///
/// Waiters are woken in the order they started waiting. Ownership passes straight from the releasing holder to the
/// oldest waiter, so the lock never looks free while someone is waiting on it.
#[derive(Clone, Default)]
pub struct Lock(SharedObject<LockState>);

/// Coroutine returned by [Lock::acquire].
pub struct Acquire {
    lock: Lock,
    waiting: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LockedStage {
    Start,
    Acquiring,
    Running,
    Finished,
}

/// Coroutine returned by [Lock::locked]: runs a body while holding the lock.
pub struct Locked {
    lock: Lock,
    body: Option<Box<dyn Coroutine>>,
    name: String,
    stage: LockedStage,
    held: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Lock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a coroutine that acquires the lock, suspending behind earlier waiters if it is held.
    pub fn acquire(&self) -> Acquire {
        Acquire {
            lock: self.clone(),
            waiting: false,
        }
    }

    /// Try to acquire this lock without waiting. Return [true] if successful.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.0.borrow_mut();
        if state.held {
            false
        } else {
            state.held = true;
            true
        }
    }

    /// Releases the lock, handing it to the oldest live waiter if there is one.
    pub fn release(&self) -> Result<(), Fail> {
        loop {
            let waiter: Callback = {
                let mut state = self.0.borrow_mut();
                if !state.held {
                    let cause: &str = "lock was not held";
                    error!("release(): {}", cause);
                    return Err(Fail::new(libc::EPERM, cause));
                }
                match state.waiters.pop_front() {
                    Some(waiter) => waiter,
                    None => {
                        state.held = false;
                        return Ok(());
                    },
                }
            };
            // Waiters whose thread was closed in the meantime are skipped.
            if waiter.is_armed() {
                trace!("release(): handing lock over");
                waiter.send(());
                return Ok(());
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.0.borrow().held
    }

    pub fn num_waiters(&self) -> usize {
        self.0.borrow().waiters.len()
    }

    /// Returns a coroutine that runs `body` with the lock held. The lock is released however the body ends, including
    /// when the thread running it is closed.
    pub fn locked(&self, body: impl Coroutine + 'static) -> Locked {
        let name: String = format!("locked {}", body.name());
        Locked {
            lock: self.clone(),
            body: Some(Box::new(body)),
            name,
            stage: LockedStage::Start,
            held: false,
        }
    }
}

impl Locked {
    fn release(&mut self) -> Result<(), Fail> {
        if self.held {
            self.held = false;
            self.lock.release()?;
        }
        Ok(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Coroutine for Acquire {
    fn name(&self) -> &str {
        "acquire"
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        if self.waiting {
            // The releasing holder kept the flag set for us.
            input?;
            return Ok(Step::Return(Value::None));
        }
        if self.lock.try_acquire() {
            return Ok(Step::Return(Value::None));
        }
        let turn: Callback = Callback::new();
        self.lock.0.borrow_mut().waiters.push_back(turn.clone());
        self.waiting = true;
        Ok(Step::suspend(&turn))
    }
}

impl Coroutine for Locked {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        match self.stage {
            LockedStage::Start => {
                self.stage = LockedStage::Acquiring;
                Ok(Step::delegate(self.lock.acquire()))
            },
            LockedStage::Acquiring => {
                input?;
                self.held = true;
                self.stage = LockedStage::Running;
                match self.body.take() {
                    Some(body) => Ok(Step::Delegate(body)),
                    None => unreachable!("locked body should run once"),
                }
            },
            LockedStage::Running => {
                // The body finished: release, then pass its outcome on.
                self.stage = LockedStage::Finished;
                self.release()?;
                input.map(Step::Return)
            },
            LockedStage::Finished => panic!("locked section resumed after it finished"),
        }
    }

    fn close(&mut self) {
        if let Err(e) = self.release() {
            warn!("close(): failed to release lock (error={:?})", e);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
