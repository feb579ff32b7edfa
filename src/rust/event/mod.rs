// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Wait primitives a coroutine can suspend on.
//!
//! Every event holds at most one [Resumer]. A thread arms the event when a coroutine suspends on it and closes it
//! either right before resuming or when the thread is torn down. Firing an event after it was closed is a no-op for
//! every variant in this module.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod callback;
pub mod file;
pub mod queue;
pub mod select;
pub mod timer;

pub use self::{
    callback::Callback,
    file::{
        FileEvent,
        IoBackend,
    },
    queue::Queue,
    select::Select,
    timer::Timer,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    result::Outcome,
};
use ::std::mem;

//======================================================================================================================
// Structures
//======================================================================================================================

/// One-shot callback that delivers an outcome to whoever armed an event.
pub type Resumer = Box<dyn FnOnce(Outcome)>;

/// Arming state of an event.
#[derive(Default)]
pub enum Arming {
    /// Never armed.
    #[default]
    Unarmed,
    /// Waiting to fire.
    Armed(Resumer),
    /// The last arming was cancelled or consumed.
    Closed,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Abstract wait handle.
pub trait Event {
    /// Registers `resumer` to be invoked once when the event becomes ready. Arming an already armed event panics.
    fn arm(&self, resumer: Resumer) -> Result<(), Fail>;

    /// Cancels any arming. Safe to call in every state, any number of times.
    fn close(&self);
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Arming {
    pub fn arm(&mut self, resumer: Resumer) {
        if self.is_armed() {
            panic!("event armed twice");
        }
        *self = Arming::Armed(resumer);
    }

    /// Drops the resumer, if any. Returns true if the event was armed.
    pub fn close(&mut self) -> bool {
        matches!(mem::replace(self, Arming::Closed), Arming::Armed(_))
    }

    /// Takes the resumer out so it can be invoked without holding any borrow on the event.
    pub fn take(&mut self) -> Option<Resumer> {
        match mem::replace(self, Arming::Closed) {
            Arming::Armed(resumer) => Some(resumer),
            Arming::Unarmed => {
                *self = Arming::Unarmed;
                None
            },
            Arming::Closed => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Arming::Armed(_))
    }

    pub fn was_ever_armed(&self) -> bool {
        !matches!(self, Arming::Unarmed)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
