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
        result::Outcome,
        value::Value,
        SharedObject,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A simple event triggered by calling it. Only meant to be triggered while armed: triggering one that was never armed
/// panics, triggering one whose arming was closed does nothing.
#[derive(Clone, Default)]
pub struct Callback(SharedObject<Arming>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Callback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires with the positional `args` bundled as a [Value::Tuple].
    pub fn trigger(&self, args: Vec<Value>) {
        self.trigger_with(Ok(Value::Tuple(args)))
    }

    /// Fires with a single value.
    pub fn send(&self, value: impl Into<Value>) {
        self.trigger_with(Ok(value.into()))
    }

    /// Fires with a failure, which is raised at the suspension point.
    pub fn throw(&self, fail: Fail) {
        self.trigger_with(Err(fail))
    }

    pub fn trigger_with(&self, outcome: Outcome) {
        let resumer: Option<Resumer> = {
            let mut arming = self.0.borrow_mut();
            if !arming.was_ever_armed() {
                panic!("callback triggered before it was ever armed");
            }
            arming.take()
        };
        match resumer {
            Some(resumer) => resumer(outcome),
            None => debug!("trigger_with(): callback is closed, dropping outcome"),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.borrow().is_armed()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Event for Callback {
    fn arm(&self, resumer: Resumer) -> Result<(), Fail> {
        self.0.borrow_mut().arm(resumer);
        Ok(())
    }

    fn close(&self) {
        self.0.borrow_mut().close();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
