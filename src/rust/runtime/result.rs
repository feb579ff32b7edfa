// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Outcomes of resuming suspended computations.
//!
//! An [Outcome] is either a produced [Value] or a pending [Fail]. The trampoline hands the same type to every frame,
//! so normal continuation and error propagation go through one dispatch point ([resume]).

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::Fail,
        value::Value,
    },
    scheduler::coroutine::{
        Coroutine,
        Step,
    },
};
use ::std::rc::Rc;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Result of running or resuming a computation.
pub type Outcome = Result<Value, Fail>;

/// Reports outcomes that reach the top of a non-joinable thread.
#[derive(Clone)]
pub struct Sinks {
    on_error: Rc<dyn Fn(&Fail)>,
    on_value: Rc<dyn Fn(&Value)>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Sinks {
    pub fn new(on_error: impl Fn(&Fail) + 'static, on_value: impl Fn(&Value) + 'static) -> Self {
        Self {
            on_error: Rc::new(on_error),
            on_value: Rc::new(on_value),
        }
    }

    /// Sinks that report errors but never echo values.
    pub fn quiet() -> Self {
        Self::new(default_error_sink, |_: &Value| {})
    }

    pub fn report_error(&self, fail: &Fail) {
        (self.on_error)(fail)
    }

    pub fn report_value(&self, value: &Value) {
        (self.on_value)(value)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Runs `call` and captures its outcome.
pub fn from_call<T, E, F>(call: F) -> Outcome
where
    T: Into<Value>,
    E: Into<Fail>,
    F: FnOnce() -> Result<T, E>,
{
    match call() {
        Ok(value) => Ok(value.into()),
        Err(e) => Err(e.into()),
    }
}

/// Feeds `outcome` into `frame`: a value is sent, a failure is thrown.
pub fn resume(frame: &mut dyn Coroutine, outcome: Outcome) -> Result<Step, Fail> {
    frame.resume(outcome)
}

/// Reports an outcome that nobody is going to join.
pub fn finalize(outcome: Outcome, sinks: &Sinks) {
    match outcome {
        Ok(value) => sinks.report_value(&value),
        Err(fail) => sinks.report_error(&fail),
    }
}

fn default_error_sink(fail: &Fail) {
    error!("unhandled failure in thread: {:?}", fail);
    eprintln!("Unhandled failure (innermost frame first):");
    for frame in fail.traceback.iter() {
        eprintln!("  in {}", frame);
    }
    for (depth, cause) in fail.chain().enumerate() {
        let prefix: &str = if depth == 0 { "" } else { "caused by: " };
        eprintln!("{}{}", prefix, cause);
    }
}

fn default_value_sink(value: &Value) {
    if !value.is_none() {
        println!("{:?}", value);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Sinks {
    fn default() -> Self {
        Self::new(default_error_sink, default_value_sink)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
