// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    event::Event,
    runtime::{
        fail::Fail,
        result::Outcome,
        value::Value,
    },
};
use ::std::fmt;

//======================================================================================================================
// Structures
//======================================================================================================================

/// What a coroutine asks the thread running it to do next.
pub enum Step {
    /// Suspend the whole thread until the event fires. The event's outcome is fed back into this frame.
    Suspend(Box<dyn Event>),
    /// Run a sub-coroutine on top of this frame. Its outcome is fed back into this frame.
    Delegate(Box<dyn Coroutine>),
    /// Finish this frame early with a value. The frame is closed so its cleanup runs.
    Produce(Value),
    /// The frame ran to completion with a value.
    Return(Value),
}

/// Coroutine built from a closure. See [from_fn].
pub struct FnCoroutine<F> {
    name: String,
    body: F,
    on_close: Option<Box<dyn FnOnce()>>,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// Coroutine
///
/// This abstraction is the basic unit of application work. A coroutine is an explicit step function: each call to
/// [Coroutine::resume] feeds it the outcome of whatever it last waited on (`Ok(Value::None)` on the first call) and it
/// answers with the next [Step]. A failure fed into `resume` should either be handled or returned as is, in which case
/// the thread unwinds it into the caller frame.
pub trait Coroutine {
    /// Name reported in failure tracebacks and [crate::scheduler::thread::Thread::extract_stack].
    fn name(&self) -> &str;

    /// Runs the coroutine until its next step.
    fn resume(&mut self, input: Outcome) -> Result<Step, Fail>;

    /// Tears down a frame that will never be resumed again. Not called on frames that returned or failed.
    fn close(&mut self) {}
}

/// Coroutine that finishes at once with a value.
struct Ready(Option<Value>);

/// Coroutine that fails at once.
struct Failing(Option<Fail>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Step {
    /// Suspends on a handle to `event`.
    pub fn suspend<E: Event + Clone + 'static>(event: &E) -> Self {
        Step::Suspend(Box::new(event.clone()))
    }

    pub fn delegate(coroutine: impl Coroutine + 'static) -> Self {
        Step::Delegate(Box::new(coroutine))
    }

    pub fn done(value: impl Into<Value>) -> Self {
        Step::Return(value.into())
    }
}

impl<F> FnCoroutine<F>
where
    F: FnMut(Outcome) -> Result<Step, Fail>,
{
    /// Registers cleanup to run if the frame is closed before it finishes.
    pub fn on_close(mut self, cleanup: impl FnOnce() + 'static) -> Self {
        self.on_close = Some(Box::new(cleanup));
        self
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Creates a coroutine named `name` whose steps are computed by `body`.
pub fn from_fn<F>(name: &str, body: F) -> FnCoroutine<F>
where
    F: FnMut(Outcome) -> Result<Step, Fail>,
{
    FnCoroutine {
        name: name.to_string(),
        body,
        on_close: None,
    }
}

/// Coroutine that returns `value` without suspending.
pub fn ready(value: impl Into<Value>) -> impl Coroutine {
    Ready(Some(value.into()))
}

/// Coroutine that raises `fail` without suspending.
pub fn fail(fail: Fail) -> impl Coroutine {
    Failing(Some(fail))
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<F> Coroutine for FnCoroutine<F>
where
    F: FnMut(Outcome) -> Result<Step, Fail>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        (self.body)(input)
    }

    fn close(&mut self) {
        if let Some(cleanup) = self.on_close.take() {
            cleanup();
        }
    }
}

impl Coroutine for Ready {
    fn name(&self) -> &str {
        "ready"
    }

    fn resume(&mut self, _: Outcome) -> Result<Step, Fail> {
        Ok(Step::Return(self.0.take().unwrap_or_default()))
    }
}

impl Coroutine for Failing {
    fn name(&self) -> &str {
        "fail"
    }

    fn resume(&mut self, _: Outcome) -> Result<Step, Fail> {
        match self.0.take() {
            Some(fail) => Err(fail),
            None => panic!("failed coroutine resumed again"),
        }
    }
}

/// Boxed frames are coroutines too, so a stack assembled at run time can be handed to a thread.
impl Coroutine for Box<dyn Coroutine> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        (**self).resume(input)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Suspend(_) => write!(f, "Suspend"),
            Step::Delegate(coroutine) => write!(f, "Delegate({})", coroutine.name()),
            Step::Produce(value) => write!(f, "Produce({:?})", value),
            Step::Return(value) => write!(f, "Return({:?})", value),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
