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
struct QueueState {
    arming: Arming,
    items: VecDeque<Outcome>,
}

/// An event that may be triggered before it is armed (message queue).
///
/// Meant for a single reader that either drains the queue synchronously through [Iterator::next] or suspends by
/// yielding the queue itself. Items sent while the reader is suspended are delivered to it immediately.
#[derive(Clone, Default)]
pub struct Queue(SharedObject<QueueState>);

/// Coroutine returned by [Queue::get].
pub struct QueueGet {
    queue: Queue,
    waiting: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, value: impl Into<Value>) {
        self.push(Ok(value.into()))
    }

    pub fn throw(&self, fail: Fail) {
        self.push(Err(fail))
    }

    /// Sends the positional `args` as a [Value::Tuple].
    pub fn trigger(&self, args: Vec<Value>) {
        self.push(Ok(Value::Tuple(args)))
    }

    fn push(&self, outcome: Outcome) {
        let delivery: Option<(Resumer, Outcome)> = {
            let mut state = self.0.borrow_mut();
            state.items.push_back(outcome);
            match state.arming.take() {
                Some(resumer) => {
                    let item: Outcome = state
                        .items
                        .pop_front()
                        .expect("queue should have an item because we just pushed one");
                    Some((resumer, item))
                },
                None => None,
            }
        };
        if let Some((resumer, item)) = delivery {
            trace!("push(): delivering to armed reader");
            resumer(item);
        }
    }

    /// Number of messages waiting in the queue.
    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().items.is_empty()
    }

    /// Returns a coroutine that produces the oldest queued item, suspending on the queue if none is buffered.
    pub fn get(&self) -> QueueGet {
        QueueGet {
            queue: self.clone(),
            waiting: false,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Event for Queue {
    fn arm(&self, resumer: Resumer) -> Result<(), Fail> {
        self.0.borrow_mut().arming.arm(resumer);
        Ok(())
    }

    fn close(&self) {
        self.0.borrow_mut().arming.close();
    }
}

/// Drains buffered items oldest first. `None` means the queue is exhausted for now.
impl Iterator for Queue {
    type Item = Outcome;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.borrow_mut().items.pop_front()
    }
}

impl Coroutine for QueueGet {
    fn name(&self) -> &str {
        "queue-get"
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        if self.waiting {
            return input.map(Step::Return);
        }
        match self.queue.next() {
            Some(item) => item.map(Step::Return),
            None => {
                self.waiting = true;
                Ok(Step::suspend(&self.queue))
            },
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
