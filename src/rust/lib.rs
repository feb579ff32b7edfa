// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Event-driven coroutine scheduler.
//!
//! A [Thread] runs a stack of [Coroutine] frames. Frames delegate to sub-coroutines synchronously and suspend the
//! whole stack on an [event::Event]; whoever fires the event resumes the thread where it left off. Failures unwind
//! the stack one frame at a time and carry the names of the frames they went through.

#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod event;
pub mod runtime;
pub mod scheduler;

pub use self::{
    event::{
        Callback,
        Event,
        FileEvent,
        IoBackend,
        Queue,
        Select,
        Timer,
    },
    runtime::{
        config::Config,
        fail::Fail,
        result::{
            Outcome,
            Sinks,
        },
        timer::SharedTimer,
        value::{
            Interest,
            Value,
        },
    },
    scheduler::{
        Coroutine,
        Lock,
        Step,
        Thread,
        ThreadState,
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the enclosing `anyhow::Result` function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val != *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left == right)`\n  left: `{:?}`,\n right: `{:?}`",
                        left_val,
                        right_val
                    );
                }
            },
        }
    }};
}

/// Ensures that two expressions are not equal, bailing out of the enclosing `anyhow::Result` function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left != right)`\n  left: `{:?}`,\n right: `{:?}`",
                        left_val,
                        right_val
                    );
                }
            },
        }
    }};
}
