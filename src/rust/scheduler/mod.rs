// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod coroutine;
pub mod mutex;
pub mod thread;

//==============================================================================
// Exports
//==============================================================================

pub use self::{
    coroutine::{
        fail,
        from_fn,
        ready,
        Coroutine,
        FnCoroutine,
        Step,
    },
    mutex::Lock,
    thread::{
        Join,
        Thread,
        ThreadState,
    },
};
