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
        value::{
            Interest,
            Value,
        },
        SharedObject,
        WeakObject,
    },
};
use ::libc::{
    c_int,
    EINVAL,
};
use ::std::rc::Rc;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Readiness notification service consumed by [FileEvent].
///
/// Implementations must not hold any internal borrow while invoking a handler, because the handler resumes the thread
/// waiting on the descriptor and that thread may watch or unwatch descriptors before returning.
pub trait IoBackend {
    /// Starts delivering readiness of `fd` for `interest` to `handler`. At most one handler is registered per `fd`.
    fn watch(&self, fd: c_int, interest: Interest, handler: Box<dyn FnMut(Interest)>) -> Result<(), Fail>;
    /// Stops delivering readiness of `fd`. Unwatching a descriptor that is not watched does nothing.
    fn unwatch(&self, fd: c_int);
}

//======================================================================================================================
// Structures
//======================================================================================================================

struct FileState {
    arming: Arming,
    interest: Interest,
    watching: bool,
}

/// Event that fires when a file descriptor becomes ready.
///
/// Fires with [Value::Ready] carrying the operations that became ready, restricted to the watched ones.
#[derive(Clone)]
pub struct FileEvent {
    fd: c_int,
    backend: Rc<dyn IoBackend>,
    state: SharedObject<FileState>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl FileEvent {
    pub fn new(fd: c_int, backend: Rc<dyn IoBackend>) -> Self {
        Self {
            fd,
            backend,
            state: SharedObject::new(FileState {
                arming: Arming::default(),
                interest: Interest::default(),
                watching: false,
            }),
        }
    }

    /// Sets the operations to wait for. Takes effect on the next arming.
    pub fn watch(self, interest: Interest) -> Self {
        self.state.borrow_mut().interest = interest;
        self
    }

    /// Adds readability to the operations waited for.
    pub fn readable(self) -> Self {
        let interest: Interest = self.interest().union(Interest::READABLE);
        self.watch(interest)
    }

    /// Adds writability to the operations waited for.
    pub fn writable(self) -> Self {
        let interest: Interest = self.interest().union(Interest::WRITABLE);
        self.watch(interest)
    }

    pub fn fd(&self) -> c_int {
        self.fd
    }

    pub fn interest(&self) -> Interest {
        self.state.borrow().interest
    }

    /// Runs when the backend reports `ready` on the descriptor. The descriptor stays watched until the event is closed.
    fn fire(state: &WeakObject<FileState>, fd: c_int, ready: Interest) {
        let state: SharedObject<FileState> = match state.upgrade() {
            Some(state) => state,
            None => return,
        };
        let (resumer, ops): (Option<Resumer>, Interest) = {
            let mut state = state.borrow_mut();
            let ops: Interest = state.interest.intersect(ready);
            if ops.is_empty() {
                return;
            }
            (state.arming.take(), ops)
        };
        match resumer {
            Some(resumer) => {
                trace!("fire(): fd {:?} ready (ops={:?})", fd, ops);
                resumer(Ok(Value::Ready { fd, ops }))
            },
            None => debug!("fire(): file event for fd {:?} is closed, dropping readiness", fd),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Event for FileEvent {
    fn arm(&self, resumer: Resumer) -> Result<(), Fail> {
        let interest: Interest = self.state.borrow().interest;
        if interest.is_empty() {
            let cause: String = format!("no operations to watch on fd {:?}", self.fd);
            error!("arm(): {}", cause);
            return Err(Fail::new(EINVAL, &cause));
        }
        self.state.borrow_mut().arming.arm(resumer);

        let weak: WeakObject<FileState> = self.state.downgrade();
        let fd: c_int = self.fd;
        let handler: Box<dyn FnMut(Interest)> = Box::new(move |ready: Interest| FileEvent::fire(&weak, fd, ready));
        match self.backend.watch(self.fd, interest, handler) {
            Ok(()) => {
                self.state.borrow_mut().watching = true;
                trace!("arm(): watching fd {:?} (interest={:?})", self.fd, interest);
                Ok(())
            },
            Err(e) => {
                warn!("arm(): backend refused fd {:?} (error={:?})", self.fd, e);
                self.state.borrow_mut().arming.close();
                Err(e)
            },
        }
    }

    fn close(&self) {
        let watching: bool = {
            let mut state = self.state.borrow_mut();
            state.arming.close();
            ::std::mem::replace(&mut state.watching, false)
        };
        if watching {
            self.backend.unwatch(self.fd);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
