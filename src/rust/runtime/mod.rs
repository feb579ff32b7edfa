// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod config;
pub mod fail;
pub mod logging;
pub mod result;
pub mod timer;
pub mod value;

pub use self::{
    fail::Fail,
    result::Outcome,
    value::{
        Interest,
        Value,
    },
};

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    cell::{
        Ref,
        RefCell,
        RefMut,
    },
    rc::{
        Rc,
        Weak,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// The SharedObject wraps an object that will be shared across coroutines and the events they wait on.
///
/// Borrows are checked at run time. A borrow must never be held across a call that may fire an event, because firing
/// re-enters whichever thread was waiting on it.
pub struct SharedObject<T>(Rc<RefCell<T>>);

/// Non-owning reference to a [SharedObject].
pub struct WeakObject<T>(Weak<RefCell<T>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Mutably borrows the object, or returns `None` if it is already borrowed.
    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, T>> {
        self.0.try_borrow_mut().ok()
    }

    pub fn downgrade(&self) -> WeakObject<T> {
        WeakObject(Rc::downgrade(&self.0))
    }
}

impl<T> WeakObject<T> {
    pub fn upgrade(&self) -> Option<SharedObject<T>> {
        self.0.upgrade().map(SharedObject)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Clone for WeakObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Default> Default for SharedObject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
