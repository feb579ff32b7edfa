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
        WeakObject,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

#[derive(Default)]
struct SelectState {
    arming: Arming,
    members: Vec<Box<dyn Event>>,
}

/// An event triggered by any of a set of alternatives.
///
/// Fires with [Value::Fired] naming the index of the member that fired and carrying that member's value. A failure
/// delivered by a member is passed through as is. Members only hold a weak reference back to the set, so a member
/// firing after the set was dropped does nothing.
#[derive(Clone, Default)]
pub struct Select(SharedObject<SelectState>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: impl IntoIterator<Item = Box<dyn Event>>) -> Self {
        let select: Select = Self::new();
        for event in events {
            select.add_boxed(event);
        }
        select
    }

    /// Adds a member and returns its index. Must not be called while the set is armed.
    pub fn add<E: Event + Clone + 'static>(&self, event: &E) -> usize {
        self.add_boxed(Box::new(event.clone()))
    }

    pub fn add_boxed(&self, event: Box<dyn Event>) -> usize {
        let mut state = self.0.borrow_mut();
        if state.arming.is_armed() {
            panic!("member added to an armed select");
        }
        state.members.push(event);
        state.members.len() - 1
    }

    pub fn len(&self) -> usize {
        self.0.borrow().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().members.is_empty()
    }

    fn close_members(&self) {
        for member in self.0.borrow().members.iter() {
            member.close();
        }
    }

    /// Runs when member `index` fires.
    fn fire(select: &WeakObject<SelectState>, index: usize, outcome: Outcome) {
        let select: Select = match select.upgrade() {
            Some(state) => Select(state),
            None => return,
        };
        let resumer: Option<Resumer> = select.0.borrow_mut().arming.take();
        let resumer: Resumer = match resumer {
            Some(resumer) => resumer,
            None => {
                debug!("fire(): select is closed, dropping outcome of member {:?}", index);
                return;
            },
        };
        // Every member is closed before the waiter runs, so a second member cannot deliver again.
        select.close_members();
        trace!("fire(): member {:?} fired", index);
        resumer(outcome.map(|value: Value| Value::Fired {
            member: index,
            value: Box::new(value),
        }));
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Event for Select {
    /// Arms every member. Arming is all-or-nothing: if a member refuses, the members armed so far are closed again.
    fn arm(&self, resumer: Resumer) -> Result<(), Fail> {
        self.0.borrow_mut().arming.arm(resumer);
        let weak: WeakObject<SelectState> = self.0.downgrade();
        let failure: Option<Fail> = {
            let state = self.0.borrow();
            let mut failure: Option<Fail> = None;
            for (index, member) in state.members.iter().enumerate() {
                let weak: WeakObject<SelectState> = weak.clone();
                let trigger: Resumer = Box::new(move |outcome: Outcome| Select::fire(&weak, index, outcome));
                if let Err(e) = member.arm(trigger) {
                    warn!("arm(): member {:?} failed to arm, rolling back (error={:?})", index, e);
                    for armed in state.members[..index].iter() {
                        armed.close();
                    }
                    failure = Some(e);
                    break;
                }
            }
            failure
        };
        match failure {
            Some(e) => {
                self.0.borrow_mut().arming.close();
                Err(e)
            },
            None => Ok(()),
        }
    }

    fn close(&self) {
        self.close_members();
        self.0.borrow_mut().arming.close();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
