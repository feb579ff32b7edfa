// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::SharedObject;
use ::core::cmp::Reverse;
use ::slab::Slab;
use ::std::{
    collections::BinaryHeap,
    time::{
        Duration,
        Instant,
    },
};

//==============================================================================
// Structures
//==============================================================================

/// Identifies a pending one-shot timer callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerKey {
    slot: usize,
    seq: u64,
}

struct TimerQueueEntry {
    expiry: Instant,
    key: TimerKey,
}

/// Timer that holds one or more callbacks for future wake up. Time only moves when [SharedTimer::advance_clock] is
/// called, which makes expiry order deterministic.
pub struct Timer {
    now: Instant,
    // Use a reverse to get a min heap.
    heap: BinaryHeap<Reverse<TimerQueueEntry>>,
    callbacks: Slab<(u64, Box<dyn FnOnce()>)>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct SharedTimer(SharedObject<Timer>);

//==============================================================================
// Traits
//==============================================================================

/// One-shot timer service consumed by [crate::event::timer::Timer].
pub trait TimerBackend {
    /// Schedules `callback` to run once after `delay`.
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerKey;
    /// Cancels a pending callback. Returns false if it already ran or was cancelled.
    fn cancel(&self, key: TimerKey) -> bool;
}

//==============================================================================
// Associate Functions
//==============================================================================

impl SharedTimer {
    pub fn new(now: Instant) -> Self {
        Self(SharedObject::<Timer>::new(Timer {
            now,
            heap: BinaryHeap::new(),
            callbacks: Slab::new(),
            next_seq: 0,
        }))
    }

    /// Moves time forward and runs every callback whose expiry has passed, earliest first.
    pub fn advance_clock(&self, now: Instant) {
        assert!(self.0.borrow().now <= now);

        // Callbacks run with the timer unborrowed so they may schedule or cancel other timers.
        while let Some(callback) = self.pop_expired(now) {
            callback();
        }
        self.0.borrow_mut().now = now;
    }

    fn pop_expired(&self, now: Instant) -> Option<Box<dyn FnOnce()>> {
        let mut timer = self.0.borrow_mut();
        loop {
            match timer.heap.peek() {
                Some(Reverse(entry)) if entry.expiry <= now => (),
                _ => return None,
            }
            let entry: TimerQueueEntry = timer
                .heap
                .pop()
                .expect("should have an entry because we were able to peek")
                .0;
            timer.now = entry.expiry;
            // Cancelled entries stay in the heap; skip them here.
            let live: bool = matches!(timer.callbacks.get(entry.key.slot), Some((seq, _)) if *seq == entry.key.seq);
            if live {
                let (_, callback) = timer.callbacks.remove(entry.key.slot);
                return Some(callback);
            }
        }
    }

    pub fn now(&self) -> Instant {
        self.0.borrow().now
    }

    /// Number of callbacks still waiting to run.
    pub fn num_pending(&self) -> usize {
        self.0.borrow().callbacks.len()
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl TimerBackend for SharedTimer {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerKey {
        let mut timer = self.0.borrow_mut();
        let seq: u64 = timer.next_seq;
        timer.next_seq += 1;
        let slot: usize = timer.callbacks.insert((seq, callback));
        let key: TimerKey = TimerKey { slot, seq };
        let expiry: Instant = timer.now + delay;
        timer.heap.push(Reverse(TimerQueueEntry { expiry, key }));
        trace!("schedule(): timer armed (key={:?}, delay={:?})", key, delay);
        key
    }

    fn cancel(&self, key: TimerKey) -> bool {
        let mut timer = self.0.borrow_mut();
        let live: bool = matches!(timer.callbacks.get(key.slot), Some((seq, _)) if *seq == key.seq);
        if live {
            drop(timer.callbacks.remove(key.slot));
            trace!("cancel(): timer cancelled (key={:?})", key);
        }
        live
    }
}

impl Default for SharedTimer {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &TimerQueueEntry) -> bool {
        self.expiry == other.expiry && self.key.seq == other.key.seq
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &TimerQueueEntry) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    // Ties on expiry go to the timer scheduled first.
    fn cmp(&self, other: &TimerQueueEntry) -> core::cmp::Ordering {
        self.expiry.cmp(&other.expiry).then(self.key.seq.cmp(&other.key.seq))
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
