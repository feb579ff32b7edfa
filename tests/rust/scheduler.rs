// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//==============================================================================
// Imports
//==============================================================================

use ::anyhow::Result;
use ::eventgen::{
    ensure_eq,
    scheduler::{
        self,
        from_fn,
    },
    Callback,
    Coroutine,
    Fail,
    Lock,
    Outcome,
    Step,
    Thread,
    ThreadState,
    Value,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use common::{
    call_then,
    logs_close,
    new_log,
    recording_sinks,
    wait_on,
    Log,
};

//==============================================================================
// Helpers
//==============================================================================

/// Builds `depth` nested frames whose innermost one waits on `callback`.
fn nested(depth: usize, callback: &Callback) -> Box<dyn Coroutine> {
    let mut coroutine: Box<dyn Coroutine> = Box::new(wait_on("leaf", callback));
    for _ in 0..depth {
        coroutine = Box::new(call_then("level", coroutine, Ok));
    }
    coroutine
}

fn as_int(value: Value) -> Result<i64, Fail> {
    value
        .as_int()
        .ok_or_else(|| Fail::new(libc::EINVAL, "expected an integer"))
}

//==============================================================================
// Scenarios
//==============================================================================

/// A waits on a callback and doubles what it gets; B adds one to what A returns.
#[test]
fn nested_coroutine_resumed_with_five_yields_eleven() -> Result<()> {
    let callback: Callback = Callback::new();
    let a = call_then("a", Box::new(wait_on("a-wait", &callback)), |x: Value| {
        Ok(Value::Int(as_int(x)? * 2))
    });
    let b = call_then("b", Box::new(a), |v: Value| Ok(Value::Int(as_int(v)? + 1)));

    let thread: Thread = Thread::joinable(b);
    ensure_eq!(thread.state(), ThreadState::Suspended);
    callback.send(5);
    ensure_eq!(thread.result(), Some(Ok(Value::Int(11))));
    Ok(())
}

/// A failure raised three frames deep reaches the error sink exactly once with application frames only.
#[test]
fn failure_three_frames_deep_is_reported_once() -> Result<()> {
    let (sinks, seen) = recording_sinks();
    let inner = from_fn("inner", |_| Err::<Step, Fail>(Fail::new(libc::EINVAL, "boom")));
    let middle = call_then("middle", Box::new(inner), Ok);
    let outer = call_then("outer", Box::new(middle), Ok);

    let thread: Thread = Thread::with_sinks(outer, false, sinks);
    ensure_eq!(thread.is_done(), true);
    ensure_eq!(seen.borrow().len(), 1);
    let fail: Fail = match seen.borrow()[0].clone() {
        Err(fail) => fail,
        Ok(value) => anyhow::bail!("unexpected value {:?}", value),
    };
    ensure_eq!(fail.cause, "boom".to_string());
    ensure_eq!(fail.errno, libc::EINVAL);
    ensure_eq!(
        fail.traceback,
        vec!["inner".to_string(), "middle".to_string(), "outer".to_string()]
    );
    Ok(())
}

//==============================================================================
// Properties
//==============================================================================

/// The stack never grows past N+1 frames and empties exactly once.
#[test]
fn stack_depth_follows_nesting() -> Result<()> {
    let mut rng: SmallRng = SmallRng::seed_from_u64(42);
    for _ in 0..16 {
        let depth: usize = rng.gen_range(0..32);
        let callback: Callback = Callback::new();
        let (sinks, seen) = recording_sinks();
        let thread: Thread = Thread::with_sinks(nested(depth, &callback), false, sinks);

        ensure_eq!(thread.depth(), depth + 1);
        ensure_eq!(thread.extract_stack().last().cloned(), Some("leaf".to_string()));
        callback.send(depth);
        ensure_eq!(thread.depth(), 0);
        ensure_eq!(*seen.borrow(), vec![Ok(Value::Int(depth as i64))]);
    }
    Ok(())
}

/// A thrown failure surfaces at the suspension point with its cause chain.
#[test]
fn thrown_failure_reaches_yield_point() -> Result<()> {
    let callback: Callback = Callback::new();
    let waiter = call_then("catcher", Box::new(wait_on("waiter", &callback)), Ok);
    let log: Log<Fail> = new_log();
    let sink: Log<Fail> = log.clone();
    let mut inner = Some(waiter);
    let handler = from_fn("handler", move |input: Outcome| match inner.take() {
        Some(waiter) => Ok(Step::delegate(waiter)),
        None => {
            if let Err(fail) = input {
                sink.borrow_mut().push(fail);
            }
            Ok(Step::done("handled"))
        },
    });

    let thread: Thread = Thread::joinable(handler);
    let root: Fail = Fail::new(libc::ECONNRESET, "peer went away");
    callback.throw(Fail::new(libc::EIO, "read failed").with_source(root.clone()));

    ensure_eq!(thread.result(), Some(Ok(Value::from("handled"))));
    let fail: Fail = log.borrow()[0].clone();
    ensure_eq!(fail.cause, "read failed".to_string());
    ensure_eq!(fail.source.as_deref(), Some(&root));
    ensure_eq!(fail.traceback, vec!["waiter".to_string(), "catcher".to_string()]);
    Ok(())
}

/// Closing a suspended thread closes every frame once, innermost first, and disarms the event.
#[test]
fn close_runs_cleanup_innermost_first() -> Result<()> {
    let callback: Callback = Callback::new();
    let log: Log<&'static str> = new_log();
    let inner = logs_close("inner", &log, Box::new(wait_on("leaf", &callback)));
    let middle = logs_close("middle", &log, inner);
    let outer = logs_close("outer", &log, middle);

    let (sinks, seen) = recording_sinks();
    let thread: Thread = Thread::with_sinks(call_then("root", outer, Ok), false, sinks);
    thread.close();
    thread.close();

    ensure_eq!(*log.borrow(), vec!["inner", "middle", "outer"]);
    ensure_eq!(callback.is_armed(), false);
    // A late fire from the backend must not reach the torn down stack.
    callback.send(1);
    ensure_eq!(seen.borrow().is_empty(), true);
    ensure_eq!(thread.is_done(), true);
    Ok(())
}

/// Waiters get the lock in the order they asked for it.
#[test]
fn lock_wakes_waiters_in_fifo_order() -> Result<()> {
    let lock: Lock = Lock::new();
    let log: Log<&'static str> = new_log();
    ensure_eq!(lock.try_acquire(), true);

    let mut threads: Vec<Thread> = Vec::new();
    for name in ["t1", "t2", "t3"] {
        let log: Log<&'static str> = log.clone();
        let body = from_fn(name, move |_| {
            log.borrow_mut().push(name);
            Ok(Step::done(()))
        });
        threads.push(Thread::joinable(lock.locked(body)));
    }
    ensure_eq!(lock.num_waiters(), 3);
    ensure_eq!(log.borrow().is_empty(), true);

    lock.release()?;
    ensure_eq!(*log.borrow(), vec!["t1", "t2", "t3"]);
    ensure_eq!(lock.is_held(), false);
    for thread in threads.iter() {
        ensure_eq!(thread.result(), Some(Ok(Value::None)));
    }
    Ok(())
}

/// A waiter whose thread was closed is skipped when the lock is handed over.
#[test]
fn lock_skips_cancelled_waiters() -> Result<()> {
    let lock: Lock = Lock::new();
    ensure_eq!(lock.try_acquire(), true);
    let cancelled: Thread = Thread::joinable(lock.acquire());
    let waiting: Thread = Thread::joinable(lock.acquire());
    cancelled.close();

    lock.release()?;
    ensure_eq!(waiting.result(), Some(Ok(Value::None)));
    ensure_eq!(lock.is_held(), true);
    lock.release()?;
    ensure_eq!(lock.is_held(), false);
    ensure_eq!(lock.release().map_err(|e| e.errno), Err(libc::EPERM));
    Ok(())
}

/// Closing a thread inside a locked section gives the lock back.
#[test]
fn closing_locked_section_releases_lock() -> Result<()> {
    let lock: Lock = Lock::new();
    let callback: Callback = Callback::new();
    let thread: Thread = Thread::joinable(lock.locked(wait_on("holder", &callback)));
    ensure_eq!(lock.is_held(), true);
    ensure_eq!(
        thread.extract_stack(),
        vec!["locked holder".to_string(), "holder".to_string()]
    );
    thread.close();
    ensure_eq!(lock.is_held(), false);
    Ok(())
}

/// Joining a finished thread twice yields the same stored outcome without running anything again.
#[test]
fn join_returns_stored_outcome_every_time() -> Result<()> {
    let runs: Log<()> = new_log();
    let counter: Log<()> = runs.clone();
    let target: Thread = Thread::joinable(from_fn("target", move |_| {
        counter.borrow_mut().push(());
        Err(Fail::new(libc::ENOENT, "missing"))
    }));
    ensure_eq!(target.is_done(), true);

    let first: Thread = Thread::joinable(target.join());
    let second: Thread = Thread::joinable(target.join());
    ensure_eq!(first.result(), second.result());
    let fail: Fail = match first.result() {
        Some(Err(fail)) => fail,
        outcome => anyhow::bail!("unexpected outcome {:?}", outcome),
    };
    ensure_eq!(fail.cause, "missing".to_string());
    ensure_eq!(fail.traceback, vec!["target".to_string(), "join".to_string()]);
    ensure_eq!(runs.borrow().len(), 1);
    Ok(())
}

/// Every concurrent joiner is woken when the thread finishes.
#[test]
fn join_waits_for_running_thread() -> Result<()> {
    let callback: Callback = Callback::new();
    let target: Thread = Thread::joinable(wait_on("target", &callback));
    let joiners: Vec<Thread> = (0..3).map(|_| Thread::joinable(target.join())).collect();
    for joiner in joiners.iter() {
        ensure_eq!(joiner.state(), ThreadState::Suspended);
    }

    callback.send(9);
    for joiner in joiners.iter() {
        ensure_eq!(joiner.result(), Some(Ok(Value::Int(9))));
    }
    Ok(())
}

/// Joiners of a cancelled thread see the cancellation.
#[test]
fn join_reports_cancellation() -> Result<()> {
    let callback: Callback = Callback::new();
    let target: Thread = Thread::joinable(wait_on("target", &callback));
    let joiner: Thread = Thread::joinable(target.join());
    target.close();
    ensure_eq!(
        joiner.result().map(|outcome| outcome.map_err(|f| f.errno)),
        Some(Err(libc::ECANCELED))
    );
    Ok(())
}

/// A non-joinable thread joins to nothing.
#[test]
fn join_on_reporting_thread_yields_none() -> Result<()> {
    let (sinks, _) = recording_sinks();
    let target: Thread = Thread::with_sinks(scheduler::ready(3), false, sinks);
    let joiner: Thread = Thread::joinable(target.join());
    ensure_eq!(joiner.result(), Some(Ok(Value::None)));
    Ok(())
}
