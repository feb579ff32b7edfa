// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//==============================================================================
// Imports
//==============================================================================

use ::anyhow::Result;
use ::eventgen::{
    ensure_eq,
    scheduler::from_fn,
    Callback,
    Event,
    Fail,
    FileEvent,
    Interest,
    IoBackend,
    Outcome,
    Queue,
    Select,
    SharedTimer,
    Step,
    Thread,
    ThreadState,
    Timer,
    Value,
};
use ::libc::c_int;
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
    time::{
        Duration,
        Instant,
    },
};
use common::{
    new_log,
    wait_on,
    Log,
};

//==============================================================================
// Helpers
//==============================================================================

/// Readiness backend driven by hand.
#[derive(Default)]
struct ManualBackend {
    handlers: RefCell<HashMap<c_int, Rc<RefCell<Box<dyn FnMut(Interest)>>>>>,
}

impl ManualBackend {
    fn make_ready(&self, fd: c_int, ready: Interest) {
        // The handler runs with the table unborrowed, so it may unwatch.
        let handler: Option<Rc<RefCell<Box<dyn FnMut(Interest)>>>> = self.handlers.borrow().get(&fd).cloned();
        if let Some(handler) = handler {
            let mut handler = handler.borrow_mut();
            (&mut **handler)(ready);
        }
    }

    fn is_watched(&self, fd: c_int) -> bool {
        self.handlers.borrow().contains_key(&fd)
    }
}

impl IoBackend for ManualBackend {
    fn watch(&self, fd: c_int, _: Interest, handler: Box<dyn FnMut(Interest)>) -> Result<(), Fail> {
        self.handlers.borrow_mut().insert(fd, Rc::new(RefCell::new(handler)));
        Ok(())
    }

    fn unwatch(&self, fd: c_int) {
        self.handlers.borrow_mut().remove(&fd);
    }
}

/// Coroutine that drains `count` items from `queue` with [Queue::get], collecting them.
fn drain(queue: &Queue, count: usize) -> impl ::eventgen::Coroutine {
    let queue: Queue = queue.clone();
    let mut items: Vec<Value> = Vec::new();
    let mut started: bool = false;
    from_fn("drain", move |input: Outcome| {
        if started {
            items.push(input?);
        }
        started = true;
        if items.len() == count {
            return Ok(Step::done(Value::Tuple(items.clone())));
        }
        Ok(Step::delegate(queue.get()))
    })
}

//==============================================================================
// Composite
//==============================================================================

/// Firing one member delivers its index and value, and the other members can no longer deliver.
#[test]
fn select_delivers_first_member_only() -> Result<()> {
    let (a, b, c) = (Callback::new(), Callback::new(), Callback::new());
    let select: Select = Select::new();
    for callback in [&a, &b, &c] {
        select.add(callback);
    }
    let thread: Thread = Thread::joinable(wait_on("select", &select));

    b.send("b");
    a.send("a");
    ensure_eq!(a.is_armed(), false);
    ensure_eq!(c.is_armed(), false);
    ensure_eq!(
        thread.result(),
        Some(Ok(Value::Fired {
            member: 1,
            value: Box::new(Value::from("b")),
        }))
    );
    Ok(())
}

/// A timer raced against a queue: the message wins if it arrives first, the timer wins otherwise.
#[test]
fn timeout_races_queue_against_timer() -> Result<()> {
    let now: Instant = Instant::now();
    let clock: SharedTimer = SharedTimer::new(now);

    // Message arrives in time.
    let queue: Queue = Queue::new();
    let timer: Timer = Timer::new(clock.clone());
    timer.start(Duration::from_secs(1));
    let select: Select = Select::new();
    select.add(&queue);
    select.add(&timer);
    let thread: Thread = Thread::joinable(wait_on("receive", &select));
    queue.send(7);
    ensure_eq!(
        thread.result(),
        Some(Ok(Value::Fired {
            member: 0,
            value: Box::new(Value::Int(7)),
        }))
    );
    timer.stop();

    // Nothing arrives.
    let queue: Queue = Queue::new();
    let timer: Timer = Timer::new(clock.clone());
    timer.start(Duration::from_secs(1));
    let select: Select = Select::from_events(vec![Box::new(queue.clone()) as Box<dyn Event>, Box::new(timer.clone())]);
    let thread: Thread = Thread::joinable(wait_on("receive", &select));
    clock.advance_clock(now + Duration::from_secs(1));
    ensure_eq!(
        thread.result(),
        Some(Ok(Value::Fired {
            member: 1,
            value: Box::new(Value::None),
        }))
    );
    // A message sent after the timeout stays queued.
    queue.send(8);
    ensure_eq!(queue.len(), 1);
    Ok(())
}

/// Closing a thread waiting on a composite disarms every member.
#[test]
fn closing_thread_disarms_composite() -> Result<()> {
    let (a, b) = (Callback::new(), Callback::new());
    let select: Select = Select::new();
    select.add(&a);
    select.add(&b);
    let thread: Thread = Thread::joinable(wait_on("select", &select));
    thread.close();
    ensure_eq!(a.is_armed(), false);
    ensure_eq!(b.is_armed(), false);
    a.send(1);
    ensure_eq!(
        thread.result().map(|outcome| outcome.map_err(|f| f.errno)),
        Some(Err(libc::ECANCELED))
    );
    Ok(())
}

//==============================================================================
// Queue
//==============================================================================

/// Values queued before anyone waits come out in the order they were sent.
#[test]
fn queue_preserves_send_order() -> Result<()> {
    let mut rng: SmallRng = SmallRng::seed_from_u64(7);
    let sent: Vec<i64> = (0..64).map(|_| rng.gen_range(-1000..1000)).collect();

    let mut queue: Queue = Queue::new();
    for value in sent.iter() {
        queue.send(*value);
    }
    let drained: Vec<i64> = queue
        .by_ref()
        .map(|outcome: Outcome| outcome.ok().and_then(|value: Value| value.as_int()).unwrap_or(i64::MIN))
        .collect();
    ensure_eq!(drained, sent);
    Ok(())
}

/// A reader suspended on the queue gets messages as they are sent, bypassing the buffer.
#[test]
fn queue_reader_mixes_buffered_and_live_messages() -> Result<()> {
    let queue: Queue = Queue::new();
    queue.send(1);
    queue.send(2);
    let reader: Thread = Thread::joinable(drain(&queue, 4));
    ensure_eq!(queue.is_empty(), true);
    ensure_eq!(reader.state(), ThreadState::Suspended);

    queue.send(3);
    ensure_eq!(queue.is_empty(), true);
    queue.trigger(vec![Value::Int(4), Value::from("four")]);
    ensure_eq!(
        reader.result(),
        Some(Ok(Value::Tuple(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Tuple(vec![Value::Int(4), Value::from("four")]),
        ])))
    );
    Ok(())
}

/// A failure sent through the queue is raised in the reader.
#[test]
fn queue_throw_raises_in_reader() -> Result<()> {
    let queue: Queue = Queue::new();
    let reader: Thread = Thread::joinable(drain(&queue, 1));
    queue.throw(Fail::new(libc::EPIPE, "closed by peer"));
    let fail: Fail = match reader.result() {
        Some(Err(fail)) => fail,
        outcome => anyhow::bail!("unexpected outcome {:?}", outcome),
    };
    ensure_eq!(fail.errno, libc::EPIPE);
    ensure_eq!(fail.traceback, vec!["queue-get".to_string(), "drain".to_string()]);
    Ok(())
}

//==============================================================================
// Timer
//==============================================================================

/// A thread sleeping on a timer wakes up when the clock reaches the deadline.
#[test]
fn thread_sleeps_on_timer() -> Result<()> {
    let now: Instant = Instant::now();
    let clock: SharedTimer = SharedTimer::new(now);
    let timer: Timer = Timer::new(clock.clone());
    timer.start(Duration::from_millis(250));
    let sleeper: Thread = Thread::joinable(wait_on("sleep", &timer));

    clock.advance_clock(now + Duration::from_millis(100));
    ensure_eq!(sleeper.is_done(), false);
    clock.advance_clock(now + Duration::from_millis(250));
    ensure_eq!(sleeper.result(), Some(Ok(Value::None)));
    ensure_eq!(timer.is_running(), false);
    Ok(())
}

//==============================================================================
// File
//==============================================================================

/// A thread waiting for readability is resumed with the ready operations.
#[test]
fn thread_waits_for_readiness() -> Result<()> {
    let backend: Rc<ManualBackend> = Rc::new(ManualBackend::default());
    let event: FileEvent = FileEvent::new(7, backend.clone()).readable();
    let thread: Thread = Thread::joinable(wait_on("read", &event));
    ensure_eq!(backend.is_watched(7), true);

    backend.make_ready(7, Interest::WRITABLE);
    ensure_eq!(thread.is_done(), false);
    backend.make_ready(
        7,
        Interest {
            readable: true,
            writable: true,
        },
    );
    ensure_eq!(
        thread.result(),
        Some(Ok(Value::Ready {
            fd: 7,
            ops: Interest::READABLE,
        }))
    );
    // Resuming the thread closed the event, which stopped the watch.
    ensure_eq!(backend.is_watched(7), false);
    Ok(())
}

/// An event that cannot be armed fails inside the frame that waited on it.
#[test]
fn arm_failure_is_raised_in_waiting_frame() -> Result<()> {
    let backend: Rc<ManualBackend> = Rc::new(ManualBackend::default());
    let event: FileEvent = FileEvent::new(3, backend);
    let errors: Log<c_int> = new_log();
    let sink: Log<c_int> = errors.clone();
    let mut waiting: bool = false;
    let thread: Thread = Thread::joinable(from_fn("reader", move |input: Outcome| {
        if waiting {
            if let Err(fail) = input {
                sink.borrow_mut().push(fail.errno);
            }
            return Ok(Step::done("recovered"));
        }
        waiting = true;
        Ok(Step::suspend(&event))
    }));
    ensure_eq!(thread.result(), Some(Ok(Value::from("recovered"))));
    ensure_eq!(*errors.borrow(), vec![libc::EINVAL]);
    Ok(())
}
