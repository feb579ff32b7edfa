// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

#[macro_use]
extern crate log;

use ::anyhow::Result;
use ::clap::{
    Arg,
    ArgMatches,
    Command,
};
use ::eventgen::{
    runtime::logging,
    Config,
    Coroutine,
    Fail,
    Outcome,
    Queue,
    Select,
    SharedTimer,
    Step,
    Thread,
    Timer,
    Value,
};
use ::std::time::{
    Duration,
    Instant,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Ping value that tells the ponger to stop.
const STOP: i64 = -1;

/// Granularity of the virtual clock.
const TICK: Duration = Duration::from_millis(1);

//======================================================================================================================
// Program Arguments
//======================================================================================================================

#[derive(Debug)]
pub struct ProgramArguments {
    rounds: i64,
    timeout: Duration,
    latency: Duration,
    slow_every: i64,
    config_path: Option<String>,
}

impl ProgramArguments {
    const DEFAULT_ROUNDS: i64 = 16;
    const DEFAULT_TIMEOUT_MS: u64 = 50;
    const DEFAULT_LATENCY_MS: u64 = 20;
    const DEFAULT_SLOW_EVERY: i64 = 4;

    pub fn new() -> Result<Self> {
        let matches: ArgMatches = Command::new("ping-pong")
            .arg(
                Arg::new("rounds")
                    .long("rounds")
                    .value_parser(clap::value_parser!(i64))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets number of pings to send"),
            )
            .arg(
                Arg::new("timeout")
                    .long("timeout")
                    .value_parser(clap::value_parser!(u64))
                    .required(false)
                    .value_name("MILLISECONDS")
                    .help("Sets how long the pinger waits for each pong"),
            )
            .arg(
                Arg::new("latency")
                    .long("latency")
                    .value_parser(clap::value_parser!(u64))
                    .required(false)
                    .value_name("MILLISECONDS")
                    .help("Sets how long the ponger takes to answer"),
            )
            .arg(
                Arg::new("slow-every")
                    .long("slow-every")
                    .value_parser(clap::value_parser!(i64))
                    .required(false)
                    .value_name("COUNT")
                    .help("Makes every n-th answer four times slower (0 disables)"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("PATH")
                    .help("Sets scheduler configuration file"),
            )
            .get_matches();

        let args: ProgramArguments = ProgramArguments {
            rounds: matches.get_one::<i64>("rounds").copied().unwrap_or(Self::DEFAULT_ROUNDS),
            timeout: Duration::from_millis(
                matches
                    .get_one::<u64>("timeout")
                    .copied()
                    .unwrap_or(Self::DEFAULT_TIMEOUT_MS),
            ),
            latency: Duration::from_millis(
                matches
                    .get_one::<u64>("latency")
                    .copied()
                    .unwrap_or(Self::DEFAULT_LATENCY_MS),
            ),
            slow_every: matches
                .get_one::<i64>("slow-every")
                .copied()
                .unwrap_or(Self::DEFAULT_SLOW_EVERY),
            config_path: matches.get_one::<String>("config").cloned(),
        };

        if args.rounds < 0 {
            anyhow::bail!("number of rounds must not be negative (rounds={:?})", args.rounds);
        }
        if args.slow_every < 0 {
            anyhow::bail!("slow-every must not be negative (slow-every={:?})", args.slow_every);
        }

        Ok(args)
    }
}

//======================================================================================================================
// Pinger
//======================================================================================================================

/// Sends numbered pings and waits for each pong, giving up on a round when its timer expires first.
struct Pinger {
    pings: Queue,
    timer: Timer,
    select: Select,
    round: i64,
    rounds: i64,
    timeout: Duration,
    received: i64,
    timeouts: i64,
    waiting: bool,
}

impl Pinger {
    fn new(pings: &Queue, pongs: &Queue, clock: &SharedTimer, args: &ProgramArguments) -> Self {
        let timer: Timer = Timer::new(clock.clone());
        let select: Select = Select::new();
        select.add(pongs);
        select.add(&timer);
        Self {
            pings: pings.clone(),
            timer,
            select,
            round: 0,
            rounds: args.rounds,
            timeout: args.timeout,
            received: 0,
            timeouts: 0,
            waiting: false,
        }
    }

    fn wait(&mut self) -> Result<Step, Fail> {
        self.waiting = true;
        Ok(Step::suspend(&self.select))
    }
}

impl Coroutine for Pinger {
    fn name(&self) -> &str {
        "pinger"
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        if self.waiting {
            self.waiting = false;
            match input? {
                Value::Fired { member: 0, value } if value.as_int() == Some(self.round) => {
                    self.timer.stop();
                    self.received += 1;
                    println!("pong {:?}", self.round);
                },
                Value::Fired { member: 0, value } => {
                    // Answer to a round that already timed out.
                    debug!("resume(): dropping stale pong {:?}", value);
                    return self.wait();
                },
                Value::Fired { member: 1, .. } => {
                    self.timeouts += 1;
                    println!("timeout {:?}", self.round);
                },
                value => {
                    let cause: String = format!("unexpected wake up (value={:?})", value);
                    error!("resume(): {}", cause);
                    return Err(Fail::new(libc::EINVAL, &cause));
                },
            }
            self.round += 1;
        }

        if self.round == self.rounds {
            self.pings.send(STOP);
            return Ok(Step::done(vec![Value::Int(self.received), Value::Int(self.timeouts)]));
        }
        self.pings.send(self.round);
        self.timer.start(self.timeout);
        self.wait()
    }
}

//======================================================================================================================
// Ponger
//======================================================================================================================

enum PongerStage {
    Start,
    Receiving,
    Sleeping(i64),
}

/// Answers every ping after a delay.
struct Ponger {
    pings: Queue,
    pongs: Queue,
    timer: Timer,
    latency: Duration,
    slow_every: i64,
    answered: i64,
    stage: PongerStage,
}

impl Ponger {
    fn new(pings: &Queue, pongs: &Queue, clock: &SharedTimer, args: &ProgramArguments) -> Self {
        Self {
            pings: pings.clone(),
            pongs: pongs.clone(),
            timer: Timer::new(clock.clone()),
            latency: args.latency,
            slow_every: args.slow_every,
            answered: 0,
            stage: PongerStage::Start,
        }
    }

    fn delay_for(&self, round: i64) -> Duration {
        if self.slow_every > 0 && round % self.slow_every == self.slow_every - 1 {
            self.latency * 4
        } else {
            self.latency
        }
    }
}

impl Coroutine for Ponger {
    fn name(&self) -> &str {
        "ponger"
    }

    fn resume(&mut self, input: Outcome) -> Result<Step, Fail> {
        match self.stage {
            PongerStage::Start => {
                self.stage = PongerStage::Receiving;
                Ok(Step::delegate(self.pings.get()))
            },
            PongerStage::Receiving => {
                let round: i64 = match input?.as_int() {
                    Some(round) => round,
                    None => return Err(Fail::new(libc::EINVAL, "ping is not a number")),
                };
                if round == STOP {
                    return Ok(Step::done(self.answered));
                }
                self.timer.start(self.delay_for(round));
                self.stage = PongerStage::Sleeping(round);
                Ok(Step::suspend(&self.timer))
            },
            PongerStage::Sleeping(round) => {
                input?;
                self.pongs.send(round);
                self.answered += 1;
                self.stage = PongerStage::Receiving;
                Ok(Step::delegate(self.pings.get()))
            },
        }
    }
}

//======================================================================================================================
// main()
//======================================================================================================================

fn main() -> Result<()> {
    let args: ProgramArguments = ProgramArguments::new()?;
    let config: Config = match &args.config_path {
        Some(path) => Config::new(path)?,
        None => Config::default(),
    };
    logging::initialize(&config.log_level()?);

    let start: Instant = Instant::now();
    let clock: SharedTimer = SharedTimer::new(start);
    let pings: Queue = Queue::new();
    let pongs: Queue = Queue::new();

    let ponger: Thread = Thread::with_config(Ponger::new(&pings, &pongs, &clock, &args), true, &config)?;
    let pinger: Thread = Thread::with_config(Pinger::new(&pings, &pongs, &clock, &args), true, &config)?;

    // Time only moves here. Every wake up happens from inside advance_clock().
    while !(pinger.is_done() && ponger.is_done()) {
        if clock.num_pending() == 0 {
            anyhow::bail!("threads are stuck (pinger={:?}, ponger={:?})", pinger.state(), ponger.state());
        }
        clock.advance_clock(clock.now() + TICK);
    }

    let counts: Vec<Value> = match pinger.result() {
        Some(Ok(Value::Tuple(counts))) => counts,
        Some(Ok(value)) => anyhow::bail!("pinger produced {:?}", value),
        Some(Err(e)) => anyhow::bail!("pinger failed: {:?}", e),
        None => anyhow::bail!("pinger did not finish"),
    };
    let answered: Option<i64> = match ponger.result() {
        Some(Ok(value)) => value.as_int(),
        Some(Err(e)) => anyhow::bail!("ponger failed: {:?}", e),
        None => None,
    };
    println!(
        "received={:?} timeouts={:?} answered={:?} elapsed={:?}",
        counts.first().and_then(Value::as_int),
        counts.get(1).and_then(Value::as_int),
        answered,
        clock.now().duration_since(start),
    );

    Ok(())
}
