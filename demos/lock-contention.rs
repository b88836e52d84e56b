// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::clap::{
    Arg,
    ArgMatches,
    Command,
};
use ::crossbeam_channel::{
    unbounded,
    Receiver,
    Sender,
};
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};
use ::ukern::{
    runtime::logging,
    Config,
    Handle,
    InternalCriticalSection,
    Scheduler,
    SchedulerConfig,
};

//======================================================================================================================
// Constants
//======================================================================================================================

const TIMEOUT_SECONDS: Duration = Duration::from_secs(256);

//======================================================================================================================
// Program Arguments
//======================================================================================================================

#[derive(Debug)]
pub struct ProgramArguments {
    config_path: Option<String>,
    num_fibers: usize,
    num_iterations: usize,
    max_hold_iterations: u32,
}

impl ProgramArguments {
    const DEFAULT_NUM_FIBERS: usize = 16;
    const DEFAULT_NUM_ITERATIONS: usize = 10_000;
    const DEFAULT_MAX_HOLD_ITERATIONS: u32 = 256;

    pub fn new() -> Result<Self> {
        let matches: ArgMatches = Command::new("lock-contention")
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("PATH")
                    .help("Sets the scheduler configuration file"),
            )
            .arg(
                Arg::new("fibers")
                    .long("fibers")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets the number of contending fibers"),
            )
            .arg(
                Arg::new("iterations")
                    .long("iterations")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets the number of critical section entries per fiber"),
            )
            .arg(
                Arg::new("hold")
                    .long("hold")
                    .value_parser(clap::value_parser!(u32))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets the maximum busy iterations spent inside the critical section"),
            )
            .get_matches();

        let mut args: ProgramArguments = ProgramArguments {
            config_path: None,
            num_fibers: Self::DEFAULT_NUM_FIBERS,
            num_iterations: Self::DEFAULT_NUM_ITERATIONS,
            max_hold_iterations: Self::DEFAULT_MAX_HOLD_ITERATIONS,
        };

        if let Some(config_path) = matches.get_one::<String>("config") {
            args.config_path = Some(config_path.clone());
        }
        if let Some(num_fibers) = matches.get_one::<usize>("fibers") {
            if *num_fibers == 0 {
                anyhow::bail!("number of fibers must be positive");
            }
            args.num_fibers = *num_fibers;
        }
        if let Some(num_iterations) = matches.get_one::<usize>("iterations") {
            args.num_iterations = *num_iterations;
        }
        if let Some(max_hold_iterations) = matches.get_one::<u32>("hold") {
            args.max_hold_iterations = *max_hold_iterations;
        }

        Ok(args)
    }

    fn scheduler_config(&self) -> Result<SchedulerConfig> {
        match &self.config_path {
            Some(config_path) => Ok(Config::new(config_path)?.scheduler_config()?),
            None => Ok(SchedulerConfig::default()),
        }
    }
}

//======================================================================================================================
// Application
//======================================================================================================================

/// Latencies observed by one fiber.
struct FiberReport {
    min: Duration,
    max: Duration,
    total: Duration,
    count: usize,
}

struct Application {
    scheduler: Arc<Scheduler>,
    section: Arc<InternalCriticalSection>,
    args: ProgramArguments,
}

impl Application {
    pub fn new(args: ProgramArguments) -> Result<Self> {
        let config: SchedulerConfig = args.scheduler_config()?;
        println!("Scheduler: {:?}", config);
        let scheduler: Arc<Scheduler> = Scheduler::new(config)?;
        let section: Arc<InternalCriticalSection> = Arc::new(InternalCriticalSection::new(scheduler.clone()));
        Ok(Self {
            scheduler,
            section,
            args,
        })
    }

    pub fn run(&self) -> Result<()> {
        let num_cores: usize = self.scheduler.config().num_cores;
        let (tx, rx): (Sender<FiberReport>, Receiver<FiberReport>) = unbounded();
        let start_time: Instant = Instant::now();

        for i in 0..self.args.num_fibers {
            let tx: Sender<FiberReport> = tx.clone();
            let section: Arc<InternalCriticalSection> = self.section.clone();
            let scheduler: Arc<Scheduler> = self.scheduler.clone();
            let num_iterations: usize = self.args.num_iterations;
            let max_hold_iterations: u32 = self.args.max_hold_iterations;
            let handle: Handle = self.scheduler.create_thread_with(
                move || {
                    let mut rng: SmallRng = SmallRng::seed_from_u64(i as u64);
                    let mut report: FiberReport = FiberReport {
                        min: Duration::MAX,
                        max: Duration::ZERO,
                        total: Duration::ZERO,
                        count: 0,
                    };
                    for _ in 0..num_iterations {
                        let start: Instant = Instant::now();
                        {
                            let _guard = section.lock();
                            let hold: u32 = rng.gen_range(0..=max_hold_iterations);
                            for _ in 0..hold {
                                std::hint::spin_loop();
                            }
                        }
                        let elapsed: Duration = start.elapsed();
                        report.min = report.min.min(elapsed);
                        report.max = report.max.max(elapsed);
                        report.total += elapsed;
                        report.count += 1;
                        if rng.gen_bool(0.25) {
                            let _ = scheduler.yield_thread();
                        }
                    }
                    let _ = tx.send(report);
                },
                self.scheduler.config().default_stack_size,
                32,
                i % num_cores,
            )?;
            self.scheduler.start_thread(handle)?;
        }

        let mut min: Duration = Duration::MAX;
        let mut max: Duration = Duration::ZERO;
        let mut total: Duration = Duration::ZERO;
        let mut count: usize = 0;
        for _ in 0..self.args.num_fibers {
            let report: FiberReport = match rx.recv_timeout(TIMEOUT_SECONDS) {
                Ok(report) => report,
                Err(e) => anyhow::bail!("fiber did not report back: {:?}", e),
            };
            min = min.min(report.min);
            max = max.max(report.max);
            total += report.total;
            count += report.count;
        }
        let elapsed: Duration = start_time.elapsed();

        println!("fibers={} iterations={} elapsed={:?}", self.args.num_fibers, count, elapsed);
        if count > 0 {
            let avg: Duration = total / (count as u32);
            println!("latency: min={:?} avg={:?} max={:?}", min, avg, max);
        }
        Ok(())
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if let Err(e) = self.scheduler.shutdown() {
            println!("ERROR: shutdown() failed (error={:?})", e);
        }
    }
}

//======================================================================================================================
// main
//======================================================================================================================

fn main() -> Result<()> {
    logging::initialize();
    let args: ProgramArguments = ProgramArguments::new()?;
    let app: Application = Application::new(args)?;
    app.run()
}
