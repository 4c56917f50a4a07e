use anyhow::{Context, Result};
use clap::Parser;
use gauntlet::{
    environment::{CartPole, Catch, MountainCar},
    scoring::SystemClock,
    Driver, EncodingDescriptor, EnvironmentKind, Export, LocalController, RunConfig,
    ScoringFunction, Seeded, SeededScoring, XorScoring,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Evolve networks against a scoring function until one of them wins
#[derive(Parser, Debug)]
#[command(name = "gauntlet", version, about, long_about = None)]
struct Cli {
    /// JSON run configuration, overridden by any flag given
    #[arg(short, long, env = "GAUNTLET_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, env = "GAUNTLET_ENV")]
    env: Option<EnvironmentKind>,

    #[arg(short, long, env = "GAUNTLET_GENERATIONS")]
    generations: Option<usize>,

    #[arg(short, long, env = "GAUNTLET_POPULATION")]
    population: Option<usize>,

    /// Hidden layer sizes, for flat encodings
    #[arg(long, value_delimiter = ',', env = "GAUNTLET_HIDDEN")]
    hidden: Option<Vec<usize>>,

    /// Seed of both the environments and the controller
    #[arg(short, long, env = "GAUNTLET_SEED")]
    seed: Option<u64>,

    #[arg(long, env = "GAUNTLET_STEP_CAP")]
    step_cap: Option<usize>,

    /// Winning score, instead of the environment's own
    #[arg(long, env = "GAUNTLET_THRESHOLD")]
    threshold: Option<f64>,

    /// Evaluation threads the controller may use
    #[arg(long, env = "GAUNTLET_WORKERS")]
    workers: Option<usize>,

    /// Instances the scoring function allows to run at once
    #[arg(long, env = "GAUNTLET_MAX_THREADS")]
    max_threads: Option<usize>,

    /// Keep instances across generations, restarting them
    #[arg(long, env = "GAUNTLET_NO_FLUSH")]
    no_flush: bool,

    /// Keep evolving after a winner is found
    #[arg(long, env = "GAUNTLET_KEEP_GOING")]
    keep_going: bool,

    /// Write the winner here instead of stdout
    #[arg(long, env = "GAUNTLET_EXPORT")]
    export: Option<PathBuf>,

    /// Keep every generation's result and champion in this directory
    #[arg(long, env = "GAUNTLET_ARCHIVE")]
    archive: Option<PathBuf>,

    /// Run the environment in real time, ticking every this many milliseconds
    #[arg(long, env = "GAUNTLET_REALTIME_TICK_MS")]
    realtime_tick_ms: Option<u64>,

    /// Log JSON lines
    #[arg(long, env = "GAUNTLET_JSON")]
    json: bool,

    /// More logging, repeat for more still
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("loading run configuration {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(env) = self.env {
            config.environment = env;
        }
        if let Some(generations) = self.generations {
            config.generations = generations;
        }
        if let Some(population) = self.population {
            config.controller.population = population;
        }
        if let Some(hidden) = &self.hidden {
            config.controller.hidden = hidden.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
            config.controller.seed = seed;
        }
        if let Some(cap) = self.step_cap {
            config.step_cap = cap;
        }
        if self.threshold.is_some() {
            config.threshold = self.threshold;
        }
        if let Some(workers) = self.workers {
            config.controller.workers = workers;
        }
        if let Some(threads) = self.max_threads {
            config.max_threads = threads;
        }
        if self.no_flush {
            config.flush_between = false;
        }
        if self.keep_going {
            config.stop_on_winner = false;
        }
        if self.export.is_some() {
            config.export = self.export.clone();
        }
        if self.archive.is_some() {
            config.archive = self.archive.clone();
        }
        if self.realtime_tick_ms.is_some() {
            config.realtime_tick_ms = self.realtime_tick_ms;
        }

        config.validate().context("invalid run configuration")?;
        Ok(config)
    }

    fn level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    // stdout carries the winner, so logs go to stderr
    if json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

fn drive<S>(scoring: S, descriptor: EncodingDescriptor, config: &RunConfig) -> Result<()>
where
    S: ScoringFunction,
    S::Instance: Send,
{
    let controller = LocalController::<S>::new(config.controller.clone());
    let export = config.export.clone().map_or(Export::Stdout, Export::File);
    let mut driver = Driver::new(controller, scoring, descriptor)
        .generations(config.generations)
        .stop_on_winner(config.stop_on_winner)
        .export(Some(export));
    if let Some(dir) = &config.archive {
        driver = driver.archive(dir);
    }

    let outcome = driver.run().context("training run failed")?;
    match outcome.winner {
        Some(winner) => info!(
            generation = winner.generation,
            fitness = winner.fitness,
            generations = outcome.generations,
            "winner exported"
        ),
        None => warn!(generations = outcome.generations, "no winner found"),
    }
    Ok(())
}

fn episode<E>(config: &RunConfig) -> Result<()>
where
    E: Seeded + Send,
{
    let mut scoring = SeededScoring::<E>::seeded(config.seed)
        .step_cap(config.step_cap)
        .threads(config.max_threads())
        .flush(config.flush_between);
    if let Some(threshold) = config.threshold {
        scoring = scoring.threshold(threshold);
    }
    if let Some(tick) = config.realtime_tick() {
        scoring = scoring.realtime(tick, Arc::new(SystemClock::new()));
    }
    let descriptor = scoring
        .descriptor()
        .context("describing the environment's encoding")?;
    info!(
        inputs = descriptor.input_arity(),
        outputs = descriptor.output_arity(),
        "encoding"
    );
    drive(scoring, descriptor, config)
}

fn xor(config: &RunConfig) -> Result<()> {
    if config.controller.hidden.is_empty() {
        warn!("xor isn't linearly separable, a run without --hidden layers can't win");
    }
    if config.realtime_tick_ms.is_some() || config.threshold.is_some() {
        warn!("xor is turn based with a fixed winning condition, ignoring tick and threshold");
    }
    let scoring = XorScoring::new(config.seed).threads(config.max_threads());
    drive(scoring, EncodingDescriptor::flat(3, 1)?, config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.level());
    let config = cli.run_config()?;
    info!(environment = ?config.environment, seed = config.seed, "starting run");

    match config.environment {
        EnvironmentKind::Xor => xor(&config),
        EnvironmentKind::CartPole => episode::<CartPole>(&config),
        EnvironmentKind::MountainCar => episode::<MountainCar>(&config),
        EnvironmentKind::Catch => episode::<Catch>(&config),
    }
}
