//! Scoring through message passing, for instances that must stay on the thread they were built
//! on. Every instance lives on its own worker thread and is driven by typed requests, so the
//! handle the assessor holds is [Send] whatever the instance is.

use crate::{
    constants::GAUNTLET_WORST_SCORE,
    error::EnvError,
    scoring::{Input, ScoringFunction, ScoringInstance},
};
use core::{marker::PhantomData, num::NonZeroUsize};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, warn};

type Factory<I> = Arc<dyn Fn() -> Result<I, EnvError> + Send + Sync>;

#[derive(Debug)]
enum Request {
    Input,
    Output(Vec<f64>),
    Score,
    Winner,
    Restart,
    Shutdown,
}

#[derive(Debug)]
enum Reply {
    Ready(Result<(), EnvError>),
    Input(Result<Input, EnvError>),
    /// The episode ended, with this verdict
    Done {
        score: f64,
        winner: bool,
    },
    Output(Result<(), EnvError>),
    Score(f64),
    Winner(bool),
    Restart(Result<(), EnvError>),
}

fn disconnected() -> EnvError {
    EnvError::Fatal("scoring worker disconnected".into())
}

fn unexpected(reply: Reply) -> EnvError {
    EnvError::Fatal(format!("scoring worker answered out of turn: {reply:?}"))
}

/// Builds the instance on this thread, then answers requests until shut down or orphaned
fn serve<I: ScoringInstance>(
    factory: Factory<I>,
    requests: Receiver<Request>,
    replies: Sender<Reply>,
) {
    let mut instance = match factory() {
        Ok(instance) => instance,
        Err(err) => {
            let _ = replies.send(Reply::Ready(Err(err)));
            return;
        }
    };
    if replies.send(Reply::Ready(Ok(()))).is_err() {
        return;
    }

    for request in requests {
        let reply = match request {
            Request::Input => match instance.generate_input() {
                Ok(Input::Done) => Reply::Done {
                    score: instance.score(),
                    winner: instance.is_winner(),
                },
                input => Reply::Input(input),
            },
            Request::Output(output) => Reply::Output(instance.accept_output(&output)),
            Request::Score => Reply::Score(instance.score()),
            Request::Winner => Reply::Winner(instance.is_winner()),
            Request::Restart => Reply::Restart(instance.restart()),
            Request::Shutdown => break,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    debug!("scoring worker done");
}

/// A [ScoringFunction] over instances built by `factory`, each confined to a worker thread
pub struct RemoteScoring<I> {
    factory: Factory<I>,
    name: String,
    spawned: AtomicUsize,
    max_threads: NonZeroUsize,
    flush_between: bool,
    real_time: bool,
    _instance: PhantomData<fn() -> I>,
}

impl<I: ScoringInstance + 'static> RemoteScoring<I> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<I, EnvError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            name: "scoring".into(),
            spawned: AtomicUsize::new(0),
            max_threads: NonZeroUsize::MIN,
            flush_between: true,
            real_time: false,
            _instance: PhantomData,
        }
    }

    /// Worker threads are named `{name}-{n}`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn threads(mut self, threads: NonZeroUsize) -> Self {
        self.max_threads = threads;
        self
    }

    pub fn flush(mut self, flush: bool) -> Self {
        self.flush_between = flush;
        self
    }

    pub fn real_time(mut self, real_time: bool) -> Self {
        self.real_time = real_time;
        self
    }

    /// Workers spawned so far
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl<I: ScoringInstance + 'static> ScoringFunction for RemoteScoring<I> {
    type Instance = RemoteInstance;

    fn create_new(&self) -> Result<RemoteInstance, EnvError> {
        let (tx, requests) = mpsc::channel();
        let (replies, rx) = mpsc::channel();
        let factory = self.factory.clone();
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let worker = thread::Builder::new()
            .name(format!("{}-{n}", self.name))
            .spawn(move || serve(factory, requests, replies))
            .map_err(|err| EnvError::Fatal(format!("can't spawn scoring worker: {err}")))?;

        let instance = RemoteInstance {
            tx,
            rx,
            worker: Some(worker),
            verdict: None,
        };
        match instance.rx.recv() {
            Ok(Reply::Ready(Ok(()))) => Ok(instance),
            Ok(Reply::Ready(Err(err))) => Err(err),
            Ok(reply) => Err(unexpected(reply)),
            Err(_) => Err(disconnected()),
        }
    }

    fn max_threads(&self) -> NonZeroUsize {
        self.max_threads
    }

    fn flush_between(&self) -> bool {
        self.flush_between
    }

    fn real_time_processing(&self) -> bool {
        self.real_time
    }
}

/// Handle to an instance living on a worker thread. Dropping it shuts the worker down.
///
/// The verdict of a finished episode arrives with [Input::Done], so reading it can't fail. A
/// worker lost before that fails the episode instead
#[derive(Debug)]
pub struct RemoteInstance {
    tx: Sender<Request>,
    rx: Receiver<Reply>,
    worker: Option<JoinHandle<()>>,
    verdict: Option<(f64, bool)>,
}

impl RemoteInstance {
    fn call(&self, request: Request) -> Result<Reply, EnvError> {
        self.tx.send(request).map_err(|_| disconnected())?;
        self.rx.recv().map_err(|_| disconnected())
    }
}

impl ScoringInstance for RemoteInstance {
    fn generate_input(&mut self) -> Result<Input, EnvError> {
        match self.call(Request::Input)? {
            Reply::Done { score, winner } => {
                self.verdict = Some((score, winner));
                Ok(Input::Done)
            }
            Reply::Input(input) => input,
            reply => Err(unexpected(reply)),
        }
    }

    fn accept_output(&mut self, output: &[f64]) -> Result<(), EnvError> {
        match self.call(Request::Output(output.to_vec()))? {
            Reply::Output(result) => result,
            reply => Err(unexpected(reply)),
        }
    }

    fn score(&self) -> f64 {
        if let Some((score, _)) = self.verdict {
            return score;
        }
        match self.call(Request::Score) {
            Ok(Reply::Score(score)) => score,
            _ => GAUNTLET_WORST_SCORE,
        }
    }

    fn is_winner(&self) -> bool {
        match self.verdict {
            Some((_, winner)) => winner,
            None => matches!(self.call(Request::Winner), Ok(Reply::Winner(true))),
        }
    }

    fn restart(&mut self) -> Result<(), EnvError> {
        self.verdict = None;
        match self.call(Request::Restart)? {
            Reply::Restart(result) => result,
            reply => Err(unexpected(reply)),
        }
    }
}

impl Drop for RemoteInstance {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let name = worker.thread().name().map(str::to_owned);
            if worker.join().is_err() {
                warn!(worker = ?name, "scoring worker panicked");
            }
        }
    }
}
