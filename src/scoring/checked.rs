use super::{Input, ScoringInstance};
use crate::{
    assess::Assessment,
    constants::GAUNTLET_WORST_SCORE,
    encoding::{check_arity, EncodingDescriptor},
    error::{ContractError, EnvError, EpisodeError, Side},
};

/// Where an instance is in its episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Fresh or restarted, nothing asked of it yet
    Init,
    /// Its last output was accepted, and it may be asked for input
    AwaitingInput,
    /// It handed out an input, and must be given exactly one output
    AwaitingOutput,
    /// It said [Input::Done], or failed. Only its verdict may be read
    Terminal,
}

impl ProtocolState {
    pub const fn name(&self) -> &'static str {
        match self {
            ProtocolState::Init => "initialized",
            ProtocolState::AwaitingInput => "awaiting input",
            ProtocolState::AwaitingOutput => "awaiting output",
            ProtocolState::Terminal => "terminal",
        }
    }
}

#[inline]
fn out_of_order(call: &'static str, state: ProtocolState) -> ContractError {
    ContractError::OutOfOrder {
        call,
        state: state.name(),
    }
}

/// A [ScoringInstance] whose every call is checked against the protocol and the run's
/// [EncodingDescriptor]. Breaking alternation or arity is a [ContractError], which no caller
/// should try to recover from. An [EnvError] from the wrapped instance ends the episode and
/// leaves the instance marked as failed.
#[derive(Debug)]
pub struct Checked<I> {
    inner: I,
    state: ProtocolState,
    sensory: usize,
    action: usize,
    inputs: usize,
    outputs: usize,
    failure: Option<EnvError>,
}

impl<I: ScoringInstance> Checked<I> {
    pub fn new(inner: I, descriptor: &EncodingDescriptor) -> Self {
        Self {
            inner,
            state: ProtocolState::Init,
            sensory: descriptor.input_arity(),
            action: descriptor.output_arity(),
            inputs: 0,
            outputs: 0,
            failure: None,
        }
    }

    #[inline]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Non-[Input::Done] inputs handed out this episode
    #[inline]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Outputs accepted this episode
    #[inline]
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    #[inline]
    pub fn failure(&self) -> Option<&EnvError> {
        self.failure.as_ref()
    }

    #[inline]
    pub fn inner(&self) -> &I {
        &self.inner
    }

    pub fn into_inner(self) -> I {
        self.inner
    }

    fn fail(&mut self, err: EnvError) -> EpisodeError {
        self.state = ProtocolState::Terminal;
        self.failure = Some(err.clone());
        err.into()
    }

    pub fn generate_input(&mut self) -> Result<Input, EpisodeError> {
        match self.state {
            ProtocolState::Init | ProtocolState::AwaitingInput => (),
            state => return Err(out_of_order("generate_input", state).into()),
        }

        match self.inner.generate_input() {
            Ok(Input::Continue(input)) => {
                if let Err(err) = check_arity(Side::Input, self.sensory, input.len()) {
                    self.state = ProtocolState::Terminal;
                    return Err(err.into());
                }
                self.inputs += 1;
                self.state = ProtocolState::AwaitingOutput;
                Ok(Input::Continue(input))
            }
            Ok(Input::Done) => {
                self.state = ProtocolState::Terminal;
                Ok(Input::Done)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn accept_output(&mut self, output: &[f64]) -> Result<(), EpisodeError> {
        if self.state != ProtocolState::AwaitingOutput {
            return Err(out_of_order("accept_output", self.state).into());
        }
        if let Err(err) = check_arity(Side::Output, self.action, output.len()) {
            self.state = ProtocolState::Terminal;
            return Err(err.into());
        }

        match self.inner.accept_output(output) {
            Ok(()) => {
                self.outputs += 1;
                self.state = ProtocolState::AwaitingInput;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Begin a new episode on an instance who finished its last one
    pub fn restart(&mut self) -> Result<(), EpisodeError> {
        match self.state {
            ProtocolState::Init | ProtocolState::Terminal => (),
            state => return Err(out_of_order("restart", state).into()),
        }

        self.inputs = 0;
        self.outputs = 0;
        self.failure = None;
        match self.inner.restart() {
            Ok(()) => {
                self.state = ProtocolState::Init;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Drive the episode to its end, answering every input with `respond`
    pub fn run(&mut self, mut respond: impl FnMut(&[f64]) -> Vec<f64>) -> Result<(), EpisodeError> {
        while let Input::Continue(input) = self.generate_input()? {
            self.accept_output(&respond(&input))?;
        }
        Ok(())
    }

    /// Score and winner flag of a finished episode. A failed episode gets the worst possible
    /// score, and never wins
    pub fn assessment(&self) -> Result<Assessment, ContractError> {
        if self.state != ProtocolState::Terminal {
            return Err(out_of_order("score", self.state));
        }

        Ok(match self.failure {
            Some(_) => Assessment::failed(self.outputs),
            None => Assessment {
                score: self.inner.score(),
                winner: self.inner.is_winner(),
                failed: false,
                exchanges: self.outputs,
            },
        })
    }
}

impl Assessment {
    pub(crate) fn failed(exchanges: usize) -> Self {
        Self {
            score: GAUNTLET_WORST_SCORE,
            winner: false,
            failed: true,
            exchanges,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Counts down from `len`, scoring the sum of first outputs
    #[derive(Debug)]
    struct Countdown {
        len: usize,
        left: usize,
        score: f64,
        fail_at: Option<usize>,
        input: Vec<f64>,
    }

    impl Countdown {
        fn new(len: usize) -> Self {
            Self {
                len,
                left: len,
                score: 0.,
                fail_at: None,
                input: vec![1., 0.],
            }
        }
    }

    impl ScoringInstance for Countdown {
        fn generate_input(&mut self) -> Result<Input, EnvError> {
            if self.left == 0 {
                Ok(Input::Done)
            } else {
                Ok(Input::Continue(self.input.clone()))
            }
        }

        fn accept_output(&mut self, output: &[f64]) -> Result<(), EnvError> {
            if Some(self.left) == self.fail_at {
                return Err(EnvError::Episode("boom".into()));
            }
            self.left -= 1;
            self.score += output[0];
            Ok(())
        }

        fn score(&self) -> f64 {
            self.score
        }

        fn is_winner(&self) -> bool {
            self.score >= self.len as f64
        }

        fn restart(&mut self) -> Result<(), EnvError> {
            self.left = self.len;
            self.score = 0.;
            Ok(())
        }
    }

    fn descriptor() -> EncodingDescriptor {
        EncodingDescriptor::flat(2, 1).unwrap()
    }

    #[test]
    fn test_alternation() {
        let mut c = Checked::new(Countdown::new(3), &descriptor());
        assert_eq!(c.state(), ProtocolState::Init);
        c.run(|_| vec![1.]).unwrap();
        assert_eq!(c.state(), ProtocolState::Terminal);
        assert_eq!(c.inputs(), 3);
        assert_eq!(c.outputs(), 3);

        let a = c.assessment().unwrap();
        assert_eq!(a.score, 3.);
        assert!(a.winner);
        assert!(!a.failed);
        assert_eq!(a.exchanges, 3);
    }

    #[test]
    fn test_out_of_order() {
        let mut c = Checked::new(Countdown::new(2), &descriptor());
        assert!(matches!(
            c.accept_output(&[1.]),
            Err(EpisodeError::Contract(ContractError::OutOfOrder {
                call: "accept_output",
                ..
            }))
        ));

        c.generate_input().unwrap();
        assert!(matches!(
            c.generate_input(),
            Err(EpisodeError::Contract(ContractError::OutOfOrder {
                call: "generate_input",
                state: "awaiting output"
            }))
        ));
        assert!(c.assessment().is_err());

        c.accept_output(&[1.]).unwrap();
        assert!(c.accept_output(&[1.]).is_err());
        assert!(c.restart().is_err());
    }

    #[test]
    fn test_no_calls_after_done() {
        let mut c = Checked::new(Countdown::new(0), &descriptor());
        assert_eq!(c.generate_input().unwrap(), Input::Done);
        assert!(c.generate_input().is_err());
        assert!(c.accept_output(&[0.]).is_err());
        assert_eq!(c.inputs(), 0);
        assert_eq!(c.assessment().unwrap().exchanges, 0);
    }

    #[test]
    fn test_arity() {
        let mut c = Checked::new(Countdown::new(2), &descriptor());
        c.generate_input().unwrap();
        assert_eq!(
            c.accept_output(&[1., 2.]),
            Err(EpisodeError::Contract(ContractError::Arity {
                side: Side::Output,
                expected: 1,
                got: 2
            }))
        );

        let mut wide = Countdown::new(2);
        wide.input = vec![1., 0., 0.];
        let mut c = Checked::new(wide, &descriptor());
        assert_eq!(
            c.generate_input(),
            Err(EpisodeError::Contract(ContractError::Arity {
                side: Side::Input,
                expected: 2,
                got: 3
            }))
        );
    }

    #[test]
    fn test_arity_agrees_with_descriptor() {
        let d = descriptor();
        let mut c = Checked::new(Countdown::new(2), &d);
        c.generate_input().unwrap();
        let checked = c.accept_output(&[]).unwrap_err();
        assert_eq!(checked, EpisodeError::from(d.check_output(&[]).unwrap_err()));
        assert_eq!(c.state(), ProtocolState::Terminal);

        let mut narrow = Countdown::new(2);
        narrow.input = vec![1.];
        let mut c = Checked::new(narrow, &d);
        let checked = c.generate_input().unwrap_err();
        assert_eq!(checked, EpisodeError::from(d.check_input(&[1.]).unwrap_err()));
        assert_eq!(c.inputs(), 0);
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut inner = Countdown::new(3);
        inner.fail_at = Some(2);
        let mut c = Checked::new(inner, &descriptor());
        let err = c.run(|_| vec![1.]).unwrap_err();
        assert_eq!(err, EpisodeError::Env(EnvError::Episode("boom".into())));
        assert_eq!(c.state(), ProtocolState::Terminal);

        let a = c.assessment().unwrap();
        assert!(a.failed);
        assert!(!a.winner);
        assert_eq!(a.score, GAUNTLET_WORST_SCORE);
        assert_eq!(a.exchanges, 1);
    }

    #[test]
    fn test_restart() {
        let mut c = Checked::new(Countdown::new(2), &descriptor());
        c.run(|_| vec![0.5]).unwrap();
        assert_eq!(c.assessment().unwrap().score, 1.);

        c.restart().unwrap();
        assert_eq!(c.state(), ProtocolState::Init);
        assert_eq!(c.inputs(), 0);
        c.run(|_| vec![2.]).unwrap();
        assert_eq!(c.assessment().unwrap().score, 4.);
        assert_eq!(c.outputs(), 2);
    }
}
