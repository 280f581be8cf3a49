//!
//! Draining a deploy stream
//!
//! Every outcome is reported as it arrives. A failed instance is reported and
//! the stream is drained anyway, the core may have scheduled the remaining
//! instances fine. Only a transport error or cancellation ends the drain early,
//! outcomes already reported stay reported.
use super::OutcomeMessage;
use crate::{Error, Result};
use futures_util::{Stream, StreamExt};
use std::future::Future;

/// Consumer state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Receiving outcomes
    Streaming,
    /// The stream ended cleanly
    Done,
    /// The stream was cut short by a transport error or cancellation
    Failed,
}

/// Tally of reported outcomes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
}

impl Summary {
    /// Number of outcomes received
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Some instances succeeded and some failed
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.succeeded > 0 && self.failed > 0
    }
}

/// Receives the outcomes of a deploy, one call per outcome in arrival order,
/// followed by exactly one call to either `done` or `failed`.
pub trait Reporter {
    /// One instance was deployed, or failed to
    fn outcome(&mut self, outcome: &OutcomeMessage);

    /// The stream ended cleanly
    fn done(&mut self, _summary: &Summary) {}

    /// The stream was cut short
    fn failed(&mut self, _error: &Error, _summary: &Summary) {}
}

/// Reports outcomes as log events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn outcome(&mut self, outcome: &OutcomeMessage) {
        if outcome.success {
            tracing::info!(
                "Success {} {} {} {:?} {}",
                outcome.id,
                outcome.name,
                outcome.node,
                outcome.cpu,
                outcome.memory
            );
            if !outcome.hook.is_empty() {
                tracing::info!("Hook output\n{}", outcome.hook);
            }
            for (network, address) in &outcome.publish {
                tracing::info!("Bound {} ip {}", network, address);
            }
        } else {
            tracing::error!("Failed {}", outcome.error);
        }
    }

    fn done(&mut self, summary: &Summary) {
        if summary.failed > 0 {
            tracing::warn!(
                "Deploy finished, {} of {} instances failed",
                summary.failed,
                summary.total()
            );
        } else {
            tracing::info!("Deploy finished, {} instances", summary.total());
        }
    }

    fn failed(&mut self, error: &Error, summary: &Summary) {
        tracing::error!(
            "Deploy aborted after {} outcomes: {}",
            summary.total(),
            error
        );
    }
}

/// Drives one outcome stream
pub struct Consumer<'a, R: Reporter + ?Sized> {
    reporter: &'a mut R,
    state: State,
    summary: Summary,
}

impl<'a, R: Reporter + ?Sized> Consumer<'a, R> {
    /// Create a consumer in the `Streaming` state
    pub fn new(reporter: &'a mut R) -> Self {
        Self {
            reporter,
            state: State::Streaming,
            summary: Summary::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn summary(&self) -> Summary {
        self.summary
    }

    /// Report one outcome. Ignored once the consumer is no longer streaming.
    pub fn on_outcome(&mut self, outcome: &OutcomeMessage) {
        if self.state != State::Streaming {
            return;
        }
        if outcome.success {
            self.summary.succeeded += 1;
        } else {
            self.summary.failed += 1;
        }
        self.reporter.outcome(outcome);
    }

    /// Clean end of stream
    pub fn on_end(&mut self) {
        if self.state == State::Streaming {
            self.state = State::Done;
            self.reporter.done(&self.summary);
        }
    }

    /// Transport error or cancellation
    pub fn on_error(&mut self, error: &Error) {
        if self.state == State::Streaming {
            self.state = State::Failed;
            self.reporter.failed(error, &self.summary);
        }
    }

    /// Read `stream` to its end, or until `cancel` completes
    pub async fn run<S, C>(mut self, mut stream: S, cancel: C) -> Result<Summary>
    where
        S: Stream<Item = Result<OutcomeMessage>> + Unpin,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        while self.state == State::Streaming {
            let next = tokio::select! {
                biased;
                () = &mut cancel => Some(Err(Error::Cancelled)),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(outcome)) => self.on_outcome(&outcome),
                Some(Err(e)) => {
                    self.on_error(&e);
                    return Err(e);
                }
                None => self.on_end(),
            }
        }

        Ok(self.summary)
    }
}

/// Report every outcome of `stream` to `reporter`.
///
/// Returns the summary on a clean end of stream. A transport error or
/// `cancel` completing is reported to `reporter` and returned.
pub async fn drain<S, R, C>(stream: S, reporter: &mut R, cancel: C) -> Result<Summary>
where
    S: Stream<Item = Result<OutcomeMessage>> + Unpin,
    R: Reporter + ?Sized,
    C: Future<Output = ()>,
{
    Consumer::new(reporter).run(stream, cancel).await
}
