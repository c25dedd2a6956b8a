use std::io::{ErrorKind, Write};
use std::process::{Child, ChildStdin, ExitStatus, Stdio};

use super::stage::{Effect, StageSpec};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Failed to start stage '{stage}': {source}")]
    Launch {
        stage: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Stage '{stage}' exited with {status}{}", others_suffix(.others))]
    StageFailed {
        stage: String,
        status: ExitStatus,
        /// Further stages that also failed, in chain order.
        others: Vec<String>,
    },
    #[error("Stage '{stage}' stopped reading after {written} of {total} bytes")]
    InputClosed {
        stage: String,
        written: usize,
        total: usize,
    },
    #[error("Failed writing audio into stage '{stage}': {source}")]
    Write {
        stage: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed waiting for stage '{stage}': {source}")]
    Wait {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

fn others_suffix(others: &[String]) -> String {
    if others.is_empty() {
        String::new()
    } else {
        format!(" (also failed: {})", others.join(", "))
    }
}

impl PipelineError {
    /// True when a downstream stage went away before consuming all input
    /// while every stage still exited cleanly. Worth a warning, not an abort.
    pub fn is_early_termination(&self) -> bool {
        matches!(self, PipelineError::InputClosed { .. })
    }

    /// Name of the stage the error is about.
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::Launch { stage, .. }
            | PipelineError::StageFailed { stage, .. }
            | PipelineError::InputClosed { stage, .. }
            | PipelineError::Write { stage, .. }
            | PipelineError::Wait { stage, .. } => stage,
        }
    }
}

/// What a successful run pushed through the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub bytes_written: usize,
    pub stages: usize,
}

/// An ordered list of processing stages ending in a playback sink.
///
/// Stage *n*'s stdout is connected directly to stage *n+1*'s stdin; the
/// sink's stdout is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageChain {
    stages: Vec<StageSpec>,
    sink: StageSpec,
}

impl Default for StageChain {
    fn default() -> Self {
        Self::with_effect(Effect::default())
    }
}

impl StageChain {
    /// A chain with no processing stages, only `sink`.
    pub fn new(sink: StageSpec) -> Self {
        Self {
            stages: Vec::new(),
            sink,
        }
    }

    /// `effect` through `sox` from PATH into `aplay`.
    pub fn with_effect(effect: Effect) -> Self {
        Self::new(StageSpec::aplay()).stages(effect.stages("sox"))
    }

    /// Append a processing stage before the sink.
    pub fn stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(mut self, stages: impl IntoIterator<Item = StageSpec>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn sink(&self) -> &StageSpec {
        &self.sink
    }

    pub fn len(&self) -> usize {
        self.stages.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn units(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().chain(std::iter::once(&self.sink))
    }

    /// Launch every stage, connected stdout to stdin.
    ///
    /// If any stage fails to start, the ones already running are killed and
    /// reaped before the error is returned.
    pub(crate) fn launch(&self) -> Result<RunningChain, PipelineError> {
        let total = self.len();
        let mut running = RunningChain {
            input: None,
            input_stage: self.units().next().map(|s| s.name().to_string()).unwrap_or_default(),
            children: Vec::with_capacity(total),
        };
        let mut upstream: Option<std::process::ChildStdout> = None;

        for (idx, spec) in self.units().enumerate() {
            let is_first = idx == 0;
            let is_last = idx + 1 == total;

            let mut cmd = spec.command();
            match upstream.take() {
                Some(out) => cmd.stdin(Stdio::from(out)),
                None => cmd.stdin(Stdio::piped()),
            };
            cmd.stdout(if is_last { Stdio::null() } else { Stdio::piped() });

            let spawned = cmd.spawn();
            // Drops the parent's copy of the upstream pipe end.
            drop(cmd);
            let mut child = spawned.map_err(|source| PipelineError::Launch {
                stage: spec.name().to_string(),
                source,
            })?;
            log::debug!("Started stage '{}' (pid {})", spec.name(), child.id());

            if is_first {
                running.input = child.stdin.take();
            }
            if !is_last {
                upstream = child.stdout.take();
            }
            running.children.push(RunningStage {
                name: spec.name().to_string(),
                child: Some(child),
            });
        }

        Ok(running)
    }

    /// Push `input` through the whole chain and wait for every stage.
    ///
    /// All stages are started before the first byte is written, and every
    /// started stage has been reaped by the time this returns, whatever the
    /// outcome.
    pub fn run(&self, input: &[u8]) -> Result<ChainReport, PipelineError> {
        let mut running = self.launch()?;
        let fed = running.feed(input);
        let finished = running.finish();

        match (fed, finished) {
            (_, Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(ChainReport {
                bytes_written: input.len(),
                stages: self.len(),
            }),
            (Err(FeedError::Closed { stage, written }), Ok(())) => Err(PipelineError::InputClosed {
                stage,
                written,
                total: input.len(),
            }),
            (Err(FeedError::Io { stage, source }), Ok(())) => {
                Err(PipelineError::Write { stage, source })
            }
        }
    }
}

struct RunningStage {
    name: String,
    /// `None` once reaped.
    child: Option<Child>,
}

enum FeedError {
    /// The first stage closed its stdin before taking everything.
    Closed { stage: String, written: usize },
    Io {
        stage: String,
        source: std::io::Error,
    },
}

/// A launched chain. Dropping it closes the input and kills and reaps any
/// stage that has not been waited for.
pub(crate) struct RunningChain {
    input: Option<ChildStdin>,
    input_stage: String,
    children: Vec<RunningStage>,
}

impl RunningChain {
    /// Write all of `bytes` into the first stage, then close its stdin.
    ///
    /// Blocks while the chain applies backpressure.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), FeedError> {
        let Some(mut input) = self.input.take() else {
            return Err(FeedError::Closed {
                stage: self.input_stage.clone(),
                written: 0,
            });
        };

        let mut written = 0;
        while written < bytes.len() {
            match input.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(FeedError::Closed {
                        stage: self.input_stage.clone(),
                        written,
                    })
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    log::warn!(
                        "Stage '{}' closed its input after {written} of {} bytes; \
                         is every stage installed?",
                        self.input_stage,
                        bytes.len()
                    );
                    return Err(FeedError::Closed {
                        stage: self.input_stage.clone(),
                        written,
                    });
                }
                Err(source) => {
                    return Err(FeedError::Io {
                        stage: self.input_stage.clone(),
                        source,
                    })
                }
            }
        }
        match input.flush() {
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(FeedError::Closed {
                stage: self.input_stage.clone(),
                written,
            }),
            Err(source) => Err(FeedError::Io {
                stage: self.input_stage.clone(),
                source,
            }),
            Ok(()) => Ok(()),
        }
        // `input` drops here, signalling EOF downstream.
    }

    /// Close the input and wait for every stage in chain order.
    ///
    /// When several stages fail, the one blamed is the most downstream stage
    /// that exited with a code of its own. Stages killed by a signal (usually
    /// SIGPIPE after a later stage went away) are blamed only when nothing
    /// else failed. The rest are listed as `others`.
    fn finish(mut self) -> Result<(), PipelineError> {
        drop(self.input.take());

        let mut failures: Vec<(String, ExitStatus)> = Vec::new();
        let mut wait_error = None;
        for stage in &mut self.children {
            let Some(mut child) = stage.child.take() else {
                continue;
            };
            match child.wait() {
                Ok(status) if status.success() => {
                    log::debug!("Stage '{}' finished", stage.name);
                }
                Ok(status) => failures.push((stage.name.clone(), status)),
                Err(source) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    wait_error.get_or_insert(PipelineError::Wait {
                        stage: stage.name.clone(),
                        source,
                    });
                }
            }
        }

        if let Some(err) = wait_error {
            return Err(err);
        }
        let Some(culprit) = failures
            .iter()
            .rposition(|(_, status)| status.code().is_some())
            .or_else(|| failures.len().checked_sub(1))
        else {
            return Ok(());
        };
        let (stage, status) = failures.remove(culprit);
        Err(PipelineError::StageFailed {
            stage,
            status,
            others: failures.into_iter().map(|(name, _)| name).collect(),
        })
    }
}

impl Drop for RunningChain {
    fn drop(&mut self) {
        drop(self.input.take());
        for stage in &mut self.children {
            if let Some(mut child) = stage.child.take() {
                log::debug!("Reaping abandoned stage '{}'", stage.name);
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}
