//! Interactive read-speak loop.
//!
//! ```text
//! AwaitingInput ──blank──▶ AwaitingInput
//!       │ ──exit/quit/EOF/interrupt──▶ Terminated
//!       └──text──▶ Speaking ──▶ AwaitingInput
//! ```
//!
//! `Speaking` covers synthesis and playback both; [`Speak::speak`] only
//! returns once the audio has played or failed. A failed utterance is
//! reported and the loop carries on. Only end of input, an interrupted read
//! or an exit keyword ends the session.

use std::io::{self, BufRead, Write};

use crate::pipeline::{Speak, SpeakError};

const EXIT_WORDS: &[&str] = &["exit", "quit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Speaking,
    Terminated,
}

/// What a single input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    Exit,
    Say(String),
}

impl Line {
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text.is_empty() {
            Line::Blank
        } else if EXIT_WORDS.iter().any(|w| text.eq_ignore_ascii_case(w)) {
            Line::Exit
        } else {
            Line::Say(text.to_string())
        }
    }
}

/// Counters for a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub spoken: usize,
    pub failed: usize,
}

/// Run the loop until exit, end of input or an interrupted read.
///
/// Prompts and status lines go to `out`; errors from `speaker` become a
/// one-line diagnostic there as well.
pub fn run_session<R, W, S>(
    mut input: R,
    mut out: W,
    speaker: &mut S,
) -> io::Result<SessionSummary>
where
    R: BufRead,
    W: Write,
    S: Speak + ?Sized,
{
    let mut summary = SessionSummary::default();
    let mut buf = Vec::new();
    let mut state = SessionState::AwaitingInput;

    writeln!(out, "Type text to synthesize (or 'exit' to quit).")?;
    while state != SessionState::Terminated {
        write!(out, "> ")?;
        out.flush()?;

        buf.clear();
        match read_line_once(&mut input, &mut buf) {
            Ok(0) => {
                writeln!(out, "\nExiting.")?;
                break;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                log::debug!("Input read interrupted");
                writeln!(out, "\nExiting.")?;
                break;
            }
            Err(e) => return Err(e),
        }

        let text = match Line::parse(&String::from_utf8_lossy(&buf)) {
            Line::Blank => continue,
            Line::Exit => {
                writeln!(out, "Goodbye.")?;
                state = SessionState::Terminated;
                continue;
            }
            Line::Say(text) => text,
        };

        state = transition(state, SessionState::Speaking);
        writeln!(out, "Generating and playing audio...")?;
        match speaker.speak(&text) {
            Ok(()) => {
                summary.spoken += 1;
                writeln!(out, "Playback finished. Type another line or 'exit'.")?;
            }
            Err(SpeakError::EmptyInput) => {}
            Err(e) => {
                summary.failed += 1;
                log::warn!("Utterance failed: {e}");
                writeln!(out, "Error: {e}")?;
            }
        }
        state = transition(state, SessionState::AwaitingInput);
    }

    log::debug!("Session over: {summary:?}");
    Ok(summary)
}

/// Read up to and including the next `\n` into `buf`.
///
/// Unlike [`BufRead::read_line`] an `Interrupted` error is returned to the
/// caller instead of being retried. Returns 0 at end of input.
fn read_line_once<R: BufRead + ?Sized>(input: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut read = 0;
    loop {
        let (done, used) = {
            let available = input.fill_buf()?;
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    buf.extend_from_slice(&available[..=i]);
                    (true, i + 1)
                }
                None => {
                    buf.extend_from_slice(available);
                    (available.is_empty(), available.len())
                }
            }
        };
        input.consume(used);
        read += used;
        if done {
            return Ok(read);
        }
    }
}

fn transition(from: SessionState, to: SessionState) -> SessionState {
    log::debug!("{from:?} -> {to:?}");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use std::io::{Cursor, Read};

    #[derive(Default)]
    struct Recorder {
        said: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl Speak for Recorder {
        fn speak(&mut self, text: &str) -> Result<(), SpeakError> {
            self.said.push(text.to_string());
            if self.fail_on == Some(text) {
                return Err(SpeakError::Pipeline(PipelineError::InputClosed {
                    stage: "sox".into(),
                    written: 0,
                    total: 10,
                }));
            }
            Ok(())
        }
    }

    fn run(script: &str, speaker: &mut Recorder) -> (SessionSummary, String) {
        let mut out = Vec::new();
        let summary = run_session(Cursor::new(script.to_string()), &mut out, speaker).unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(Line::parse("  \t"), Line::Blank);
        assert_eq!(Line::parse(" QUIT "), Line::Exit);
        assert_eq!(Line::parse("Exit"), Line::Exit);
        assert_eq!(Line::parse(" exit now "), Line::Say("exit now".into()));
    }

    #[test]
    fn blank_lines_are_skipped_and_exit_stops() {
        let mut speaker = Recorder::default();
        let (summary, out) = run("hello\n\n   \nexit\nnever said\n", &mut speaker);

        assert_eq!(speaker.said, vec!["hello"]);
        assert_eq!(summary, SessionSummary { spoken: 1, failed: 0 });
        assert!(out.ends_with("Goodbye.\n"));
    }

    #[test]
    fn end_of_input_terminates() {
        let mut speaker = Recorder::default();
        let (summary, out) = run("one\ntwo", &mut speaker);

        assert_eq!(speaker.said, vec!["one", "two"]);
        assert_eq!(summary.spoken, 2);
        assert!(out.ends_with("Exiting.\n"));
    }

    #[test]
    fn failed_utterance_does_not_end_session() {
        let mut speaker = Recorder {
            fail_on: Some("broken"),
            ..Default::default()
        };
        let (summary, out) = run("broken\nfine\nquit\n", &mut speaker);

        assert_eq!(speaker.said, vec!["broken", "fine"]);
        assert_eq!(summary, SessionSummary { spoken: 1, failed: 1 });
        assert_eq!(out.matches("Error: ").count(), 1);
    }

    /// Fails its first `fill_buf` with `Interrupted`, then serves `data`.
    struct InterruptedOnce {
        interrupted: bool,
        data: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    impl BufRead for InterruptedOnce {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.data.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.data.consume(amt)
        }
    }

    #[test]
    fn interrupted_read_terminates() {
        let input = InterruptedOnce {
            interrupted: false,
            data: Cursor::new(b"after interrupt\n".to_vec()),
        };
        let mut speaker = Recorder::default();
        let mut out = Vec::new();

        let summary = run_session(input, &mut out, &mut speaker).unwrap();
        assert!(speaker.said.is_empty());
        assert_eq!(summary, SessionSummary::default());
        assert!(String::from_utf8(out).unwrap().ends_with("Exiting.\n"));
    }

    #[test]
    fn reads_crlf_and_unterminated_last_line() {
        let mut speaker = Recorder::default();
        let (summary, _) = run("first\r\nsecond", &mut speaker);

        assert_eq!(speaker.said, vec!["first", "second"]);
        assert_eq!(summary.spoken, 2);
    }
}
