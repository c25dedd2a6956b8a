use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::{Command, Stdio};

/// One external program in a stage chain.
///
/// Stages read audio on stdin and write it on stdout; the sink only reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    name: String,
    program: OsString,
    args: Vec<OsString>,
    quiet: bool,
}

impl StageSpec {
    /// A stage running `program`, named after the program.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let program = program.as_ref().to_os_string();
        Self {
            name: program.to_string_lossy().into_owned(),
            program,
            args: Vec::new(),
            quiet: false,
        }
    }

    /// Override the name used in logs and diagnostics.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Discard the program's stderr instead of inheriting it.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stderr(if self.quiet {
            Stdio::null()
        } else {
            Stdio::inherit()
        });
        cmd
    }

    /// SoX reading a WAV on stdin and writing a WAV on stdout with `effects`.
    pub fn sox<I, S>(sox_bin: impl AsRef<OsStr>, effects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self::new(sox_bin)
            .named("sox")
            .args(["-t", "wav", "-", "-t", "wav", "-"])
            .args(effects)
    }

    /// `aplay` playing a WAV from stdin.
    pub fn aplay() -> Self {
        Self::new("aplay").arg("-q")
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Voice effect presets, each a single SoX stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Effect {
    /// Flanger with a short reverb.
    #[default]
    Droid,
    /// Pitched down, slowed and reverberant.
    Deep,
    /// No processing; audio goes straight to the sink.
    Clean,
}

impl Effect {
    pub fn sox_effects(self) -> &'static [&'static str] {
        match self {
            Effect::Droid => &["flanger", "10", "2", "reverb", "25", "50"],
            Effect::Deep => &["pitch", "-800", "speed", "0.9", "reverb", "50", "75"],
            Effect::Clean => &[],
        }
    }

    /// The stages implementing this effect with the given SoX binary.
    pub fn stages(self, sox_bin: impl AsRef<OsStr>) -> Vec<StageSpec> {
        match self {
            Effect::Clean => Vec::new(),
            effect => vec![StageSpec::sox(sox_bin, effect.sox_effects())],
        }
    }
}
