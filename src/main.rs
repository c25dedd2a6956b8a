use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use robovoice::cache::{
    default_cache_root, CacheSettingsBuilder, HttpSource, ModelCache, ModelCatalog,
};
use robovoice::engines::piper::{PiperEngine, PiperInferenceParams, PiperModelParams};
use robovoice::pipeline::{Effect, Speak, SpeakError, Speaker, StageChain, StageSpec};
use robovoice::{session, BoxError, SynthesisEngine};

/// Overrides the default per-user cache root.
const CACHE_DIR_ENV: &str = "ROBOVOICE_CACHE_DIR";

#[derive(Debug, Parser)]
#[command(name = "robovoice", version, about = "Piper voices through a SoX effects chain")]
struct Cli {
    /// JSON catalog to use instead of the built-in voices
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Make sure a language's voice files are cached
    Fetch {
        /// Language code from the catalog
        #[arg(long)]
        lang: String,
    },
    /// List the languages in the catalog
    Languages,
    /// Speak text (or read lines interactively) through the effects chain
    Speak(SpeakArgs),
}

#[derive(Debug, Args)]
struct SpeakArgs {
    #[arg(long, default_value = "en")]
    lang: String,
    /// Say this and exit instead of starting the interactive loop
    #[arg(long)]
    text: Option<String>,
    #[arg(long, value_enum, default_value_t = EffectArg::Droid)]
    effect: EffectArg,
    #[arg(long, default_value = "sox")]
    sox: PathBuf,
    /// Playback program reading a WAV on stdin
    #[arg(long, default_value = "aplay")]
    player: PathBuf,
    #[arg(long, default_value = "piper")]
    piper: PathBuf,
    #[arg(long)]
    speaker: Option<u32>,
    #[arg(long)]
    length_scale: Option<f32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectArg {
    Droid,
    Deep,
    Clean,
}

impl From<EffectArg> for Effect {
    fn from(arg: EffectArg) -> Self {
        match arg {
            EffectArg::Droid => Effect::Droid,
            EffectArg::Deep => Effect::Deep,
            EffectArg::Clean => Effect::Clean,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BoxError> {
    let catalog = match &cli.catalog {
        Some(path) => ModelCatalog::from_json_file(path)?,
        None => ModelCatalog::builtin(),
    };

    match cli.command {
        Commands::Languages => {
            for (lang, model) in catalog.iter() {
                println!("{lang}\t{}", model.name);
            }
            Ok(())
        }
        Commands::Fetch { lang } => {
            let cache = model_cache(catalog)?;
            let model_path = cache.ensure_model(&lang)?;
            let dir = model_path.parent().unwrap_or(model_path.as_path());
            println!("Model ready in: {}", dir.display());
            Ok(())
        }
        Commands::Speak(args) => speak(model_cache(catalog)?, args),
    }
}

fn model_cache(catalog: ModelCatalog) -> Result<ModelCache<HttpSource>, BoxError> {
    let root = std::env::var_os(CACHE_DIR_ENV)
        .map(PathBuf::from)
        .or_else(default_cache_root)
        .ok_or("could not determine a cache directory; set ROBOVOICE_CACHE_DIR")?;
    let settings = CacheSettingsBuilder::default().root(root).build()?;
    let source = HttpSource::new(&settings.user_agent)?;
    Ok(ModelCache::new(catalog, settings, source).with_progress(print_progress))
}

fn print_progress(progress: &robovoice::cache::DownloadProgress) {
    if let Some(percent) = progress.percent() {
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r  {}: {percent}%", progress.file_name);
        if Some(progress.downloaded) == progress.total {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }
}

fn speak(cache: ModelCache<HttpSource>, args: SpeakArgs) -> Result<(), BoxError> {
    let model_path = cache.ensure_model(&args.lang)?;

    println!("Loading voice model...");
    let mut engine = PiperEngine::new();
    engine.load_model_with_params(
        &model_path,
        PiperModelParams {
            bin_path: Some(args.piper),
            config_path: None,
        },
    )?;

    let chain = StageChain::new(StageSpec::new(&args.player).named("player"))
        .stages(Effect::from(args.effect).stages(&args.sox));
    let mut speaker = Speaker::new(engine, chain).with_params(PiperInferenceParams {
        speaker: args.speaker,
        length_scale: args.length_scale,
        ..Default::default()
    });

    match args.text {
        Some(text) => match speaker.speak(&text) {
            Ok(()) | Err(SpeakError::EmptyInput) => Ok(()),
            Err(e) => Err(e.into()),
        },
        None => {
            println!("Model loaded.");
            let stdin = io::stdin();
            session::run_session(stdin.lock(), io::stdout(), &mut speaker)?;
            Ok(())
        }
    }
}
