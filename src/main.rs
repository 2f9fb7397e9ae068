use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{error::PipelineError, prelude::*};

mod artifact;
mod cmd;
mod config;
mod error;
mod ocr;
mod pipeline;
mod prelude;
mod storage;
mod text;
mod tts;

/// Narrate uploaded documents: OCR, then speech synthesis.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  - DOCINTEL_ENDPOINT / DOCINTEL_KEY: Document analysis service.
  - SPEECH_REGION / SPEECH_KEY: Speech synthesis service.
  - STORAGE_ACCOUNT_NAME: Blob account holding documents and audio.
  - STORAGE_SOURCE_SAS / STORAGE_AUDIO_SAS: SAS tokens for the source
    and audio containers. The source token's expiry must exceed the
    polling budget.
  - STORAGE_SOURCE_CONTAINER / STORAGE_AUDIO_CONTAINER (optional):
    Container names, defaulting to "books" and "audio".

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Convert an uploaded document into a narrated MP3.
    Narrate(cmd::narrate::NarrateOpts),
}

/// Our entry point. Errors print with an optional backtrace; pipeline
/// errors additionally map to distinct exit codes so callers can tell
/// caller mistakes from remote failures.
#[tokio::main]
async fn main() {
    // Initialize tracing.
    let directive = Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    if let Err(err) = real_main().await {
        eprintln!("Error: {err:?}");
        let code = err
            .downcast_ref::<PipelineError>()
            .map(PipelineError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Narrate(narrate_opts) => cmd::narrate::cmd_narrate(narrate_opts).await,
    }
}
