use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use crashscope::analyzer::{self, AnalysisConfig};
use crashscope::cli::{Cli, OutputFormat};
use crashscope::error::AnalyzeError;
use crashscope::json_output::JsonReport;
use crashscope::parser;
use crashscope::report::{self, ReportSink};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Parse arguments; usage errors exit with status 1
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    }
}

fn run(args: Cli) -> Result<()> {
    let parsed = parser::parse_file(&args.log_file)
        .with_context(|| format!("while analyzing {}", args.log_file.display()))?;

    if parsed.events.is_empty() {
        return Err(AnalyzeError::NoEvents.into());
    }

    let config = AnalysisConfig {
        tail_len: args.tail,
    };
    let findings = analyzer::analyze(&parsed, &config);

    let stdout = std::io::stdout().lock();
    let mut sink = match &args.output_file {
        Some(path) => ReportSink::with_mirror(stdout, path)?,
        None => ReportSink::new(stdout),
    };

    match args.format {
        OutputFormat::Text => report::render_text(&findings, &mut sink)?,
        OutputFormat::Json => JsonReport::new(
            &parsed,
            &findings,
            Some(args.log_file.display().to_string()),
        )
        .render(&mut sink)?,
    }
    sink.finish()?;

    if let Some(path) = &args.output_file {
        println!("Analysis saved to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = parse_args();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The empty-log case prints its message alone
            match err.downcast_ref::<AnalyzeError>() {
                Some(AnalyzeError::NoEvents) => eprintln!("{}", err),
                _ => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
