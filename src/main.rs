use anyhow::{Context, Result};
use clap::Parser;
use qttest_core::codemodel::{self, CodeModel};
use qttest_core::config::{Cli, Commands, OutputFormat, Settings};
use qttest_core::junit::JunitReporter;
use qttest_core::process::OutputSink;
use qttest_core::reporter::{ExecutableReport, HumanReporter, JsonReporter, MultiReporter, Reporter};
use qttest_core::{scan, signals, Logger, RunOptions, TestSuite};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::from_cli(&cli)?;
    let command = cli.command.clone().unwrap_or(Commands::List);

    match command {
        Commands::List => {
            let suite = build_suite(&settings).await;
            print!("{}", suite.dump_executable_paths());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Slots => {
            let mut suite = build_suite(&settings).await;
            suite.introspect_all().await;
            print!("{}", suite.dump_slots());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            slot,
            cwd,
            show_output,
        } => {
            let mut suite = build_suite(&settings).await;
            let mut options = RunOptions::default().with_policy(settings.expected_failures.clone());
            if let Some(cwd) = cwd {
                options = options.with_cwd(cwd);
            }
            if show_output {
                let sink: OutputSink = Arc::new(|line: &str| eprintln!("{}", line));
                options = options.with_output(sink);
            }
            let mut reporter = make_reporter(&cli);
            run_suite(&mut suite, slot.as_deref(), &options, reporter.as_mut()).await
        }
        Commands::Target {
            codemodel,
            executable,
        } => {
            let model = load_codemodel(&codemodel)?;
            let logger = Logger::tracing();
            match codemodel::target_name_for_executable(
                &executable,
                &model,
                settings.match_policy,
                &logger,
            ) {
                Some(name) => {
                    println!("{}", name);
                    Ok(ExitCode::SUCCESS)
                }
                None => Ok(ExitCode::FAILURE),
            }
        }
        Commands::Sources {
            codemodel,
            executable,
        } => {
            let model = load_codemodel(&codemodel)?;
            let logger = Logger::tracing();
            let sources = codemodel::sources_for_executable(
                &executable,
                &model,
                settings.match_policy,
                &logger,
            );
            for source in &sources {
                println!("{}", source.display());
            }
            Ok(if sources.is_empty() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Scan => {
            let found = scan::executable_files(&settings.build_dir).with_context(|| {
                format!("Failed to scan {}", settings.build_dir.display())
            })?;
            for path in found {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so that stdout stays clean for listings and NDJSON
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Discovery followed by the configured filters
async fn build_suite(settings: &Settings) -> TestSuite {
    let mut suite = TestSuite::new(Logger::tracing()).with_ctest_program(&settings.ctest);
    suite.discover(&settings.build_dir).await;
    tracing::debug!("ctest reported {} executables", suite.len());

    if let Some(pattern) = &settings.exclude {
        suite.exclude_matching(pattern);
    }
    if let Some(pattern) = &settings.include {
        suite.retain_matching(pattern);
    }
    if settings.linkage_filter {
        suite.filter_by_linkage().await;
    }
    if settings.help_filter {
        suite.filter_by_help_text().await;
    }

    tracing::debug!("{} executables after filtering", suite.len());
    suite
}

fn make_reporter(cli: &Cli) -> Box<dyn Reporter> {
    let primary: Box<dyn Reporter> = match cli.format {
        OutputFormat::Human => Box::new(HumanReporter),
        OutputFormat::Json => Box::new(JsonReporter),
    };

    match &cli.junit_xml {
        Some(path) => Box::new(MultiReporter::new(vec![
            primary,
            Box::new(JunitReporter::new(path.clone())),
        ])),
        None => primary,
    }
}

fn load_codemodel(path: &Path) -> Result<CodeModel> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read codemodel {}", path.display()))?;
    CodeModel::from_json(&json)
        .with_context(|| format!("Failed to parse codemodel {}", path.display()))
}

async fn run_suite(
    suite: &mut TestSuite,
    slot: Option<&str>,
    options: &RunOptions,
    reporter: &mut dyn Reporter,
) -> Result<ExitCode> {
    if let Err(e) = signals::install_signal_handlers() {
        tracing::warn!("Could not install signal handlers: {}", e);
    }

    // Slots are needed both for --slot and for mapping failures back
    suite.introspect_all().await;

    let targets: Vec<PathBuf> = match slot {
        Some(name) => suite
            .find_by_slot_name(name)
            .into_iter()
            .map(|ex| ex.path().to_path_buf())
            .collect(),
        None => suite
            .executables()
            .iter()
            .map(|ex| ex.path().to_path_buf())
            .collect(),
    };

    if let (Some(name), true) = (slot, targets.is_empty()) {
        let message = format!("No executable has a slot named {}", name);
        reporter.on_error(&message);
        return Ok(ExitCode::FAILURE);
    }

    let run_start = Instant::now();
    let mut passed = 0;
    let mut failed = 0;
    reporter.on_run_start(targets.len());

    for path in targets {
        if signals::shutdown_requested() {
            tracing::warn!("Shutdown requested, skipping remaining executables");
            break;
        }

        let Some(executable) = suite
            .executables_mut()
            .iter_mut()
            .find(|ex| ex.path() == path)
        else {
            continue;
        };

        let id = executable.id();
        reporter.on_executable_start(&id, slot);

        let started = Instant::now();
        let ok = match executable.run(slot, options).await {
            Ok(ok) => ok,
            Err(e) => {
                reporter.on_error(&e.to_string());
                false
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        if ok {
            passed += 1;
        } else {
            failed += 1;
        }
        reporter.on_executable_finished(&ExecutableReport::from_run(
            executable,
            slot,
            ok,
            duration_ms,
        ));
    }

    reporter.on_run_finished(passed, failed, run_start.elapsed().as_millis() as u64);

    Ok(if failed == 0 && !signals::shutdown_requested() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
