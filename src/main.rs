mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chordia::analysis::result::ChordSegment;
use chordia::config::{self, Config};
use chordia::harmony::bars::quantize_to_bars;
use chordia::stream::SessionManager;
use chordia::{AnalysisResult, Engine, Request};
use cli::{AnalyzeArgs, Cli, Command, EngineChoice, OutputFormat};

#[derive(Serialize)]
struct Report<'a> {
    file: String,
    #[serde(flatten)]
    result: &'a AnalysisResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    bars: Option<Vec<ChordSegment>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let config = match config::discover_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}; using defaults", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    match cli.command {
        Command::Analyze(args) => run_analyze(args, config),
        Command::Stream { session } => run_stream(&session, config),
        Command::Fingerprint { file } => {
            if !file.exists() {
                anyhow::bail!("Input file not found: {}", file.display());
            }
            println!("{}", chordia::cache::fingerprint(&file));
            Ok(())
        }
    }
}

fn run_analyze(args: AnalyzeArgs, mut config: Config) -> Result<()> {
    // CLI overrides config
    if let Some(secs) = args.max_duration {
        config.analysis.max_duration_secs = secs;
    }
    let fast = match args.engine {
        EngineChoice::Precise => false,
        EngineChoice::Fast => {
            config.fast.enabled = true;
            true
        }
        EngineChoice::Auto => config.fast.enabled,
    };

    for file in &args.files {
        if !file.exists() {
            anyhow::bail!("Input file not found: {}", file.display());
        }
    }

    let engine = Engine::from_config(&config).context("Failed to set up analysis engine")?;
    log::info!(
        "Analyzing {} file(s), engine={:?}, max {} concurrent",
        args.files.len(),
        args.engine,
        config.limits.max_concurrent_analyses
    );

    let pb = if args.files.len() > 1 {
        let pb = ProgressBar::new(args.files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")
                .context("Invalid progress template")?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    // Plain threads, not rayon workers: callers block on the engine's gate.
    let workers = config.limits.max_concurrent_analyses.clamp(1, args.files.len());
    let (jobs_tx, jobs_rx) = crossbeam::channel::unbounded::<(usize, &PathBuf)>();
    for job in args.files.iter().enumerate() {
        jobs_tx.send(job).map_err(|_| anyhow::anyhow!("Failed to queue input files"))?;
    }
    drop(jobs_tx);

    type Outcome = (usize, PathBuf, chordia::Result<AnalysisResult>);
    let mut outcomes: Vec<Outcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let jobs = jobs_rx.clone();
                let (engine, pb) = (&engine, &pb);
                scope.spawn(move || {
                    let mut done = Vec::new();
                    for (index, file) in jobs.iter() {
                        let request = Request {
                            path: file.clone(),
                            fast,
                            separate_vocals: args.separate_vocals,
                        };
                        let outcome = engine.analyze(&request);
                        if let Some(pb) = pb {
                            pb.inc(1);
                        }
                        done.push((index, file.clone(), outcome));
                    }
                    done
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    outcomes.sort_by_key(|(index, _, _)| *index);

    if let Some(pb) = &pb {
        pb.finish_with_message("Analysis complete");
    }

    let mut failed = 0usize;
    let mut reports = Vec::new();
    for (_, file, outcome) in &outcomes {
        match outcome {
            Ok(result) => reports.push(Report {
                file: file.display().to_string(),
                result,
                bars: args.bars.then(|| bar_view(result, config.analysis.beats_per_bar)),
            }),
            Err(err) => {
                log::error!("Could not analyze {}: {}", file.display(), err);
                failed += 1;
            }
        }
    }

    let rendered = match args.format {
        OutputFormat::Json if reports.len() == 1 => serde_json::to_string_pretty(&reports[0])?,
        OutputFormat::Json => serde_json::to_string_pretty(&reports)?,
        OutputFormat::Text => reports.iter().map(render_text).collect::<Vec<_>>().join("\n"),
    };
    write_output(args.output.as_deref(), &rendered)?;

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) could not be analyzed", failed, outcomes.len());
    }
    Ok(())
}

/// Bars use the detected meter unless the result has no tempo.
fn bar_view(result: &AnalysisResult, fallback_beats: u32) -> Vec<ChordSegment> {
    let duration = result.chords.last().map(|c| c.end).unwrap_or(0.0);
    let beats = if result.tempo > 0.0 {
        result.meter as u32
    } else {
        fallback_beats
    };
    quantize_to_bars(&result.simple_chords, result.tempo, duration, beats)
}

fn render_text(report: &Report) -> String {
    let result = report.result;
    let mut out = format!(
        "{}\n  key: {} {}   tempo: {:.2} bpm   meter: {}/4\n",
        report.file,
        result.key,
        result.scale.as_str(),
        result.tempo,
        result.meter
    );
    if let Some(instrumental) = &result.instrumental_path {
        out.push_str(&format!("  instrumental: {}\n", instrumental));
    }
    let timeline = report.bars.as_deref().unwrap_or(&result.chords);
    for segment in timeline {
        out.push_str(&format!(
            "  {} - {}  {:<8} ({:.2})\n",
            format_time(segment.start),
            format_time(segment.end),
            segment.chord,
            segment.confidence
        ));
    }
    out
}

fn format_time(seconds: f32) -> String {
    let total_secs = seconds.max(0.0) as u64;
    let centis = ((seconds - total_secs as f32) * 100.0) as u64;
    format!("{:02}:{:02}.{:02}", total_secs / 60, total_secs % 60, centis.min(99))
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn run_stream(session: &str, config: Config) -> Result<()> {
    log::info!(
        "Streaming session {} ({} Hz PCM16, {:.1}s window)",
        session,
        config.stream.sample_rate,
        config.stream.window_secs
    );
    let manager = SessionManager::new(config.stream);
    manager.connect(session);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        for message in manager.handle(session, &line) {
            serde_json::to_writer(&mut out, &message)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }

    manager.disconnect(session);
    Ok(())
}
