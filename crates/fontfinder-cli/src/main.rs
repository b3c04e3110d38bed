use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fontfinder_contracts::analysis::AnalysisReport;
use fontfinder_contracts::assets::ImageAsset;
use fontfinder_contracts::commands::{parse_intent, Intent, SESSION_HELP_COMMANDS};
use fontfinder_contracts::events::{new_session_id, EventWriter};
use fontfinder_contracts::models::{ModelSelector, ANALYSIS_CAPABILITY};
use fontfinder_engine::{
    AnalysisSession, Analyzer, AnalyzerConfig, GeminiClient, ModelClient, PreviewRegistry,
    SessionOutcome,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fontfinder", version, about = "Identify fonts from images")]
struct Cli {
    /// Fallback `KEY=VALUE` file consulted after the process environment.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one or more images in a single request.
    Analyze(AnalyzeArgs),
    /// Interactive session with a pending image set.
    Session(SessionArgs),
    /// List known analysis models.
    Models,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fontfinder error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args, &cli.env_file),
        Command::Session(args) => {
            run_session(args, &cli.env_file)?;
            Ok(0)
        }
        Command::Models => {
            print!("{}", format_models(&ModelSelector::new(None)));
            Ok(0)
        }
    }
}

fn open_events(path: Option<&Path>) -> Option<EventWriter> {
    path.map(|path| EventWriter::new(path, new_session_id()))
}

/// Resolves configuration and the model, returning selection warnings
/// alongside the analyzer.
fn build_analyzer(
    env_file: &Path,
    requested_model: Option<&str>,
    events: Option<EventWriter>,
) -> Result<(Analyzer<GeminiClient>, Vec<String>)> {
    let config = AnalyzerConfig::from_env_with_dotenv(env_file)
        .with_context(|| format!("failed to load configuration (env file {})", env_file.display()))?;
    let requested = requested_model
        .map(str::to_string)
        .unwrap_or_else(|| config.model.clone());
    let selection = ModelSelector::new(None)
        .select_for_analysis(Some(&requested))
        .map_err(anyhow::Error::msg)?;
    let warnings: Vec<String> = selection.fallback_reason.into_iter().collect();
    debug!(model = %selection.model.name, "resolved analysis model");

    let analyzer = Analyzer::gemini(config.with_model(selection.model.name))
        .context("failed to build Gemini client")?
        .with_events(events);
    Ok((analyzer, warnings))
}

fn load_assets(paths: &[PathBuf]) -> Result<Vec<ImageAsset>> {
    paths.iter().map(|path| load_asset(path)).collect()
}

fn load_asset(path: &Path) -> Result<ImageAsset> {
    let asset = ImageAsset::from_path(path)?;
    if asset.is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(asset)
}

fn run_analyze(args: AnalyzeArgs, env_file: &Path) -> Result<i32> {
    let assets = load_assets(&args.images)?;
    let (analyzer, warnings) =
        build_analyzer(env_file, args.model.as_deref(), open_events(args.events.as_deref()))?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    match analyzer.analyze_report(&assets) {
        Ok(mut report) => {
            let mut all_warnings = warnings;
            all_warnings.append(&mut report.warnings);
            report.warnings = all_warnings;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", format_report(&report));
            }
            Ok(0)
        }
        Err(err) => {
            eprintln!("fontfinder error: {err}");
            if let Some(raw) = err.raw_response() {
                eprintln!("raw model response:\n{raw}");
            }
            Ok(1)
        }
    }
}

fn run_session(args: SessionArgs, env_file: &Path) -> Result<()> {
    let events = open_events(args.events.as_deref());
    let (analyzer, warnings) = build_analyzer(env_file, args.model.as_deref(), events.clone())?;
    for warning in &warnings {
        println!("Warning: {warning}");
    }
    let mut shell = SessionShell::new(analyzer, events);

    println!(
        "Font Finder session started (model {}). Type /help for commands.",
        shell.analyzer.model()
    );
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if !shell.handle(&intent, &mut stdout)? {
            break;
        }
    }
    Ok(())
}

/// Interactive state: the analyzer plus the pending image set.
struct SessionShell<C: ModelClient> {
    analyzer: Analyzer<C>,
    session: AnalysisSession<PreviewRegistry>,
    selector: ModelSelector,
}

impl<C: ModelClient> SessionShell<C> {
    fn new(analyzer: Analyzer<C>, events: Option<EventWriter>) -> Self {
        Self {
            analyzer,
            session: AnalysisSession::new(PreviewRegistry::default()).with_events(events),
            selector: ModelSelector::new(None),
        }
    }

    /// Applies one intent; returns `false` when the session should end.
    fn handle(&mut self, intent: &Intent, out: &mut impl Write) -> Result<bool> {
        match intent.action.as_str() {
            "noop" => {}
            "help" => writeln!(out, "Commands: {}", SESSION_HELP_COMMANDS.join(" "))?,
            "quit" => return Ok(false),
            "add_images" => self.add_images(&intent.paths(), out)?,
            "remove_image" => {
                let Some(token) = intent.arg("id") else {
                    writeln!(out, "/remove requires an image id or list position")?;
                    return Ok(true);
                };
                match self.session.find_id(token) {
                    Some(id) => {
                        self.session.remove(&id)?;
                        writeln!(out, "Removed {}", short_id(&id))?;
                    }
                    None => writeln!(out, "No pending image matches '{token}'")?,
                }
            }
            "list_images" => write!(out, "{}", self.format_images())?,
            "clear_images" => {
                let removed = self.session.clear()?;
                writeln!(out, "Cleared {removed} image(s)")?;
            }
            "set_model" => {
                let Some(requested) = intent.arg("model") else {
                    writeln!(out, "Model: {}", self.analyzer.model())?;
                    return Ok(true);
                };
                let selection = self
                    .selector
                    .select_for_analysis(Some(requested))
                    .map_err(anyhow::Error::msg)?;
                if let Some(reason) = selection.fallback_reason.as_deref() {
                    writeln!(out, "Warning: {reason}")?;
                }
                self.analyzer.set_model(selection.model.name.clone());
                writeln!(out, "Model set to {}", selection.model.name)?;
            }
            "analyze" => match self.session.analyze_with(&self.analyzer) {
                Ok(SessionOutcome::Result(report)) => write!(out, "{}", format_report(report))?,
                Ok(SessionOutcome::Error {
                    message,
                    raw_response,
                }) => {
                    writeln!(out, "Analysis failed: {message}")?;
                    if let Some(raw) = raw_response {
                        writeln!(out, "raw model response:\n{raw}")?;
                    }
                }
                Err(err) => writeln!(out, "{err}")?,
            },
            "unknown" => {
                let command = intent.arg("command").unwrap_or_default();
                writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
            }
            other => writeln!(out, "Unhandled action {other}")?,
        }
        Ok(true)
    }

    fn add_images(&mut self, paths: &[String], out: &mut impl Write) -> Result<()> {
        if paths.is_empty() {
            writeln!(out, "/add requires one or more paths")?;
            return Ok(());
        }
        let mut assets = Vec::with_capacity(paths.len());
        for path in paths {
            match load_asset(Path::new(path)) {
                Ok(asset) => assets.push(asset),
                Err(err) => writeln!(out, "Skipped {path}: {err:#}")?,
            }
        }
        let offered = assets.len();
        let skipped = self.session.add_assets(assets)?;
        for asset in &skipped {
            writeln!(
                out,
                "Skipped {}: not an image ({})",
                asset.file_name(),
                asset.media_type()
            )?;
        }
        writeln!(
            out,
            "Added {} image(s); {} pending",
            offered - skipped.len(),
            self.session.images().len()
        )?;
        Ok(())
    }

    fn format_images(&self) -> String {
        if self.session.images().is_empty() {
            return "No pending images. Use /add <paths>.\n".to_string();
        }
        let mut text = String::new();
        for (idx, row) in self.session.images().iter().enumerate() {
            text.push_str(&format!(
                "{}. {} {} ({}, {} bytes)\n",
                idx + 1,
                short_id(row.asset.id()),
                row.asset.file_name(),
                row.asset.media_type(),
                row.asset.len()
            ));
        }
        text
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_report(report: &AnalysisReport) -> String {
    let mut text = format!("Font: {}\n", report.result.font_name);
    if !report.result.description.trim().is_empty() {
        text.push_str(&format!("{}\n", report.result.description.trim()));
    }
    if report.result.store_links.is_empty() {
        text.push_str("No store links returned.\n");
    } else {
        text.push_str("Where to get it:\n");
        for (idx, link) in report.result.store_links.iter().enumerate() {
            text.push_str(&format!("  {}. {} <{}>\n", idx + 1, link.name, link.url));
        }
    }
    for warning in &report.warnings {
        text.push_str(&format!("Warning: {warning}\n"));
    }
    text.push_str(&format!(
        "({} image(s), model {}, {} ms)\n",
        report.image_count, report.model, report.elapsed_ms
    ));
    text
}

fn format_models(selector: &ModelSelector) -> String {
    let default = selector
        .select_for_analysis(None)
        .map(|selection| selection.model.name)
        .unwrap_or_default();
    let mut text = String::new();
    for spec in selector.registry.list() {
        let marker = if spec.name == default { "*" } else { " " };
        let usable = if spec.supports(ANALYSIS_CAPABILITY) {
            ""
        } else {
            " (not usable for analysis)"
        };
        text.push_str(&format!(
            "{marker} {} [{}] {}{usable}\n",
            spec.name,
            spec.provider,
            spec.capabilities.join(",")
        ));
    }
    text
}
