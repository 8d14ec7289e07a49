//! omrscore CLI: score photographed bubble answer sheets.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use omrscore::{
    AlignmentMode, AnswerKey, EvaluateConfig, EvaluationResult, Evaluator, LayoutConfig,
    MultiMarkPolicy, MultipleMarkScoring,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "omrscore")]
#[command(about = "Score photographed or scanned bubble answer sheets against an answer key")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single sheet image.
    Evaluate(CliEvaluateArgs),

    /// Evaluate many sheet images, writing one JSON result per image.
    Batch(CliBatchArgs),

    /// Print the sheet layout and its derived counts.
    LayoutInfo {
        /// Layout JSON (defaults to the built-in 100-question sheet).
        #[arg(long)]
        layout: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct CliSheetArgs {
    /// Answer key JSON.
    #[arg(long)]
    key: PathBuf,

    /// Layout JSON (defaults to the built-in 100-question sheet).
    #[arg(long)]
    layout: Option<PathBuf>,

    /// Evaluation config JSON; command-line overrides are applied on top.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliEvaluateArgs {
    /// Path to the sheet image.
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    sheet: CliSheetArgs,

    /// Path to write the result (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Alignment strategy.
    #[arg(long, value_enum)]
    align: Option<AlignArg>,

    /// Report any question with two or more filled bubbles as multiple-marked.
    #[arg(long)]
    strict_multiple: bool,

    /// Score multiple-marked questions as incorrect.
    #[arg(long)]
    multiple_as_incorrect: bool,

    /// Points awarded for an incorrect answer (zero or negative).
    #[arg(long, allow_hyphen_values = true)]
    penalty: Option<f64>,

    /// Disable per-bubble position refinement.
    #[arg(long)]
    no_refine: bool,
}

#[derive(Debug, Clone, Args)]
struct CliBatchArgs {
    #[command(flatten)]
    sheet: CliSheetArgs,

    /// Directory receiving `<image stem>.json` results.
    #[arg(long)]
    out_dir: PathBuf,

    /// Sheet images.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlignArg {
    Auto,
    SheetBoundary,
    Fiducials,
}

impl AlignArg {
    fn to_core(self) -> AlignmentMode {
        match self {
            Self::Auto => AlignmentMode::Auto,
            Self::SheetBoundary => AlignmentMode::SheetBoundary,
            Self::Fiducials => AlignmentMode::Fiducials,
        }
    }
}

impl CliEvaluateArgs {
    fn apply_overrides(&self, config: &mut EvaluateConfig) {
        if let Some(align) = self.align {
            config.align.mode = align.to_core();
        }
        if self.strict_multiple {
            config.classify.multi_mark = MultiMarkPolicy::Strict;
        }
        if self.multiple_as_incorrect {
            config.scoring.multiple_marked = MultipleMarkScoring::CountAsIncorrect;
        }
        if let Some(penalty) = self.penalty {
            config.scoring.incorrect_weight = penalty;
        }
        if self.no_refine {
            config.grid.refine = false;
        }
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate(args) => run_evaluate(&args),
        Commands::Batch(args) => run_batch(&args),
        Commands::LayoutInfo { layout } => run_layout_info(layout.as_deref()),
    }
}

fn load_layout(path: Option<&Path>) -> CliResult<LayoutConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading layout: {}", path.display());
            Ok(LayoutConfig::from_json_file(path)?)
        }
        None => Ok(LayoutConfig::default()),
    }
}

fn load_inputs(args: &CliSheetArgs) -> CliResult<(LayoutConfig, AnswerKey, EvaluateConfig)> {
    let layout = load_layout(args.layout.as_deref())?;
    tracing::info!("Loading answer key: {}", args.key.display());
    let key = AnswerKey::from_json_file(&args.key)?;
    let config = match &args.config {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            EvaluateConfig::from_json_file(path)?
        }
        None => EvaluateConfig::default(),
    };
    Ok((layout, key, config))
}

fn open_image(path: &Path) -> CliResult<image::DynamicImage> {
    image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })
}

fn log_summary(label: &str, result: &EvaluationResult) {
    tracing::info!(
        "{}: {}/{} points ({:.1}%), {} correct, {} incorrect, {} blank, {} multiple",
        label,
        result.score,
        result.max_score,
        result.percentage,
        result.counts.correct,
        result.counts.incorrect,
        result.counts.blank,
        result.counts.multiple_marked,
    );
    if result.low_confidence_regions > 0 {
        tracing::warn!(
            "{}: {} bubble regions were located with low confidence",
            label,
            result.low_confidence_regions
        );
    }
}

// ── evaluate ───────────────────────────────────────────────────────────

fn run_evaluate(args: &CliEvaluateArgs) -> CliResult<()> {
    let (layout, key, mut config) = load_inputs(&args.sheet)?;
    args.apply_overrides(&mut config);
    let evaluator = Evaluator::with_config(layout, key, config)?;

    tracing::info!("Loading image: {}", args.image.display());
    let img = open_image(&args.image)?;
    tracing::info!("Image size: {}x{}", img.width(), img.height());

    let result = evaluator.evaluate(&img)?;
    log_summary(&args.image.display().to_string(), &result);

    let json = serde_json::to_string_pretty(&result)?;
    match &args.out {
        Some(out) => {
            std::fs::write(out, &json)?;
            tracing::info!("Results written to {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── batch ──────────────────────────────────────────────────────────────

fn sheet_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Output id per image (`<stem>.json`); stems shared by two images are rejected.
fn batch_ids(images: &[PathBuf]) -> CliResult<Vec<String>> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    let mut ids = Vec::with_capacity(images.len());
    for path in images {
        let id = sheet_id(path);
        if let Some(prev) = seen.insert(id.clone(), path.as_path()) {
            return Err(format!(
                "{} and {} would both be written to {id}.json",
                prev.display(),
                path.display()
            )
            .into());
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Decode every image. Unreadable ones are returned as failed ids.
fn load_sheets(
    ids: Vec<String>,
    images: &[PathBuf],
) -> (Vec<(String, image::DynamicImage)>, Vec<String>) {
    let mut sheets = Vec::with_capacity(ids.len());
    let mut failed = Vec::new();
    for (id, path) in ids.into_iter().zip(images) {
        match open_image(path) {
            Ok(img) => sheets.push((id, img)),
            Err(e) => {
                tracing::error!("{}: {}", id, e);
                failed.push(id);
            }
        }
    }
    (sheets, failed)
}

fn run_batch(args: &CliBatchArgs) -> CliResult<()> {
    let (layout, key, config) = load_inputs(&args.sheet)?;
    let evaluator = Evaluator::with_config(layout, key, config)?;
    let ids = batch_ids(&args.images)?;
    std::fs::create_dir_all(&args.out_dir)?;

    let (sheets, mut failed) = load_sheets(ids, &args.images);
    let mut written = 0usize;
    for ((id, _), outcome) in sheets.iter().zip(evaluator.evaluate_batch(&sheets)) {
        match outcome {
            Ok(result) => {
                log_summary(id, &result);
                let out = args.out_dir.join(format!("{id}.json"));
                std::fs::write(&out, serde_json::to_string_pretty(&result)?)?;
                written += 1;
            }
            Err(e) => {
                tracing::error!("{}: {} error: {}", e.sheet_id, e.source.kind(), e.source);
                failed.push(e.sheet_id);
            }
        }
    }

    tracing::info!(
        "Batch done: {} written to {}, {} failed",
        written,
        args.out_dir.display(),
        failed.len()
    );
    if !failed.is_empty() {
        return Err(format!("{} sheet(s) failed: {}", failed.len(), failed.join(", ")).into());
    }
    Ok(())
}

// ── layout-info ────────────────────────────────────────────────────────

fn run_layout_info(path: Option<&Path>) -> CliResult<()> {
    let layout = load_layout(path)?;
    layout.validate()?;

    println!("omrscore sheet layout");
    println!("  name:             {}", layout.name);
    println!(
        "  canonical size:   {}x{} px",
        layout.canonical_size_px[0], layout.canonical_size_px[1]
    );
    println!("  questions:        {}", layout.question_count);
    println!("  options:          {}", layout.options_per_question);
    println!(
        "  columns:          {} ({} questions each)",
        layout.column_count(),
        layout.questions_per_column
    );
    println!("  bubbles:          {}", layout.bubble_count());
    println!("  bubble radius:    {} px", layout.bubble_radius_px);
    match layout.fiducials {
        Some(f) => println!(
            "  fiducials:        {} px squares, inset {} px",
            f.size_px, f.inset_px
        ),
        None => println!("  fiducials:        none (sheet boundary alignment)"),
    }
    println!();
    println!("{}", layout.to_json_string()?);
    Ok(())
}
