use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use literal_patcher::config::{
    apply_patch_set, check_patch_set, load_from_path, resolve_target, PatchOutcome,
};
use literal_patcher::{
    apply_document, check_document, MatchCount, MatchError, MatchPolicy, MissingPolicy,
    PatchError, PatchResult, PatchRule, PatchStatus, SourceDocument,
};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "literal-patcher")]
#[command(about = "Literal text patching for source files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace one exact block of text in a file
    Patch(PatchArgs),

    /// Apply patch sets (TOML files or directories of them)
    Apply {
        /// Patch set files or directories (default: ./patches)
        patch_sets: Vec<PathBuf>,

        /// Directory that workspace-relative patch targets are resolved against
        #[arg(short, long, default_value = ".")]
        base: PathBuf,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report patch set status without modifying files
    Check {
        /// Patch set files or directories (default: ./patches)
        patch_sets: Vec<PathBuf>,

        /// Directory that workspace-relative patch targets are resolved against
        #[arg(short, long, default_value = ".")]
        base: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Args)]
struct PatchArgs {
    /// File to patch in place
    file: PathBuf,

    #[command(flatten)]
    search: SearchSource,

    #[command(flatten)]
    replace: ReplaceSource,

    /// Replace every occurrence instead of rejecting multiple matches
    #[arg(long)]
    all: bool,

    /// What to do when the search text is absent: error, warn or ignore
    #[arg(long, value_name = "POLICY", default_value = "error")]
    on_missing: MissingPolicy,

    /// Report "already applied" when the search text is absent but the
    /// replacement text is present
    #[arg(long)]
    detect_applied: bool,

    /// Dry run - show what would be changed without modifying the file
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SearchSource {
    /// Exact text to search for
    #[arg(long, value_name = "TEXT", allow_hyphen_values = true)]
    search: Option<String>,

    /// File holding the exact text to search for
    #[arg(long, value_name = "PATH")]
    search_file: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ReplaceSource {
    /// Replacement text
    #[arg(long, value_name = "TEXT", allow_hyphen_values = true)]
    replace: Option<String>,

    /// File holding the replacement text
    #[arg(long, value_name = "PATH")]
    replace_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("literal_patcher=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Patch(args) => cmd_patch(args),

        Commands::Apply {
            patch_sets,
            base,
            dry_run,
            diff,
        } => cmd_apply(patch_sets, &base, dry_run, diff),

        Commands::Check {
            patch_sets,
            base,
            format,
        } => cmd_check(patch_sets, &base, format),
    }
}

/// Read literal text given inline or through a file.
fn read_source(inline: Option<String>, file: Option<PathBuf>, what: &str) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read {what} text from {}", path.display())),
        (None, None) => anyhow::bail!("no {what} text given"),
    }
}

/// Helper: Expand patch set arguments into a sorted list of .toml files.
///
/// With no arguments, `./patches` is used.
fn discover_patch_sets(args: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    let roots = if args.is_empty() {
        vec![PathBuf::from("patches")]
    } else {
        args
    };

    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            files.push(root);
            continue;
        }
        if !root.is_dir() {
            anyhow::bail!("patch set not found: {}", root.display());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&root).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                found.push(entry.path().to_path_buf());
            }
        }
        if found.is_empty() {
            anyhow::bail!("no .toml patch sets found in {}", root.display());
        }
        found.sort();
        files.extend(found);
    }

    Ok(files)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    if !modified.ends_with('\n') {
        println!();
    }
}

/// Helper: Explain a failed patch on stderr
fn report_error(label: &str, err: &PatchError) {
    eprintln!("{} {}: Error - {}", "✗".red(), label, err);

    match err.match_error() {
        Some(MatchError::NoMatch { hint }) => {
            eprintln!("  {}", "CONFLICT: Search text matched no locations".red());
            eprintln!("  Possible causes:");
            eprintln!("    - Target block was edited or reformatted");
            eprintln!("    - Line endings or indentation differ");
            eprintln!("    - Patch targets the wrong file");
            if let Some(hint) = hint {
                eprintln!("  Closest line {}: {}", hint.line, hint.text.dimmed());
            }
        }
        Some(MatchError::AmbiguousMatch { count, offsets }) => {
            eprintln!(
                "  {}",
                format!("CONFLICT: Search text matched {} locations (expected 1)", count).red()
            );
            eprintln!("  Byte offsets: {:?}", offsets);
            eprintln!("  Action: Extend the search text to be unique, or pass --all");
        }
        _ => {}
    }
}

fn cmd_patch(args: PatchArgs) -> Result<()> {
    let search = read_source(args.search.search, args.search.search_file, "search")?;
    let replacement = read_source(args.replace.replace, args.replace.replace_file, "replace")?;

    let policy = if args.all {
        MatchPolicy::All
    } else {
        MatchPolicy::Reject
    };
    let rule = PatchRule::new(search, replacement)
        .on_multiple(policy)
        .on_missing(args.on_missing)
        .detect_applied(args.detect_applied);

    let label = args.file.display().to_string();
    let doc = match SourceDocument::load(&args.file) {
        Ok(doc) => doc,
        Err(err) => {
            report_error(&label, &PatchError::from(err));
            std::process::exit(1);
        }
    };

    let outcome = if args.dry_run {
        println!("{}", "[DRY RUN - showing what would be applied]".cyan());
        check_document(&doc, &rule)
    } else {
        apply_document(&doc, &rule)
    };

    match outcome {
        Ok(result) => {
            print_result(&label, &result, args.dry_run);
            if args.diff && result.changed() {
                display_diff(&args.file, doc.content(), &result.content);
            }
            Ok(())
        }
        Err(err) => {
            report_error(&label, &err);
            std::process::exit(1);
        }
    }
}

fn print_result(label: &str, result: &PatchResult, dry_run: bool) {
    match result.status {
        PatchStatus::Applied => {
            let verb = if dry_run { "Would replace" } else { "Replaced" };
            println!(
                "{} {}: {} {} occurrence(s)",
                "✓".green(),
                label,
                verb,
                result.replaced
            );
        }
        PatchStatus::AlreadyApplied => {
            println!("{} {}: Already applied", "⊙".yellow(), label);
        }
        PatchStatus::Unmatched => {
            println!("{} {}: Search text not found, unchanged", "⊘".cyan(), label);
        }
    }
}

#[derive(Default)]
struct Totals {
    applied: usize,
    already_applied: usize,
    unmatched: usize,
    failed: usize,
}

impl Totals {
    fn record(&mut self, outcome: &Result<PatchResult, PatchError>) {
        match outcome {
            Ok(result) => match result.status {
                PatchStatus::Applied => self.applied += 1,
                PatchStatus::AlreadyApplied => self.already_applied += 1,
                PatchStatus::Unmatched => self.unmatched += 1,
            },
            Err(_) => self.failed += 1,
        }
    }

    fn print(&self) {
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", self.applied).green());
        println!(
            "  {} already applied",
            format!("{}", self.already_applied).yellow()
        );
        println!("  {} unmatched", format!("{}", self.unmatched).cyan());
        println!("  {} failed", format!("{}", self.failed).red());
    }
}

fn cmd_apply(patch_sets: Vec<PathBuf>, base: &Path, dry_run: bool, show_diff: bool) -> Result<()> {
    let files = discover_patch_sets(patch_sets)?;
    let mut totals = Totals::default();

    println!("Base: {}", base.display());
    println!();

    for patch_file in files {
        println!("Loading patches from {}...", patch_file.display());
        let set = load_from_path(&patch_file)?;

        // Capture contents of touched files before applying (for diff output).
        let mut before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff {
            for patch in &set.patches {
                let target = resolve_target(&set, patch, base);
                if let Ok(content) = fs::read_to_string(&target) {
                    before.entry(target).or_insert(content);
                }
            }
        }

        let results = if dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
            check_patch_set(&set, base)
        } else {
            apply_patch_set(&set, base)
        };

        // Latest content per file: patches on one file chain, so the last
        // successful result holds the final text.
        let mut after: HashMap<PathBuf, String> = HashMap::new();

        for (patch_id, outcome) in &results {
            totals.record(outcome);
            match outcome {
                Ok(result) => {
                    print_result(patch_id, result, dry_run);
                    if show_diff {
                        if let Some(patch) = set.patches.iter().find(|p| &p.id == patch_id) {
                            after.insert(resolve_target(&set, patch, base), result.content.clone());
                        }
                    }
                }
                Err(err) => report_error(patch_id, err),
            }
        }

        let mut changed: Vec<_> = after.into_iter().collect();
        changed.sort_by(|a, b| a.0.cmp(&b.0));
        for (file, content) in changed {
            if let Some(original) = before.get(&file) {
                if original != &content {
                    display_diff(&file, original, &content);
                }
            }
        }

        println!();
    }

    totals.print();

    if totals.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Serialize)]
struct ReportEntry {
    patch_set: PathBuf,
    id: String,
    file: Option<PathBuf>,
    #[serde(flatten)]
    outcome: ReportOutcome,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ReportOutcome {
    Evaluated {
        status: PatchStatus,
        replaced: usize,
        matches: MatchCount,
    },
    Failed {
        error: String,
    },
}

impl ReportEntry {
    fn new(patch_set: &Path, target: Option<PathBuf>, (id, outcome): PatchOutcome) -> Self {
        let (file, outcome) = match outcome {
            Ok(result) => (
                target,
                ReportOutcome::Evaluated {
                    status: result.status,
                    replaced: result.replaced,
                    matches: result.matches,
                },
            ),
            Err(err) => (
                err.file().map(Path::to_path_buf).or(target),
                ReportOutcome::Failed {
                    error: err.to_string(),
                },
            ),
        };

        Self {
            patch_set: patch_set.to_path_buf(),
            id,
            file,
            outcome,
        }
    }
}

fn cmd_check(patch_sets: Vec<PathBuf>, base: &Path, format: OutputFormat) -> Result<()> {
    let files = discover_patch_sets(patch_sets)?;
    let mut totals = Totals::default();
    let mut entries = Vec::new();

    for patch_file in files {
        let set = load_from_path(&patch_file)?;
        for outcome in check_patch_set(&set, base) {
            totals.record(&outcome.1);
            let target = set
                .patches
                .iter()
                .find(|p| p.id == outcome.0)
                .map(|p| resolve_target(&set, p, base));
            entries.push(ReportEntry::new(&patch_file, target, outcome));
        }
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            println!("{}", "Patch Status Report".bold());
            println!("Base: {}", base.display());
            println!();
            for entry in &entries {
                let file = entry
                    .file
                    .as_deref()
                    .map(|f| f.display().to_string())
                    .unwrap_or_default();
                match &entry.outcome {
                    ReportOutcome::Evaluated {
                        status: PatchStatus::Applied,
                        replaced,
                        ..
                    } => println!(
                        "{} {}: would apply to {} ({} match(es))",
                        "⊙".yellow(),
                        entry.id,
                        file,
                        replaced
                    ),
                    ReportOutcome::Evaluated {
                        status: PatchStatus::AlreadyApplied,
                        ..
                    } => {
                        println!("{} {}: already applied to {}", "✓".green(), entry.id, file)
                    }
                    ReportOutcome::Evaluated {
                        status: PatchStatus::Unmatched,
                        ..
                    } => {
                        println!("{} {}: unmatched in {}", "⊘".cyan(), entry.id, file)
                    }
                    ReportOutcome::Failed { error } => {
                        println!("{} {}: {}", "✗".red(), entry.id, error.dimmed())
                    }
                }
            }
            println!();
            totals.print();
        }
    }

    if totals.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
