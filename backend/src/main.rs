//! Converter CLI - convert CSV exports between schemas
//!
//! # Main Commands
//!
//! ```bash
//! converter init                                   # Write built-in specs
//! converter specs                                  # List sources, destinations, mappings
//! converter validate -m <mapping> input.csv        # Preview a conversion
//! converter convert -m <mapping> input.csv -o out.csv
//! converter process -m <mapping>                   # Convert every file in the input directory
//! converter update-row -m <mapping> input.csv --line 3 --set Type=BUY --write
//! converter transforms                             # Transform and filter reference
//! ```

use clap::{ArgAction, Parser, Subcommand};
use converter::config::Settings;
use converter::logging::{init_logging, LogConfig, LogFormat};
use converter::parser::{self, ParseResult};
use converter::pipeline::{self, PipelineOptions, Report};
use converter::store::{JsonSpecStore, ResolvedMapping, SpecRepository};
use converter::transform::{operators_description, transforms_description, Mapper};
use converter::PipelineError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "converter")]
#[command(about = "Convert CSV files between schemas with declarative mappings", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "pretty", global = true)]
    log_format: LogFormat,

    /// Data directory (overrides CONVERTER_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Spec directory (default: <data>/config)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the built-in specs when none exist
    Init,

    /// List sources, destinations and mappings
    Specs,

    /// Validate a CSV file against a mapping without writing output
    Validate {
        /// Mapping ID
        #[arg(short, long)]
        mapping: String,

        /// Input CSV file
        input: PathBuf,

        /// Print the full report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Convert a CSV file; nothing is written when any row has errors
    Convert {
        /// Mapping ID
        #[arg(short, long)]
        mapping: String,

        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write valid rows even when other rows have errors
        #[arg(long)]
        force: bool,
    },

    /// Convert every CSV file in the mapping's input directory
    Process {
        /// Mapping ID
        #[arg(short, long)]
        mapping: String,

        /// Write valid rows even when other rows have errors
        #[arg(long)]
        force: bool,
    },

    /// Edit one row of a CSV file and validate it again
    UpdateRow {
        /// Mapping ID
        #[arg(short, long)]
        mapping: String,

        /// Input CSV file
        input: PathBuf,

        /// Line number as shown in reports: the header is line 1 and blank
        /// lines are not counted
        #[arg(short, long)]
        line: usize,

        /// Column assignment, repeatable: --set Column=value
        #[arg(short, long = "set", value_parser = parse_assignment, required = true)]
        set: Vec<(String, String)>,

        /// Save the edited file
        #[arg(short, long)]
        write: bool,
    },

    /// Show available transforms and filter operators
    Transforms,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("⚠️  Logging disabled: {}", e);
    }

    let mut settings = match cli.data_dir {
        Some(dir) => Settings::new(dir),
        None => Settings::from_env(),
    };
    if let Some(dir) = cli.config_dir {
        settings = settings.with_config_dir(dir);
    }

    let result = match cli.command {
        Commands::Init => cmd_init(&settings),
        Commands::Specs => cmd_specs(&settings),
        Commands::Validate { mapping, input, json } => cmd_validate(&settings, &mapping, &input, json),
        Commands::Convert {
            mapping,
            input,
            output,
            force,
        } => cmd_convert(&settings, &mapping, &input, output.as_deref(), force),
        Commands::Process { mapping, force } => cmd_process(&settings, &mapping, force),
        Commands::UpdateRow {
            mapping,
            input,
            line,
            set,
            write,
        } => cmd_update_row(&settings, &mapping, &input, line, set, write),
        Commands::Transforms => cmd_transforms(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => Ok((column.trim().to_string(), value.to_string())),
        _ => Err(format!("expected Column=value, got '{}'", s)),
    }
}

fn open_store(settings: &Settings) -> CliResult<JsonSpecStore> {
    Ok(JsonSpecStore::open(&settings.config_dir)?)
}

fn load_mapping(settings: &Settings, mapping_id: &str) -> CliResult<ResolvedMapping> {
    let store = open_store(settings)?;
    let resolved = store.resolve(mapping_id)?;
    let name = if resolved.mapping.name.is_empty() {
        &resolved.mapping.id
    } else {
        &resolved.mapping.name
    };
    eprintln!("🔗 Mapping: {} ({} → {})", name, resolved.source.id, resolved.destination.id);
    Ok(resolved)
}

fn checked_mapper(resolved: &ResolvedMapping) -> CliResult<Mapper<'_>> {
    Ok(Mapper::checked(&resolved.mapping, &resolved.source, &resolved.destination)?)
}

fn read_input(input: &Path, resolved: &ResolvedMapping) -> CliResult<ParseResult> {
    eprintln!("📄 Reading: {}", input.display());
    let parsed = parser::parse_file_for(input, &resolved.source)?;
    eprintln!("   Encoding: {}", parsed.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(parsed.delimiter));
    eprintln!("   Rows: {}", parsed.records.len());
    Ok(parsed)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn print_log(report: &Report) {
    for entry in report.log.entries() {
        eprintln!("{}", entry.render());
    }
}

fn cmd_init(settings: &Settings) -> CliResult<()> {
    settings.ensure_dirs()?;
    let mut store = open_store(settings)?;

    if store.init_defaults()? {
        eprintln!("✅ Default specs written to: {}", settings.config_dir.display());
    } else {
        eprintln!("📋 Specs already present in: {}", settings.config_dir.display());
    }

    for source in store.sources() {
        fs::create_dir_all(settings.input_path(&source.default_directory))?;
    }
    for destination in store.destinations() {
        fs::create_dir_all(settings.output_path(&destination.default_directory))?;
    }
    eprintln!("   Input: {}", settings.input_dir.display());
    eprintln!("   Output: {}", settings.output_dir.display());
    Ok(())
}

fn cmd_specs(settings: &Settings) -> CliResult<()> {
    let store = open_store(settings)?;

    let sources = store.sources();
    let destinations = store.destinations();
    let mappings = store.mappings();
    if sources.is_empty() && destinations.is_empty() && mappings.is_empty() {
        eprintln!("📋 No specs stored yet.");
        eprintln!("   Use 'converter init' to write the built-in ones.");
        return Ok(());
    }

    println!("Sources ({}):", sources.len());
    for spec in &sources {
        println!("  📄 {} ({}) - {} columns", spec.name, spec.id, spec.columns.len());
    }
    println!("\nDestinations ({}):", destinations.len());
    for spec in &destinations {
        println!("  📄 {} ({}) - {} columns", spec.name, spec.id, spec.columns.len());
    }
    println!("\nMappings ({}):", mappings.len());
    for mapping in &mappings {
        println!("  🔗 {} ({}): {} → {}", mapping.name, mapping.id, mapping.source_id, mapping.destination_id);
        println!(
            "     Field mappings: {}, Filter rules: {}",
            mapping.field_mappings.len(),
            mapping.filter_rules.len()
        );
        if let Err(problems) = store
            .resolve(&mapping.id)
            .map_err(|e| vec![e.to_string()])
            .and_then(|r| r.mapping.check(&r.source, &r.destination))
        {
            for problem in problems {
                println!("     ⚠️  {}", problem);
            }
        }
    }
    Ok(())
}

fn cmd_validate(settings: &Settings, mapping_id: &str, input: &Path, json: bool) -> CliResult<()> {
    let resolved = load_mapping(settings, mapping_id)?;
    let mapper = checked_mapper(&resolved)?;
    let parsed = read_input(input, &resolved)?;

    let report = pipeline::validate(&mapper, &parsed.records);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_log(&report);
    }

    if !report.is_ok() {
        return Err(format!("{} row(s) have errors", report.error_count()).into());
    }
    Ok(())
}

/// Convert one parsed file. Returns the report, or prints why output was withheld.
fn run_convert(mapper: &Mapper<'_>, parsed: &ParseResult, force: bool) -> CliResult<Report> {
    let options = if force {
        PipelineOptions::default().allow_errors()
    } else {
        PipelineOptions::default()
    };

    match pipeline::convert_with(mapper, &parsed.records, options) {
        Ok(report) => {
            print_log(&report);
            Ok(report)
        }
        Err(PipelineError::HasErrors { count, report }) => {
            print_log(&report);
            for error in report.errors.iter().take(10) {
                eprintln!("   - {}", error.summary());
            }
            Err(format!("{} row(s) have errors, nothing written (use --force to keep valid rows)", count).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_convert(
    settings: &Settings,
    mapping_id: &str,
    input: &Path,
    output: Option<&Path>,
    force: bool,
) -> CliResult<()> {
    let resolved = load_mapping(settings, mapping_id)?;
    let mapper = checked_mapper(&resolved)?;
    let parsed = read_input(input, &resolved)?;

    let report = run_convert(&mapper, &parsed, force)?;

    match output {
        Some(path) => {
            parser::write_file(path, &resolved.destination, &report.converted)?;
            eprintln!("💾 Output written to: {}", path.display());
        }
        None => {
            let headers = parser::output_headers(&resolved.destination, &report.converted);
            parser::write_records(
                std::io::stdout().lock(),
                &headers,
                &report.converted,
                resolved.destination.delimiter,
            )?;
        }
    }
    Ok(())
}

fn cmd_process(settings: &Settings, mapping_id: &str, force: bool) -> CliResult<()> {
    let resolved = load_mapping(settings, mapping_id)?;
    let mapper = checked_mapper(&resolved)?;

    let input_dir = settings.input_path(&resolved.source.default_directory);
    let output_dir = settings.output_path(&resolved.destination.default_directory);

    let mut files: Vec<PathBuf> = fs::read_dir(&input_dir)
        .map_err(|e| format!("Cannot read {}: {}", input_dir.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    files.sort();

    if files.is_empty() {
        eprintln!("📋 No CSV files in {}", input_dir.display());
        return Ok(());
    }

    let mut failed = 0;
    for input in &files {
        let parsed = read_input(input, &resolved)?;
        match run_convert(&mapper, &parsed, force) {
            Ok(report) => {
                let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
                let path = output_dir.join(format!("{}_{}.csv", stem, resolved.destination.id));
                parser::write_file(&path, &resolved.destination, &report.converted)?;
                eprintln!("💾 Output written to: {}\n", path.display());
            }
            Err(e) => {
                failed += 1;
                eprintln!("❌ {}: {}\n", input.display(), e);
            }
        }
    }

    eprintln!("📊 Processed {} file(s), {} failed", files.len(), failed);
    if failed > 0 {
        return Err(format!("{} file(s) were not converted", failed).into());
    }
    Ok(())
}

fn cmd_update_row(
    settings: &Settings,
    mapping_id: &str,
    input: &Path,
    line: usize,
    set: Vec<(String, String)>,
    write: bool,
) -> CliResult<()> {
    let resolved = load_mapping(settings, mapping_id)?;
    let mapper = checked_mapper(&resolved)?;
    let parsed = read_input(input, &resolved)?;

    let index = line
        .checked_sub(2)
        .ok_or_else(|| format!("Line {} is the header; data starts at line 2", line))?;
    let patch: HashMap<String, String> = set.into_iter().collect();
    for column in patch.keys() {
        if !parsed.headers.contains(column) {
            eprintln!("⚠️  Column '{}' not in file, ignored", column);
        }
    }

    let rows = pipeline::update_row(&parsed.records, index, &patch)?;
    if let Some(physical) = parsed.physical_line(index).filter(|&p| p != line as u64) {
        eprintln!("ℹ️  Line {} is line {} of {}", line, physical, input.display());
    }
    let execution = mapper.execute(index, &rows[index]);
    match &execution.outcome {
        converter::RowOutcome::Converted(record) => {
            eprintln!("✅ Line {}: Valid", line);
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        converter::RowOutcome::Skipped => eprintln!("⚠️  Line {}: Skipped (filtered out)", line),
        converter::RowOutcome::Failed(error) => eprintln!("❌ {}", error.summary()),
    }

    if write {
        let file = fs::File::create(input)?;
        parsed.write_back(file, &rows)?;
        eprintln!("💾 Saved: {}", input.display());
    }

    let report = pipeline::validate(&mapper, &rows);
    eprintln!("{}", report.summary());
    Ok(())
}

fn cmd_transforms() -> CliResult<()> {
    println!("{}", transforms_description());
    println!();
    println!("{}", operators_description());
    Ok(())
}
