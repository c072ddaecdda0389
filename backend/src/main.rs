//! Fieldload CLI - import, map and submit field data spreadsheets
//!
//! ```bash
//! fieldload serve                                          # Start HTTP server (port 3000)
//! fieldload parse farmers.csv                              # CSV grid as JSON
//! fieldload transform farmers.csv -s schema.json -m map.json
//! fieldload submit farmers.csv -s schema.json -m map.json --export-dir out/
//! fieldload mapping list                                   # Manage mapping presets
//! ```

use clap::{Parser, Subcommand};
use fieldload::{
    export_failed_or_pending, export_successful, read_file, CsvTable, Dataset, HttpBroadcaster, HttpUploader,
    MappingRegistry, MappingSet, ServiceConfig, SubmissionPipeline, SubmitConfig, TargetSchema,
};
use std::fs;
use std::path::{Path, PathBuf};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "fieldload")]
#[command(about = "Map spreadsheet rows onto a target schema and submit them in chunks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output the grid as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transform CSV rows into target-schema records
    Transform {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transform and submit every row, then export the results
    Submit {
        #[command(flatten)]
        source: SourceArgs,

        /// Rows per chunk (default: FIELDLOAD_CHUNK_SIZE or 15)
        #[arg(short, long)]
        chunk_size: Option<usize>,

        /// Where to write successful.csv and incomplete.csv
        #[arg(short, long, default_value = ".")]
        export_dir: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Rows per chunk for submissions
        #[arg(short, long)]
        chunk_size: Option<usize>,
    },

    /// Manage mapping presets
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Input CSV file
    input: PathBuf,

    /// Target schema JSON (array of fields)
    #[arg(short, long)]
    schema: PathBuf,

    /// Mapping JSON file. Without it, a stored preset is used.
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Stored preset id
    #[arg(long, conflicts_with = "mapping")]
    preset: Option<String>,

    /// Treat the first row as data
    #[arg(long)]
    no_headers: bool,
}

#[derive(Subcommand)]
enum MappingAction {
    /// List stored presets
    List,

    /// Import a mapping JSON file as a preset
    Import {
        /// Mapping JSON file
        file: PathBuf,
        /// Preset name (default: file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show a preset
    Show {
        /// Preset ID
        id: String,
    },

    /// Delete a preset
    Delete {
        /// Preset ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),
        Commands::Transform { source, output } => cmd_transform(&source, output.as_deref()),
        Commands::Submit {
            source,
            chunk_size,
            export_dir,
        } => cmd_submit(&source, chunk_size, &export_dir).await,
        Commands::Serve { port, chunk_size } => cmd_serve(port, chunk_size).await,
        Commands::Mapping { action } => cmd_mapping(action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let decoded = read_file(input)?;
    let grid = fieldload::parse(&decoded.text);

    eprintln!("   Encoding: {}", decoded.encoding);
    eprintln!("✅ Parsed {} rows", grid.len());

    write_output(&serde_json::to_string_pretty(&grid)?, output)
}

fn cmd_transform(source: &SourceArgs, output: Option<&Path>) -> CliResult {
    let dataset = load_dataset(source)?;

    let records: Vec<_> = dataset.records().iter().map(|r| r.to_json()).collect();
    eprintln!("⚙️  Transformed {} records", records.len());

    write_output(&serde_json::to_string_pretty(&records)?, output)
}

async fn cmd_submit(source: &SourceArgs, chunk_size: Option<usize>, export_dir: &Path) -> CliResult {
    let config = match chunk_size {
        Some(n) => SubmitConfig::new(n)?,
        None => SubmitConfig::from_env()?,
    };
    let services = ServiceConfig::from_env();
    let uploader = HttpUploader::from_config(&services).ok_or("FIELDLOAD_UPLOAD_URL is not set")?;
    let broadcaster = HttpBroadcaster::from_config(&services).ok_or("FIELDLOAD_BROADCAST_URL is not set")?;

    let mut dataset = load_dataset(source)?;
    let pipeline = SubmissionPipeline::new(uploader, broadcaster, config);

    eprintln!("\n📤 Submitting {} rows", dataset.len());
    let report = pipeline.submit_all(&mut dataset).await;

    eprintln!("\n{}", "=".repeat(60));
    eprintln!("📊 SUMMARY");
    eprintln!("{}", "=".repeat(60));
    eprintln!("   Succeeded:     {}", report.succeeded);
    eprintln!("   Failed twice:  {}", report.failed_twice);
    eprintln!("   Not attempted: {}", report.pending);
    eprintln!("   Transactions:  {}", report.tx_hashes.len());
    if report.declined {
        eprintln!("   ⛔ Stopped: signing declined");
    } else if report.stopped {
        eprintln!("   ⚠️  Stopped after a row failed twice");
    }
    eprintln!("{}", "=".repeat(60));

    fs::create_dir_all(export_dir)?;
    let successful = export_dir.join("successful.csv");
    fs::write(&successful, export_successful(&dataset)?)?;
    eprintln!("💾 {}", successful.display());

    if dataset.status_counts().success < dataset.len() {
        let incomplete = export_dir.join("incomplete.csv");
        fs::write(&incomplete, export_failed_or_pending(&dataset)?)?;
        eprintln!("💾 {} (fix and re-import)", incomplete.display());
    }

    Ok(())
}

async fn cmd_serve(port: u16, chunk_size: Option<usize>) -> CliResult {
    let config = match chunk_size {
        Some(n) => SubmitConfig::new(n)?,
        None => SubmitConfig::from_env()?,
    };
    fieldload::server::start_server(port, config).await
}

fn cmd_mapping(action: MappingAction) -> CliResult {
    let mut registry = MappingRegistry::new();

    match action {
        MappingAction::List => {
            let presets = registry.list();
            if presets.is_empty() {
                eprintln!("📋 No mapping presets stored yet.");
                eprintln!("   Use 'fieldload mapping import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Stored presets ({}):\n", presets.len());
            for p in presets {
                println!("  📄 {} ({})", p.name, p.id);
                println!("     Columns: {}", p.source_columns.join(", "));
                println!("     Fields: {}", p.mappings.len());
                println!("     Uses: {}", p.use_count);
                if let Some(ref last) = p.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        MappingAction::Import { file, name } => {
            eprintln!("📥 Importing mapping from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Preset saved with ID: {}", id);
        }

        MappingAction::Show { id } => {
            let p = registry.get(&id)?;
            println!("📄 Preset: {} ({})\n", p.name, p.id);
            println!("Columns: {}", p.source_columns.join(", "));
            println!("Created: {}", p.created_at);
            println!("Uses: {}", p.use_count);
            println!("\nMappings:");
            println!("{}", p.mappings.to_json()?);
        }

        MappingAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Preset deleted: {}", id);
        }
    }

    Ok(())
}

/// Read, parse and transform the CSV named by `source`.
fn load_dataset(source: &SourceArgs) -> Result<Dataset, Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", source.input.display());

    let decoded = read_file(&source.input)?;
    let table = CsvTable::from_text(&decoded.text, !source.no_headers);
    let schema = TargetSchema::from_json(&fs::read_to_string(&source.schema)?)?;

    eprintln!("   Encoding: {}", decoded.encoding);
    eprintln!("   Columns: {}", table.column_keys().join(", "));

    let mappings = resolve_mappings(source, &table.column_keys())?;
    Ok(Dataset::from_table(table, schema, mappings)?)
}

/// `--mapping` file, else `--preset`, else the best compatible stored preset.
fn resolve_mappings(source: &SourceArgs, columns: &[String]) -> Result<MappingSet, Box<dyn std::error::Error>> {
    if let Some(path) = &source.mapping {
        return Ok(MappingSet::from_json(&fs::read_to_string(path)?)?);
    }

    let mut registry = MappingRegistry::new();
    let id = match &source.preset {
        Some(id) => id.clone(),
        None => {
            let (preset, score) = registry
                .find_compatible(columns)
                .into_iter()
                .next()
                .ok_or("no --mapping given and no stored preset matches these columns")?;
            eprintln!("   Preset: {} ({:.0}% of columns match)", preset.name, score * 100.0);
            preset.id.clone()
        }
    };

    let mappings = registry.get(&id)?.mappings.clone();
    registry.mark_used(&id)?;
    Ok(mappings)
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
