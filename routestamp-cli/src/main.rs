use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// Import from routestamp-core
use routestamp_core::{
    propose, BatchProcessor, FileTemplateStore, PdfInput, ProcessingConfig, TabularIngestor,
    Template, TemplateStore,
};

use routestamp_cli::output;

#[derive(Parser)]
#[command(name = "routestamp")]
#[command(about = "Match delivery run sheets to PDF shipping labels and stamp route numbers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a run sheet against label PDFs and write stamped copies
    Process {
        /// Run sheet upload (.csv, .xls, .xlsx, or .zip of those)
        #[arg(short, long)]
        sheet: String,

        /// Label PDFs to match and stamp
        #[arg(short, long, required = true, num_args = 1..)]
        labels: Vec<String>,

        /// Name of the saved column template to apply
        #[arg(short, long)]
        template: String,

        /// Directory holding saved templates
        #[arg(long, default_value = "templates")]
        templates_dir: String,

        /// Path to custom config file (YAML format)
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory (timestamped next to the sheet if not specified)
        #[arg(short, long)]
        output: Option<String>,

        /// Enable detailed profiling of all pipeline steps
        #[arg(long)]
        profile: bool,
    },

    /// Show the columns detected in a spreadsheet upload
    Columns {
        /// Spreadsheet to inspect
        sheet: String,

        /// Path to custom config file (YAML format)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Manage saved column templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,

        /// Directory holding saved templates
        #[arg(long, default_value = "templates")]
        templates_dir: String,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List saved templates
    List,
    /// Print one template as JSON
    Show { name: String },
    /// Save a template from a JSON definition file
    Save {
        /// JSON file with name, column_map, and required_fields
        file: String,
        /// Replace an existing template with the same name
        #[arg(long)]
        overwrite: bool,
    },
    /// Delete a saved template
    Delete { name: String },
}

/// On-disk shape of a template definition passed to `template save`.
#[derive(Deserialize)]
struct TemplateSpec {
    name: String,
    column_map: BTreeMap<String, String>,
    #[serde(default)]
    required_fields: BTreeSet<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("🦀 Routestamp Label Processor");

    match args.command {
        Command::Process {
            sheet,
            labels,
            template,
            templates_dir,
            config,
            output,
            profile,
        } => run_process(
            &sheet,
            &labels,
            &template,
            &templates_dir,
            config.as_deref(),
            output.as_deref(),
            profile,
        ),
        Command::Columns { sheet, config } => run_columns(&sheet, config.as_deref()),
        Command::Template {
            action,
            templates_dir,
        } => run_template(action, &templates_dir),
    }
}

fn load_config(path: Option<&str>) -> ProcessingConfig {
    let config = ProcessingConfig::load_with_fallback(path);
    if let Some(config_path) = path {
        println!("📋 Loaded config from: {}", config_path);
    } else {
        println!("📋 Using default config");
    }
    config
}

#[allow(clippy::too_many_arguments)]
fn run_process(
    sheet: &str,
    labels: &[String],
    template_name: &str,
    templates_dir: &str,
    config_path: Option<&str>,
    output_dir: Option<&str>,
    profile: bool,
) -> Result<()> {
    if !Path::new(sheet).exists() {
        println!("⚠️  Run sheet not found at: {}", sheet);
        println!("   Please check the file path.");
        return Ok(());
    }

    let config = load_config(config_path);

    let store = FileTemplateStore::new(templates_dir)?;
    let template = store
        .load(template_name)?
        .ok_or_else(|| anyhow!("no saved template named '{}' in {}", template_name, templates_dir))?;

    let sheet_bytes = std::fs::read(sheet)?;
    let mut pdfs = Vec::with_capacity(labels.len());
    for label in labels {
        pdfs.push(PdfInput {
            filename: label.clone(),
            bytes: std::fs::read(label)?,
        });
    }

    let processor = BatchProcessor::new(config).with_profiling(profile);
    match processor.run(&sheet_bytes, sheet, &template, &pdfs) {
        Ok(result) => {
            let output_dir = output_dir
                .map(str::to_string)
                .unwrap_or_else(|| output::default_output_dir(sheet));
            let report_path = output::write_batch_result(&result, &output_dir)?;
            println!("✅ Batch complete");
            println!(
                "📊 {} stamped PDF(s), {} file error(s), {} row error(s)",
                result.annotated_pdfs.len(),
                result.report.file_errors.len(),
                result.row_errors.len()
            );
            println!("💾 Report saved to: {}", report_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Processing failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run_columns(sheet: &str, config_path: Option<&str>) -> Result<()> {
    if !Path::new(sheet).exists() {
        println!("⚠️  Spreadsheet not found at: {}", sheet);
        return Ok(());
    }

    let config = load_config(config_path);
    let ingestor = TabularIngestor::new(config.header_detection, config.encoding);
    let bytes = std::fs::read(sheet)?;

    match ingestor.ingest(&bytes, sheet) {
        Ok(tables) => {
            for table in &tables {
                println!("\n📋 {} (header on row {})", table.source, table.header_row + 1);
                for column in propose(table) {
                    println!("   - {}", column);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Could not read columns: {e}");
            std::process::exit(1);
        }
    }
}

fn run_template(action: TemplateAction, templates_dir: &str) -> Result<()> {
    let store = FileTemplateStore::new(templates_dir)?;

    match action {
        TemplateAction::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("📋 No templates saved in {}", templates_dir);
            } else {
                println!("📋 Saved templates:");
                for name in names {
                    println!("   - {}", name);
                }
            }
        }
        TemplateAction::Show { name } => match store.load(&name)? {
            Some(template) => println!("{}", serde_json::to_string_pretty(&template)?),
            None => {
                eprintln!("❌ No template named '{}'", name);
                std::process::exit(1);
            }
        },
        TemplateAction::Save { file, overwrite } => {
            let json = std::fs::read_to_string(&file)?;
            let spec: TemplateSpec = serde_json::from_str(&json)
                .map_err(|e| anyhow!("invalid template definition in {}: {}", file, e))?;

            // Re-saving an existing template keeps its creation date and
            // becomes a new version of the same mapping.
            let template = match store.load(&spec.name)? {
                Some(previous) => previous.edited(spec.column_map, spec.required_fields),
                None => Template::new(spec.name, spec.column_map, spec.required_fields),
            };
            store.save(&template, overwrite)?;
            println!("✅ Saved template '{}'", template.name);
        }
        TemplateAction::Delete { name } => {
            if store.delete(&name)? {
                println!("✅ Deleted template '{}'", name);
            } else {
                println!("⚠️  No template named '{}'", name);
            }
        }
    }
    Ok(())
}
