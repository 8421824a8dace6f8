//! Clineval CLI - Command-line interface
//!
//! Usage:
//!   clineval evaluate
//!   clineval reconcile <table>
//!   clineval metrics <table>
//!   clineval verify <code> <term>
//!   clineval parse-response <file> --document <name>

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use clineval_core::{AppConfig, LoggingConfig, MetricConvention};
use clineval_engine::{
    canonical_term, CodeCorrespondenceCache, Evaluator, RunReport, SimilarityMatcher,
    UnknownCodeVerifier,
};
use clineval_parser::{
    list_xml_documents, parse_model_response, read_classification_table, read_extracted_table,
    write_classification_table, write_extracted_table, XmlGoldStandardSource,
};

#[derive(Parser)]
#[command(name = "clineval")]
#[command(about = "Clinical finding extraction evaluation against a gold standard")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the extracted findings and score them
    Evaluate {
        /// Directory of gold-standard XML documents
        #[arg(long)]
        gold_dir: Option<PathBuf>,
        /// Extracted-findings table
        #[arg(long)]
        extracted: Option<PathBuf>,
        /// Classification table to write
        #[arg(long)]
        output: Option<PathBuf>,
        /// Code correspondence cache
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Run report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Re-run similarity recovery over a classification table
    Reconcile {
        /// Classification table
        table: PathBuf,
        /// Where to write the result (defaults to the input table)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score a classification table
    Metrics {
        /// Classification table
        table: PathBuf,
        /// strict or lenient
        #[arg(long)]
        convention: Option<MetricConvention>,
    },
    /// Check a term against the code correspondence cache
    Verify {
        code: String,
        term: String,
        #[arg(long)]
        abbreviation: Option<String>,
        /// Code correspondence cache
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Convert a raw model response into extracted-table rows
    ParseResponse {
        /// Response text file
        file: PathBuf,
        /// Narrative name recorded on every row
        #[arg(long)]
        document: String,
        /// Extracted table to write (prints JSON when absent)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Evaluate {
            gold_dir,
            extracted,
            output,
            cache,
            report,
        } => {
            if let Some(dir) = gold_dir {
                config.paths.gold_dir = dir;
            }
            if let Some(file) = extracted {
                config.paths.extracted_table = file;
            }
            if let Some(file) = output {
                config.paths.results_table = file;
            }
            if let Some(file) = cache {
                config.paths.cache_file = file;
            }
            if report.is_some() {
                config.paths.report_file = report;
            }
            evaluate(&config)?;
        }
        Commands::Reconcile { table, output } => {
            let records = read_classification_table(&table)?;
            let before = records.len();
            let matcher = SimilarityMatcher::new(config.matching.similarity_threshold);
            let records = matcher.reconcile_table(records, &config.matching.document_id);

            let output = output.unwrap_or(table);
            write_classification_table(&output, &records)?;
            println!(
                "Reconciled {} rows into {} ({})",
                before,
                records.len(),
                output.display()
            );
        }
        Commands::Metrics { table, convention } => {
            let records = read_classification_table(&table)?;
            let convention = convention.unwrap_or(config.matching.metric_convention);
            let mut report =
                RunReport::from_records(&records, convention, config.matching.similarity_threshold);
            for record in &records {
                if let Some(mark) = record.correspondence {
                    report.correspondence.record(mark);
                }
            }
            print!("{}", report.report());
        }
        Commands::Verify {
            code,
            term,
            abbreviation,
            cache,
        } => {
            let path = cache.unwrap_or(config.paths.cache_file);
            let cache = CodeCorrespondenceCache::load(&path)?;
            let term = canonical_term(&term, abbreviation.as_deref());
            let answer = cache.verify(&code, &term);
            println!("{} - {}", answer.as_u8(), answer.describe());
        }
        Commands::ParseResponse {
            file,
            document,
            output,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let parsed = parse_model_response(&text, &document);
            match output {
                Some(path) => {
                    write_extracted_table(&path, &parsed.rows)?;
                    println!("Wrote {} rows to {}", parsed.rows.len(), path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&parsed.rows)?),
            }
        }
    }

    Ok(())
}

fn evaluate(config: &AppConfig) -> anyhow::Result<()> {
    let paths = &config.paths;

    let gold_documents = list_xml_documents(&paths.gold_dir)?;
    if gold_documents.is_empty() {
        anyhow::bail!("No gold-standard documents in {}", paths.gold_dir.display());
    }
    tracing::info!(
        "{} gold-standard documents in {}",
        gold_documents.len(),
        paths.gold_dir.display()
    );

    let rows = read_extracted_table(&paths.extracted_table)?;
    let source = XmlGoldStandardSource::new(&paths.gold_dir);
    let mut cache = CodeCorrespondenceCache::load(&paths.cache_file)?;

    let evaluation = Evaluator::new(config).run(&source, &rows, &mut cache, &UnknownCodeVerifier)?;

    if let Some(parent) = paths.results_table.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    write_classification_table(&paths.results_table, &evaluation.records)?;
    cache.save(&paths.cache_file)?;

    if let Some(report_file) = &paths.report_file {
        let json = serde_json::to_string_pretty(&evaluation.report)?;
        std::fs::write(report_file, json)
            .with_context(|| format!("Failed to write {}", report_file.display()))?;
    }

    print!("{}", evaluation.report.report());
    Ok(())
}
