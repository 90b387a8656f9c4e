use assess_core::*;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "assess")]
#[command(about = "Fitness assessment protocols and progress tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// User whose history is read and written
    #[arg(long, global = true)]
    user: Option<String>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available protocols
    Catalog {
        /// Filter by category (cardio, strength, body_composition)
        #[arg(long)]
        category: Option<ProtocolCategory>,

        /// Filter by difficulty (basic, intermediate, advanced)
        #[arg(long)]
        difficulty: Option<Difficulty>,
    },

    /// Run a protocol and record the result
    Run {
        /// Protocol id, e.g. cooper_test
        protocol: String,

        /// Input value as name=value (repeatable)
        #[arg(long = "input", short = 'i', value_parser = parse_input)]
        inputs: Vec<(String, RawValue)>,

        /// Show the result without recording it
        #[arg(long)]
        no_record: bool,
    },

    /// Show recorded results for a protocol
    Progress {
        protocol: String,

        /// Trailing window (week, month, year)
        #[arg(long, default_value = "month")]
        timeframe: Timeframe,
    },

    /// Compare the results nearest to two dates
    Compare {
        protocol: String,

        /// Earlier date (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: DateTime<Utc>,

        /// Later date (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        to: DateTime<Utc>,
    },

    /// Export recorded results to CSV
    Export {
        protocol: String,

        /// CSV file to append to
        #[arg(long, short)]
        output: PathBuf,

        /// Restrict to a trailing window (default: all history)
        #[arg(long)]
        timeframe: Option<Timeframe>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        assess_core::logging::init_with_level("debug");
    } else {
        assess_core::logging::init_with_level("warn");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(dir) = cli.data_dir {
        config.data.data_dir = dir;
    }
    let user = cli
        .user
        .unwrap_or_else(|| config.tracking.default_user.clone());
    tracing::debug!("Using data directory {:?} for user '{}'", config.data.data_dir, user);

    match cli.command {
        Commands::Catalog {
            category,
            difficulty,
        } => cmd_catalog(&config, ProtocolFilter { category, difficulty }),
        Commands::Run {
            protocol,
            inputs,
            no_record,
        } => cmd_run(&config, &user, &protocol, inputs, no_record),
        Commands::Progress {
            protocol,
            timeframe,
        } => cmd_progress(&config, &user, &protocol, timeframe),
        Commands::Compare { protocol, from, to } => {
            cmd_compare(&config, &user, &protocol, from, to)
        }
        Commands::Export {
            protocol,
            output,
            timeframe,
        } => cmd_export(&config, &user, &protocol, output, timeframe),
    }
}

fn report(error: &Error) {
    match error {
        Error::Assessment(AssessmentError::Validation(errors)) => {
            eprintln!("Invalid input ({} problem(s)):", errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
        }
        Error::Tracker(e @ TrackerError::StoreUnavailable { .. }) => {
            eprintln!("Error: {}", e);
            eprintln!("The result above was calculated but not saved.");
        }
        other => eprintln!("Error: {}", other),
    }
}

fn build_assessor(config: &Config) -> Result<Assessor> {
    Ok(Assessor::new(
        ProtocolRegistry::with_defaults()?,
        config.reference_data()?,
    ))
}

fn open_store(config: &Config) -> Arc<JsonlStore> {
    Arc::new(JsonlStore::new(config.history_dir()))
}

fn cmd_catalog(config: &Config, filter: ProtocolFilter) -> Result<()> {
    let assessor = build_assessor(config)?;
    let summaries = assessor.protocol_catalog(filter);

    if summaries.is_empty() {
        println!("No protocols match the given filter.");
        return Ok(());
    }

    for summary in &summaries {
        println!(
            "{:<14} {:<32} {:<17} {:<13} {}",
            summary.id, summary.name, summary.category, summary.difficulty, summary.unit
        );
        println!("    {}", summary.description);
    }
    Ok(())
}

fn cmd_run(
    config: &Config,
    user: &str,
    protocol: &str,
    inputs: Vec<(String, RawValue)>,
    no_record: bool,
) -> Result<()> {
    let assessor = build_assessor(config)?;
    let raw: RawInputs = inputs.into_iter().collect();
    let assessment = assessor.run_assessment(protocol, &raw)?;

    display_result(&assessment.protocol_id, &assessment.result);

    if no_record {
        println!("\n[Not recorded]");
        return Ok(());
    }

    let tracker = ProgressTracker::new(open_store(config));
    let record = tracker.record(
        user,
        &assessment.protocol_id,
        assessment.inputs,
        assessment.result,
    )?;
    println!("\n✓ Recorded for '{}' at {}", user, record.timestamp.to_rfc3339());
    Ok(())
}

fn cmd_progress(config: &Config, user: &str, protocol: &str, timeframe: Timeframe) -> Result<()> {
    let tracker = ProgressTracker::new(open_store(config));
    let records = tracker.get_progress(user, protocol, timeframe)?;

    if records.is_empty() {
        println!("No {} results for '{}' in this timeframe.", protocol, user);
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:>8.2} {:<10} {}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.result.value,
            record.result.unit,
            record.result.category.as_deref().unwrap_or("-")
        );
    }

    if let Some(trend) = progress::summarize(&records) {
        println!();
        print!(
            "{} result(s), {:+.2} from first to latest",
            trend.count, trend.change
        );
        if let Some(pct) = trend.percent_change {
            print!(" ({:+.1}%)", pct);
        }
        println!(": {:?}", trend.direction);
    }
    Ok(())
}

fn cmd_compare(
    config: &Config,
    user: &str,
    protocol: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<()> {
    let tracker = ProgressTracker::new(open_store(config));
    let comparison = tracker.compare_results(user, protocol, from, to)?;

    for (label, record) in [("Before", &comparison.record1), ("After", &comparison.record2)] {
        println!(
            "{:<7} {}  {:.2} {}",
            label,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.result.value,
            record.result.unit
        );
    }
    println!("Delta:  {:+.2} {}", comparison.delta, comparison.record2.result.unit);
    Ok(())
}

fn cmd_export(
    config: &Config,
    user: &str,
    protocol: &str,
    output: PathBuf,
    timeframe: Option<Timeframe>,
) -> Result<()> {
    let store = open_store(config);
    let records = match timeframe {
        Some(timeframe) => ProgressTracker::new(store).get_progress(user, protocol, timeframe)?,
        None => store.query(user, protocol, None, None)?,
    };

    let count = export::write_csv(&records, &output)?;
    println!("✓ Exported {} records to {}", count, output.display());
    Ok(())
}

fn display_result(protocol_id: &str, result: &CalculationResult) {
    println!("\n{}", protocol_id);
    println!("  Result:   {:.1} {}", result.value, result.unit);
    if let Some(ref category) = result.category {
        println!("  Category: {}", category);
    }
    for (name, value) in &result.components {
        println!("    {:<10} {:.2}", name, value);
    }
    println!();
    println!("  {}", result.interpretation);

    if !result.recommendations.is_empty() {
        println!();
        for rec in &result.recommendations {
            println!("  → {}", rec);
        }
    }
}

/// Parse `name=value`; numeric text becomes a number
fn parse_input(s: &str) -> std::result::Result<(String, RawValue), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{}'", s));
    }
    let value = value.trim();
    let raw = match value.parse::<f64>() {
        Ok(number) => RawValue::Number(number),
        Err(_) => RawValue::Text(value.to_string()),
    };
    Ok((name.to_string(), raw))
}

/// RFC 3339 timestamp, or a calendar date meaning the end of that day (UTC)
fn parse_date(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("expected RFC 3339 or YYYY-MM-DD, got '{}'", s))?;
    let end_of_day = date
        .and_hms_micro_opt(23, 59, 59, 999_999)
        .ok_or_else(|| format!("invalid date '{}'", s))?;
    Ok(Utc.from_utc_datetime(&end_of_day))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input_number_and_text() {
        assert_eq!(
            parse_input("distance_m=2400").unwrap(),
            ("distance_m".to_string(), RawValue::Number(2400.0))
        );
        assert_eq!(
            parse_input("gender = male").unwrap(),
            ("gender".to_string(), RawValue::Text("male".into()))
        );
        assert!(parse_input("distance_m").is_err());
        assert!(parse_input("=5").is_err());
    }

    #[test]
    fn test_parse_date_forms() {
        let day = parse_date("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T23:59:59.999999+00:00");

        let exact = parse_date("2024-03-01T08:00:00+02:00").unwrap();
        assert_eq!(exact.to_rfc3339(), "2024-03-01T06:00:00+00:00");

        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
