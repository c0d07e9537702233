use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs,
    io::{self, IsTerminal, Read},
    path::PathBuf,
    process::ExitCode,
};

mod category;
mod evaluator;
mod extraction;
mod ops;
mod policy;
mod timestamp;

use category::{Category, TIME_CONTACTED};
use evaluator::{Evaluation, Evaluator};
use extraction::Extraction;
use ops::{filter, report};
use policy::{DateRange, Policy};
use timestamp::{parse_timestamp, Timestamp};

#[derive(Parser, Debug)]
#[command(version, about = "Filters a mobile device extraction down to a warrant's date range.", long_about = None)]
struct Args {
    #[arg(short, long, help = "Start of the date range, inclusive (e.g. \"2015-02-20 00:00:00-8\").", value_parser = parse_timestamp, global = true)]
    start: Option<Timestamp>,

    #[arg(short, long, help = "End of the date range, inclusive (e.g. \"2015-02-20 23:59:59-8\").", value_parser = parse_timestamp, global = true)]
    end: Option<Timestamp>,

    #[arg(long, help = "Apply the date range to deleted items too.", global = true)]
    filter_deleted: bool,

    #[arg(long, help = "Also filter contacts by their TimeContacted timestamp.", global = true)]
    filter_last_contacted: bool,

    #[clap(subcommand)]
    command: Commands,

    /// Input extraction dump (use '-' for stdin).
    #[arg(default_value = "-")]
    file: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Remove everything outside the date range and output what is left.
    Filter(FilterArgs),

    /// Show what would be removed, and why, without removing anything.
    Check(CheckArgs),

    /// List the timestamp fields checked for each category.
    Fields,
}

#[derive(Debug, clap::Args)]
struct FilterArgs {
    /// Where to write the filtered dump (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a JSON run report with every verdict to this path.
    #[arg(short, long)]
    report: Option<PathBuf>,

    #[arg(long, help = "Also save the run report to the application's log directory.")]
    save_log: bool,
}

#[derive(Debug, clap::Args)]
struct CheckArgs {
    #[arg(short, long, help = "List kept items as well as removed ones.")]
    all: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn read_input(file_path: &str) -> Result<String> {
    fs::read_to_string(file_path).with_context(|| format!("Failed to read file: {}", file_path))
}

/// Up to five lines either side of a 1-based error position, with a pointer
/// under the offending column.
fn error_context(input: &str, line: usize, column: usize) -> String {
    let line_index = line.saturating_sub(1);
    let first = line_index.saturating_sub(5);

    let mut shown = Vec::new();
    for (i, text) in input.lines().enumerate().skip(first).take(line_index + 5 - first) {
        shown.push(text.to_string());
        if i == line_index {
            shown.push(format!(
                "{}{}",
                " ".repeat(column.saturating_sub(1)),
                "^-- here".purple().bold()
            ));
        }
    }
    shown.join("\n")
}

fn parse_extraction(input: &str) -> Result<Extraction> {
    serde_json::from_str(input)
        .map_err(|e| {
            let (line, column) = (e.line(), e.column());

            // serde_json appends the position, which we show ourselves
            let message = e.to_string();
            let reason = message.split(" at line ").next().unwrap_or(&message);

            anyhow!(
                "invalid extraction at line {line}:{column}\n\
                 {}: {reason}\n\
                 {}:\n{}\n",
                "Problem".red().bold(),
                "Context".yellow().bold(),
                error_context(input, line, column)
            )
        })
        .context("Failed to parse extraction dump")
}

fn policy_from_args(args: &Args) -> Result<Policy> {
    let (Some(start), Some(end)) = (args.start, args.end) else {
        #[allow(unreachable_code)]
        return Err(Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "Both --start and --end are required to filter.",
            )
            .exit());
    };

    let range = DateRange::new(start, end).context("Invalid date range")?;

    Ok(Policy::new(range)
        .exempt_deleted(!args.filter_deleted)
        .exempt_contact_last_seen(!args.filter_last_contacted))
}

fn progress_bar(len: usize) -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}

fn print_fields(args: &Args) {
    for category in Category::KNOWN.iter() {
        let fields: Vec<String> = category
            .timestamp_fields()
            .iter()
            .map(|field| {
                if *field == TIME_CONTACTED && !args.filter_last_contacted {
                    format!("{} (exempt)", field).dimmed().to_string()
                } else {
                    field.to_string()
                }
            })
            .collect();
        println!("{}: {}", category.name().bold(), fields.join(", "));
    }
    println!("{}: every field above", "Other model types".bold());
}

fn print_evaluation(label: &str, evaluation: &Evaluation, indent: usize) {
    let verdict = if evaluation.is_keep() {
        evaluation.verdict.to_string().green()
    } else {
        evaluation.verdict.to_string().red()
    };
    println!(
        "{:indent$}{} {} {}: {}",
        "",
        verdict,
        evaluation.category.to_string().cyan(),
        label,
        evaluation.reason,
        indent = indent
    );
    for line in &evaluation.trace {
        println!("{:indent$}    {}", "", line, indent = indent);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if let Commands::Fields = args.command {
        print_fields(&args);
        return Ok(());
    }

    // validate the range before touching any data
    let policy = policy_from_args(&args)?;

    let contents = match args.file.as_str() {
        "-" => {
            let mut stdin = io::stdin();
            if stdin.is_terminal() {
                #[allow(unreachable_code)]
                return Err(Args::command()
                    .error(
                        ErrorKind::MissingRequiredArgument,
                        "Missing required argument: either provide a file or pipe input.",
                    )
                    .exit());
            }

            let mut contents = String::new();
            stdin.read_to_string(&mut contents)?;
            contents
        }
        file => read_input(file)?,
    };

    let mut extraction = parse_extraction(&contents)?;
    let evaluator = Evaluator::new(policy);

    let started = Local::now();
    let progress = progress_bar(extraction.data_files.len() + extraction.models.len());
    let outcome = filter::plan(&extraction, &evaluator, &progress);
    progress.finish_and_clear();

    match &args.command {
        Commands::Filter(filter_args) => {
            filter::apply(&mut extraction, &outcome);
            let finished = Local::now();

            let json = serde_json::to_string_pretty(&extraction)
                .context("Failed to serialise filtered extraction")?;
            match &filter_args.output {
                Some(path) => fs::write(path, json)
                    .with_context(|| format!("Failed to write output: {:?}", path))?,
                None => println!("{}", json),
            }

            report::print_summary(&outcome.summary, finished - started);

            let display_name = extraction.device.display_name.as_deref();
            let run_report = report::RunReport {
                started,
                finished,
                duration_ms: (finished - started).num_milliseconds(),
                input: &args.file,
                display_name,
                policy: evaluator.policy(),
                summary: &outcome.summary,
                evaluations: &outcome.evaluations,
            };

            if let Some(path) = &filter_args.report {
                report::write_report(path, &run_report)?;
            }

            if filter_args.save_log {
                let path = report::get_log_dir()?
                    .join(report::log_file_name(display_name, started));
                report::write_report(&path, &run_report)?;
                eprintln!("{}: {}", "Saved log".purple(), path.display());
            }
        }

        Commands::Check(check_args) => {
            for item in &outcome.evaluations {
                let evaluation = &item.evaluation;
                let removes_something = !evaluation.record.is_keep()
                    || evaluation.children.iter().any(|c| !c.is_keep());
                if !check_args.all && !removes_something {
                    continue;
                }

                print_evaluation(&evaluation.record.id, &evaluation.record, 0);
                for child in &evaluation.children {
                    if check_args.all || !child.is_keep() {
                        print_evaluation(&child.id, child, 4);
                    }
                }
            }

            report::print_summary(&outcome.summary, Local::now() - started);
        }

        Commands::Fields => {}
    }

    Ok(())
}
