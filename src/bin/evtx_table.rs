use anyhow::{Context, Result, bail, format_err};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use indoc::indoc;
use log::{LevelFilter, warn};
use serde_json::{Map as JsonMap, Value as JsonValue};
use simplelog::{Config, WriteLogger};

use evtx_table::{
    COLUMNS, DuplicateChildPolicy, IndexSettings, RawRecord, RecordIndex, TableAdapter,
    raw_records_from_evtx, raw_records_from_jsonl,
};

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum InputFormat {
    Evtx,
    Jsonl,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Jsonl,
}

struct EvtxTable {
    input: PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    rows: Option<Range<usize>>,
    prefetch: bool,
    settings: IndexSettings,
    output: Box<dyn Write>,
    verbosity_level: Option<LevelFilter>,
}

impl EvtxTable {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let input = PathBuf::from(
            matches
                .get_one::<String>("INPUT")
                .expect("This is a required argument"),
        );

        let input_format = match matches.get_one::<String>("input-format").map(String::as_str) {
            Some("evtx") => InputFormat::Evtx,
            Some("jsonl") => InputFormat::Jsonl,
            _ => Self::guess_input_format(&input),
        };

        let output_format = match matches.get_one::<String>("output-format").map(String::as_str) {
            Some("jsonl") => OutputFormat::Jsonl,
            _ => OutputFormat::Table,
        };

        let rows = matches
            .get_one::<String>("rows")
            .map(|value| parse_row_range(value))
            .transpose()?;

        let num_threads = matches.get_one::<usize>("num-threads").copied();
        let num_threads = match (cfg!(feature = "multithreading"), num_threads) {
            (true, Some(number)) => number,
            (true, None) => 0,
            (false, None) => 1,
            (false, Some(_)) => {
                eprintln!(
                    "turned on threads, but library was compiled without `multithreading` feature! using fallback sync iterator"
                );
                1
            }
        };

        let policy = if matches.get_flag("first-wins") {
            DuplicateChildPolicy::FirstWins
        } else {
            DuplicateChildPolicy::LastWins
        };

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(LevelFilter::Info),
            2 => Some(LevelFilter::Debug),
            3 => Some(LevelFilter::Trace),
            _ => {
                eprintln!("using more than  -vvv does not affect verbosity level");
                Some(LevelFilter::Trace)
            }
        };

        let output: Box<dyn Write> = match matches.get_one::<String>("output-target") {
            Some(path) => {
                let file =
                    Self::create_output_file(path, !matches.get_flag("no-confirm-overwrite"))
                        .with_context(|| {
                            format!("An error occurred while creating output file at `{}`", path)
                        })?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(BufWriter::new(io::stdout())),
        };

        Ok(EvtxTable {
            input,
            input_format,
            output_format,
            rows,
            prefetch: matches.get_flag("prefetch"),
            settings: IndexSettings::new()
                .num_threads(num_threads)
                .duplicate_children(policy),
            output,
            verbosity_level,
        })
    }

    fn guess_input_format(input: &Path) -> InputFormat {
        if input == Path::new("-") {
            return InputFormat::Jsonl;
        }

        match input.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("json") => {
                InputFormat::Jsonl
            }
            _ => InputFormat::Evtx,
        }
    }

    /// Main entry point for `EvtxTable`
    pub fn run(&mut self) -> Result<()> {
        self.try_to_initialize_logging();

        let records = self.read_records()?;
        let index = RecordIndex::load_with_settings(records, self.settings.clone());

        if self.prefetch {
            let failures = index.parse_all();
            if failures > 0 {
                warn!("{} records have fields that could not be extracted", failures);
            }
        }

        let table = TableAdapter::new(&index);
        let rows = match &self.rows {
            Some(range) => range.start.min(table.row_count())..range.end.min(table.row_count()),
            None => 0..table.row_count(),
        };

        match self.output_format {
            OutputFormat::Table => self.write_table(&index, rows)?,
            OutputFormat::Jsonl => self.write_jsonl(&index, rows)?,
        }

        self.output.flush()?;
        Ok(())
    }

    fn read_records(&self) -> Result<Vec<RawRecord>> {
        match self.input_format {
            InputFormat::Jsonl if self.input == Path::new("-") => {
                Ok(raw_records_from_jsonl(io::stdin().lock())?)
            }
            InputFormat::Jsonl => {
                let file = File::open(&self.input).with_context(|| {
                    format!("Failed to open file {}", self.input.display())
                })?;
                raw_records_from_jsonl(BufReader::new(file)).with_context(|| {
                    format!("Failed to read records from {}", self.input.display())
                })
            }
            InputFormat::Evtx => raw_records_from_evtx(&self.input)
                .with_context(|| format!("Failed to open file {}", self.input.display())),
        }
    }

    fn write_table(&mut self, index: &RecordIndex, rows: Range<usize>) -> Result<()> {
        let table = TableAdapter::new(index);

        let header: Vec<&str> = COLUMNS.iter().map(|column| column.name()).collect();
        writeln!(self.output, "{}", header.join("\t"))?;

        for row in rows {
            let id = index.entry_at(row)?.id();
            let cells: Vec<String> = table
                .row(row)?
                .into_iter()
                .zip(COLUMNS.iter())
                .map(|(cell, column)| match cell {
                    Ok(value) => value.to_string(),
                    Err(e) => {
                        warn!("record {}: `{}` is unavailable: {}", id, column, e);
                        String::new()
                    }
                })
                .collect();

            writeln!(self.output, "{}", cells.join("\t"))?;
        }

        Ok(())
    }

    fn write_jsonl(&mut self, index: &RecordIndex, rows: Range<usize>) -> Result<()> {
        let table = TableAdapter::new(index);

        for row in rows {
            let id = index.entry_at(row)?.id();
            let mut line = JsonMap::new();
            let mut errors = Vec::new();

            line.insert("event_record_id".to_string(), JsonValue::from(id));

            for (cell, column) in table.row(row)?.into_iter().zip(COLUMNS.iter()) {
                let value = match cell {
                    Ok(value) => JsonValue::String(value.to_string()),
                    Err(e) => {
                        warn!("record {}: `{}` is unavailable: {}", id, column, e);
                        errors.push(JsonValue::String(format!("{}: {}", column, e)));
                        JsonValue::Null
                    }
                };
                line.insert(column.name().to_string(), value);
            }

            if !errors.is_empty() {
                line.insert("errors".to_string(), JsonValue::Array(errors));
            }

            serde_json::to_writer(&mut self.output, &JsonValue::Object(line))?;
            writeln!(self.output)?;
        }

        Ok(())
    }

    /// If `prompt` is passed, will display a confirmation prompt before overwriting files.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let p = path.as_ref();

        if p.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                p.display()
            );
        }

        if p.exists() {
            if prompt {
                match Confirm::new()
                    .with_prompt(format!(
                        "Are you sure you want to override output file at {}",
                        p.display()
                    ))
                    .default(false)
                    .interact()
                {
                    Ok(true) => Ok(File::create(p)?),
                    Ok(false) => bail!("Cancelled"),
                    Err(e) => Err(format_err!(
                        "Failed to write confirmation prompt to term caused by\n{}",
                        e
                    )),
                }
            } else {
                Ok(File::create(p)?)
            }
        } else {
            // Ok to assume p is not an existing directory
            match p.parent() {
                Some(parent) => {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        fs::create_dir_all(parent)?;
                    }
                    Ok(File::create(p)?)
                }
                None => bail!("Output file cannot be root."),
            }
        }
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            // Logs go to stderr, stdout is reserved for the table.
            if let Err(e) = WriteLogger::init(level, Config::default(), io::stderr()) {
                eprintln!("Failed to initialize logging: {}", e);
            }
        }
    }
}

/// Parses `START..END`, either bound may be omitted.
fn parse_row_range(value: &str) -> Result<Range<usize>> {
    let (start, end) = value
        .split_once("..")
        .ok_or_else(|| format_err!("Expected a row range like `10..20`, got `{}`", value))?;

    let start = match start.trim() {
        "" => 0,
        s => s
            .parse::<usize>()
            .with_context(|| format!("Invalid range start `{}`", s))?,
    };
    let end = match end.trim() {
        "" => usize::MAX,
        s => s
            .parse::<usize>()
            .with_context(|| format!("Invalid range end `{}`", s))?,
    };

    if start > end {
        bail!("Row range `{}` is empty", value);
    }

    Ok(start..end)
}

fn command() -> Command {
    Command::new("evtx_table")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lists EVTX records as a table of TimeCreated, Provider, EventID and Level")
        .long_about(indoc!(r#"
            Lists EVTX records as a table of TimeCreated, Provider, EventID and Level.

            Rows are ordered by event record id. Fields are only extracted from the
            records' XML for the rows that are printed, unless `--prefetch` is passed.
            Cells whose record cannot be parsed are left empty (or `null` for jsonl).
        "#))
        .arg(
            Arg::new("INPUT")
                .required(true)
                .help("Path to an EVTX file, or to a JSON lines file of raw records. `-` reads JSON lines from stdin."),
        )
        .arg(
            Arg::new("input-format")
                .long("input-format")
                .value_parser(["evtx", "jsonl"])
                .help("Sets the input format. Defaults to `jsonl` for `.jsonl`/`.json` files and stdin, `evtx` otherwise."),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["table", "jsonl"])
                .default_value("table")
                .help("Sets the output format")
                .long_help(indoc!(r#"
                    Sets the output format:
                        "table" - tab separated columns with a header line.
                        "jsonl" - one JSON object per record.
                "#)),
        )
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_name("START..END")
                .help("Only print rows in the given half-open range, either bound may be omitted."),
        )
        .arg(
            Arg::new("num-threads")
                .short('t')
                .long("threads")
                .value_parser(clap::value_parser!(usize))
                .help("Sets the number of worker threads used by `--prefetch`, defaults to number of CPU cores."),
        )
        .arg(
            Arg::new("prefetch")
                .long("prefetch")
                .action(ArgAction::SetTrue)
                .help("Extract the fields of all records up front instead of row by row."),
        )
        .arg(
            Arg::new("first-wins")
                .long("first-wins")
                .action(ArgAction::SetTrue)
                .help("When an element has several children with the same name, use the first one instead of the last."),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .action(ArgAction::Set)
                .help(indoc!(
                    "Writes output to the file specified instead of stdout, errors will still be printed to stderr.
                     Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`
                     Will create parent directories if needed."
                )),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - info, -vv - debug, -vvv - trace"),
        )
}

fn main() {
    let matches = command().get_matches();

    let result = EvtxTable::from_cli_matches(&matches).and_then(|mut app| app.run());

    if let Err(e) = result {
        eprintln!("{:?}", e);
        exit(1);
    }
}
