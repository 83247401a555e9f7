// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `fieldbase` command-line tool: a thin, scriptable front-end over [`Fdb`]
//! for listing, archiving, hiding, wiping, purging and relocating DBs from a
//! shell. Every subcommand takes a mars-style request string
//! (`name=value,name=value/value,...`) that gets expanded against a schema
//! built from the `--level1`/`--level2`/`--level3` flags.

use clap::{Parser, Subcommand};
use fieldbase::config::{Config, RootManager, RootRule};
use fieldbase::schema::{Request, Rule, Schema};
use fieldbase::{CancellationToken, Error, Fdb, Key, Result};
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fieldbase", about = "Inspect and manage field archives")]
struct ToolArgs {
    /// Root directory DBs are created under and read from.
    #[arg(long, global = true)]
    root: PathBuf,

    /// Comma-separated db-level key names, outermost first.
    #[arg(long, global = true, default_value = "class,expver,stream")]
    level1: String,

    /// Comma-separated index-level key names.
    #[arg(long, global = true, default_value = "date,time")]
    level2: String,

    /// Comma-separated field-level key names.
    #[arg(long, global = true, default_value = "param,levelist")]
    level3: String,

    /// Refuses `archive-bytes` for files larger than this (e.g. "64MiB").
    #[arg(long, global = true)]
    max_file_size: Option<String>,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// With no subcommand, drops into an interactive shell instead.
    #[command(subcommand)]
    command: Option<ToolCommand>,
}

/// A single interactive-shell line: just the subcommand, since the session's
/// root/schema/verbosity flags are fixed for the shell's whole lifetime.
#[derive(Parser)]
#[command(name = "fieldbase")]
struct ShellLine {
    #[command(subcommand)]
    command: ToolCommand,
}

#[derive(Subcommand)]
enum ToolCommand {
    /// List every full key an expanded request resolves to.
    List { request: String },

    /// Dump TOC records and index contents for an expanded request.
    Dump { request: String },

    /// Report or commit deletion of a partial or full index range.
    Wipe {
        request: String,
        #[arg(long)]
        doit: bool,
        #[arg(long)]
        unsafe_wipe_all: bool,
        #[arg(long)]
        porcelain: bool,
    },

    /// Report or commit removal of duplicate-fingerprint data.
    Purge {
        request: String,
        #[arg(long)]
        doit: bool,
    },

    /// Append a mask-all record to a DB's TOC without deleting data files.
    Hide {
        request: String,
        #[arg(long)]
        doit: bool,
    },

    /// Copy a DB to a new root, optionally removing the source afterwards.
    Move {
        request: String,
        dest: PathBuf,
        #[arg(long)]
        keep: bool,
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Archive the raw bytes of a file under a fully-specified key.
    ArchiveBytes { request: String, file: PathBuf },
}

/// Parses `name=value/value,name=value` into ordered `(name, values)` pairs.
fn parse_pairs(s: &str) -> Vec<(String, Vec<String>)> {
    s.split(',')
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| chunk.split_once('='))
        .map(|(name, values)| {
            (
                name.to_string(),
                values.split('/').map(str::to_string).collect(),
            )
        })
        .collect()
}

fn build_request(pairs: &[(String, Vec<String>)]) -> Request {
    pairs
        .iter()
        .fold(Request::new(), |req, (name, values)| req.with(name.clone(), values.clone()))
}

/// Collapses a parsed request to a `Key` of first values, for the
/// single-DB/single-field commands that need a concrete key rather than a
/// multi-valued request.
fn build_key_first_values(pairs: &[(String, Vec<String>)]) -> Key {
    let mut key = Key::new();
    for (name, values) in pairs {
        if let Some(value) = values.first() {
            key.set(name.clone(), value.clone());
        }
    }
    key
}

fn split_names(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn build_schema(args: &ToolArgs) -> Schema {
    Schema::new(vec![Rule::new(
        split_names(&args.level1),
        split_names(&args.level2),
        split_names(&args.level3),
    )])
}

fn build_fdb(args: &ToolArgs) -> Fdb {
    let rule = RootRule {
        pattern: Regex::new(".*").expect("static pattern is valid"),
        path: args.root.clone(),
        writable: true,
        visitable: true,
        min_free_bytes: None,
    };
    Fdb::new(build_schema(args), Config::new(RootManager::new(vec![rule])))
}

fn resolve_db_key(fdb: &Fdb, pairs: &[(String, Vec<String>)]) -> Result<Key> {
    let partial = build_key_first_values(pairs);
    fdb.schema()
        .first_level_match(&partial)
        .into_iter()
        .next()
        .ok_or_else(|| Error::SchemaMismatch(format!("no rule matches request key {partial}")))
}

fn cmd_list(fdb: &Fdb, request: &str) -> Result<()> {
    let req = build_request(&parse_pairs(request));
    for entry in fdb.list(&req, CancellationToken::default())? {
        match entry {
            Ok(entry) => println!("{}", entry.full_key),
            Err(err) => log::warn!("list: skipping an index after error: {err}"),
        }
    }
    Ok(())
}

fn cmd_dump(fdb: &Fdb, request: &str) -> Result<()> {
    let req = build_request(&parse_pairs(request));
    for entry in fdb.list(&req, CancellationToken::default())? {
        match entry {
            Ok(entry) => println!(
                "{} location={:?} details={:?}",
                entry.full_key, entry.field.location, entry.field.details
            ),
            Err(err) => log::warn!("dump: skipping an index after error: {err}"),
        }
    }
    Ok(())
}

fn cmd_wipe(fdb: &Fdb, request: &str, doit: bool, unsafe_wipe_all: bool, porcelain: bool) -> Result<()> {
    let pairs = parse_pairs(request);
    let db_key = resolve_db_key(fdb, &pairs)?;
    let index_request = build_request(&pairs);

    let report = fdb.wipe(&db_key, &index_request, doit, unsafe_wipe_all)?;
    if porcelain {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            db_key,
            report.masked_indexes,
            report.deleted_data_uris,
            report.deleted_unknown_uris,
            report.deleted_metadata_paths
        );
    } else {
        println!(
            "{db_key}: masked {} indexes, deleted {} data uris, {} unknown uris, {} metadata paths (partial={})",
            report.masked_indexes,
            report.deleted_data_uris,
            report.deleted_unknown_uris,
            report.deleted_metadata_paths,
            report.is_partial
        );
    }
    Ok(())
}

fn cmd_purge(fdb: &Fdb, request: &str, doit: bool) -> Result<()> {
    let pairs = parse_pairs(request);
    let db_key = resolve_db_key(fdb, &pairs)?;

    let report = fdb.purge(&db_key, doit)?;
    println!(
        "{db_key}: masked {} indexes, deleted {} data uris",
        report.masked_indexes, report.deleted_data_uris
    );
    Ok(())
}

fn cmd_hide(fdb: &Fdb, request: &str, doit: bool) -> Result<()> {
    let pairs = parse_pairs(request);
    let db_key = resolve_db_key(fdb, &pairs)?;
    fdb.hide(&db_key, doit)?;
    println!("{db_key}: {}", if doit { "hidden" } else { "would be hidden" });
    Ok(())
}

fn copy_dir_all(src: &std::path::Path, dest: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &to)?;
        } else {
            std::fs::copy(entry.path(), to)?;
        }
    }
    Ok(())
}

fn cmd_move(fdb: &Fdb, request: &str, dest: &std::path::Path, keep: bool, delay: Option<u64>) -> Result<()> {
    let pairs = parse_pairs(request);
    let db_key = resolve_db_key(fdb, &pairs)?;

    let src = fdb
        .config()
        .root_manager
        .primary_write_root(&db_key.to_string())
        .ok_or_else(|| Error::NotFound(format!("no writable root configured for db-key {db_key}")))?
        .to_path_buf();

    copy_dir_all(&src, dest)?;
    println!("{db_key}: copied {} -> {}", src.display(), dest.display());

    if !keep {
        if let Some(seconds) = delay {
            log::info!("move: waiting {seconds}s before removing source");
            std::thread::sleep(std::time::Duration::from_secs(seconds));
        }
        std::fs::remove_dir_all(&src)?;
        println!("{db_key}: removed source {}", src.display());
    }
    Ok(())
}

fn cmd_archive_bytes(fdb: &Fdb, request: &str, file: &std::path::Path, max_file_size: Option<u64>) -> Result<()> {
    let full_key = build_key_first_values(&parse_pairs(request));
    let (db_key, _, _) = fdb.schema().match_level(&full_key)?;

    let len = std::fs::metadata(file)?.len();
    if let Some(max) = max_file_size {
        if len > max {
            return Err(Error::SchemaMismatch(format!(
                "{} is {} but the configured limit is {}",
                file.display(),
                humansize::format_size(len, humansize::BINARY),
                humansize::format_size(max, humansize::BINARY)
            )));
        }
    }

    let mut archiver = match fdb.open_for_archive(&db_key) {
        Ok(archiver) => archiver,
        Err(Error::NotFound(_)) => fdb.create(&db_key, b"cli-managed".to_vec())?,
        Err(err) => return Err(err),
    };

    let bytes = std::fs::read(file)?;
    archiver.archive(&full_key, &bytes, None, None)?;
    archiver.flush()?;

    println!(
        "{full_key}: archived {} from {}",
        humansize::format_size(bytes.len() as u64, humansize::BINARY),
        file.display()
    );
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) {
    let level = if quiet {
        tracing::Level::WARN
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let level_filter: tracing_subscriber::filter::LevelFilter = level.into();
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// User-facing errors (bad request, missing/unconfigured roots, policy
/// refusals) exit 1; everything else (I/O, serialization, cancellation) is
/// treated as a system error and exits 2.
fn exit_code_for(err: &Error) -> ExitCode {
    match err {
        Error::SchemaMismatch(_)
        | Error::NotFound(_)
        | Error::AccessDenied(_)
        | Error::Conflict(_)
        | Error::UncleanDatabase(_) => ExitCode::from(1),
        _ => ExitCode::from(2),
    }
}

fn run_command(fdb: &Fdb, command: &ToolCommand, max_file_size: Option<u64>) -> Result<()> {
    match command {
        ToolCommand::List { request } => cmd_list(fdb, request),
        ToolCommand::Dump { request } => cmd_dump(fdb, request),
        ToolCommand::Wipe { request, doit, unsafe_wipe_all, porcelain } => {
            cmd_wipe(fdb, request, *doit, *unsafe_wipe_all, *porcelain)
        }
        ToolCommand::Purge { request, doit } => cmd_purge(fdb, request, *doit),
        ToolCommand::Hide { request, doit } => cmd_hide(fdb, request, *doit),
        ToolCommand::Move { request, dest, keep, delay } => cmd_move(fdb, request, dest, *keep, *delay),
        ToolCommand::ArchiveBytes { request, file } => cmd_archive_bytes(fdb, request, file, max_file_size),
    }
}

/// Reads `fieldbase`-subcommand lines from stdin until `quit`/`exit` or EOF,
/// parsing each with [`shlex`] and running it against the one `Fdb` bound for
/// the whole session.
fn run_shell(fdb: &Fdb, max_file_size: Option<u64>) -> Result<()> {
    let mut editor =
        rustyline::DefaultEditor::new().map_err(|_| Error::Unsupported("rustyline init failed"))?;

    loop {
        let line = match editor.readline("fieldbase> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Eof | rustyline::error::ReadlineError::Interrupted) => break,
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);
        if matches!(trimmed, "quit" | "exit") {
            break;
        }

        let tokens = match shlex::split(trimmed) {
            Some(tokens) => tokens,
            None => {
                eprintln!("error: unbalanced quotes");
                continue;
            }
        };

        let mut argv = vec!["fieldbase".to_string()];
        argv.extend(tokens);

        match ShellLine::try_parse_from(argv) {
            Ok(shell_line) => {
                if let Err(err) = run_command(fdb, &shell_line.command, max_file_size) {
                    eprintln!("error: {err}");
                }
            }
            Err(clap_err) => eprintln!("{clap_err}"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = ToolArgs::parse();
    init_tracing(args.quiet, args.verbose);

    let max_file_size = match args.max_file_size.as_deref().map(parse_size::parse_size) {
        Some(Ok(bytes)) => Some(bytes),
        Some(Err(err)) => {
            eprintln!("error: invalid --max-file-size: {err}");
            return ExitCode::from(1);
        }
        None => None,
    };

    let fdb = build_fdb(&args);

    let result = match &args.command {
        Some(command) => run_command(&fdb, command, max_file_size),
        None => run_shell(&fdb, max_file_size),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            exit_code_for(&err)
        }
    }
}
