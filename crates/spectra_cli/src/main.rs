//! `spectra` command line entry point.
//!
//! # Responsibility
//! - Map subcommands and flags onto core query, bootstrap and normalize
//!   operations.
//! - Render results as padded text tables or JSON.

mod table;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use spectra_core::bootstrap::{bootstrap, BootstrapOptions};
use spectra_core::config::{DataLayout, Profile, ProfileConfig};
use spectra_core::model::{EntityKind, SourceSnapshot};
use spectra_core::ndjson::{read_values, NdjsonDir};
use spectra_core::normalize::{NormalizeContext, Normalizer, RawRecord, RecordRejection};
use spectra_core::provision::DirectoryAssets;
use spectra_core::query::api::DEFAULT_SPECIES_LIMIT;
use spectra_core::query::diatomic::DiatomicQuery;
use spectra_core::query::{ExportOptions, LevelQuery, LineQuery, QueryApi, SpectralUnit};
use spectra_core::resolve::{DisambiguationPolicy, ResolveOptions};
use spectra_core::{default_log_level, init_logging, NormalizeReport};
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use table::{format_table, opt_num, opt_text};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Query and maintain the local spectroscopic database.
#[derive(Parser, Debug)]
#[command(name = "spectra", version, about = "Spectroscopic line and level database")]
struct Cli {
    /// Dataset profile.
    #[arg(long, global = true, default_value = "atomic")]
    profile: Profile,

    /// Data root (overrides SPECTRA_DB_DATA_DIR and checkout detection).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Database file for the profile.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// NDJSON directory for the profile.
    #[arg(long, global = true)]
    ndjson_dir: Option<PathBuf>,

    /// Directory with bundled `db/<file>` databases for first-use copies.
    #[arg(long, global = true)]
    assets_dir: Option<PathBuf>,

    /// Write rotating log files here.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print JSON instead of a table.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search species by formula or name.
    Species {
        query: String,
        #[arg(long, default_value_t = DEFAULT_SPECIES_LIMIT)]
        limit: u32,
    },

    /// List energy levels of a species.
    Levels {
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long)]
        max_energy: Option<f64>,
    },

    /// List lines of a species.
    Lines {
        query: String,
        #[command(flatten)]
        lines: LineArgs,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show diatomic constants per electronic state (molecular profile).
    Diatomic {
        query: String,
        /// Excited states to show after the lowest one.
        #[arg(long)]
        n_excited: Option<usize>,
        /// Print footnotes referenced by the shown cells.
        #[arg(long)]
        footnotes: bool,
        /// Print the page's bibliographic references.
        #[arg(long)]
        citations: bool,
        /// Treat the query as a species id.
        #[arg(long)]
        species_id: bool,
        /// Fall back to fuzzy matching when no exact match exists.
        #[arg(long)]
        fuzzy: bool,
    },

    /// Export species, isotopologues, levels and lines as JSON.
    Export {
        query: String,
        #[arg(long)]
        max_energy: Option<f64>,
        #[arg(long, default_value_t = 5000)]
        levels_limit: u32,
        #[command(flatten)]
        lines: LineArgs,
        #[arg(long, default_value_t = 10_000)]
        lines_limit: usize,
        #[arg(long)]
        no_levels: bool,
        #[arg(long)]
        no_lines: bool,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Load the profile's NDJSON files into its database.
    Bootstrap {
        /// Empty every table first instead of upserting.
        #[arg(long)]
        truncate_all: bool,
    },

    /// Normalize raw parser records and append them to the NDJSON files.
    Normalize {
        /// NDJSON file of raw records tagged by `kind`.
        input: PathBuf,
        /// Record a source snapshot for the input under this URL.
        #[arg(long)]
        source_url: Option<String>,
        #[arg(long, default_value = "raw_records")]
        source: String,
        /// Write rejected records here as NDJSON.
        #[arg(long)]
        rejects: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct LineArgs {
    /// Display unit: nm, A, um or cm-1.
    #[arg(long, default_value = "nm")]
    unit: String,
    #[arg(long)]
    min_wav: Option<f64>,
    #[arg(long)]
    max_wav: Option<f64>,
    /// Return the physics payload as stored JSON.
    #[arg(long)]
    raw_payload: bool,
}

impl LineArgs {
    fn to_query(&self, limit: usize) -> CliResult<LineQuery> {
        Ok(LineQuery {
            unit: self.unit.parse::<SpectralUnit>()?,
            min: self.min_wav,
            max: self.max_wav,
            limit: Some(limit),
            parse_payload: !self.raw_payload,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("warning: file logging disabled: {err}");
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    let config = profile_config(cli)?;
    match &cli.command {
        Command::Species { query, limit } => {
            let api = open_api(cli, &config)?;
            let species = api.find_species(query, *limit)?;
            if cli.json {
                return print_json(&species);
            }
            let rows = species
                .iter()
                .map(|s| {
                    vec![
                        s.species_id.clone(),
                        s.formula.clone(),
                        opt_text(s.name.as_deref()),
                        format!("{:+}", s.charge),
                    ]
                })
                .collect::<Vec<_>>();
            print!("{}", format_table(&["species_id", "formula", "name", "charge"], &rows));
        }

        Command::Levels {
            query,
            limit,
            max_energy,
        } => {
            let api = open_api(cli, &config)?;
            let Some(species_id) = resolve_one(&api, query, api.resolve_options())? else {
                return Ok(());
            };
            let level_query = LevelQuery {
                max_energy: *max_energy,
                limit: Some(*limit),
            };
            let mut all = Vec::new();
            for iso in api.isotopologues(&species_id)? {
                all.extend(api.levels(&iso.iso_id, &level_query)?);
            }
            if cli.json {
                let states: Vec<_> = all.iter().map(|row| &row.state).collect();
                return print_json(&states);
            }
            let rows = all
                .iter()
                .map(|row| {
                    let state = &row.state;
                    vec![
                        opt_num(state.energy_value),
                        opt_text(state.energy_unit.as_deref()),
                        opt_text(state.configuration.as_deref()),
                        opt_text(state.term.as_deref()),
                        opt_num(state.j_value),
                        opt_num(state.g_value),
                        opt_text(row.ref_url.as_deref()),
                    ]
                })
                .collect::<Vec<_>>();
            println!("{species_id}");
            print!(
                "{}",
                format_table(&["energy", "unit", "configuration", "term", "J", "g", "ref"], &rows)
            );
        }

        Command::Lines {
            query,
            lines,
            limit,
        } => {
            let api = open_api(cli, &config)?;
            let Some(species_id) = resolve_one(&api, query, api.resolve_options())? else {
                return Ok(());
            };
            let line_query = lines.to_query(*limit)?;
            let mut all = Vec::new();
            for iso in api.isotopologues(&species_id)? {
                all.extend(api.lines(&iso.iso_id, &line_query)?);
            }
            if cli.json {
                return print_json(&all);
            }
            let rows = all
                .iter()
                .map(|line| {
                    let physics = line.payload.physics();
                    vec![
                        line.value.to_string(),
                        line.unit.to_string(),
                        opt_num(line.uncertainty),
                        opt_num(physics.and_then(|p| p.relative_intensity)),
                        opt_num(physics.and_then(|p| p.aki_per_s)),
                        opt_num(physics.and_then(|p| p.ei_cm)),
                        opt_num(physics.and_then(|p| p.ek_cm)),
                        physics
                            .and_then(|p| p.lower.as_ref())
                            .map(|level| level.display())
                            .unwrap_or_default(),
                        physics
                            .and_then(|p| p.upper.as_ref())
                            .map(|level| level.display())
                            .unwrap_or_default(),
                        opt_text(line.ref_id.as_deref()),
                    ]
                })
                .collect::<Vec<_>>();
            println!("{species_id}");
            print!(
                "{}",
                format_table(
                    &["value", "unit", "unc", "rel_int", "Aki", "Ei", "Ek", "lower", "upper", "ref"],
                    &rows
                )
            );
        }

        Command::Diatomic {
            query,
            n_excited,
            footnotes,
            citations,
            species_id,
            fuzzy,
        } => {
            let api = open_api(cli, &config)?;
            let resolve = ResolveOptions {
                fuzzy_fallback: *fuzzy && !*species_id,
                policy: if *species_id {
                    DisambiguationPolicy::RequireExact
                } else {
                    DisambiguationPolicy::AcceptTop
                },
                ..api.resolve_options()
            };
            let options = DiatomicQuery {
                n_excited: *n_excited,
                include_notes: *footnotes,
                include_citations: *citations,
            };
            let Some(constants) = api.diatomic_constants(query, &resolve, &options)? else {
                eprintln!("no species matches `{query}`");
                return Ok(());
            };
            if cli.json {
                return print_json(&constants);
            }
            print_diatomic(&constants);
        }

        Command::Export {
            query,
            max_energy,
            levels_limit,
            lines,
            lines_limit,
            no_levels,
            no_lines,
            out,
        } => {
            let api = open_api(cli, &config)?;
            let options = ExportOptions {
                levels: (!*no_levels).then_some(LevelQuery {
                    max_energy: *max_energy,
                    limit: Some(*levels_limit),
                }),
                lines: if *no_lines {
                    None
                } else {
                    Some(lines.to_query(*lines_limit)?)
                },
                ..ExportOptions::for_profile(api.profile())
            };
            let bundle = api.export_bundle(query, &options)?;
            let json = bundle.to_json_pretty()?;
            match out {
                Some(path) => {
                    write_file(path, json.as_bytes())?;
                    eprintln!(
                        "exported {} species to {}",
                        bundle.species_ids.len(),
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
        }

        Command::Bootstrap { truncate_all } => {
            let report = bootstrap(
                &config,
                BootstrapOptions {
                    truncate: *truncate_all,
                },
            )?;
            let rows = EntityKind::ALL
                .iter()
                .map(|kind| {
                    vec![
                        kind.table_name().to_string(),
                        report.loaded.get(kind).copied().unwrap_or(0).to_string(),
                        report.rows(*kind).to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            println!("{} -> {}", config.ndjson_dir.display(), config.db_path.display());
            print!("{}", format_table(&["table", "ndjson", "rows"], &rows));
        }

        Command::Normalize {
            input,
            source_url,
            source,
            rejects,
        } => {
            let report = normalize_file(&config, input, source_url.as_deref(), source)?;
            let appended = NdjsonDir::new(&config.ndjson_dir).append_batch(&report.batch)?;
            if let Some(path) = rejects {
                write_rejections(path, &report.rejections)?;
            }
            let rows = appended
                .iter()
                .map(|(kind, count)| vec![kind.file_name().to_string(), count.to_string()])
                .collect::<Vec<_>>();
            print!("{}", format_table(&["file", "appended"], &rows));
            println!("rejected: {}", report.rejections.len());
        }
    }
    Ok(())
}

fn profile_config(cli: &Cli) -> CliResult<ProfileConfig> {
    let layout = match &cli.data_dir {
        Some(dir) => DataLayout::at(dir),
        None => DataLayout::from_env()?,
    };
    let mut config = layout.profile_config(cli.profile);
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(ndjson_dir) = &cli.ndjson_dir {
        config.ndjson_dir = ndjson_dir.clone();
    }
    log::debug!(
        "event=cli_config module=cli profile={} layout_source={} db={}",
        config.profile,
        layout.source.as_str(),
        config.db_path.display()
    );
    Ok(config)
}

fn open_api(cli: &Cli, config: &ProfileConfig) -> CliResult<QueryApi> {
    let assets = cli.assets_dir.as_ref().map(DirectoryAssets::new);
    let api = QueryApi::open(
        config,
        assets
            .as_ref()
            .map(|assets| assets as &dyn spectra_core::provision::AssetProvider),
    )?;
    Ok(api)
}

fn resolve_one(api: &QueryApi, query: &str, options: ResolveOptions) -> CliResult<Option<String>> {
    let species_id = api.resolve_species_id(query, &options)?;
    if species_id.is_none() {
        eprintln!("no species matches `{query}`");
    }
    Ok(species_id)
}

fn normalize_file(
    config: &ProfileConfig,
    input: &Path,
    source_url: Option<&str>,
    source: &str,
) -> CliResult<NormalizeReport> {
    let mut ctx = NormalizeContext::default();
    let mut snapshot = None;
    if let Some(url) = source_url {
        let bytes = fs::read(input)?;
        let captured = SourceSnapshot::capture(
            source,
            url,
            &bytes,
            Utc::now(),
            Some(input.display().to_string()),
        );
        ctx = NormalizeContext::from_snapshot(&captured);
        snapshot = Some(captured);
    }

    let mut records = Vec::new();
    let mut parse_rejections = Vec::new();
    for (index, value) in read_values(input)?.into_iter().enumerate() {
        match serde_json::from_value::<RawRecord>(value.clone()) {
            Ok(record) => records.push((index, record)),
            Err(err) => parse_rejections.push(RecordRejection {
                index,
                kind: "unknown",
                reason: err.to_string(),
                raw: value,
            }),
        }
    }

    let indices: Vec<usize> = records.iter().map(|(index, _)| *index).collect();
    let mut normalizer = Normalizer::new(config.profile);
    let mut report = normalizer.normalize_all(records.into_iter().map(|(_, record)| record), &ctx);
    for rejection in &mut report.rejections {
        if let Some(index) = indices.get(rejection.index) {
            rejection.index = *index;
        }
    }
    report.rejections.extend(parse_rejections);
    report.rejections.sort_by_key(|rejection| rejection.index);
    if let Some(snapshot) = snapshot {
        report.batch.insert(snapshot);
    }
    Ok(report)
}

fn write_rejections(path: &Path, rejections: &[RecordRejection]) -> CliResult<()> {
    let mut out = String::new();
    for rejection in rejections {
        out.push_str(&serde_json::to_string(rejection)?);
        out.push('\n');
    }
    write_file(path, out.as_bytes())
}

fn write_file(path: &Path, bytes: &[u8]) -> CliResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_diatomic(constants: &spectra_core::query::DiatomicConstants) {
    use spectra_core::normalize::molecular::DIATOMIC_CONSTANTS;

    println!("{}", constants.species.species_id);
    for table in &constants.tables {
        println!();
        println!(
            "{}",
            table
                .caption
                .as_deref()
                .or(table.label.as_deref())
                .unwrap_or(&table.iso_id)
        );
        let mut headers = vec!["state"];
        headers.extend(DIATOMIC_CONSTANTS);
        headers.push("Trans");
        let rows = table
            .states
            .iter()
            .map(|state| {
                let mut row = vec![opt_text(state.label.as_deref())];
                row.extend(DIATOMIC_CONSTANTS.iter().map(|name| {
                    state
                        .constants
                        .get(*name)
                        .map(|cell| cell.display())
                        .unwrap_or_default()
                }));
                row.push(format!(
                    "{}{}",
                    state.trans.as_deref().unwrap_or(""),
                    state.trans_suffix.as_deref().unwrap_or("")
                ));
                row
            })
            .collect::<Vec<_>>();
        print!("{}", format_table(&headers, &rows));
    }

    if !constants.footnotes.is_empty() {
        println!();
        for note in &constants.footnotes {
            println!("[{}] {}", note.id, note.text.as_deref().unwrap_or(""));
        }
    }
    if !constants.citations.is_empty() {
        println!();
        for reference in &constants.citations {
            let tag = reference.ref_id.rsplit(':').next().unwrap_or(&reference.ref_id);
            println!(
                "[{tag}] {}{}",
                reference.citation.as_deref().unwrap_or(""),
                reference
                    .doi
                    .as_deref()
                    .map(|doi| format!(" doi:{doi}"))
                    .unwrap_or_default()
            );
        }
    }
}
