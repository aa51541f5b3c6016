use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use polars::prelude::DataFrame;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use covmap_core::config::Config;
use covmap_core::outputs::{self, RunSummary};
use covmap_core::regions::RegionTable;
use covmap_core::render::{self, ShapeTable};
use covmap_core::report;
use covmap_core::stats;
use covmap_core::tables::{self, CountyPopulation, StatePopulation};
use covmap_parser::{latest_daily_report, prep_county_file, prep_state_file, PrepError, PrepSummary};

#[derive(Parser, Debug)]
#[command(author, version, about = "County/state covid reconciliation and choropleth pipeline", long_about = None)]
struct Cli {
    /// Config file (defaults to $COVMAP_CONFIG, then ./covmap.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean raw daily report files into the standard input names
    Prep(PrepArgs),
    /// Load, reconcile, and derive the tables; write parquet/csv artifacts
    Build,
    /// Render the enabled choropleth maps
    Plot,
    /// Print the top-N terminal summaries
    Report(ReportArgs),
    /// Prep, build, plot, and report in one pass
    Run,
}

#[derive(Args, Debug, Default)]
struct PrepArgs {
    /// Raw county daily report (default: newest MM-DD-YYYY.csv in data_dir)
    #[arg(long)]
    county_file: Option<PathBuf>,

    /// Raw state daily report (optional)
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// How many rows to print per table
    #[arg(long, default_value_t = 15)]
    top: usize,
}

struct BuiltTable {
    df: DataFrame,
    as_of: NaiveDate,
}

#[derive(Default)]
struct BuiltTables {
    county: Option<BuiltTable>,
    state: Option<BuiltTable>,
    nyt: Option<BuiltTable>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Prep(args) => {
            run_prep(&config, &args)?;
            Ok(())
        }
        Command::Build => {
            let built = build_tables(&config)?;
            write_artifacts(&config, &built, Vec::new(), &[])?;
            Ok(())
        }
        Command::Plot => {
            let built = build_tables(&config)?;
            render_maps(&config, &built)?;
            Ok(())
        }
        Command::Report(args) => {
            let built = build_tables(&config)?;
            print_report(&built, args.top)
        }
        Command::Run => run_all(&config),
    }
}

fn run_prep(config: &Config, args: &PrepArgs) -> Result<Vec<PrepSummary>> {
    let options = config.prep_options();
    let mut summaries = Vec::new();

    let county_raw = match args.county_file.clone() {
        Some(path) => path,
        None => latest_daily_report(&config.paths.data_dir)
            .context("no raw county daily report found")?,
    };
    let county_out = config.county_cases_path();
    let summary = prep_county_file(&county_raw, &county_out, &options)?;
    println!(
        "prepped {} -> {} ({} rows kept, {} dropped)",
        county_raw.display(),
        county_out.display(),
        summary.rows_written,
        summary.rows_dropped
    );
    summaries.push(summary);

    if let Some(state_raw) = &args.state_file {
        let state_out = config.state_cases_path();
        let summary = prep_state_file(state_raw, &state_out, &options)?;
        println!(
            "prepped {} -> {} ({} rows kept, {} dropped)",
            state_raw.display(),
            state_out.display(),
            summary.rows_written,
            summary.rows_dropped
        );
        summaries.push(summary);
    }

    Ok(summaries)
}

fn build_tables(config: &Config) -> Result<BuiltTables> {
    let regions = RegionTable::load(&config.region_reference_path())?;
    let county_pop = CountyPopulation::from_csv_path(&config.county_population_path(), &regions)?;

    let mut built = BuiltTables::default();

    if config.run.county {
        let df = tables::load_county_cases(&config.county_cases_path(), &regions, &county_pop)?;
        let as_of = stats::max_date(&df, "updated")?;
        info!(rows = df.height(), %as_of, "county table built");
        built.county = Some(BuiltTable { df, as_of });
    }

    if config.run.state {
        let state_pop = StatePopulation::from_csv_path(&config.state_population_path())?;
        let df = tables::load_state_cases(&config.state_cases_path(), &state_pop)?;
        let as_of = stats::max_date(&df, "updated")?;
        info!(rows = df.height(), %as_of, "state table built");
        built.state = Some(BuiltTable { df, as_of });
    }

    if config.run.nyt {
        let series = tables::load_nyt_series(&config.nyt_series_path())?;
        let snapshot = stats::trailing_snapshot(&series)?;
        let df = stats::attach_population(&snapshot.df, &county_pop)?;
        let df = stats::derive_rates(&df)?;
        info!(rows = df.height(), as_of = %snapshot.as_of, "nyt snapshot built");
        built.nyt = Some(BuiltTable {
            df,
            as_of: snapshot.as_of,
        });
    }

    Ok(built)
}

fn render_maps(config: &Config, built: &BuiltTables) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&config.paths.out_dir)?;
    let extension = config.prep.map_format.extension();
    let mut written = Vec::new();

    if built.county.is_some() || built.nyt.is_some() {
        let shapes = ShapeTable::from_geojson_path(&config.county_shapes_path())?;

        if let Some(county) = &built.county {
            let cases_out = config.out_path(&format!("county_cases.{extension}"));
            render::county_cases_map(&county.df, &shapes, county.as_of, &cases_out)?;
            written.push(cases_out);

            let mortality_out = config.out_path(&format!("county_mortality.{extension}"));
            render::county_mortality_map(&county.df, &shapes, county.as_of, &mortality_out)?;
            written.push(mortality_out);
        }

        if let Some(nyt) = &built.nyt {
            let nyt_out = config.out_path(&format!("nyt_case_rate.{extension}"));
            render::nyt_case_rate_map(&nyt.df, &shapes, nyt.as_of, &nyt_out)?;
            written.push(nyt_out);
        }
    }

    if let Some(state) = &built.state {
        let shapes = ShapeTable::from_geojson_path(&config.state_shapes_path())?;
        let state_out = config.out_path(&format!("state_deaths.{extension}"));
        render::state_deaths_map(&state.df, &shapes, state.as_of, &state_out)?;
        written.push(state_out);
    }

    Ok(written)
}

fn write_artifacts(
    config: &Config,
    built: &BuiltTables,
    prep: Vec<PrepSummary>,
    maps: &[PathBuf],
) -> Result<()> {
    fs::create_dir_all(&config.paths.out_dir)?;

    let mut summary = RunSummary::new();
    summary.prep = prep;
    summary.maps = maps.iter().map(|path| path.display().to_string()).collect();

    if let Some(county) = &built.county {
        outputs::write_parquet(&county.df, &config.out_path("county_cases.parquet"))?;
        outputs::write_csv(&county.df, &config.out_path("county_cases.csv"))?;
        summary.county_rows = Some(county.df.height());
        summary.as_of_county = Some(county.as_of.to_string());
    }
    if let Some(state) = &built.state {
        outputs::write_parquet(&state.df, &config.out_path("state_cases.parquet"))?;
        outputs::write_csv(&state.df, &config.out_path("state_cases.csv"))?;
        summary.state_rows = Some(state.df.height());
        summary.as_of_state = Some(state.as_of.to_string());
    }
    if let Some(nyt) = &built.nyt {
        outputs::write_parquet(&nyt.df, &config.out_path("nyt_stats.parquet"))?;
        outputs::write_csv(&nyt.df, &config.out_path("nyt_stats.csv"))?;
        summary.nyt_rows = Some(nyt.df.height());
        summary.as_of_nyt = Some(nyt.as_of.to_string());
    }

    outputs::write_run_summary(&summary, &config.out_path("run_summary.json"))?;
    Ok(())
}

fn print_report(built: &BuiltTables, top: usize) -> Result<()> {
    if let Some(county) = &built.county {
        println!("Counties by deaths per 100 people (as of {}):", county.as_of);
        println!("{}", report::county_table(&county.df, top)?);
    }
    if let Some(state) = &built.state {
        println!("States by fatality rate (as of {}):", state.as_of);
        println!("{}", report::state_table(&state.df, top)?);
    }
    if built.county.is_none() && built.state.is_none() {
        warn!("nothing to report; enable county or state in the config");
    }
    Ok(())
}

fn run_all(config: &Config) -> Result<()> {
    let options = config.prep_options();
    let mut prep_summaries = Vec::new();

    match latest_daily_report(&config.paths.data_dir) {
        Ok(raw) => {
            let out = config.county_cases_path();
            let summary = prep_county_file(&raw, &out, &options)?;
            prep_summaries.push(summary);
        }
        Err(PrepError::NoDailyReports { dir }) => {
            warn!(dir = dir.as_str(), "no raw daily report; using existing cleaned file");
        }
        Err(err) => return Err(err.into()),
    }

    let built = build_tables(config)?;
    let maps = render_maps(config, &built)?;
    write_artifacts(config, &built, prep_summaries, &maps)?;
    print_report(&built, 15)
}
