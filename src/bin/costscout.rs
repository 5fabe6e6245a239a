use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use costscout::config::ScoutConfig;
use costscout::scan::{scan, ScanOutcome};
use costscout::source::{CostQuery, FileSource};
use costscout::SuspectRecord;
use itertools::Itertools;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Once;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_parallelism() {
    static START: Once = Once::new();
    START.call_once(|| {
        let n = num_cpus::get();
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    });
}

fn init_logging(verbose: bool) {
    let default = if verbose { "costscout=debug" } else { "costscout=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SortKey {
    Input,
    Change,
    Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GroupBy {
    None,
    Service,
}

#[derive(Parser, Debug)]
#[command(name = "costscout", version, about = "Flag cloud cost spikes by service and region")]
struct Cli {
    /// Report export for the current window
    #[arg(long = "current", requires = "previous")]
    current: Option<PathBuf>,
    /// Report export for the previous window
    #[arg(long = "previous", requires = "current")]
    previous: Option<PathBuf>,
    /// Directory of `<start>_<end>.json` report exports
    #[arg(long = "reports-dir", conflicts_with_all = ["current", "previous"])]
    reports_dir: Option<PathBuf>,
    /// Config file (toml, json or yaml); defaults to ./costscout.* when present
    #[arg(long = "config")]
    config: Option<PathBuf>,

    #[arg(long = "pct-threshold")] pct_threshold: Option<f64>,
    #[arg(long = "abs-threshold")] abs_threshold: Option<f64>,
    #[arg(long = "window-days")] window_days: Option<i64>,
    #[arg(long = "window-label")] window_label: Option<String>,
    #[arg(long = "metric")] metric: Option<String>,
    /// End (exclusive) of the current window, YYYY-MM-DD; defaults to today (UTC)
    #[arg(long = "today")]
    today: Option<NaiveDate>,

    /// Keep suspects whose service matches
    #[arg(long = "match")] match_re: Option<String>,
    /// Drop suspects whose service matches
    #[arg(long = "exclude")] exclude_re: Option<String>,
    #[arg(long = "top")] top: Option<usize>,
    /// Order suspects by
    #[arg(long = "sort", value_enum, default_value_t = SortKey::Input)] sort_by: SortKey,
    /// Output format; auto prints a table on a terminal
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Auto)] format: OutputFormat,
    /// Group table rows by
    #[arg(long = "group-by", value_enum, default_value_t = GroupBy::None)] group_by: GroupBy,

    /// Print the usage queries for both windows and exit
    #[arg(long = "print-query", default_value_t = false)] print_query: bool,
    #[arg(long = "verbose", short = 'v', default_value_t = false)] verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    init_parallelism();
    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = ScoutConfig::load(cli.config.as_deref())?;
    if let Some(p) = cli.pct_threshold { cfg.pct_threshold = p; }
    if let Some(a) = cli.abs_threshold { cfg.abs_threshold = a; }
    if let Some(d) = cli.window_days { cfg.window_days = d; }
    if let Some(l) = cli.window_label.clone() { cfg.window_label = Some(l); }
    if let Some(m) = cli.metric.clone() { cfg.metric = m; }
    let today = cli.today.unwrap_or_else(|| Utc::now().date_naive());

    if cli.print_query {
        let (current, previous) = cfg.windows(today)?;
        let queries = serde_json::json!({
            "current": CostQuery::new(current, &cfg.metric).to_request(),
            "previous": CostQuery::new(previous, &cfg.metric).to_request(),
        });
        println!("{}", serde_json::to_string_pretty(&queries)?);
        return Ok(());
    }

    let source = match (&cli.current, &cli.previous, &cli.reports_dir) {
        (Some(c), Some(p), _) => {
            let (cw, pw) = cfg.windows(today)?;
            FileSource::pair(cw, c.clone(), pw, p.clone())
        }
        (_, _, Some(dir)) => FileSource::dir(dir),
        _ => bail!("no reports given: pass --current and --previous, or --reports-dir"),
    };

    let mut out = scan(&source, &cfg, today)?;
    filter_suspects(&mut out, &cli)?;

    let table = match cli.format {
        OutputFormat::Table => true,
        OutputFormat::Json => false,
        OutputFormat::Auto => atty::is(atty::Stream::Stdout),
    };
    if table {
        print_suspects_table(&out, cli.group_by);
    } else {
        println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Ok(())
}

fn filter_suspects(out: &mut ScanOutcome, cli: &Cli) -> anyhow::Result<()> {
    let sus = &mut out.suspects;
    if let Some(re) = &cli.match_re {
        let rx = Regex::new(re).with_context(|| format!("--match {re}"))?;
        sus.retain(|s| rx.is_match(&s.service));
    }
    if let Some(re) = &cli.exclude_re {
        let rx = Regex::new(re).with_context(|| format!("--exclude {re}"))?;
        sus.retain(|s| !rx.is_match(&s.service));
    }
    match cli.sort_by {
        SortKey::Input => {}
        SortKey::Change => sus.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct).then_with(|| b.current_cost.total_cmp(&a.current_cost))),
        SortKey::Cost => sus.sort_by(|a, b| b.current_cost.total_cmp(&a.current_cost).then_with(|| b.change_pct.total_cmp(&a.change_pct))),
    }
    if let Some(top) = cli.top { sus.truncate(top); }
    Ok(())
}

fn print_row(s: &SuspectRecord) {
    println!("{:<40} {:<16} {:>12.2} {:>12.2} {:>9.2} {:<10}",
        s.service, s.region, s.current_cost, s.previous_cost, s.change_pct, format!("{:?}", s.trigger).to_lowercase());
}

fn print_header() {
    println!("{:<40} {:<16} {:>12} {:>12} {:>9} {:<10}", "Service", "Region", "Current", "Previous", "Change%", "Trigger");
}

fn print_suspects_table(out: &ScanOutcome, group_by: GroupBy) {
    println!("# current {} ({:.2})  previous {} ({:.2})",
        out.current_window, out.current_total, out.previous_window, out.previous_total);
    if group_by == GroupBy::Service {
        let mut sorted = out.suspects.clone();
        sorted.sort_by(|a, b| a.service.cmp(&b.service));
        for (service, rows) in &sorted.iter().chunk_by(|s| s.service.clone()) {
            println!("\n# {}", service);
            print_header();
            for s in rows { print_row(s); }
        }
        return;
    }
    print_header();
    for s in &out.suspects { print_row(s); }
}
