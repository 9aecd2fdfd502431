use clap::{Parser, Subcommand};

use sitepulse::server::DEFAULT_BIND_ADDR;
use sitepulse::{
    DateRange, Metric, PeriodComparison, SitePulse, CONFIG_BIND_ADDR, CONFIG_USER_CACHE_TTL_SECS,
};

#[derive(Parser)]
#[command(name = "sitepulse", about = "Period-over-period dashboard analytics")]
struct Cli {
    /// Database path (default: ~/.sitepulse/sitepulse.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the metrics HTTP API
    Serve {
        /// Address to listen on (default: app config `bind_addr`, then 127.0.0.1:8787)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Compare a metric over a window against the preceding window
    Compare {
        /// Metric name (see `sitepulse metrics`)
        metric: String,
        /// Site (tenant) identifier
        #[arg(long)]
        site: String,
        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: String,
        /// Window end (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        end: String,
        /// Dimension value: segment, user (id or email) or channel, depending on the metric
        #[arg(long)]
        filter: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available metrics
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show row counts per table
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => sitepulse::Database::open_at(path).await?,
        None => sitepulse::Database::open().await?,
    };

    match cli.command {
        Commands::Serve { bind } => {
            let bind = match bind {
                Some(addr) => addr,
                None => db
                    .config_get(CONFIG_BIND_ADDR)
                    .await?
                    .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            };
            let pulse = SitePulse::from_database(db).await?;
            sitepulse::server::serve(pulse, &bind).await?;
        }
        Commands::Compare {
            metric,
            site,
            start,
            end,
            filter,
            json,
        } => {
            let metric = Metric::parse(&metric)?;
            let range = DateRange::parse(&start, &end)?;
            let pulse = SitePulse::from_database(db).await?;
            let result = pulse
                .compare(metric, &site, filter.as_deref(), &range)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_comparison(&result);
            }
        }
        Commands::Metrics { json } => {
            let infos: Vec<_> = Metric::ALL.iter().map(Metric::info).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for info in infos {
                    println!(
                        "  {:<20} {:<28} {}",
                        info.name,
                        info.description,
                        info.filter_param.unwrap_or("-")
                    );
                }
            }
        }
        Commands::Config { action } => {
            handle_config(&db, action).await?;
        }
        Commands::Status => {
            let counts = db.table_counts().await?;
            println!("Database Status");
            for count in counts {
                println!("  {:<18} {}", count.table, count.rows);
            }
        }
    }

    Ok(())
}

fn print_comparison(result: &PeriodComparison) {
    let meta = &result.metadata;
    println!("{} ({})", meta.metric, result.period_type);
    println!(
        "  Current:  {} .. {}  {}",
        meta.current_period.start, meta.current_period.end, result.actual
    );
    println!(
        "  Previous: {} .. {}  {}",
        meta.previous_period.start, meta.previous_period.end, result.previous
    );
    let sign = if result.percent_change > 0.0 { "+" } else { "" };
    println!(
        "  Change:   {sign}{:.1}% {}",
        result.percent_change, meta.comparison_label
    );
    if let Some(filter) = &meta.filter {
        println!("  Filter:   {:?} = {}", filter.kind, filter.value);
    }
    if meta.degraded {
        println!("  (data unavailable; showing zeros)");
    }
}

async fn handle_config(db: &sitepulse::Database, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match db.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            if key == CONFIG_USER_CACHE_TTL_SECS && value.trim().parse::<u64>().is_err() {
                anyhow::bail!("{key} must be a whole number of seconds");
            }
            db.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = db.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
