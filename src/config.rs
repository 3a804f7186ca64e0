use std::time::Duration;

use clap::Parser;

use crate::scrape::RunSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobboard", about = "Job board backend and company listing scraper")]
pub struct Config {
    /// Database connection URL. Without one, jobs are kept in memory only.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    /// Built-in company sources to scrape
    #[arg(
        long,
        env = "SOURCES",
        value_delimiter = ',',
        default_value = "ola,swiggy,zepto"
    )]
    pub sources: Vec<String>,

    /// Greenhouse boards to scrape, as `token` or `token=Company Name`
    #[arg(long, env = "GREENHOUSE_BOARDS", value_delimiter = ',')]
    pub greenhouse_boards: Vec<String>,

    /// Per-source fetch timeout for a run, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "60")]
    pub fetch_timeout_secs: u64,

    /// Delay between successive page requests to one source, in milliseconds
    #[arg(long, env = "REQUEST_DELAY_MS", default_value = "1500")]
    pub request_delay_ms: u64,

    /// Largest accepted max_jobs for a run
    #[arg(long, env = "MAX_JOBS_LIMIT", default_value = "50")]
    pub max_jobs_limit: u32,

    /// Count re-scraped jobs with identical content as updated
    #[arg(
        long,
        env = "COUNT_UNCHANGED_AS_UPDATED",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    pub count_unchanged_as_updated: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the web server (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Run one scrape and print the report
    Scrape {
        /// Maximum postings to take from each company
        #[arg(long, default_value = "3")]
        max_jobs: u32,
    },
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            fetch_timeout: self.fetch_timeout(),
            max_jobs_limit: self.max_jobs_limit,
            count_unchanged_as_updated: self.count_unchanged_as_updated,
        }
    }
}
