use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scanhound", version, about = "Web application vulnerability scanner")]
pub struct Cli {
    /// Verbose output (info-level logs)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug output (very noisy)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl a target and run the vulnerability detectors against it
    Scan {
        /// Target URL, e.g. https://staging.example.com
        target: String,

        /// Scan mode: quick (shallow crawl, passive-heavy) or full
        #[arg(long, default_value = "quick")]
        mode: String,

        /// Also scan subdomains of the target host
        #[arg(long)]
        subdomains: bool,

        /// Regex of URLs to exclude (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Extra request header as `Name: value` (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Per-host request delay in seconds (floored at 2.0)
        #[arg(long)]
        delay: Option<f64>,

        /// Write the findings report as JSON to this path
        #[arg(long)]
        out: Option<String>,
    },
}
