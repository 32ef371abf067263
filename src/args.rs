use clap::Parser;
use crawl_engine::CrawlConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "crawl-engine")]
#[command(about = "Polite web crawler with change detection")]
#[command(version)]
pub struct Args {
    /// Seed URL to start crawling from (overrides the config file)
    pub seed: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Append page and change records to this JSON-lines file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum number of pages to admit
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Maximum link depth from the seed
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Seconds between requests to the same host
    #[arg(long)]
    pub delay: Option<f64>,

    /// Number of concurrent workers
    #[arg(short = 'n', long)]
    pub concurrent: Option<usize>,

    /// Ignore robots.txt
    #[arg(long)]
    pub no_robots: bool,

    /// Render pages through WebDriver
    #[arg(long)]
    pub render: bool,

    /// Follow links to other domains
    #[arg(long)]
    pub allow_external: bool,

    /// Treat query parameter order as significant
    #[arg(long)]
    pub no_sort_query: bool,

    /// Seed the crawl from the site's sitemaps
    #[arg(long)]
    pub sitemaps: bool,
}

impl Args {
    /// Build the session configuration from the config file and flags
    pub fn into_config(self) -> crawl_engine::Result<CrawlConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlConfig::from_file(path)?,
            None => {
                let mut config = CrawlConfig::new("");
                config.apply_env();
                config
            }
        };

        if let Some(seed) = self.seed {
            config.seed_url = seed;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(concurrent) = self.concurrent {
            config.concurrent = concurrent;
        }
        config.respect_robots &= !self.no_robots;
        config.render |= self.render;
        config.allow_external |= self.allow_external;
        config.sort_query_params &= !self.no_sort_query;
        config.parse_sitemaps |= self.sitemaps;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "crawl-engine",
            "https://example.com",
            "--max-pages",
            "5",
            "-n",
            "2",
            "--no-robots",
            "--no-sort-query",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.seed_url, "https://example.com");
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.concurrent, 2);
        assert!(!config.respect_robots);
        assert!(!config.sort_query_params);
        assert!(!config.render);
    }
}
