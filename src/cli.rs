//! Command-line interface for photobatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::features::Feature;

/// Batch AI photo generation with bounded concurrency.
#[derive(Debug, Parser)]
#[command(name = "photobatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a config file (defaults to ./photobatch.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a generation batch over one or more photos.
    Run {
        /// Source photos.
        #[arg(required = true)]
        photos: Vec<PathBuf>,

        /// Which feature profile drives the batch.
        #[arg(long, value_enum, default_value_t = Feature::IdPhoto)]
        feature: Feature,

        /// Prompt sent with every photo.
        #[arg(long)]
        prompt: String,

        /// Outputs per photo for quantity features.
        #[arg(long, default_value_t = 4)]
        quantity: usize,

        /// Override the feature's concurrency limit.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Ask the service to downscale inputs before generation.
        #[arg(long, default_value_t = false)]
        precompress: bool,

        /// Archive to write successful outputs to.
        #[arg(long, default_value = "photobatch-output.tar")]
        out: PathBuf,
    },

    /// List recent history entries.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the variation each job index would receive.
    Variations {
        #[arg(long, value_enum, default_value_t = Feature::Portrait)]
        feature: Feature,

        #[arg(long, default_value_t = 4)]
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "photobatch",
            "run",
            "a.png",
            "b.jpg",
            "--feature",
            "id-photo",
            "--prompt",
            "white background",
            "--concurrency",
            "2",
        ]);
        match cli.command {
            Command::Run {
                photos,
                feature,
                prompt,
                concurrency,
                precompress,
                ..
            } => {
                assert_eq!(photos.len(), 2);
                assert_eq!(feature, Feature::IdPhoto);
                assert_eq!(prompt, "white background");
                assert_eq!(concurrency, Some(2));
                assert!(!precompress);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "photobatch",
            "--config",
            "alt.toml",
            "--verbose",
            "history",
            "--limit",
            "3",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Command::History { limit: 3 }));
    }

    #[test]
    fn cli_parses_variations() {
        let cli = Cli::parse_from(["photobatch", "variations", "--feature", "couple"]);
        match cli.command {
            Command::Variations { feature, count } => {
                assert_eq!(feature, Feature::Couple);
                assert_eq!(count, 4);
            }
            _ => panic!("expected Variations command"),
        }
    }

    #[test]
    fn run_requires_photos() {
        assert!(Cli::try_parse_from(["photobatch", "run", "--prompt", "x"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
