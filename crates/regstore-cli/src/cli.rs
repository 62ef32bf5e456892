use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "regstore",
    about = "regstore -- typed object registries over a versioned store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Store configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Namespace for manifests that carry none, and for the final listing
    #[arg(short, long, global = true, default_value = "default")]
    pub namespace: String,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply NetworkPolicy manifests to an in-memory store
    Apply(ApplyArgs),
    /// Print the effective store configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ApplyArgs {
    /// JSON manifests, each one policy or an array of policies
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Label selector for the final listing, e.g. `app=api,tier!=db`
    #[arg(short = 'l', long)]
    pub selector: Option<String>,
    /// List every namespace instead of only `--namespace`
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,
}

#[derive(Args)]
pub struct ConfigArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_apply() {
        let cli = Cli::try_parse_from(["regstore", "apply", "a.json", "b.json"]).unwrap();
        if let Command::Apply(args) = cli.command {
            assert_eq!(args.files, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
            assert!(args.selector.is_none());
            assert!(!args.all_namespaces);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_apply_requires_files() {
        assert!(Cli::try_parse_from(["regstore", "apply"]).is_err());
    }

    #[test]
    fn parse_apply_selector() {
        let cli = Cli::try_parse_from(["regstore", "apply", "-l", "app=api", "-A", "p.json"]).unwrap();
        if let Command::Apply(args) = cli.command {
            assert_eq!(args.selector, Some("app=api".into()));
            assert!(args.all_namespaces);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_config() {
        let cli = Cli::try_parse_from(["regstore", "config"]).unwrap();
        assert!(matches!(cli.command, Command::Config(_)));
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_global_options() {
        let cli = Cli::try_parse_from([
            "regstore", "--config", "store.toml", "-n", "prod", "config",
        ]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("store.toml")));
        assert_eq!(cli.namespace, "prod");
    }

    #[test]
    fn parse_default_namespace() {
        let cli = Cli::try_parse_from(["regstore", "config"]).unwrap();
        assert_eq!(cli.namespace, "default");
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["regstore", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["regstore", "--format", "json", "config"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
