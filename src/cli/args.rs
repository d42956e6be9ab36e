//! Command-line surface of the `stencil` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};

#[derive(Debug, Parser)]
#[command(name = "stencil")]
#[command(about = "Scaffold projects and run their setup in a sandbox")]
#[command(version)]
pub struct Cli {
    /// Configuration file (overrides STENCIL_CONFIG_PATH and stencil.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Caller identity used for abuse tracking in the audit trail
    #[arg(long, global = true, default_value = "anonymous")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run inputs through the input gate and print the validated result
    Validate {
        #[command(flatten)]
        inputs: InputArgs,

        /// Field that must be present (repeatable)
        #[arg(long = "require", value_name = "FIELD")]
        required: Vec<String>,
    },

    /// Validate inputs, build the execution context and run the template's setup plan
    Setup {
        #[command(flatten)]
        inputs: InputArgs,

        /// Run in template authoring mode
        #[arg(long)]
        authoring: bool,

        /// Selected option as dimension=value (repeatable)
        #[arg(long = "option", value_name = "DIMENSION=VALUE")]
        options: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

/// Raw inputs as typed on the command line.
#[derive(Debug, Clone, Default, Args)]
pub struct InputArgs {
    #[arg(long)]
    pub project_name: Option<String>,

    /// Project directory, relative to the current directory
    #[arg(long)]
    pub project_directory: Option<String>,

    #[arg(long)]
    pub template: Option<String>,

    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub cache_ttl: Option<String>,

    #[arg(long)]
    pub log_file: Option<String>,

    /// Additional template input as key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub extra: Vec<(String, String)>,
}

impl InputArgs {
    /// Build the untyped input object handed to the gate.
    pub fn to_json(&self) -> Value {
        let known = [
            ("project_name", &self.project_name),
            ("project_directory", &self.project_directory),
            ("template", &self.template),
            ("repo", &self.repo),
            ("branch", &self.branch),
            ("cache_ttl", &self.cache_ttl),
            ("log_file", &self.log_file),
        ];
        let mut object = Map::new();
        for (key, value) in known {
            if let Some(value) = value {
                object.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        for (key, value) in &self.extra {
            object.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(object)
    }

    pub fn extra_keys(&self) -> impl Iterator<Item = &str> {
        self.extra.iter().map(|(key, _)| key.as_str())
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn only_given_inputs_are_forwarded() {
        let cli = Cli::parse_from([
            "stencil",
            "validate",
            "--project-name",
            "demo",
            "--set",
            "author=Ada",
        ]);
        let Commands::Validate { inputs, .. } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(
            inputs.to_json(),
            json!({ "project_name": "demo", "author": "Ada" })
        );
    }

    #[test]
    fn malformed_key_value_is_rejected() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
        assert_eq!(
            parse_key_value("a=b=c").unwrap(),
            ("a".to_string(), "b=c".to_string())
        );
    }
}
