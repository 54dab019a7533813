use anyhow::{Result, anyhow};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub name: String,                // --name
    pub doc: PathBuf,                // --doc
    pub config: Option<PathBuf>,     // --config
    pub resume_from: Option<String>, // --resume-from
    pub pipeline_id: Option<String>, // --pipeline-id
    pub export: Option<PathBuf>,     // --export
    pub verbose: bool,               // -v/--verbose
}

impl CliArgs {
    pub fn parse() -> Result<Self> {
        let args: Vec<String> = env::args().collect();
        Self::parse_from(&args[1..])
    }

    /// Parse from a slice of arguments (for testing)
    pub fn parse_from(args: &[String]) -> Result<Self> {
        let mut name = None;
        let mut doc = None;
        let mut config = None;
        let mut resume_from = None;
        let mut pipeline_id = None;
        let mut export = None;
        let mut verbose = false;

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];

            match arg.as_str() {
                "--name" | "--doc" | "--config" | "--resume-from" | "--pipeline-id"
                | "--export" => {
                    i += 1;
                    if i >= args.len() {
                        return Err(anyhow!("{arg} requires a value"));
                    }
                    let value = args[i].clone();
                    match arg.as_str() {
                        "--name" => name = Some(value),
                        "--doc" => doc = Some(PathBuf::from(value)),
                        "--config" => config = Some(PathBuf::from(value)),
                        "--resume-from" => resume_from = Some(value),
                        "--pipeline-id" => pipeline_id = Some(value),
                        _ => export = Some(PathBuf::from(value)),
                    }
                }
                "-v" | "--verbose" => {
                    verbose = true;
                }
                unknown => {
                    return Err(anyhow!("Unknown argument: {unknown}"));
                }
            }

            i += 1;
        }

        if resume_from.is_some() && pipeline_id.is_none() {
            return Err(anyhow!("--resume-from requires --pipeline-id"));
        }

        Ok(CliArgs {
            name: name.ok_or_else(|| anyhow!("--name is required"))?,
            doc: doc.ok_or_else(|| anyhow!("--doc is required"))?,
            config,
            resume_from,
            pipeline_id,
            export,
            verbose,
        })
    }

    pub fn usage() -> &'static str {
        "Usage: periphgen --name <peripheral> --doc <path> [--config <path>] \
         [--resume-from <step> --pipeline-id <id>] [--export <dir>] [-v]"
    }
}
