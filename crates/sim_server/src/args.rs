//! Command-line argument parsing for the simulation host

use std::path::PathBuf;

use anyhow::{bail, Context};

/// Result of parsing command-line arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    pub verbose: bool,
    /// Overrides the per-user config location
    pub config_path: Option<PathBuf>,
    /// Stop after this many update ticks instead of waiting for Ctrl-C
    pub ticks: Option<u64>,
}

/// Parse the process arguments
pub fn parse_args() -> anyhow::Result<ParsedArgs> {
    parse_args_from(std::env::args().skip(1))
}

/// Parse `args`, which must not include the program name
pub fn parse_args_from<I, S>(args: I) -> anyhow::Result<ParsedArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut parsed = ParsedArgs::default();
    let mut args = args.into_iter().map(Into::into);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" | "--verbose" => parsed.verbose = true,
            "--config" => {
                let path = args.next().context("--config requires a path")?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--ticks" => {
                let value = args.next().context("--ticks requires a count")?;
                let ticks = value
                    .parse::<u64>()
                    .with_context(|| format!("Invalid tick count: {value}"))?;
                parsed.ticks = Some(ticks);
            }
            other => bail!("Unknown argument: {other}"),
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let parsed = parse_args_from(Vec::<String>::new()).unwrap();
        assert_eq!(parsed, ParsedArgs::default());
    }

    #[test]
    fn test_all_flags() {
        let parsed =
            parse_args_from(["-v", "--config", "/tmp/sim.toml", "--ticks", "90"]).unwrap();
        assert!(parsed.verbose);
        assert_eq!(parsed.config_path, Some(PathBuf::from("/tmp/sim.toml")));
        assert_eq!(parsed.ticks, Some(90));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_args_from(["--ticks"]).is_err());
        assert!(parse_args_from(["--ticks", "soon"]).is_err());
        assert!(parse_args_from(["--config"]).is_err());
        assert!(parse_args_from(["--fast"]).is_err());
    }
}
