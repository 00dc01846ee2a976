//! Command-line argument parsing (§4.6, §6).
//!
//! Hand-rolled, not pulled through an external arg-parsing crate — the
//! surface is five flags and doesn't earn the dependency.

pub const USAGE: &str = "\
modembridge - bridge a dial-up modem to a telnet host

USAGE:
    modembridge [OPTIONS]

OPTIONS:
    -c, --config FILE      configuration file (default: /etc/modembridge.conf)
    -d, --daemon           detach and run in the background
    -p, --pid-file FILE    override the configured PID file path
    -v, --verbose          lower the default log level to debug
    -h, --help             print this message and exit
    -V, --version          print the version and exit
";

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: String,
    pub daemon: bool,
    pub pid_file: Option<String>,
    pub verbose: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config_path: "/etc/modembridge.conf".to_string(),
            daemon: false,
            pid_file: None,
            verbose: false,
        }
    }
}

/// Outcome of parsing: either the parsed arguments, or a request to print
/// something and exit immediately (help/version), or a parse error message.
pub enum ParseOutcome {
    Args(CliArgs),
    PrintAndExit(String),
    Error(String),
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> ParseOutcome {
    let mut result = CliArgs::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => match iter.next() {
                Some(value) => result.config_path = value,
                None => return ParseOutcome::Error(format!("{} requires a value", arg)),
            },
            "-d" | "--daemon" => result.daemon = true,
            "-p" | "--pid-file" => match iter.next() {
                Some(value) => result.pid_file = Some(value),
                None => return ParseOutcome::Error(format!("{} requires a value", arg)),
            },
            "-v" | "--verbose" => result.verbose = true,
            "-h" | "--help" => return ParseOutcome::PrintAndExit(USAGE.to_string()),
            "-V" | "--version" => {
                return ParseOutcome::PrintAndExit(format!(
                    "modembridge {}\n",
                    env!("CARGO_PKG_VERSION")
                ));
            }
            other => return ParseOutcome::Error(format!("unrecognized argument: {}", other)),
        }
    }

    ParseOutcome::Args(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_when_no_args_given() {
        match parse_args(args(&[])) {
            ParseOutcome::Args(a) => {
                assert_eq!(a.config_path, "/etc/modembridge.conf");
                assert!(!a.daemon);
                assert!(a.pid_file.is_none());
                assert!(!a.verbose);
            }
            _ => panic!("expected Args"),
        }
    }

    #[test]
    fn parses_long_and_short_flags_together() {
        match parse_args(args(&["-c", "/tmp/x.conf", "--daemon", "-p", "/tmp/x.pid", "-v"])) {
            ParseOutcome::Args(a) => {
                assert_eq!(a.config_path, "/tmp/x.conf");
                assert!(a.daemon);
                assert_eq!(a.pid_file.as_deref(), Some("/tmp/x.pid"));
                assert!(a.verbose);
            }
            _ => panic!("expected Args"),
        }
    }

    #[test]
    fn help_short_circuits_with_usage_text() {
        match parse_args(args(&["--help"])) {
            ParseOutcome::PrintAndExit(text) => assert!(text.contains("USAGE")),
            _ => panic!("expected PrintAndExit"),
        }
    }

    #[test]
    fn version_short_circuits_with_version_text() {
        match parse_args(args(&["-V"])) {
            ParseOutcome::PrintAndExit(text) => assert!(text.contains("modembridge")),
            _ => panic!("expected PrintAndExit"),
        }
    }

    #[test]
    fn missing_value_is_an_error() {
        match parse_args(args(&["--config"])) {
            ParseOutcome::Error(msg) => assert!(msg.contains("--config")),
            _ => panic!("expected Error"),
        }
    }

    #[test]
    fn unknown_flag_is_an_error() {
        match parse_args(args(&["--bogus"])) {
            ParseOutcome::Error(msg) => assert!(msg.contains("--bogus")),
            _ => panic!("expected Error"),
        }
    }
}
