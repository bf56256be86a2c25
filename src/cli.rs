use crate::power::Level;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "pufreader", author, version, about = "Power-cycle a PUF device and capture its responses")]
pub struct Cli {
    /// Config file (default: $PUFREADER_CONFIG or ~/.config/pufreader/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Measure repeatedly, writing `<prefix><n>.bin` per completed capture
    Run(RunOptions),
    /// Capture one response and print the key selected by a position file
    Keygen(KeygenOptions),
}

/// Options shared by every command; `None` when not given on the command line.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonOptions {
    /// Serial device path (default: /dev/ttyUSB0)
    #[arg(long)]
    pub device: Option<String>,

    /// Baud rate (default: 115200)
    #[arg(long)]
    pub baud: Option<u32>,

    /// GPIO line (BCM) switching device power (default: 17)
    #[arg(long, value_name = "PIN")]
    pub power_gpio: Option<u8>,

    /// Line level that cuts device power: high|low (default: high)
    #[arg(long, value_name = "LEVEL")]
    pub power_off_level: Option<Level>,

    /// Seconds the device stays unpowered each cycle (default: 5)
    #[arg(long, value_name = "SECS")]
    pub power_off_secs: Option<u64>,

    /// Parameter sent when the device asks for input; repeat in send order
    #[arg(long = "param", value_name = "VALUE")]
    pub params: Vec<String>,

    /// Stop after this many completed captures, 0 for no limit (run only)
    #[arg(long, value_name = "N")]
    pub max_measures: Option<u32>,

    /// Output file prefix (default: puf_)
    #[arg(long, value_name = "PREFIX")]
    pub out_prefix: Option<String>,

    /// Delay around each parameter write in milliseconds (default: 50)
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Log verbosity: error|warn|info|debug|trace (default: info)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    #[command(flatten)]
    pub common: CommonOptions,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct KeygenOptions {
    #[command(flatten)]
    pub common: CommonOptions,

    /// File of ascending bit offsets, whitespace separated
    #[arg(long, value_name = "PATH")]
    pub positions: PathBuf,

    /// Number of key bits to produce
    #[arg(long, value_name = "BITS")]
    pub key_len: usize,
}

impl Command {
    pub fn common(&self) -> &CommonOptions {
        match self {
            Command::Run(opts) => &opts.common,
            Command::Keygen(opts) => &opts.common,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("pufreader").chain(args.iter().copied()))
    }

    #[test]
    fn run_with_overrides() {
        let cli = parse(&[
            "run",
            "--device",
            "/dev/ttyACM0",
            "--baud",
            "57600",
            "--power-gpio",
            "4",
            "--power-off-level",
            "low",
            "--power-off-secs",
            "2",
            "--param",
            "a",
            "--param",
            "b",
            "--max-measures",
            "3",
            "--out-prefix",
            "out/m",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let expected = CommonOptions {
            device: Some("/dev/ttyACM0".into()),
            baud: Some(57_600),
            power_gpio: Some(4),
            power_off_level: Some(Level::Low),
            power_off_secs: Some(2),
            params: vec!["a".into(), "b".into()],
            max_measures: Some(3),
            out_prefix: Some("out/m".into()),
            settle_ms: None,
            log_level: Some("debug".into()),
            log_file: None,
        };
        assert_eq!(cli.command, Command::Run(RunOptions { common: expected }));
        assert_eq!(cli.config, None);
    }

    #[test]
    fn keygen_requires_positions_and_length() {
        assert!(parse(&["keygen", "--key-len", "128"]).is_err());
        let cli = parse(&[
            "keygen",
            "--positions",
            "pos.txt",
            "--key-len",
            "128",
            "--config",
            "/etc/puf.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/puf.toml")));
        match cli.command {
            Command::Keygen(opts) => {
                assert_eq!(opts.positions, PathBuf::from("pos.txt"));
                assert_eq!(opts.key_len, 128);
                assert_eq!(opts.common, CommonOptions::default());
            }
            other => panic!("expected Keygen, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_flag_and_bad_level() {
        assert!(parse(&["run", "--nope"]).is_err());
        let err = parse(&["run", "--power-off-level", "sideways"]).unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }
}
