use std::path::PathBuf;

use clap::Parser;
use termbridge_config::BridgeConfig;

/// termbridge: a WebSocket bridge to interactive shells.
#[derive(Parser, Debug, Default)]
#[command(name = "termbridge", version, about)]
pub struct Args {
    /// Port to listen on (overrides PORT and the config file).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Shell program to spawn for each connection.
    #[arg(short, long)]
    pub shell: Option<String>,

    /// Config file path override.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error, or a filter directive).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Layer command-line flags over an already loaded config.
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(shell) = &self.shell {
            config.shell.program = shell.clone();
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "termbridge",
            "--port",
            "9000",
            "--host",
            "127.0.0.1",
            "--shell",
            "/bin/zsh",
        ])
        .unwrap();

        let mut config = BridgeConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.shell.program, "/bin/zsh");
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::try_parse_from(["termbridge"]).unwrap();
        let mut config = BridgeConfig::default();
        config.server.port = 4444;
        args.apply(&mut config);
        assert_eq!(config.server.port, 4444);
        assert!(config.shell.program.is_empty());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Args::try_parse_from(["termbridge", "--port", "70000"]).is_err());
    }
}
