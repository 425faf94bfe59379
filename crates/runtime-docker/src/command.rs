//! Command lines for the trading toolchain inside containers.

use config_inject::{sanitize_strategy_name, ConfigFilePaths, RunFilePaths};

/// Binary every workload image ships.
pub const TRADER_BIN: &str = "trader";

/// Command for a live trading workload: layered config in precedence
/// order, then the sanitized strategy class.
pub fn trade_command(paths: &ConfigFilePaths, strategy_name: &str) -> Vec<String> {
    let mut cmd = vec![TRADER_BIN.to_string(), "trade".to_string()];
    cmd.extend(paths.config_args());
    cmd.push("--strategy".to_string());
    cmd.push(sanitize_strategy_name(strategy_name));
    cmd
}

/// Command for an isolated backtest run.
///
/// The workspace rides in as the working-directory argument and the
/// data directory is never overridden; the process resolves it at
/// `{workspace}/data` on its own.
pub fn backtest_command(
    paths: &RunFilePaths,
    strategy_name: &str,
    timerange: Option<&str>,
) -> Vec<String> {
    let mut cmd = vec![
        TRADER_BIN.to_string(),
        "backtest".to_string(),
        "--workdir".to_string(),
        paths.workspace.display().to_string(),
    ];
    cmd.extend(paths.config_args());
    cmd.push("--strategy".to_string());
    cmd.push(sanitize_strategy_name(strategy_name));
    if let Some(range) = timerange {
        cmd.push("--timerange".to_string());
        cmd.push(range.to_string());
    }
    cmd
}

/// Entrypoint that fetches and unpacks a data bundle before handing
/// off to the real command.
///
/// The fetch is best effort: a missing or broken bundle logs and
/// continues, a cold start is valid. The real command replaces the
/// shell via `exec` so signals reach the trading process.
pub fn data_bundle_prelude(bundle_url: &str, data_dir: &str, command: &[String]) -> Vec<String> {
    let script = format!(
        "mkdir -p {dir} && \
         ((curl -fsSL {url} -o /tmp/bundle.tar.gz && tar -xzf /tmp/bundle.tar.gz -C {dir}) \
         || echo 'data bundle unavailable, starting cold') && \
         exec {cmd}",
        dir = sh_quote(data_dir),
        url = sh_quote(bundle_url),
        cmd = sh_join(command),
    );
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// Quote one word for `sh -c`. Plain words pass through untouched.
pub(crate) fn sh_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Join words into one shell-safe command string.
pub(crate) fn sh_join(words: &[String]) -> String {
    words
        .iter()
        .map(|word| sh_quote(word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn bot_paths() -> ConfigFilePaths {
        ConfigFilePaths {
            exchange: Some(PathBuf::from("/srv/botfleet/alpha-1/config.exchange.json")),
            strategy: None,
            bot: Some(PathBuf::from("/srv/botfleet/alpha-1/config.bot.json")),
            secure: PathBuf::from("/srv/botfleet/alpha-1/config.secure.json"),
            strategy_file: PathBuf::from("/srv/botfleet/alpha-1/strategies/RsiTestStrategy.py"),
        }
    }

    fn run_paths() -> RunFilePaths {
        RunFilePaths {
            workspace: PathBuf::from("/srv/botfleet/bt-7f3a"),
            exchange: Some(PathBuf::from("/srv/botfleet/bt-7f3a/config.exchange.json")),
            strategy: Some(PathBuf::from("/srv/botfleet/bt-7f3a/config.strategy.json")),
            strategy_file: PathBuf::from("/srv/botfleet/bt-7f3a/strategies/Breakout.py"),
        }
    }

    #[test]
    fn test_trade_command_shape() {
        let cmd = trade_command(&bot_paths(), "RSI Test Strategy");

        assert_eq!(cmd[0], "trader");
        assert_eq!(cmd[1], "trade");
        assert_eq!(cmd.last().unwrap(), "RsiTestStrategy");
        assert_eq!(cmd[cmd.len() - 2], "--strategy");

        // The secure layer is the last --config argument.
        let configs: Vec<&String> = cmd.iter().filter(|arg| arg.contains("config.")).collect();
        assert!(configs.last().unwrap().ends_with("config.secure.json"));
    }

    #[test]
    fn test_backtest_command_never_overrides_data_dir() {
        let cmd = backtest_command(&run_paths(), "Breakout", Some("20240101-20240401"));

        assert_eq!(cmd[2], "--workdir");
        assert_eq!(cmd[3], "/srv/botfleet/bt-7f3a");
        assert!(cmd.contains(&"--timerange".to_string()));
        assert!(!cmd.iter().any(|arg| arg.starts_with("--datadir")));
        assert!(!cmd.iter().any(|arg| arg.starts_with("--data-dir")));
    }

    #[test]
    fn test_prelude_execs_the_real_command() {
        let trade = vec!["trader".to_string(), "trade".to_string()];
        let prelude = data_bundle_prelude(
            "https://bundles.example.com/alpha?sig=a b",
            "/srv/botfleet/alpha-1/data",
            &trade,
        );

        assert_eq!(&prelude[..2], ["sh", "-c"]);
        let script = &prelude[2];
        assert!(script.contains("'https://bundles.example.com/alpha?sig=a b'"));
        assert!(script.ends_with("exec trader trade"));
        assert!(script.contains("|| echo"));
    }

    #[test]
    fn test_sh_quote_escapes_hostile_words() {
        assert_eq!(sh_quote("plain-word_1.2"), "plain-word_1.2");
        assert_eq!(sh_quote("has space"), "'has space'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
        assert_eq!(sh_quote(""), "''");
        assert_eq!(sh_quote(".*/USDT"), "'.*/USDT'");
    }
}
