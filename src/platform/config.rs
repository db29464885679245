//! `jattack.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{Lit, SearchStrategy, Type};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory generated programs are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Generated class names are `<Template><postfix><n>`.
    #[serde(default = "default_output_postfix")]
    pub output_postfix: String,

    #[serde(default = "default_strategy")]
    pub strategy: SearchStrategy,

    #[serde(default)]
    pub seed: Option<u64>,

    /// Number of programs to generate.
    #[serde(default = "default_n_outputs")]
    pub n_outputs: u64,

    /// Systematic search ignores `n_outputs` and runs until the space is exhausted.
    #[serde(default)]
    pub exhaustive: bool,

    /// Entry invocations per run, and the default iteration count of the harness.
    #[serde(default = "default_invocations")]
    pub invocations: u64,

    /// Consecutive runs without a new program before giving up.
    #[serde(default = "default_max_repeated_trials")]
    pub max_repeated_trials: u64,

    #[serde(default = "default_true")]
    pub solver_aid: bool,

    #[serde(default = "default_true")]
    pub hot_filling: bool,

    #[serde(default = "default_true")]
    pub stop_early: bool,

    /// Wrap filled expressions in `track(val, id)` in emitted programs.
    #[serde(default)]
    pub track_holes: bool,

    /// Emit programs even when they fail the compile check.
    #[serde(default)]
    pub allow_non_compilable: bool,

    /// Type names skipped by the checksum.
    #[serde(default)]
    pub ignored_types: Vec<String>,

    /// Value sets behind `default` literal domains.
    #[serde(default = "default_ints")]
    pub default_ints: Vec<i32>,

    #[serde(default = "default_longs")]
    pub default_longs: Vec<i64>,

    #[serde(default = "default_doubles")]
    pub default_doubles: Vec<f64>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".jattack")
}

fn default_output_postfix() -> String {
    "Gen".to_string()
}

fn default_strategy() -> SearchStrategy {
    SearchStrategy::Random
}

fn default_n_outputs() -> u64 {
    100
}

fn default_invocations() -> u64 {
    100_000
}

fn default_max_repeated_trials() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_ints() -> Vec<i32> {
    vec![0, 1, -1, i32::MAX, i32::MIN]
}

fn default_longs() -> Vec<i64> {
    vec![0, 1, -1, i64::MAX, i64::MIN]
}

fn default_doubles() -> Vec<f64> {
    vec![0.0, 1.0, -1.0, f64::MAX, f64::from_bits(1)]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            output_postfix: default_output_postfix(),
            strategy: default_strategy(),
            seed: None,
            n_outputs: default_n_outputs(),
            exhaustive: false,
            invocations: default_invocations(),
            max_repeated_trials: default_max_repeated_trials(),
            solver_aid: true,
            hot_filling: true,
            stop_early: true,
            track_holes: false,
            allow_non_compilable: false,
            ignored_types: Vec::new(),
            default_ints: default_ints(),
            default_longs: default_longs(),
            default_doubles: default_doubles(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Values a `default` literal domain of `ty` expands to.
    pub fn default_literals(&self, ty: &Type) -> Vec<Lit> {
        match ty {
            Type::Boolean => vec![Lit::Bool(false), Lit::Bool(true)],
            Type::Int => self.default_ints.iter().map(|v| Lit::Int(*v)).collect(),
            Type::Long => self.default_longs.iter().map(|v| Lit::Long(*v)).collect(),
            Type::Double => self.default_doubles.iter().map(|v| Lit::Double(*v)).collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("jattack-missing-{}.toml", uuid::Uuid::new_v4()));
        let cfg = Config::load_optional(&path);
        assert_eq!(cfg.n_outputs, 100);
        assert_eq!(cfg.output_postfix, "Gen");
        assert!(cfg.solver_aid && cfg.hot_filling && cfg.stop_early);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: Config = toml::from_str("strategy = \"systematic\"\nn_outputs = 3\n").unwrap();
        assert!(matches!(cfg.strategy, SearchStrategy::Systematic));
        assert_eq!(cfg.n_outputs, 3);
        assert_eq!(cfg.invocations, 100_000);
        assert_eq!(cfg.default_literals(&Type::Int).len(), 5);
    }
}
