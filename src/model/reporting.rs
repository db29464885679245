//! Reporting types and renderers.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{JattackResult, SearchStrategy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// The search space was exhausted before the output quota.
    Exhausted,
    /// The output quota was reached.
    Quota,
    /// Too many consecutive runs produced no new program.
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub status: GenerationStatus,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub template: String,
    pub seed: u64,
    pub strategy: SearchStrategy,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "finishedAt")]
    pub finished_at: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub runs: u64,
    pub outputs: u64,
    #[serde(rename = "repeatedTrials")]
    pub repeated_trials: u64,
    #[serde(rename = "totalHoles")]
    pub total_holes: usize,
    #[serde(rename = "filledHoles")]
    pub filled_holes: usize,
    #[serde(rename = "solverCalls")]
    pub solver_calls: u64,
    #[serde(rename = "templateExceptions")]
    pub template_exceptions: u64,
    #[serde(rename = "outputDir")]
    pub output_dir: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub programs: Vec<String>,
}

impl GenerationSummary {
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "status={:?} template={} runId={} seed={} strategy={:?}\n",
            self.status, self.template, self.run_id, self.seed, self.strategy
        ));
        out.push_str(&format!(
            "runs={} outputs={} repeatedTrials={} durationMs={}\n",
            self.runs, self.outputs, self.repeated_trials, self.duration_ms
        ));
        out.push_str(&format!(
            "holes: filled={}/{} solverCalls={} templateExceptions={}\n",
            self.filled_holes, self.total_holes, self.solver_calls, self.template_exceptions
        ));
        out.push_str(&format!("output={}\n", self.output_dir));
        for name in &self.programs {
            out.push_str(&format!("- {name}\n"));
        }
        out.trim_end().to_string()
    }
}

/// Result of executing a generated program through its harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramReport {
    pub class: String,
    pub iterations: u64,
    pub checksum: u64,
    #[serde(rename = "reachedHoles")]
    pub reached_holes: Vec<u32>,
    #[serde(rename = "totalHoles")]
    pub total_holes: usize,
}

impl ProgramReport {
    pub fn pretty(&self) -> String {
        format!(
            "{} iterations={} checksum={}\nholes: reached={}/{}",
            self.class,
            self.iterations,
            self.checksum,
            self.reached_holes.len(),
            self.total_holes
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("JATTACK_COMMIT").map(|s| s.to_string()),
    }
}

pub fn write_summary(summary: &GenerationSummary, dir: &Path) -> JattackResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let out = dir.join("summary.json");
    std::fs::write(&out, serde_json::to_vec_pretty(summary)?)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> GenerationSummary {
        GenerationSummary {
            status: GenerationStatus::Quota,
            run_id: "r".to_string(),
            template: "T".to_string(),
            seed: 7,
            strategy: SearchStrategy::Systematic,
            started_at: "a".to_string(),
            finished_at: "b".to_string(),
            duration_ms: 3,
            runs: 2,
            outputs: 2,
            repeated_trials: 0,
            total_holes: 4,
            filled_holes: 3,
            solver_calls: 1,
            template_exceptions: 0,
            output_dir: ".jattack".to_string(),
            programs: vec!["TGen0".to_string(), "TGen1".to_string()],
        }
    }

    #[test]
    fn summary_uses_camel_case_keys() {
        let v = serde_json::to_value(summary()).unwrap();
        assert_eq!(v["runId"], "r");
        assert_eq!(v["filledHoles"], 3);
        assert_eq!(v["strategy"], "systematic");
        assert_eq!(v["status"], "quota");
    }

    #[test]
    fn pretty_lists_programs() {
        let text = summary().pretty();
        assert!(text.contains("holes: filled=3/4"));
        assert!(text.ends_with("- TGen1"));
    }
}
