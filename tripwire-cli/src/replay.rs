//! Sequential replay of seeds and input files through a [`CaseExecutor`].

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tripwire_core::{load_corpus, HarnessConfig};
use tripwire_executor::{CaseExecutor, CaseReport};

use crate::CliError;

/// One input queued for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    /// Where the input came from, for reporting.
    pub label: String,
    /// Raw input bytes.
    pub data: Vec<u8>,
}

/// Totals for a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Cases run.
    pub total: usize,
    /// Cases reported as failures.
    pub failed: usize,
}

/// Gather the cases to run: corpus seeds, then input files in order.
///
/// When there are neither, all of `stdin` becomes a single case.
///
/// # Errors
/// Returns [`CliError::Core`] if the corpus cannot be loaded and
/// [`CliError::ReadInput`] if an input file or stdin cannot be read.
pub fn collect_cases<R: Read>(
    config: &HarnessConfig,
    inputs: &[PathBuf],
    mut stdin: R,
) -> Result<Vec<Case>, CliError> {
    let mut cases = Vec::new();

    if let Some(dir) = &config.corpus_dir {
        let seeds = load_corpus(dir)?;
        tracing::info!(corpus = %dir.display(), seeds = seeds.len(), "loaded corpus");
        cases.extend(seeds.into_iter().map(|seed| Case {
            label: seed.path.display().to_string(),
            data: seed.data,
        }));
    } else {
        tracing::info!("no corpus was declared");
    }

    for path in inputs {
        let data = std::fs::read(path).map_err(|source| CliError::ReadInput {
            source_name: path.display().to_string(),
            source,
        })?;
        cases.push(Case { label: path.display().to_string(), data });
    }

    if cases.is_empty() && config.corpus_dir.is_none() {
        let mut data = Vec::new();
        stdin.read_to_end(&mut data).map_err(|source| CliError::ReadInput {
            source_name: "<stdin>".to_owned(),
            source,
        })?;
        cases.push(Case { label: "<stdin>".to_owned(), data });
    }

    Ok(cases)
}

/// Run every case in order and report each result to `out`.
///
/// Failing inputs are copied into `crash_dir` when given. In JSON mode each
/// case prints one line; otherwise only failures and a final total print.
///
/// # Errors
/// Returns [`CliError::SaveCrash`] if a failing input cannot be saved and
/// [`CliError::Output`] if writing to `out` fails.
pub async fn replay<E, W>(
    executor: &E,
    cases: &[Case],
    crash_dir: Option<&Path>,
    json: bool,
    out: &mut W,
) -> Result<Summary, CliError>
where
    E: CaseExecutor + ?Sized,
    W: Write,
{
    let mut summary = Summary::default();

    for case in cases {
        let report = executor.execute(&case.data).await;
        summary.total += 1;

        let saved = match (report.is_failure(), crash_dir) {
            (true, Some(dir)) => Some(save_crash(dir, &report, &case.data)?),
            _ => None,
        };
        if report.is_failure() {
            summary.failed += 1;
        }

        if json {
            let line = serde_json::json!({
                "input": case.label,
                "saved": saved,
                "report": report,
            });
            writeln!(out, "{line}")?;
        } else if let Some(reason) = report.outcome.reason() {
            writeln!(out, "FAIL {}: {reason}", case.label)?;
            if let Some(path) = &saved {
                writeln!(out, "     saved to {}", path.display())?;
            }
        }
    }

    if !json {
        writeln!(out, "{} cases, {} failed", summary.total, summary.failed)?;
    }
    Ok(summary)
}

fn save_crash(dir: &Path, report: &CaseReport, data: &[u8]) -> Result<PathBuf, CliError> {
    let path = dir.join(format!("crash-{}", report.input_digest));
    std::fs::create_dir_all(dir)
        .and_then(|()| std::fs::write(&path, data))
        .map_err(|source| CliError::SaveCrash { path: path.clone(), source })?;
    tracing::info!(case_id = %report.id, path = %path.display(), "saved failing input");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tripwire_core::{CaseId, CaseOutcome, InputDigest, Stream};

    use super::*;

    /// Fails every input that contains `bad`.
    struct SubstringExecutor;

    #[async_trait]
    impl CaseExecutor for SubstringExecutor {
        async fn execute(&self, input: &[u8]) -> CaseReport {
            let outcome = if input.windows(3).any(|w| w == b"bad") {
                CaseOutcome::Crash {
                    stream: Stream::Stderr,
                    pattern: ".*bad.*".to_owned(),
                    line: String::from_utf8_lossy(input).into_owned(),
                }
            } else {
                CaseOutcome::Pass
            };
            CaseReport::new(CaseId::new(), InputDigest::of(input), Utc::now(), Duration::ZERO, outcome)
        }
    }

    fn cases(inputs: &[&[u8]]) -> Vec<Case> {
        inputs
            .iter()
            .enumerate()
            .map(|(i, data)| Case { label: format!("case-{i}"), data: data.to_vec() })
            .collect()
    }

    #[tokio::test]
    async fn replay_counts_and_saves_failures() {
        let dir = tempfile::tempdir().expect("temp dir");
        let crash_dir = dir.path().join("crashes");
        let mut out = Vec::new();

        let summary = replay(
            &SubstringExecutor,
            &cases(&[b"good", b"very bad", b"fine"]),
            Some(&crash_dir),
            false,
            &mut out,
        )
        .await
        .expect("replay");

        assert_eq!(summary, Summary { total: 3, failed: 1 });
        let saved = crash_dir.join(format!("crash-{}", InputDigest::of(b"very bad")));
        assert_eq!(std::fs::read(&saved).expect("crash saved"), b"very bad");

        let text = String::from_utf8(out).expect("utf-8 output");
        assert!(text.contains("FAIL case-1: stderr: [very bad]"), "got {text}");
        assert!(text.ends_with("3 cases, 1 failed\n"), "got {text}");
    }

    #[tokio::test]
    async fn json_mode_prints_one_line_per_case() {
        let mut out = Vec::new();
        let summary = replay(&SubstringExecutor, &cases(&[b"a", b"bad"]), None, true, &mut out)
            .await
            .expect("replay");
        assert_eq!(summary.failed, 1);

        let text = String::from_utf8(out).expect("utf-8 output");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("each line is JSON"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["report"]["outcome"]["kind"], "pass");
        assert_eq!(lines[1]["report"]["outcome"]["kind"], "crash");
        assert_eq!(lines[1]["input"], "case-1");
    }

    #[test]
    fn stdin_is_a_case_only_without_other_inputs() {
        let config = HarnessConfig::new("cat");
        let from_stdin = collect_cases(&config, &[], &b"piped"[..]).expect("collect");
        assert_eq!(from_stdin, vec![Case { label: "<stdin>".to_owned(), data: b"piped".to_vec() }]);

        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("input");
        std::fs::write(&file, b"from file").expect("write");
        let from_files = collect_cases(&config, &[file], &b"ignored"[..]).expect("collect");
        assert_eq!(from_files.len(), 1);
        assert_eq!(from_files[0].data, b"from file");
    }

    #[test]
    fn corpus_seeds_come_first() {
        let dir = tempfile::tempdir().expect("temp dir");
        let corpus = dir.path().join("corpus");
        std::fs::create_dir_all(corpus.join("sub")).expect("mkdir");
        std::fs::write(corpus.join("sub/seed"), b"seed").expect("write seed");
        let extra = dir.path().join("extra");
        std::fs::write(&extra, b"extra").expect("write extra");

        let mut config = HarnessConfig::new("cat");
        config.corpus_dir = Some(corpus);
        let cases = collect_cases(&config, &[extra], &b""[..]).expect("collect");
        let data: Vec<&[u8]> = cases.iter().map(|c| c.data.as_slice()).collect();
        assert_eq!(data, vec![&b"seed"[..], &b"extra"[..]]);
    }
}
