//! Phoneme transcription and counting.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::PhonemeTranscriber;
use crate::command::{check_tool, run_process, stderr_tail};
use crate::error::{MediaError, MediaResult};

/// espeak translates per paragraph; three line breaks keep samples apart.
pub const ESPEAK_SEPARATOR: &str = "\n\n\n";

/// Separate adjacent letters so each vowel nucleus counts once.
///
/// Runs of three IPA/latin letters are split first, then pairs.
pub fn split_nuclei(phonemes: &str) -> String {
    let tri = regex!(r"([\u{0250}-\u{02AF}a-z])([\u{0250}-\u{02AF}a-z])([\u{0250}-\u{02AF}a-z])");
    let di = regex!(r"([\u{0250}-\u{02AF}a-z])([\u{0250}-\u{02AF}a-z])");
    let split = tri.replace_all(phonemes.trim(), "${1}_${2}_${3}");
    di.replace_all(&split, "${1}_${2}").into_owned()
}

/// Number of phonemes in a split transcription: separators plus spaces.
pub fn count_phonemes(split: &str) -> usize {
    split.chars().filter(|c| *c == '_' || *c == ' ').count()
}

/// Positional pairing is only sound when every sample got exactly one line.
fn check_aligned(program: &str, expected: usize, lines: Vec<String>) -> MediaResult<Vec<String>> {
    if lines.len() != expected {
        return Err(MediaError::collaborator_failed(
            program,
            format!(
                "returned {} transcriptions for {} samples",
                lines.len(),
                expected
            ),
        ));
    }
    Ok(lines)
}

/// Transcriber backed by the `espeak` command line tool.
#[derive(Debug, Clone)]
pub struct EspeakTranscriber {
    program: String,
    timeout_secs: Option<u64>,
}

impl Default for EspeakTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl EspeakTranscriber {
    pub fn new() -> Self {
        Self {
            program: "espeak".to_string(),
            timeout_secs: None,
        }
    }

    /// Use a different binary, e.g. `espeak-ng`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[async_trait]
impl PhonemeTranscriber for EspeakTranscriber {
    async fn transcribe(&self, samples: &[String], language: &str) -> MediaResult<Vec<String>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        check_tool(&self.program)?;

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("graphemes.txt");
        let output = dir.path().join("phonemes.txt");

        let mut corpus = String::new();
        for sample in samples {
            corpus.push_str(sample.trim());
            corpus.push_str(ESPEAK_SEPARATOR);
        }
        tokio::fs::write(&input, corpus).await?;

        let args = vec![
            "-q".to_string(),
            "-v".to_string(),
            language.to_string(),
            "--ipa=3".to_string(),
            "-f".to_string(),
            input.to_string_lossy().to_string(),
            format!("--phonout={}", output.to_string_lossy()),
        ];
        debug!(program = %self.program, samples = samples.len(), language, "Running phoneme transcription");

        let result = run_process(&self.program, &args, self.timeout_secs).await?;
        if !result.status.success() {
            return Err(MediaError::collaborator_failed(
                self.program.clone(),
                stderr_tail(&result.stderr),
            ));
        }
        let diagnostics = String::from_utf8_lossy(&result.stdout);
        if !diagnostics.trim().is_empty() {
            warn!(program = %self.program, output = %diagnostics.trim(), "Transcriber reported problems");
        }

        let text = tokio::fs::read_to_string(&output).await?;
        let lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        check_aligned(&self.program, samples.len(), lines)
    }
}
