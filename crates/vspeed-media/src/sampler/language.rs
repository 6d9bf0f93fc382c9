//! Language identification backed by `whatlang`.

use super::LanguageDetector;

/// ISO 639-3 to ISO 639-1 for the languages espeak handles well.
const ISO_639_1: &[(&str, &str)] = &[
    ("spa", "es"),
    ("eng", "en"),
    ("fra", "fr"),
    ("deu", "de"),
    ("ita", "it"),
    ("por", "pt"),
    ("cat", "ca"),
    ("nld", "nl"),
    ("rus", "ru"),
    ("pol", "pl"),
    ("ces", "cs"),
    ("swe", "sv"),
    ("dan", "da"),
    ("fin", "fi"),
    ("ron", "ro"),
    ("hun", "hu"),
    ("tur", "tr"),
    ("ell", "el"),
    ("ukr", "uk"),
    ("jpn", "ja"),
    ("cmn", "zh"),
    ("kor", "ko"),
    ("ara", "ar"),
    ("hin", "hi"),
];

/// Map an ISO 639-3 code to ISO 639-1, if known.
pub(crate) fn to_iso_639_1(code: &str) -> Option<&'static str> {
    ISO_639_1
        .iter()
        .find(|(three, _)| *three == code)
        .map(|(_, two)| *two)
}

/// Detector using `whatlang` trigram models.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        to_iso_639_1(info.lang().code()).map(str::to_string)
    }
}
