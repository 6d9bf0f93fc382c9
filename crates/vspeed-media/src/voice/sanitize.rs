//! Subtitle text to grapheme stream.

/// Characters removed after markup stripping.
fn is_stripped(c: char) -> bool {
    c.is_ascii_punctuation() || matches!(c, '¿' | '¡' | '♪' | '\n' | '\t')
}

/// Reduce a subtitle's text to the words that are actually spoken.
///
/// Markup (`<i>`, `{\an8}`) becomes spaces, line breaks (real or `\N`) are
/// joined with spaces, leading non-word characters go away and punctuation is
/// removed. An empty result means the line carries no speech.
pub fn sanitize_text(raw: &str) -> String {
    let without_tags = regex!(r"<[^<]+?>").replace_all(raw, " ");
    let without_braces = regex!(r"\{[^{]+?\}").replace_all(&without_tags, " ");

    let joined = without_braces
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ");

    let leading_stripped = regex!(r"^\W+").replace(&joined, "");
    leading_stripped
        .replace(r"\N", " ")
        .chars()
        .filter(|c| !is_stripped(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markup() {
        assert_eq!(sanitize_text("<i>Hola</i> mundo"), "Hola  mundo");
        assert_eq!(sanitize_text(r"{\an8}Arriba"), "Arriba");
    }

    #[test]
    fn test_joins_lines() {
        assert_eq!(sanitize_text("Primera línea\n  segunda línea "), "Primera línea segunda línea");
        assert_eq!(sanitize_text(r"uno\Ndos"), "uno dos");
    }

    #[test]
    fn test_removes_punctuation() {
        assert_eq!(sanitize_text("- ¿Qué pasa? ¡Nada!"), "Qué pasa Nada");
        assert_eq!(sanitize_text("♪ la la la ♪"), "la la la");
    }

    #[test]
    fn test_empty_after_sanitizing() {
        assert_eq!(sanitize_text("<i></i>"), "");
        assert_eq!(sanitize_text("..."), "");
        assert_eq!(sanitize_text("♪♪"), "");
    }
}
