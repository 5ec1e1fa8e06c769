//! Removal of banner lines some CLI tools print before their payload.

/// Banners known to precede the real output of supported tools.
pub const KNOWN_PREAMBLES: &[&str] = &[
    "Loaded cached credentials.",
    "Data collection is disabled.",
    "Using bundled Node",
];

/// Drop leading lines that are blank or start with one of `preambles`.
///
/// Only the head of the output is inspected; a matching line after the first
/// payload line is left alone.
pub fn strip_preamble<S: AsRef<str>>(output: &str, preambles: &[S]) -> String {
    let mut rest = output;
    loop {
        let (line, tail) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, ""),
        };
        let trimmed = line.trim();
        let is_banner = trimmed.is_empty()
            || preambles
                .iter()
                .any(|p| trimmed.starts_with(p.as_ref()));
        if !is_banner || rest.is_empty() {
            break;
        }
        rest = tail;
    }
    rest.to_string()
}
