/// Prepare a received line for the terminal.
///
/// Drops ASCII control characters, DEL and the replacement character left
/// behind by lossy decoding, so remote bytes cannot drive the local terminal.
pub fn sanitize(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_ascii_control() && *c != char::REPLACEMENT_CHARACTER)
        .collect()
}
