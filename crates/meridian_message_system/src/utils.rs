//! Small helpers shared by the registry, the pipeline and log output.

/// Returns the current Unix timestamp in seconds.
///
/// All timestamps emitted in structured logs use this function so readings
/// stay comparable across subsystems.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}

/// Renders bytes as printable ASCII, replacing everything else with `.`.
///
/// Used for the receive record and for the default format's string
/// rendering; never fails on arbitrary input.
pub fn ascii_safe(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (0x20..0x7f).contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Hex-dumps up to `max` leading bytes, marking truncation with `..`.
pub fn hex_peek(bytes: &[u8], max: usize) -> String {
    let shown = &bytes[..bytes.len().min(max)];
    let mut out = shown
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > max {
        out.push_str(" ..");
    }
    out
}
