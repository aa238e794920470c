/// Every character outside `[A-Za-z0-9_]` becomes a space.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                ' '
            }
        })
        .collect()
}

/// Sanitizes `title`, truncates it so that `"<title> <suffix>"` never
/// exceeds `limit` characters, and appends the suffix.
pub fn render_title(title: &str, suffix: &str, limit: usize) -> String {
    let sanitized = sanitize_title(title);
    let budget = limit.saturating_sub(suffix.chars().count() + 1);
    let truncated: String = sanitized.chars().take(budget).collect();
    format!("{truncated} {suffix}")
}
