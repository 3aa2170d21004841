/// Origin URL for a request: base + path, plus `?query` when the query is
/// non-empty. No normalisation happens here; the base is used verbatim.
pub(crate) fn upstream_uri(base_url: &str, path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{base_url}{path}?{q}"),
        _ => format!("{base_url}{path}"),
    }
}
