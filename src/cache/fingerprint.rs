/// Collapse runs of whitespace and trim, then escape the separators.
fn normalize(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    out
}

/// Cache key of a read: `name:` followed by the params sorted by key, whitespace-normalized,
/// escaped and joined as `k=v&k=v`. Repeated keys keep their request order. Every key of an
/// entity shares the `name:` prefix, which is what mutations invalidate.
pub fn fingerprint(name: &str, params: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (normalize(k), normalize(v)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let body: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}:{}", name, body.join("&"))
}
