//! Text rendering for diagnostics.
//!
//! Errors produced by the resolution engine carry dependency paths and type
//! names; these helpers turn them into something a human can read.

/// Joins a dependency path with arrows.
///
/// ```
/// use khazin_support::rendering::render_chain;
///
/// let path = ["Orders", "Payments", "Orders"];
/// assert_eq!(render_chain(&path), "Orders → Payments → Orders");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut out = String::new();
    for (i, link) in chain.iter().enumerate() {
        if i > 0 {
            out.push_str(" → ");
        }
        out.push_str(link.as_ref());
    }
    out
}

/// A single step of a dependency path annotated with its lifetime.
#[derive(Debug, Clone)]
pub struct PathStep {
    pub service: String,
    pub lifetime: String,
}

impl PathStep {
    pub fn new(service: impl Into<String>, lifetime: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            lifetime: lifetime.into(),
        }
    }
}

/// Renders a dependency path top-down, one step per line, lifetimes aligned.
///
/// ```text
/// [Singleton] ReportCache
///           ↓
/// [Scoped]    DbSession
/// ```
pub fn render_path(steps: &[PathStep]) -> String {
    let width = steps.iter().map(|s| s.lifetime.len()).max().unwrap_or(0);
    let mut out = String::new();

    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            out.push_str(&" ".repeat(width + 2));
            out.push_str("↓\n");
        }
        let tag = format!("[{}]", step.lifetime);
        out.push_str(&format!("{tag:<w$} {}\n", step.service, w = width + 2));
    }

    out
}

/// Strips module paths from every path segment of a type name.
///
/// ```
/// use khazin_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("app::billing::Invoice"), "Invoice");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn app::ports::Clock>"),
///     "Arc<dyn Clock>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut segment_start = 0;
    let bytes = full_name.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
                segment_start = i;
                continue;
            }
            b'<' | b'>' | b',' | b' ' | b'(' | b')' | b'[' | b']' | b'&' | b';' => {
                out.push_str(&full_name[segment_start..i]);
                out.push(bytes[i] as char);
                segment_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    out.push_str(&full_name[segment_start..]);
    out
}

/// Picks registered names that look like `requested`, best match first.
///
/// Matching is done on shortened, lower-cased names: containment scores
/// highest, then shared prefix length, then a small edit distance.
pub fn suggest_similar(requested: &str, available: &[&str], limit: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&candidate| {
            let short = shorten_type_name(candidate).to_lowercase();
            if short == wanted {
                return Some((200, candidate));
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((100, candidate));
            }
            let prefix = short
                .chars()
                .zip(wanted.chars())
                .take_while(|(a, b)| a == b)
                .count();
            if prefix >= 3 {
                return Some((10 * prefix, candidate));
            }
            if edit_distance(&short, &wanted) <= 2 {
                return Some((5, candidate));
            }
            None
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_string())
        .collect()
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }

    prev[b.len()]
}
