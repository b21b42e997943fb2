use rand::Rng;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::rules::OneOrMany;

// Matches `${author}` and the spaced form `${ author }`.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*([A-Za-z0-9_]+)\s*\}").expect("placeholder pattern"));

/// Pick one comment body from the candidates and substitute placeholders.
///
/// A single string is used verbatim; a list yields a uniformly random
/// element. Selection never fails for a non-empty list — an out-of-range
/// index falls back to the first element. An empty list yields `None`
/// (nothing to post).
///
/// Unmatched placeholders render as empty strings.
pub fn pick_comment(candidates: &OneOrMany, vars: &HashMap<&str, String>) -> Option<String> {
    let raw = match candidates {
        OneOrMany::One(body) => body.as_str(),
        OneOrMany::Many(bodies) => {
            if bodies.is_empty() {
                return None;
            }
            let pos = rand::thread_rng().gen_range(0..bodies.len());
            bodies.get(pos).unwrap_or(&bodies[0]).as_str()
        }
    };

    Some(render(raw, vars))
}

fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
