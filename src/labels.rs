use crate::rules::OneOrMany;

/// Split a label spec into (to_add, to_remove) sets.
///
/// A string spec is split on whitespace runs with empty tokens dropped; a
/// list spec is classified element by element, verbatim. Tokens starting
/// with `-` land in the remove set with the prefix stripped, everything else
/// in the add set. Insertion order is preserved and duplicates are kept —
/// a redundant mutation request downstream is acceptable.
pub fn split_labels(spec: &OneOrMany) -> (Vec<String>, Vec<String>) {
    let mut to_add = Vec::new();
    let mut to_remove = Vec::new();

    let mut classify = |token: &str| {
        if let Some(stripped) = token.strip_prefix('-') {
            to_remove.push(stripped.to_string());
        } else {
            to_add.push(token.to_string());
        }
    };

    match spec {
        OneOrMany::One(raw) => {
            for token in raw.split_whitespace() {
                classify(token);
            }
        }
        OneOrMany::Many(items) => {
            for item in items {
                classify(item);
            }
        }
    }

    (to_add, to_remove)
}
