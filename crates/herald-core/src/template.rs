//! Spintax expansion — `{Hello|Hi|Hey} world` picks one alternative per group.

use rand::Rng;

/// Expand every `{a|b|c}` group in `template`, choosing one alternative
/// uniformly at random per group, independently across groups and calls.
///
/// Groups never nest; the innermost braces win (`{x{a|b}` expands `{a|b}`).
/// Unbalanced braces are left untouched — this is a best-effort textual
/// transform, not a parser.
pub fn expand(template: &str) -> String {
    let mut text = template.to_string();
    let mut rng = rand::thread_rng();

    while let Some((start, end)) = find_group(&text) {
        let options: Vec<&str> = text[start + 1..end].split('|').collect();
        let pick = options[rng.gen_range(0..options.len())];
        text = format!("{}{}{}", &text[..start], pick, &text[end + 1..]);
    }
    text
}

/// Byte offsets of the first `{…}` pair that contains no inner braces.
///
/// A `}` with no `{` before it is skipped, so `x} {a|b}` still expands the
/// second group. Returns `None` when no complete group exists.
fn find_group(text: &str) -> Option<(usize, usize)> {
    let mut open: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        match ch {
            '{' => open = Some(i),
            '}' => {
                if let Some(start) = open {
                    return Some((start, i));
                }
            }
            _ => {}
        }
    }
    None
}
