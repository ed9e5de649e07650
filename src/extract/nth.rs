//! `:nth-of-type` rewriting for sequence walks against a live browser.
//!
//! Walking a sequence over CDP means addressing the i-th match with a
//! selector, not a node handle. The last segment's `:nth-of-type(...)`
//! pseudo (or its absence) is rewritten per walk position; pseudos that
//! would contradict the rewrite are rejected.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static NTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>.*):nth-of-type\((?:odd|even|(?:(?P<a>[0-9]+)n)?\+?(?P<b>[0-9]+)?)\)$")
        .unwrap()
});
static NTH_KIND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":nth-of-type\((odd|even)\)$").unwrap());

const FORBIDDEN_PSEUDOS: [&str; 3] = [":nth-child(", ":nth-last-child(", ":nth-last-of-type("];

fn split_last(selector: &str) -> (Option<&str>, &str) {
    match selector.rsplit_once(' ') {
        Some((head, last)) => (Some(head), last),
        None => (None, selector),
    }
}

/// Parses the last segment into (prefix, a, b) for an `an+b` expression.
/// `odd` is `2n+1`, `even` is `2n+0`. A segment without the pseudo comes
/// back as (segment, 0, 0).
fn parse_nth_of_type(segment: &str) -> (&str, i64, i64) {
    let Some(caps) = NTH_RE.captures(segment) else {
        return (segment, 0, 0);
    };
    let (mut a, mut b) = (
        caps.name("a")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0),
        caps.name("b")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0),
    );
    if let Some(kind) = NTH_KIND_RE.captures(segment) {
        a = 2;
        b = if &kind[1] == "odd" { 1 } else { 0 };
    }
    let prefix = caps.name("prefix").map(|m| m.as_str()).unwrap_or("");
    (prefix, a, b)
}

/// Rewrites `selector` to address the element at 0-indexed walk position
/// `index`. `:first-child`/`:last-child` segments pass through untouched.
pub fn resolve_nth_of_type(selector: &str, index: usize) -> String {
    let (head, last) = split_last(selector);
    if last.ends_with(":first-child") || last.ends_with(":last-child") {
        return selector.to_string();
    }

    let (prefix, a, b) = parse_nth_of_type(last);
    let i = index as i64;
    let x = if a == 0 && b == 0 {
        i + 1
    } else if a == 0 || a == 1 {
        b
    } else {
        let b = if b < 1 { a } else { b };
        i * a + b
    };

    let rewritten = format!("{prefix}:nth-of-type({x})");
    match head {
        Some(head) => format!("{head} {rewritten}"),
        None => rewritten,
    }
}

/// Rejects selectors whose final segment carries a child-indexed pseudo:
/// those count positions the rewrite cannot reproduce.
pub fn check_rewritable(selector: &str) -> Result<()> {
    let (_, last) = split_last(selector);
    for pseudo in FORBIDDEN_PSEUDOS {
        if last.contains(pseudo) {
            return Err(Error::SelectorRewrite {
                selector: selector.to_string(),
                pseudo: pseudo.trim_end_matches('('),
            });
        }
    }
    Ok(())
}
