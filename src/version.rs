//! Version policy for upstream tags.
//!
//! Every decision about "which upstream release is newest" goes through
//! this module: extracting a version from a tag name, comparing versions,
//! and rewriting a spec for a new version.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static TAG_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(\.\d+)+").unwrap());
static VERSION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([Vv]ersion:\s*)\S.*$").unwrap());
static RELEASE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([Rr]elease:\s*)\d+(.*)$").unwrap());

/// The dotted version embedded in a tag name, if there is one.
///
/// # Examples
///
/// ```
/// use planex::version::tag_version;
///
/// assert_eq!(tag_version("v1.2.3"), Some("1.2.3"));
/// assert_eq!(tag_version("ocaml-cohttp-0.9.8"), Some("0.9.8"));
/// assert_eq!(tag_version("release-7"), None);
/// ```
pub fn tag_version(tag: &str) -> Option<&str> {
    TAG_VERSION_RE.find(tag).map(|m| m.as_str())
}

/// Compare two version strings the way rpm does.
///
/// Versions are split into alternating numeric and alphabetic segments;
/// other characters only separate segments. Numeric segments compare as
/// numbers and are newer than alphabetic ones. `~` sorts before anything,
/// even the end of the string, and `^` sorts after the end of the string
/// but before any other segment.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use planex::version::compare;
///
/// assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(compare("1.0~rc1", "1.0"), Ordering::Less);
/// assert_eq!(compare("1.0^git1", "1.0"), Ordering::Greater);
/// ```
pub fn compare(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let is_separator = |c: char| !c.is_ascii_alphanumeric() && c != '~' && c != '^';
    let (mut a, mut b) = (a, b);
    loop {
        a = a.trim_start_matches(is_separator);
        b = b.trim_start_matches(is_separator);

        match (a.strip_prefix('~'), b.strip_prefix('~')) {
            (Some(ra), Some(rb)) => {
                a = ra;
                b = rb;
                continue;
            }
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => {}
        }

        match (a.strip_prefix('^'), b.strip_prefix('^')) {
            (Some(ra), Some(rb)) => {
                a = ra;
                b = rb;
                continue;
            }
            (Some(_), None) if b.is_empty() => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) if a.is_empty() => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => {}
        }

        if a.is_empty() || b.is_empty() {
            break;
        }

        let numeric = a.starts_with(|c: char| c.is_ascii_digit());
        let segment_len = |s: &str| {
            s.find(|c: char| {
                if numeric {
                    !c.is_ascii_digit()
                } else {
                    !c.is_ascii_alphabetic()
                }
            })
            .unwrap_or(s.len())
        };
        let (seg_a, rest_a) = a.split_at(segment_len(a));
        let (seg_b, rest_b) = b.split_at(segment_len(b));

        // Segments of different types: numbers are newer.
        if seg_b.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ordering = if numeric {
            let seg_a = seg_a.trim_start_matches('0');
            let seg_b = seg_b.trim_start_matches('0');
            seg_a.len().cmp(&seg_b.len()).then_with(|| seg_a.cmp(seg_b))
        } else {
            seg_a.cmp(seg_b)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
        a = rest_a;
        b = rest_b;
    }

    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, _) => Ordering::Greater,
    }
}

fn compare_tag_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare(a, b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// The tag carrying the highest version.
///
/// Tags without a version lose against any tag with one. Among tags with
/// equal versions the first one given wins.
///
/// # Examples
///
/// ```
/// use planex::version::latest_tag;
///
/// let tags = ["v1.9", "nightly", "v1.10", "1.10"];
/// assert_eq!(latest_tag(&tags), Some("v1.10"));
/// ```
pub fn latest_tag<S: AsRef<str>>(tags: &[S]) -> Option<&str> {
    let mut best: Option<(&str, Option<&str>)> = None;
    for tag in tags {
        let tag = tag.as_ref();
        let version = tag_version(tag);
        let better = match best {
            None => true,
            Some((_, best_version)) => {
                compare_tag_versions(version, best_version) == Ordering::Greater
            }
        };
        if better {
            best = Some((tag, version));
        }
    }
    best.map(|(tag, _)| tag)
}

/// Whether `tag` names a newer version than `current`.
pub fn is_newer(tag: &str, current: &str) -> bool {
    tag_version(tag).is_some_and(|v| compare(v, current) == Ordering::Greater)
}

/// Rewrite spec lines for `version`: `Version:` gets the new value and the
/// leading number of `Release:` goes back to `1`, keeping any suffix such
/// as `%{?dist}`.
///
/// # Examples
///
/// ```
/// use planex::version::rewrite_version;
///
/// let lines = vec!["Version: 1.0".to_string(), "Release: 12%{?dist}".to_string()];
/// assert_eq!(rewrite_version(&lines, "1.1"), vec!["Version: 1.1", "Release: 1%{?dist}"]);
/// ```
pub fn rewrite_version(lines: &[String], version: &str) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            if let Some(caps) = VERSION_LINE_RE.captures(line) {
                format!("{}{version}", &caps[1])
            } else if let Some(caps) = RELEASE_LINE_RE.captures(line) {
                format!("{}1{}", &caps[1], &caps[2])
            } else {
                line.clone()
            }
        })
        .collect()
}
