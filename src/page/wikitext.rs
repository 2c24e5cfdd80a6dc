use std::time::Instant;

use storage::article::LinkCounts;

/// The per-page parse deadline was exceeded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeadlineExceeded;

const DEADLINE_CHECK_INTERVAL: u64 = 4096;

/// Extract the internal-link multiset from revision wikitext.
///
/// We consider two forms:
/// - [[abc]] is seen as "abc" in text and links to page "abc".
/// - [[a|b]] is labelled "b" but links to page "a".
///
/// Section fragments (`#...`) are stripped from the target; section-only
/// links and empty targets are skipped. Nested links inside file captions
/// are picked up at their own opening brackets. Namespaced targets such as
/// `File:` are kept; the redirect resolver accounts for them.
pub fn extract_links(
    text: &str,
    deadline: Option<Instant>,
) -> Result<LinkCounts, DeadlineExceeded> {
    let mut links = LinkCounts::default();
    let mut cursor = 0;
    let mut scanned: u64 = 0;
    while let Some(offset) = text[cursor..].find("[[") {
        let begin = cursor + offset;
        scanned += 1;
        if scanned % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(DeadlineExceeded);
                }
            }
        }
        if let Some(target) = pare_link_target(text, begin) {
            *links.entry(target.to_owned()).or_insert(0) += 1;
        }
        cursor = begin + 2;
    }
    Ok(links)
}

/// Extract the target of a link, given the index of its `[[` within the
/// page text.
fn pare_link_target(page: &str, begin: usize) -> Option<&str> {
    let initial = &page[begin + 2..];
    let end = initial.find("]]")?;
    let inner = &initial[..end];
    let target = match inner.find('|') {
        Some(index) => &inner[..index],
        None => inner,
    };
    let target = match target.find('#') {
        Some(index) => &target[..index],
        None => target,
    };
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    Some(target)
}

/// Check if a link target points to a file.
pub fn is_file_target(target: &str) -> bool {
    target.starts_with("File:") || target.starts_with("Image:")
}
