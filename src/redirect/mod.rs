use fnv::{FnvHashMap, FnvHashSet};
use log::info;
use spinners::{Spinner, Spinners};
use std::fmt;

use storage::article::{CanonicalArticle, LinkCounts};

use crate::page::wikitext;
use crate::page::ParsedPage;

/// Redirect-chain outcomes. These are statistics, not errors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RedirectStats {
    pub resolved: u64,
    pub cycles: u64,
    pub dangling: u64,
}

impl RedirectStats {
    fn total(&self) -> u64 {
        self.resolved + self.cycles + self.dangling
    }
}

impl fmt::Display for RedirectStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = self.total().max(1) as f64;
        write!(
            f,
            "Resolved {} ({:.3}) redirects with {} ({:.3}) cycles and {} ({:.3}) unresolvables",
            self.resolved,
            self.resolved as f64 / t,
            self.cycles,
            self.cycles as f64 / t,
            self.dangling,
            self.dangling as f64 / t
        )
    }
}

/// Link-rewrite outcomes. Good counts link entries; bad and file count
/// occurrences, as the unresolved mass is what matters downstream.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LinkStats {
    pub good: u64,
    pub bad: u64,
    pub file: u64,
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = (self.good + self.bad).max(1) as f64;
        write!(
            f,
            "Found {} ({:.3}) good links and {} ({:.3}) bad links and {} ({:.3}) file links",
            self.good,
            self.good as f64 / t,
            self.bad,
            self.bad as f64 / t,
            self.file,
            self.file as f64 / t
        )
    }
}

/// Upper-case the first code point, as wikilinks are case-insensitive in
/// their first letter only.
pub fn title_case(title: &str) -> String {
    let mut chars = title.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Collapse redirects into their terminal articles.
///
/// Partitions the parsed pages into terminal pages and redirects, chases
/// every redirect chain to its terminal target (detecting cycles and
/// dangling targets), attaches the chain sources as aliases, rewrites all
/// link multisets to terminal titles and accumulates reverse links.
pub fn resolve_pages(pages: Vec<ParsedPage>) -> (Vec<CanonicalArticle>, RedirectStats, LinkStats) {
    let mut terminal: FnvHashMap<String, CanonicalArticle> = FnvHashMap::default();
    // A value of None marks a chain found circular or dangling.
    let mut redirects: FnvHashMap<String, Option<String>> = FnvHashMap::default();

    for page in pages {
        match page.redirect {
            Some(target) => {
                redirects.insert(page.title, Some(target));
            }
            None => {
                terminal.insert(
                    page.title.clone(),
                    CanonicalArticle::new(page.id, page.title, page.links),
                );
            }
        }
    }

    let spinner = Spinner::new(Spinners::Dots, "Chasing redirect chains...".to_owned());
    let mut redirect_stats = RedirectStats::default();
    let sources: Vec<String> = redirects.keys().cloned().collect();
    for source in sources {
        let mut pointer = match redirects.get(&source) {
            Some(Some(target)) => target.clone(),
            _ => continue,
        };
        let mut seen: FnvHashSet<String> = FnvHashSet::default();
        loop {
            if seen.contains(&pointer) {
                redirects.insert(source.clone(), None);
                redirect_stats.cycles += 1;
                break;
            }
            seen.insert(pointer.clone());

            if terminal.contains_key(&pointer) {
                if let Some(article) = terminal.get_mut(&pointer) {
                    article.aliases.insert(source.clone());
                }
                redirects.insert(source.clone(), Some(pointer));
                redirect_stats.resolved += 1;
                break;
            }
            match redirects.get(&pointer) {
                Some(Some(next)) => pointer = next.clone(),
                _ => {
                    redirects.insert(source.clone(), None);
                    redirect_stats.dangling += 1;
                    break;
                }
            }
        }
    }
    spinner.stop();
    info!("{}", redirect_stats);

    // Rewrite links to the deepest page. The raw multisets are drained
    // first; resolution then runs against the immutable maps so inlinks
    // can be accumulated afterwards.
    let mut link_stats = LinkStats::default();
    let drained: Vec<(String, LinkCounts)> = terminal
        .iter_mut()
        .map(|(title, article)| (title.clone(), std::mem::take(&mut article.links)))
        .collect();
    let mut rewritten: Vec<(String, LinkCounts)> = Vec::with_capacity(drained.len());
    for (title, raw_links) in drained {
        let mut resolved_links = LinkCounts::default();
        for (raw_link, count) in raw_links {
            let mut resolved = None;
            for candidate in candidates(&raw_link) {
                match redirects.get(&candidate) {
                    Some(Some(target)) => {
                        resolved = Some(target.clone());
                        break;
                    }
                    _ => {
                        if terminal.contains_key(&candidate) {
                            resolved = Some(candidate);
                            break;
                        }
                    }
                }
            }
            match resolved {
                Some(target) => {
                    *resolved_links.entry(target).or_insert(0) += count;
                    link_stats.good += 1;
                }
                None => {
                    if wikitext::is_file_target(&raw_link) {
                        link_stats.file += count;
                    } else {
                        link_stats.bad += count;
                    }
                }
            }
        }
        rewritten.push((title, resolved_links));
    }

    for (source, resolved_links) in rewritten {
        for (target, count) in &resolved_links {
            if let Some(article) = terminal.get_mut(target) {
                *article.inlinks.entry(source.clone()).or_insert(0) += count;
            }
        }
        if let Some(article) = terminal.get_mut(&source) {
            article.links = resolved_links;
        }
    }
    info!("{}", link_stats);

    (terminal.into_iter().map(|(_, v)| v).collect(), redirect_stats, link_stats)
}

fn candidates(raw_link: &str) -> Vec<String> {
    let cased = title_case(raw_link);
    if cased == raw_link {
        vec![raw_link.to_owned()]
    } else {
        vec![raw_link.to_owned(), cased]
    }
}
