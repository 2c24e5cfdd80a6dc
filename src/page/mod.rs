pub mod extractor;
pub mod pool;
pub mod wikitext;

pub use self::{
    extractor::{ExtractError, ExtractStats, WikiXMLExtractor},
    pool::WikitextWorkerPool,
};

use storage::article::LinkCounts;

/// A raw page pulled out of the dump, not yet parsed. Produced by the XML
/// extractor, consumed once by a worker, then discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct UnparsedPage {
    pub id: String,
    pub title: String,
    pub redirect: Option<String>,
    pub text: String,
}

/// A page whose revision text has been reduced to its wikilink multiset.
/// A page is either a redirect (`redirect` set, links ignored) or a
/// content page.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedPage {
    pub id: String,
    pub title: String,
    pub redirect: Option<String>,
    pub links: LinkCounts,
}

impl ParsedPage {
    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }
}
