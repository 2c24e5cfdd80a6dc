use bincode::{deserialize, serialize, ErrorKind as BincodeError, Result as BincodeResult};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::io::{self, Read, Write};

use crate::store::StoreError;

/// Multiset of article titles, counted by occurrence.
pub type LinkCounts = FnvHashMap<String, u64>;

/// A terminal (non-redirect) article after all incoming redirects have been
/// collapsed into it. After canonicalization every key in `links` and
/// `inlinks` is itself a canonical title in the same store.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CanonicalArticle {
    /// Page id, as recorded in the dump.
    pub id: String,
    /// Canonical page title.
    pub title: String,
    /// Redirect source titles whose chain terminates at this article.
    pub aliases: BTreeSet<String>,
    /// Outgoing links, keyed by canonical target title.
    pub links: LinkCounts,
    /// Incoming links, keyed by canonical source title.
    pub inlinks: LinkCounts,
    pub pagerank: Option<f64>,
    pub pagerank_percentile: Option<f64>,
}

impl CanonicalArticle {
    pub fn new(id: String, title: String, links: LinkCounts) -> Self {
        CanonicalArticle {
            id,
            title,
            aliases: BTreeSet::new(),
            links,
            inlinks: LinkCounts::default(),
            pagerank: None,
            pagerank_percentile: None,
        }
    }

    pub fn title_bytes(&self) -> &[u8] {
        self.title.as_bytes()
    }

    /// Deserialise the article from a bytestream using bincode.
    pub fn from_bytes(bytes: &[u8]) -> BincodeResult<Self> {
        deserialize(bytes)
    }

    /// Serialise the article to a bytestream using bincode.
    pub fn to_bytes(&self) -> BincodeResult<Vec<u8>> {
        serialize(self)
    }
}

/// Write a collection of articles to a writer as a framed record sequence.
pub fn dump_collection<W, I>(articles: I, writer: &mut W) -> Result<usize, StoreError>
where
    W: Write,
    I: IntoIterator,
    I::Item: Borrow<CanonicalArticle>,
{
    let mut count = 0;
    for article in articles {
        bincode::serialize_into(&mut *writer, article.borrow())?;
        count += 1;
    }
    Ok(count)
}

/// Iterator over a framed article collection, terminating at end of stream.
pub struct CollectionIter<R> {
    reader: R,
    done: bool,
}

impl<R: Read> CollectionIter<R> {
    pub fn new(reader: R) -> Self {
        CollectionIter {
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for CollectionIter<R> {
    type Item = Result<CanonicalArticle, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match bincode::deserialize_from(&mut self.reader) {
            Ok(article) => Some(Ok(article)),
            Err(err) => {
                self.done = true;
                match *err {
                    BincodeError::Io(ref io_err)
                        if io_err.kind() == io::ErrorKind::UnexpectedEof =>
                    {
                        None
                    }
                    _ => Some(Err(StoreError::Serialize(err))),
                }
            }
        }
    }
}

/// Read a framed article collection from a reader.
pub fn read_collection<R: Read>(reader: R) -> CollectionIter<R> {
    CollectionIter::new(reader)
}
