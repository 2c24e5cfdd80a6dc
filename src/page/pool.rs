use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{info, warn};
use std::fmt;
use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

use crate::page::extractor::{ExtractError, ExtractStats, WikiXMLExtractor};
use crate::page::wikitext;
use crate::page::{ParsedPage, UnparsedPage};

/// Per-page wall-clock budget for wikitext parsing. Pages over budget are
/// dropped with a warning; the pipeline continues.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Reader-queue capacity per worker. The bounded queue backpressures the
/// XML reader.
const QUEUE_FACTOR: usize = 10;

#[derive(Debug)]
pub enum PoolError {
    Extract(ExtractError),
    WorkerPanicked,
}

impl std::error::Error for PoolError {}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            PoolError::Extract(err) => write!(f, "Extract error: {}", err),
            PoolError::WorkerPanicked => write!(f, "A wikitext worker panicked"),
        }
    }
}

impl From<ExtractError> for PoolError {
    fn from(error: ExtractError) -> Self {
        PoolError::Extract(error)
    }
}

/// Fixed pool of wikitext workers fed by the XML extractor through a
/// bounded queue. Workers terminate on a poison value; parsed pages drain
/// from an unbounded queue once all workers have finished. No page
/// ordering is guaranteed across workers.
pub struct WikitextWorkerPool {
    workers: usize,
    page_timeout: Duration,
}

impl WikitextWorkerPool {
    pub fn new(workers: Option<usize>) -> Self {
        WikitextWorkerPool {
            workers: workers.unwrap_or_else(|| num_cpus::get() * 2),
            page_timeout: PAGE_TIMEOUT,
        }
    }

    pub fn with_page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }

    /// Run the extractor on the calling thread and the workers on their
    /// own threads, returning every parsed page.
    pub fn parse<B: BufRead>(
        &self,
        reader: B,
        extractor: &WikiXMLExtractor,
    ) -> Result<(Vec<ParsedPage>, ExtractStats), PoolError> {
        let (page_tx, page_rx) = bounded::<Option<UnparsedPage>>(self.workers * QUEUE_FACTOR);
        let (parsed_tx, parsed_rx) = unbounded::<ParsedPage>();

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let rx = page_rx.clone();
            let tx = parsed_tx.clone();
            let timeout = self.page_timeout;
            handles.push(thread::spawn(move || worker(rx, tx, timeout)));
        }
        drop(page_rx);
        drop(parsed_tx);

        let mut sink = page_tx.clone();
        let extracted = extractor.run(reader, &mut sink);
        drop(sink);

        // Poison the reader queue whether or not extraction succeeded so
        // the workers wind down before the error is surfaced.
        for _ in 0..self.workers {
            if page_tx.send(None).is_err() {
                break;
            }
        }
        drop(page_tx);

        let mut panicked = false;
        for handle in handles {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        let stats = extracted?;
        if panicked {
            return Err(PoolError::WorkerPanicked);
        }

        let pages: Vec<ParsedPage> = parsed_rx.iter().collect();
        info!(
            "worker pool: parsed {} of {} extracted pages",
            pages.len(),
            stats.pages
        );
        Ok((pages, stats))
    }
}

fn worker(rx: Receiver<Option<UnparsedPage>>, tx: Sender<ParsedPage>, timeout: Duration) {
    while let Ok(Some(page)) = rx.recv() {
        let deadline = Instant::now() + timeout;
        match wikitext::extract_links(&page.text, Some(deadline)) {
            Ok(links) => {
                let parsed = ParsedPage {
                    id: page.id,
                    title: page.title,
                    redirect: page.redirect,
                    links,
                };
                if tx.send(parsed).is_err() {
                    return;
                }
            }
            Err(_) => {
                warn!(
                    "Dropping '{}' after exceeding the {}s parse budget",
                    page.title,
                    timeout.as_secs()
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DUMP: &str = r#"<mediawiki>
  <page>
    <title>Paris</title>
    <id>41</id>
    <revision><text>Capital of [[France]]. See [[France]].</text></revision>
  </page>
  <page>
    <title>Lutetia</title>
    <id>42</id>
    <redirect title="Paris"/>
    <revision><text>#REDIRECT [[Paris]]</text></revision>
  </page>
  <page>
    <title>France</title>
    <id>43</id>
    <revision><text>Contains [[Paris]].</text></revision>
  </page>
</mediawiki>"#;

    #[test]
    fn test_pool_parses_all_pages() {
        let pool = WikitextWorkerPool::new(Some(2));
        let extractor = WikiXMLExtractor::new(None);
        let (mut pages, stats) = pool.parse(DUMP.as_bytes(), &extractor).unwrap();
        assert_eq!(stats.pages, 3);
        assert_eq!(pages.len(), 3);

        pages.sort_by(|a, b| a.title.cmp(&b.title));
        assert_eq!(pages[0].title, "France");
        assert_eq!(pages[0].links.get("Paris"), Some(&1));
        assert_eq!(pages[2].title, "Paris");
        assert_eq!(pages[2].links.get("France"), Some(&2));
        assert!(pages[1].is_redirect());
    }

    #[test]
    fn test_pool_respects_limit() {
        let pool = WikitextWorkerPool::new(Some(2));
        let extractor = WikiXMLExtractor::new(Some(1));
        let (pages, stats) = pool.parse(DUMP.as_bytes(), &extractor).unwrap();
        assert!(stats.limit_reached);
        assert_eq!(pages.len(), 1);
    }
}
