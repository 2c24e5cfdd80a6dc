use log::{info, warn};
use quick_xml::{self as qx, events::BytesStart, events::Event};
use std::fmt;
use std::io::BufRead;
use std::time::Instant;

use crate::page::UnparsedPage;

/// Default cap on revision text per page. Characters past the cap are
/// discarded and the page is emitted truncated.
pub const MAX_TEXT_BYTES: usize = 100 * 1024 * 1024;

const PROGRESS_INTERVAL: u64 = 10_000;

/// Receives reconstructed pages from the extractor. The channel feeding
/// the worker pool implements this; closing the sink unwinds the parse.
pub trait PageSink {
    fn send(&mut self, page: UnparsedPage) -> Result<(), SinkClosed>;
}

/// The downstream consumer went away.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SinkClosed;

impl PageSink for crossbeam_channel::Sender<Option<UnparsedPage>> {
    fn send(&mut self, page: UnparsedPage) -> Result<(), SinkClosed> {
        crossbeam_channel::Sender::send(self, Some(page)).map_err(|_| SinkClosed)
    }
}

impl PageSink for Vec<UnparsedPage> {
    fn send(&mut self, page: UnparsedPage) -> Result<(), SinkClosed> {
        self.push(page);
        Ok(())
    }
}

/// Structural errors that abort the parse. A recursive `<page>` or a
/// repeated `<title>`/`<revision>` indicates a corrupt dump.
#[derive(Debug)]
pub enum ExtractError {
    Xml(qx::Error),
    RecursivePage { position: usize },
    SecondTitle { title: String },
    SecondRevision { title: String },
    Aborted,
}

impl std::error::Error for ExtractError {}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            ExtractError::Xml(err) => write!(f, "XML error: {}", err),
            ExtractError::RecursivePage { position } => {
                write!(f, "Recursive page element at byte {}", position)
            }
            ExtractError::SecondTitle { title } => {
                write!(f, "Encountered a second title for page '{}'", title)
            }
            ExtractError::SecondRevision { title } => {
                write!(f, "Saw a second revision for page '{}'", title)
            }
            ExtractError::Aborted => write!(f, "Page consumer went away"),
        }
    }
}

impl From<qx::Error> for ExtractError {
    fn from(error: qx::Error) -> Self {
        ExtractError::Xml(error)
    }
}

/// Counts reported after an extraction pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractStats {
    /// Pages emitted downstream.
    pub pages: u64,
    /// Pages whose revision text hit the size cap.
    pub truncated: u64,
    /// Pages dropped for a recoverable structural anomaly.
    pub dropped: u64,
    /// True when the page limit stopped the parse early.
    pub limit_reached: bool,
}

#[derive(Default)]
struct PageState {
    title: Option<String>,
    redirect: Option<String>,
    id: Option<String>,
    text: String,
    title_buf: String,
    id_buf: String,
    in_title: bool,
    in_text: bool,
    in_id: bool,
    in_revision: bool,
    seen_revision: bool,
    truncated: bool,
    poisoned: bool,
}

impl PageState {
    fn in_capture(&self) -> bool {
        self.in_title || self.in_text || self.in_id
    }
}

/// Event-driven `<page>` reconstructor for MediaWiki export XML.
///
/// Tracks a small state stack (outside-page, page, title / redirect /
/// revision text / id) and emits one [`UnparsedPage`] per completed page
/// into the sink. The sink is expected to apply backpressure.
pub struct WikiXMLExtractor {
    limit: Option<u64>,
    max_text_bytes: usize,
}

impl WikiXMLExtractor {
    pub fn new(limit: Option<u64>) -> Self {
        WikiXMLExtractor {
            limit,
            max_text_bytes: MAX_TEXT_BYTES,
        }
    }

    pub fn with_max_text_bytes(mut self, max_text_bytes: usize) -> Self {
        self.max_text_bytes = max_text_bytes;
        self
    }

    /// Run the extraction over an XML stream, emitting pages into `sink`.
    /// Stops cleanly once the configured page limit is reached.
    pub fn run<B, S>(&self, reader: B, sink: &mut S) -> Result<ExtractStats, ExtractError>
    where
        B: BufRead,
        S: PageSink,
    {
        let mut reader = qx::Reader::from_reader(reader);
        let mut buf = Vec::new();
        let mut stats = ExtractStats::default();
        let mut in_page = false;
        let mut page = PageState::default();
        let start_time = Instant::now();

        loop {
            match reader.read_event(&mut buf) {
                Ok(Event::Start(ref tag)) => match tag.name() {
                    b"page" => {
                        if in_page {
                            return Err(ExtractError::RecursivePage {
                                position: reader.buffer_position(),
                            });
                        }
                        in_page = true;
                        page = PageState::default();
                    }
                    name if in_page => {
                        if page.in_capture() {
                            if !page.poisoned {
                                warn!(
                                    "Dropping '{}': unexpected element inside a text field",
                                    page.title.as_deref().unwrap_or("?")
                                );
                                page.poisoned = true;
                            }
                        } else {
                            match name {
                                b"title" => {
                                    if page.title.is_some() {
                                        return Err(ExtractError::SecondTitle {
                                            title: page.title.unwrap_or_default(),
                                        });
                                    }
                                    page.in_title = true;
                                    page.title_buf.clear();
                                }
                                b"redirect" => self.capture_redirect(tag, &mut page),
                                b"revision" => {
                                    if page.seen_revision {
                                        return Err(ExtractError::SecondRevision {
                                            title: page.title.unwrap_or_default(),
                                        });
                                    }
                                    page.in_revision = true;
                                }
                                b"text" if page.in_revision => {
                                    page.in_text = true;
                                    page.text.clear();
                                }
                                // Revision ids do not identify the page.
                                b"id" if !page.in_revision && page.id.is_none() => {
                                    page.in_id = true;
                                    page.id_buf.clear();
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::Empty(ref tag)) => {
                    if in_page && tag.name() == b"redirect" {
                        self.capture_redirect(tag, &mut page);
                    }
                }
                Ok(Event::Text(ref e)) | Ok(Event::CData(ref e)) => {
                    if page.in_title {
                        page.title_buf.push_str(&e.unescape_and_decode(&reader)?);
                    } else if page.in_text {
                        let chunk = e.unescape_and_decode(&reader)?;
                        self.append_capped(&mut page, &chunk);
                    } else if page.in_id {
                        page.id_buf.push_str(&e.unescape_and_decode(&reader)?);
                    }
                }
                Ok(Event::End(ref tag)) => match tag.name() {
                    b"page" => {
                        in_page = false;
                        if self.finish_page(&mut page, sink, &mut stats, start_time)? {
                            stats.limit_reached = true;
                            return Ok(stats);
                        }
                    }
                    b"title" if in_page => {
                        page.in_title = false;
                        page.title = Some(std::mem::replace(&mut page.title_buf, String::new()));
                    }
                    b"revision" if in_page => {
                        page.in_revision = false;
                        page.seen_revision = true;
                    }
                    b"text" if in_page => page.in_text = false,
                    b"id" if in_page && page.in_id => {
                        page.in_id = false;
                        page.id = Some(page.id_buf.trim().to_owned());
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(ExtractError::Xml(err)),
            }
            buf.clear();
        }
        Ok(stats)
    }

    fn capture_redirect(&self, tag: &BytesStart, page: &mut PageState) {
        if page.redirect.is_some() {
            if !page.poisoned {
                warn!(
                    "Dropping '{}': already had a redirect",
                    page.title.as_deref().unwrap_or("?")
                );
                page.poisoned = true;
            }
            return;
        }
        let target = tag
            .attributes()
            .filter_map(|a| a.ok())
            .find(|a| a.key == b"title")
            .and_then(|a| {
                a.unescaped_value()
                    .ok()
                    .map(|value| String::from_utf8_lossy(&value).into_owned())
            });
        match target {
            Some(target) => page.redirect = Some(target),
            None => {
                if !page.poisoned {
                    warn!(
                        "Dropping '{}': redirect without a title attribute",
                        page.title.as_deref().unwrap_or("?")
                    );
                    page.poisoned = true;
                }
            }
        }
    }

    fn append_capped(&self, page: &mut PageState, chunk: &str) {
        let remaining = self.max_text_bytes.saturating_sub(page.text.len());
        if chunk.len() <= remaining {
            page.text.push_str(chunk);
            return;
        }
        if !page.truncated {
            warn!(
                "Revision text for '{}' exceeds {} bytes, truncating",
                page.title.as_deref().unwrap_or("?"),
                self.max_text_bytes
            );
            page.truncated = true;
        }
        let mut cut = remaining;
        while cut > 0 && !chunk.is_char_boundary(cut) {
            cut -= 1;
        }
        page.text.push_str(&chunk[..cut]);
    }

    /// Emit a completed page. Returns true once the page limit is hit.
    fn finish_page<S: PageSink>(
        &self,
        page: &mut PageState,
        sink: &mut S,
        stats: &mut ExtractStats,
        start_time: Instant,
    ) -> Result<bool, ExtractError> {
        let page = std::mem::replace(page, PageState::default());
        if page.poisoned {
            stats.dropped += 1;
            return Ok(false);
        }
        let title = match page.title {
            Some(title) => title,
            None => {
                warn!("Dropping a page without a title");
                stats.dropped += 1;
                return Ok(false);
            }
        };
        if page.truncated {
            stats.truncated += 1;
        }
        let unparsed = UnparsedPage {
            id: page.id.unwrap_or_default(),
            title,
            redirect: page.redirect,
            text: page.text,
        };
        let title_for_log = if stats.pages % PROGRESS_INTERVAL == PROGRESS_INTERVAL - 1 {
            Some(unparsed.title.clone())
        } else {
            None
        };
        sink.send(unparsed).map_err(|_| ExtractError::Aborted)?;
        stats.pages += 1;
        if let Some(title) = title_for_log {
            let delta = start_time.elapsed().as_secs() as f64
                + f64::from(start_time.elapsed().subsec_millis()) / 1000.0;
            info!(
                "Made it to {} ({}) in {:.1}s ({:.0} pps)",
                title,
                stats.pages,
                delta,
                stats.pages as f64 / delta.max(0.001)
            );
        }
        if let Some(limit) = self.limit {
            if stats.pages >= limit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn extract(xml: &str) -> (Vec<UnparsedPage>, ExtractStats) {
        extract_limited(xml, None)
    }

    fn extract_limited(xml: &str, limit: Option<u64>) -> (Vec<UnparsedPage>, ExtractStats) {
        let mut pages = Vec::new();
        let stats = WikiXMLExtractor::new(limit)
            .run(xml.as_bytes(), &mut pages)
            .unwrap();
        (pages, stats)
    }

    const SIMPLE_DUMP: &str = r#"<mediawiki>
  <page>
    <title>Paris</title>
    <id>41</id>
    <revision>
      <id>9000</id>
      <text>Capital of [[France]].</text>
    </revision>
  </page>
  <page>
    <title>Lutetia</title>
    <id>42</id>
    <redirect title="Paris"/>
    <revision>
      <id>9001</id>
      <text>#REDIRECT [[Paris]]</text>
    </revision>
  </page>
</mediawiki>"#;

    #[test]
    fn test_extracts_pages_and_redirects() {
        let (pages, stats) = extract(SIMPLE_DUMP);
        assert_eq!(stats.pages, 2);
        assert_eq!(pages[0].title, "Paris");
        assert_eq!(pages[0].id, "41");
        assert_eq!(pages[0].redirect, None);
        assert_eq!(pages[0].text, "Capital of [[France]].");
        assert_eq!(pages[1].title, "Lutetia");
        assert_eq!(pages[1].redirect.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_revision_id_does_not_become_page_id() {
        let (pages, _) = extract(SIMPLE_DUMP);
        assert_eq!(pages[0].id, "41");
        assert_eq!(pages[1].id, "42");
    }

    #[test]
    fn test_limit_stops_the_parse() {
        let (pages, stats) = extract_limited(SIMPLE_DUMP, Some(1));
        assert_eq!(pages.len(), 1);
        assert!(stats.limit_reached);
    }

    #[test]
    fn test_second_title_aborts() {
        let xml = r#"<mediawiki><page>
            <title>Paris</title><title>Paris again</title>
        </page></mediawiki>"#;
        let mut pages = Vec::new();
        let err = WikiXMLExtractor::new(None)
            .run(xml.as_bytes(), &mut pages)
            .unwrap_err();
        assert!(matches!(err, ExtractError::SecondTitle { .. }));
    }

    #[test]
    fn test_second_revision_aborts() {
        let xml = r#"<mediawiki><page>
            <title>Paris</title>
            <revision><text>a</text></revision>
            <revision><text>b</text></revision>
        </page></mediawiki>"#;
        let mut pages = Vec::new();
        let err = WikiXMLExtractor::new(None)
            .run(xml.as_bytes(), &mut pages)
            .unwrap_err();
        assert!(matches!(err, ExtractError::SecondRevision { .. }));
    }

    #[test]
    fn test_recursive_page_aborts() {
        let xml = "<mediawiki><page><page></page></page></mediawiki>";
        let mut pages = Vec::new();
        let err = WikiXMLExtractor::new(None)
            .run(xml.as_bytes(), &mut pages)
            .unwrap_err();
        assert!(matches!(err, ExtractError::RecursivePage { .. }));
    }

    #[test]
    fn test_second_redirect_drops_the_page() {
        let xml = r#"<mediawiki>
            <page>
              <title>Doubled</title>
              <redirect title="A"/>
              <redirect title="B"/>
            </page>
            <page>
              <title>Kept</title>
              <revision><text>ok</text></revision>
            </page>
        </mediawiki>"#;
        let (pages, stats) = extract(xml);
        assert_eq!(stats.dropped, 1);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Kept");
    }

    #[test]
    fn test_text_cap_truncates_but_emits() {
        let xml = r#"<mediawiki><page>
            <title>Long</title>
            <revision><text>0123456789abcdef</text></revision>
        </page></mediawiki>"#;
        let mut pages = Vec::new();
        let stats = WikiXMLExtractor::new(None)
            .with_max_text_bytes(8)
            .run(xml.as_bytes(), &mut pages)
            .unwrap();
        assert_eq!(stats.truncated, 1);
        assert_eq!(pages[0].text, "01234567");
    }

    #[test]
    fn test_escaped_text_is_decoded() {
        let xml = r#"<mediawiki><page>
            <title>AT&amp;T</title>
            <revision><text>[[Bell System]] &amp; successors</text></revision>
        </page></mediawiki>"#;
        let (pages, _) = extract(xml);
        assert_eq!(pages[0].title, "AT&T");
        assert_eq!(pages[0].text, "[[Bell System]] & successors");
    }
}
