use log::{info, warn};
use qp_trie::{wrapper::BString, Trie};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use storage::article::CanonicalArticle;
use storage::store::{ArticleStoreRead, StoreError};
use storage::{RocksAliasStore, RocksArticleStore};

use crate::wikidata::inheritance::InheritanceGraph;
use crate::wikidata::parser::WikidataEntityParser;
use crate::wikidata::WikidataEntity;

/// The per-wiki stores the joiner reads from.
pub struct WikiStores {
    pub name: String,
    pub articles: RocksArticleStore,
    pub aliases: RocksAliasStore,
}

/// Serialization convention for list-valued columns. One convention is
/// fixed for a whole run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ListStyle {
    CommaJoined,
    JsonArray,
}

impl ListStyle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "comma" => Some(ListStyle::CommaJoined),
            "json" => Some(ListStyle::JsonArray),
            _ => None,
        }
    }

    fn format(&self, ids: &BTreeSet<String>) -> Result<String, JoinError> {
        match self {
            ListStyle::CommaJoined => Ok(ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(",")),
            ListStyle::JsonArray => {
                let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                Ok(serde_json::to_string(&ids)?)
            }
        }
    }
}

#[derive(Debug)]
pub enum JoinError {
    Store(StoreError),
    Csv(csv::Error),
    Io(io::Error),
    Json(serde_json::Error),
    MissingColumn(String),
}

impl std::error::Error for JoinError {}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            JoinError::Store(err) => write!(f, "Store error: {}", err),
            JoinError::Csv(err) => write!(f, "CSV error: {}", err),
            JoinError::Io(err) => write!(f, "I/O error: {}", err),
            JoinError::Json(err) => write!(f, "JSON error: {}", err),
            JoinError::MissingColumn(name) => {
                write!(f, "Intermediate file has no '{}' column", name)
            }
        }
    }
}

impl From<StoreError> for JoinError {
    fn from(error: StoreError) -> Self {
        JoinError::Store(error)
    }
}

impl From<csv::Error> for JoinError {
    fn from(error: csv::Error) -> Self {
        JoinError::Csv(error)
    }
}

impl From<io::Error> for JoinError {
    fn from(error: io::Error) -> Self {
        JoinError::Io(error)
    }
}

impl From<serde_json::Error> for JoinError {
    fn from(error: serde_json::Error) -> Self {
        JoinError::Json(error)
    }
}

const PROGRESS_INTERVAL: u64 = 10_000;

/// Joiner outcome counts, reported at the end of the stage. The
/// semantic misses are statistics, never errors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JoinStats {
    /// Rows written.
    pub considered: u64,
    /// Entities with no sitelink into any target wiki.
    pub empty: u64,
    /// Per-wiki lookups with no sitelinked title.
    pub no_title: u64,
    /// Sitelinked titles absent from the store even after alias lookup.
    pub missing_article: u64,
    /// Articles found through the alias fallback.
    pub aliased: u64,
    /// Entity lines dropped with a decoding diagnostic.
    pub decode_warnings: u64,
}

impl fmt::Display for JoinStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Wrote {} rows ({} without sitelinks, {} missing titles, \
             {} missing articles, {} via aliases, {} decode warnings)",
            self.considered,
            self.empty,
            self.no_title,
            self.missing_article,
            self.aliased,
            self.decode_warnings
        )
    }
}

fn base_headers() -> Vec<String> {
    vec![
        "concept_id".to_owned(),
        "sample_label".to_owned(),
        "coord_latitude".to_owned(),
        "coord_longitude".to_owned(),
        "coord_altitude".to_owned(),
        "coord_precision".to_owned(),
        "country_of_origin".to_owned(),
        "publication_date".to_owned(),
    ]
}

fn closure_headers() -> Vec<String> {
    vec![
        "direct_instance_of".to_owned(),
        "recursive_instance_of".to_owned(),
        "direct_subclass_of".to_owned(),
        "recursive_subclass_of".to_owned(),
    ]
}

fn base_cells(entity: &WikidataEntity) -> Vec<String> {
    let mut cells = Vec::with_capacity(8);
    cells.push(entity.id.clone());
    cells.push(entity.sample_label.clone().unwrap_or_default());
    match &entity.sample_coord {
        Some(coord) => {
            cells.push(coord.latitude.to_string());
            cells.push(coord.longitude.to_string());
            cells.push(coord.altitude.map(|v| v.to_string()).unwrap_or_default());
            cells.push(coord.precision.map(|v| v.to_string()).unwrap_or_default());
        }
        None => {
            cells.push(String::new());
            cells.push(String::new());
            cells.push(String::new());
            cells.push(String::new());
        }
    }
    cells.push(entity.country_of_origin.clone().unwrap_or_default());
    cells.push(
        entity
            .publication_date
            .map(|ts| ts.to_string())
            .unwrap_or_default(),
    );
    cells
}

/// Union of ancestor closures over a set of direct concept ids.
fn recursive_closure(graph: &InheritanceGraph, direct: &BTreeSet<String>) -> BTreeSet<String> {
    let mut closure = BTreeSet::new();
    for concept in direct {
        closure.extend(graph.ancestors(concept));
    }
    closure
}

fn closure_cells(
    entity: &WikidataEntity,
    graph: &InheritanceGraph,
    list_style: ListStyle,
) -> Result<Vec<String>, JoinError> {
    Ok(vec![
        list_style.format(&entity.direct_instance_of)?,
        list_style.format(&recursive_closure(graph, &entity.direct_instance_of))?,
        list_style.format(&entity.direct_subclass_of)?,
        list_style.format(&recursive_closure(graph, &entity.direct_subclass_of))?,
    ])
}

/// Article found for a sitelinked title, possibly through an alias.
fn resolve_article(
    stores: &WikiStores,
    title: &str,
) -> Result<(Option<CanonicalArticle>, bool), JoinError> {
    if let Some(article) = stores.articles.get(title)? {
        return Ok((Some(article), false));
    }
    if let Some(canonical) = stores.aliases.get(title)? {
        if let Some(article) = stores.articles.get(&canonical)? {
            return Ok((Some(article), true));
        }
    }
    Ok((None, false))
}

fn float_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Stream the Wikidata dump and write one tab-separated row per concept,
/// with the sitelinked title and PageRank for every target wiki.
pub fn write_concept_table<I>(
    lines: I,
    parser: &WikidataEntityParser,
    stores: &[WikiStores],
    graph: &InheritanceGraph,
    out_path: &Path,
    list_style: ListStyle,
    limit: Option<u64>,
) -> Result<JoinStats, JoinError>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(out_path)?;
    let mut header = base_headers();
    for wiki in stores {
        header.push(format!("{}_title", wiki.name));
        header.push(format!("{}_pagerank", wiki.name));
    }
    header.extend(closure_headers());
    writer.write_record(&header)?;

    let mut stats = JoinStats::default();
    for line in lines {
        let line = line?;
        let entity = match parser.parse_line(&line) {
            Ok(Some(entity)) => entity,
            Ok(None) => continue,
            Err(err) => {
                warn!("join: skipping entity: {}", err);
                stats.decode_warnings += 1;
                continue;
            }
        };

        let mut row = base_cells(&entity);
        let mut any_title = false;
        for wiki in stores {
            match entity.titles_by_wiki.get(&wiki.name) {
                Some(title) => {
                    any_title = true;
                    let (article, aliased) = resolve_article(wiki, title)?;
                    match article {
                        Some(article) => {
                            if aliased {
                                stats.aliased += 1;
                            }
                            row.push(article.title);
                            row.push(float_cell(article.pagerank));
                        }
                        None => {
                            stats.missing_article += 1;
                            row.push(title.clone());
                            row.push(String::new());
                        }
                    }
                }
                None => {
                    stats.no_title += 1;
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        if !any_title {
            stats.empty += 1;
        }
        row.extend(closure_cells(&entity, graph, list_style)?);
        writer.write_record(&row)?;
        stats.considered += 1;
        if stats.considered % PROGRESS_INTERVAL == 0 {
            info!("join: reached {} rows", stats.considered);
        }

        if let Some(limit) = limit {
            if stats.considered >= limit {
                break;
            }
        }
    }
    writer.flush()?;
    info!("{}", stats);
    Ok(stats)
}

fn link_cell(links: &storage::article::LinkCounts) -> Result<String, JoinError> {
    let sorted: BTreeMap<&str, u64> = links
        .iter()
        .map(|(title, count)| (title.as_str(), *count))
        .collect();
    Ok(serde_json::to_string(&sorted)?)
}

fn alias_cell(aliases: &BTreeSet<String>) -> Result<String, JoinError> {
    let aliases: Vec<&str> = aliases.iter().map(|alias| alias.as_str()).collect();
    Ok(serde_json::to_string(&aliases)?)
}

/// Rewrite a title-keyed link cell to concept ids. Pairs whose title
/// never mapped to a concept are dropped.
fn rewrite_link_cell(
    cell: &str,
    title_to_concept: &Trie<BString, String>,
) -> Result<String, JoinError> {
    if cell.is_empty() {
        return Ok(String::new());
    }
    let links: BTreeMap<String, u64> = serde_json::from_str(cell)?;
    let mut rewritten: BTreeMap<String, u64> = BTreeMap::new();
    for (title, count) in links {
        if let Some(concept) = title_to_concept.get_str(&title) {
            *rewritten.entry(concept.clone()).or_insert(0) += count;
        }
    }
    Ok(serde_json::to_string(&rewritten)?)
}

/// Single-wiki table with percentile, link and alias columns.
///
/// Two passes are mandatory: in-/out-link keys are article titles, and
/// the title-to-concept mapping is only complete once the whole dump has
/// been read. The first pass writes titles to an intermediate file and
/// collects the mapping; the second rewrites the link cells to concept
/// ids and writes the final table. The intermediate file is removed on
/// success.
pub fn write_full_wiki_table<I>(
    lines: I,
    parser: &WikidataEntityParser,
    stores: &WikiStores,
    graph: &InheritanceGraph,
    out_path: &Path,
    intermediate_path: &Path,
    list_style: ListStyle,
    limit: Option<u64>,
) -> Result<JoinStats, JoinError>
where
    I: Iterator<Item = io::Result<String>>,
{
    let inlinks_column = format!("{}_inlinks", stores.name);
    let outlinks_column = format!("{}_outlinks", stores.name);

    let mut header = base_headers();
    header.push(format!("{}_title", stores.name));
    header.push(format!("{}_pagerank", stores.name));
    header.push(format!("{}_pagerank_percentile", stores.name));
    header.push(inlinks_column.clone());
    header.push(outlinks_column.clone());
    header.push(format!("{}_aliases", stores.name));
    header.extend(closure_headers());

    let mut title_to_concept: Trie<BString, String> = Trie::new();
    let mut stats = JoinStats::default();
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(intermediate_path)?;
        writer.write_record(&header)?;

        for line in lines {
            let line = line?;
            let entity = match parser.parse_line(&line) {
                Ok(Some(entity)) => entity,
                Ok(None) => continue,
                Err(err) => {
                    warn!("join: skipping entity: {}", err);
                    stats.decode_warnings += 1;
                    continue;
                }
            };

            let mut row = base_cells(&entity);
            match entity.titles_by_wiki.get(&stores.name) {
                Some(title) => {
                    let (article, aliased) = resolve_article(stores, title)?;
                    match article {
                        Some(article) => {
                            if aliased {
                                stats.aliased += 1;
                            }
                            title_to_concept.insert_str(&article.title, entity.id.clone());
                            row.push(article.title.clone());
                            row.push(float_cell(article.pagerank));
                            row.push(float_cell(article.pagerank_percentile));
                            row.push(link_cell(&article.inlinks)?);
                            row.push(link_cell(&article.links)?);
                            row.push(alias_cell(&article.aliases)?);
                        }
                        None => {
                            stats.missing_article += 1;
                            row.push(title.clone());
                            for _ in 0..5 {
                                row.push(String::new());
                            }
                        }
                    }
                }
                None => {
                    stats.no_title += 1;
                    stats.empty += 1;
                    for _ in 0..6 {
                        row.push(String::new());
                    }
                }
            }
            row.extend(closure_cells(&entity, graph, list_style)?);
            writer.write_record(&row)?;
            stats.considered += 1;
            if stats.considered % PROGRESS_INTERVAL == 0 {
                info!("join: reached {} rows", stats.considered);
            }

            if let Some(limit) = limit {
                if stats.considered >= limit {
                    break;
                }
            }
        }
        writer.flush()?;
    }
    info!(
        "join: first pass {} (mapped {} titles), rewriting links",
        stats,
        title_to_concept.iter().count()
    );

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(intermediate_path)?;
    let positions = {
        let headers = reader.headers()?;
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| JoinError::MissingColumn(name.to_owned()))
        };
        (position(&inlinks_column)?, position(&outlinks_column)?)
    };

    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(out_path)?;
    writer.write_record(&header)?;
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|cell| cell.to_owned()).collect();
        row[positions.0] = rewrite_link_cell(&row[positions.0], &title_to_concept)?;
        row[positions.1] = rewrite_link_cell(&row[positions.1], &title_to_concept)?;
        writer.write_record(&row)?;
    }
    writer.flush()?;
    fs::remove_file(intermediate_path)?;
    Ok(stats)
}
