use log::info;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use core::progress::Timer;
use core::stream;
use storage::article::{dump_collection, read_collection, CanonicalArticle};
use storage::store::StoreError;
use storage::{ArticleStoreWrite, RocksAliasStore, RocksArticleStore};

use crate::join::{self, JoinError, ListStyle, WikiStores};
use crate::page::extractor::WikiXMLExtractor;
use crate::page::pool::{PoolError, WikitextWorkerPool};
use crate::rank::kl::{self, KlError, KlKind};
use crate::rank::{self, CollectionSource, InMemorySource, RankError};
use crate::redirect;
use crate::settings::Settings;
use crate::wikidata::inheritance::{InheritanceError, InheritanceGraph};
use crate::wikidata::parser::WikidataEntityParser;
use crate::wikidata::stream::EntityLines;
use crate::wikidata::TitleConceptIndex;

const STORE_WRITE_CHUNK: usize = 20000;

#[derive(Debug)]
pub enum PipelineError {
    Io(io::Error),
    Pool(PoolError),
    Store(StoreError),
    Rank(RankError),
    Join(JoinError),
    Inheritance(InheritanceError),
    Kl(KlError),
    Config(String),
}

impl std::error::Error for PipelineError {}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            PipelineError::Io(err) => write!(f, "I/O error: {}", err),
            PipelineError::Pool(err) => write!(f, "{}", err),
            PipelineError::Store(err) => write!(f, "{}", err),
            PipelineError::Rank(err) => write!(f, "{}", err),
            PipelineError::Join(err) => write!(f, "{}", err),
            PipelineError::Inheritance(err) => write!(f, "{}", err),
            PipelineError::Kl(err) => write!(f, "{}", err),
            PipelineError::Config(message) => write!(f, "{}", message),
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(error: io::Error) -> Self {
        PipelineError::Io(error)
    }
}

impl From<PoolError> for PipelineError {
    fn from(error: PoolError) -> Self {
        PipelineError::Pool(error)
    }
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        PipelineError::Store(error)
    }
}

impl From<RankError> for PipelineError {
    fn from(error: RankError) -> Self {
        PipelineError::Rank(error)
    }
}

impl From<JoinError> for PipelineError {
    fn from(error: JoinError) -> Self {
        PipelineError::Join(error)
    }
}

impl From<InheritanceError> for PipelineError {
    fn from(error: InheritanceError) -> Self {
        PipelineError::Inheritance(error)
    }
}

impl From<KlError> for PipelineError {
    fn from(error: KlError) -> Self {
        PipelineError::Kl(error)
    }
}

/// The wiki name is the dump filename prefix before the first hyphen,
/// e.g. "enwiki" for "enwiki-20200701-pages-articles.xml.bz2".
pub fn wiki_name_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let prefix = name.split('-').next()?;
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_owned())
    }
}

/// Parse one Wikipedia dump, canonicalize it, rank it and write the
/// title-keyed store. The sorted canonical collection is also written as
/// the per-language article dump and doubles as the streaming PageRank
/// source.
pub fn build_article_store(
    dump_path: &Path,
    store_path: &Path,
    collection_path: &Path,
    limit: Option<u64>,
    workers: Option<usize>,
    rank_in_memory: bool,
) -> Result<(), PipelineError> {
    let mut timer = Timer::new();
    info!("Parsing raw pages from {:?}", dump_path);
    let reader = stream::open_dump_with_progress(dump_path)?;
    let pool = WikitextWorkerPool::new(workers);
    let extractor = WikiXMLExtractor::new(limit);
    let (pages, _) = pool.parse(reader, &extractor)?;
    timer.finish("parse");

    timer.reset();
    info!("Parsed! Resolving links");
    let (mut articles, _, _) = redirect::resolve_pages(pages);
    articles.sort_by(|a, b| a.title.cmp(&b.title));
    timer.finish("resolve");

    timer.reset();
    info!("Writing {} canonical articles", articles.len());
    {
        let file = File::create(collection_path)?;
        let mut writer = BufWriter::new(file);
        dump_collection(&articles, &mut writer)?;
    }
    timer.finish("collection write");

    timer.reset();
    let mut store = RocksArticleStore::new(&store_path)?;
    if rank_in_memory {
        let source = InMemorySource(articles);
        let (ranks, percentiles) = rank::pagerank_with_percentiles(&source)?;
        attach_and_store(&mut store, source.0.into_iter().map(Ok), &ranks, &percentiles)?;
    } else {
        drop(articles);
        let source = CollectionSource(collection_path.to_owned());
        let (ranks, percentiles) = rank::pagerank_with_percentiles(&source)?;
        let file = File::open(collection_path)?;
        attach_and_store(
            &mut store,
            read_collection(BufReader::new(file)),
            &ranks,
            &percentiles,
        )?;
    }
    timer.finish("pagerank and store write");
    Ok(())
}

fn attach_and_store<I>(
    store: &mut RocksArticleStore,
    articles: I,
    ranks: &[f64],
    percentiles: &[f64],
) -> Result<(), PipelineError>
where
    I: Iterator<Item = Result<CanonicalArticle, StoreError>>,
{
    let mut chunk: Vec<CanonicalArticle> = Vec::with_capacity(STORE_WRITE_CHUNK);
    for (article, (rank, percentile)) in articles.zip(ranks.iter().zip(percentiles)) {
        let mut article = article?;
        article.pagerank = Some(*rank);
        article.pagerank_percentile = Some(*percentile);
        chunk.push(article);
        if chunk.len() >= STORE_WRITE_CHUNK {
            store.put_many(&chunk)?;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        store.put_many(&chunk)?;
    }
    Ok(())
}

/// Load the inheritance-graph snapshot, building it from the dump when no
/// snapshot exists yet.
pub fn inheritance_graph(
    wikidata_path: &Path,
    snapshot_path: &Path,
    limit: Option<u64>,
) -> Result<InheritanceGraph, PipelineError> {
    if snapshot_path.exists() {
        info!("Loading inheritance graph from {:?}", snapshot_path);
        return Ok(InheritanceGraph::load(snapshot_path)?);
    }
    info!("Building inheritance graph from {:?}", wikidata_path);
    let lines = EntityLines::new(stream::open_dump_with_progress(wikidata_path)?);
    let graph = InheritanceGraph::build(lines, limit)?;
    graph.save(snapshot_path)?;
    Ok(graph)
}

fn whitelist_of(settings: &Settings) -> Option<HashSet<String>> {
    settings
        .whitelisted_wikis
        .as_ref()
        .map(|wikis| wikis.iter().cloned().collect())
}

fn list_style_of(settings: &Settings) -> Result<ListStyle, PipelineError> {
    ListStyle::from_name(&settings.list_style).ok_or_else(|| {
        PipelineError::Config(format!(
            "Unknown list_style '{}' (expected 'comma' or 'json')",
            settings.list_style
        ))
    })
}

/// Open the per-wiki stores for a run, building any that are missing from
/// the working directory. Fresh stores are staged under a temp path and
/// moved into place on success.
fn open_wiki_stores(settings: &Settings) -> Result<Vec<WikiStores>, PipelineError> {
    let working_dir = Path::new(&settings.working_dir);
    let whitelist = whitelist_of(settings);
    let mut stores = Vec::new();
    for dump in &settings.wiki_dumps {
        let dump_path = Path::new(dump);
        let wiki = wiki_name_from_path(dump_path).ok_or_else(|| {
            PipelineError::Config(format!("Cannot extract a wiki name from {:?}", dump_path))
        })?;
        if let Some(whitelist) = &whitelist {
            if !whitelist.contains(&wiki) {
                continue;
            }
        }

        let store_path = working_dir.join(&wiki);
        let alias_path = working_dir.join(format!("aliases_{}", wiki));
        let collection_path = working_dir.join(format!("{}.articles.bin", wiki));

        if store_path.exists() {
            info!("Reading article store from {:?}", store_path);
        } else {
            let in_memory = !settings.streaming_wikis.contains(&wiki);
            info!(
                "Main: starting write {} to {:?} (in_memory={})",
                wiki, store_path, in_memory
            );
            let staging = staging_path(&store_path)?;
            build_article_store(
                dump_path,
                &staging,
                &collection_path,
                settings.limit,
                settings.workers,
                in_memory,
            )?;
            fs::rename(&staging, &store_path)?;
        }
        let articles = RocksArticleStore::new(&store_path)?;

        if alias_path.exists() {
            info!("Reading alias store from {:?}", alias_path);
        } else {
            info!("Writing alias store for {}", wiki);
            let staging = staging_path(&alias_path)?;
            {
                let mut aliases = RocksAliasStore::new(&staging)?;
                aliases.populate(articles.iter())?;
            }
            fs::rename(&staging, &alias_path)?;
        }
        let aliases = RocksAliasStore::new(&alias_path)?;

        stores.push(WikiStores {
            name: wiki,
            articles,
            aliases,
        });
    }
    Ok(stores)
}

fn staging_path(path: &Path) -> Result<PathBuf, PipelineError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    Ok(staging)
}

/// Run the whole batch: per-wiki stores, alias stores, the inheritance
/// snapshot and the joined table.
pub fn run(settings: &Settings) -> Result<(), PipelineError> {
    let wikidata_path = Path::new(&settings.wikidata_dump);
    if !wikidata_path.exists() {
        return Err(PipelineError::Config(format!(
            "{:?} not found",
            wikidata_path
        )));
    }
    let list_style = list_style_of(settings)?;
    fs::create_dir_all(&settings.working_dir)?;

    let stores = open_wiki_stores(settings)?;
    if stores.is_empty() {
        return Err(PipelineError::Config(
            "No wiki dumps left after whitelisting".to_owned(),
        ));
    }
    info!("Done wiki writes, loading inheritance graph");

    let working_dir = Path::new(&settings.working_dir);
    let graph = inheritance_graph(
        wikidata_path,
        &working_dir.join("inheritance.bin"),
        settings.limit,
    )?;

    let output = Path::new(&settings.output);
    info!("Writing wikidata to {:?}", output);
    let parser = WikidataEntityParser::new(whitelist_of(settings));
    let lines = EntityLines::new(stream::open_dump_with_progress(wikidata_path)?);
    if settings.full_single_wiki {
        if stores.len() != 1 {
            return Err(PipelineError::Config(format!(
                "full_single_wiki needs exactly one active wiki, found {}",
                stores.len()
            )));
        }
        let intermediate = working_dir.join("output.pass1.tsv");
        join::write_full_wiki_table(
            lines,
            &parser,
            &stores[0],
            &graph,
            output,
            &intermediate,
            list_style,
            settings.limit,
        )?;
    } else {
        join::write_concept_table(
            lines,
            &parser,
            &stores,
            &graph,
            output,
            list_style,
            settings.limit,
        )?;
    }
    info!("Done write to {:?}!", output);
    Ok(())
}

/// Cross-language divergence report over two previously built stores.
pub fn kl_report(
    settings: &Settings,
    base_wiki: &str,
    target_wiki: &str,
    kind: KlKind,
    out_path: &Path,
) -> Result<(), PipelineError> {
    let working_dir = Path::new(&settings.working_dir);
    let open = |wiki: &str| -> Result<RocksArticleStore, PipelineError> {
        let path = working_dir.join(wiki);
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "No article store for '{}' under {:?}; run the pipeline first",
                wiki, working_dir
            )));
        }
        Ok(RocksArticleStore::new(&path)?)
    };
    let base_store = open(base_wiki)?;
    let target_store = open(target_wiki)?;

    info!("Indexing sitelinks for {} and {}", base_wiki, target_wiki);
    let whitelist: HashSet<String> = vec![base_wiki.to_owned(), target_wiki.to_owned()]
        .into_iter()
        .collect();
    let parser = WikidataEntityParser::new(Some(whitelist));
    let mut index = TitleConceptIndex::new();
    let lines = EntityLines::new(stream::open_dump_with_progress(Path::new(
        &settings.wikidata_dump,
    ))?);
    for line in lines {
        let line = line?;
        match parser.parse_line(&line) {
            Ok(Some(entity)) => index.add_entity(&entity),
            Ok(None) => {}
            Err(err) => log::warn!("kl: skipping entity: {}", err),
        }
    }

    let ranked_titles = |store: &RocksArticleStore| -> Result<Vec<(String, f64)>, PipelineError> {
        let mut titles = Vec::new();
        for article in store.iter() {
            let article = article?;
            if let Some(pagerank) = article.pagerank {
                titles.push((article.title, pagerank));
            }
        }
        Ok(titles)
    };
    let common = kl::common_articles(
        &index,
        base_wiki,
        ranked_titles(&base_store)?,
        target_wiki,
        ranked_titles(&target_store)?,
    )?;
    let ranked = kl::kl_divergence_rank(&common, kind)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(out_path)
        .map_err(JoinError::from)?;
    let base_column = format!("{}_title", base_wiki);
    let target_column = format!("{}_title", target_wiki);
    writer
        .write_record(&[
            "concept_id",
            base_column.as_str(),
            target_column.as_str(),
            "kl_contribution",
            "kl_rank",
        ])
        .map_err(JoinError::from)?;
    for item in &ranked {
        let contribution = item.kl_contribution.to_string();
        let rank = item.kl_rank.to_string();
        writer
            .write_record(&[
                item.concept_id.as_str(),
                item.base_title.as_str(),
                item.target_title.as_str(),
                contribution.as_str(),
                rank.as_str(),
            ])
            .map_err(JoinError::from)?;
    }
    writer.flush()?;
    info!("Wrote {} divergence rows to {:?}", ranked.len(), out_path);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wiki_name_from_path() {
        assert_eq!(
            wiki_name_from_path(Path::new(
                "/data/enwiki-20200701-pages-articles.xml.bz2"
            )),
            Some("enwiki".to_owned())
        );
        assert_eq!(
            wiki_name_from_path(Path::new("jawiki-latest.xml.gz")),
            Some("jawiki".to_owned())
        );
        assert_eq!(wiki_name_from_path(Path::new("-odd")), None);
        assert_eq!(wiki_name_from_path(Path::new("/")), None);
    }

    #[test]
    fn test_build_article_store_end_to_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let dump_path = dir.path().join("testwiki-pages-articles.xml");
        std::fs::write(
            &dump_path,
            r#"<mediawiki>
  <page>
    <title>Paris</title>
    <id>1</id>
    <revision><text>In [[France]]. Also [[france]].</text></revision>
  </page>
  <page>
    <title>France</title>
    <id>2</id>
    <revision><text>Capital: [[Paris]]</text></revision>
  </page>
  <page>
    <title>Lutetia</title>
    <id>3</id>
    <redirect title="Paris"/>
    <revision><text>#REDIRECT [[Paris]]</text></revision>
  </page>
</mediawiki>"#,
        )
        .unwrap();

        let store_path = dir.path().join("testwiki");
        let collection_path = dir.path().join("testwiki.articles.bin");
        build_article_store(&dump_path, &store_path, &collection_path, None, Some(2), true)
            .unwrap();

        use storage::ArticleStoreRead;
        let store = RocksArticleStore::new(&store_path).unwrap();
        let paris = store.get("Paris").unwrap().unwrap();
        assert!(paris.aliases.contains("Lutetia"));
        assert_eq!(paris.links.get("France"), Some(&2));
        assert!(paris.pagerank.unwrap() > 0.0);
        assert!(paris.pagerank_percentile.unwrap() > 0.0);
        let france = store.get("France").unwrap().unwrap();
        assert_eq!(france.inlinks.get("Paris"), Some(&2));

        // The collection doubles as the streaming source and is sorted.
        let file = std::fs::File::open(&collection_path).unwrap();
        let titles: Vec<String> = read_collection(std::io::BufReader::new(file))
            .map(|article| article.unwrap().title)
            .collect();
        assert_eq!(titles, vec!["France", "Paris"]);
    }

    fn write_wikidata_dump(path: &Path) {
        use serde_json::json;
        let q90 = json!({
            "type": "item",
            "id": "Q90",
            "labels": {"en": {"language": "en", "value": "Paris"}},
            "sitelinks": {"enwiki": {"title": "Paris"}, "frwiki": {"title": "Paris"}},
            "claims": {"P31": [{
                "mainsnak": {
                    "snaktype": "value",
                    "datavalue": {
                        "type": "wikibase-entityid",
                        "value": {"entity-type": "item", "id": "Q515"}
                    }
                }
            }]}
        });
        let q145 = json!({
            "type": "item",
            "id": "Q145",
            "labels": {"en": {"language": "en", "value": "United Kingdom"}},
            "sitelinks": {"enwiki": {"title": "UK"}},
            "claims": {}
        });
        let q515 = json!({
            "type": "item",
            "id": "Q515",
            "labels": {"en": {"language": "en", "value": "city"}},
            "sitelinks": {},
            "claims": {"P279": [{
                "mainsnak": {
                    "snaktype": "value",
                    "datavalue": {
                        "type": "wikibase-entityid",
                        "value": {"entity-type": "item", "id": "Q486972"}
                    }
                }
            }]}
        });
        let q142 = json!({
            "type": "item",
            "id": "Q142",
            "labels": {"en": {"language": "en", "value": "France"}},
            "sitelinks": {"enwiki": {"title": "France"}},
            "claims": {}
        });
        let property = json!({"type": "property", "id": "P31", "datatype": "wikibase-item"});
        let dump = format!(
            "[\n{},\n{},\n{},\n{},\n{}\n]\n",
            q90, q145, q515, q142, property
        );
        std::fs::write(path, dump).unwrap();
    }

    #[test]
    fn test_run_end_to_end_and_reuse() {
        let dir = tempfile::TempDir::new().unwrap();
        let enwiki_path = dir.path().join("enwiki-test-pages-articles.xml");
        std::fs::write(
            &enwiki_path,
            r#"<mediawiki>
  <page>
    <title>Paris</title>
    <id>1</id>
    <revision><text>Capital of [[France]].</text></revision>
  </page>
  <page>
    <title>France</title>
    <id>2</id>
    <revision><text>Contains [[Paris]].</text></revision>
  </page>
  <page>
    <title>United Kingdom</title>
    <id>3</id>
    <revision><text>Not [[France]].</text></revision>
  </page>
  <page>
    <title>UK</title>
    <id>4</id>
    <redirect title="United Kingdom"/>
    <revision><text>#REDIRECT [[United Kingdom]]</text></revision>
  </page>
</mediawiki>"#,
        )
        .unwrap();
        let frwiki_path = dir.path().join("frwiki-test-pages-articles.xml");
        std::fs::write(
            &frwiki_path,
            r#"<mediawiki>
  <page>
    <title>Paris</title>
    <id>1</id>
    <revision><text>Capitale de la France.</text></revision>
  </page>
</mediawiki>"#,
        )
        .unwrap();
        let wikidata_path = dir.path().join("wikidata-test.json");
        write_wikidata_dump(&wikidata_path);

        let output = dir.path().join("wikilanguage.tsv");
        let settings = Settings {
            wikidata_dump: wikidata_path.to_str().unwrap().to_owned(),
            wiki_dumps: vec![
                enwiki_path.to_str().unwrap().to_owned(),
                frwiki_path.to_str().unwrap().to_owned(),
            ],
            output: output.to_str().unwrap().to_owned(),
            working_dir: dir.path().join("working").to_str().unwrap().to_owned(),
            limit: None,
            whitelisted_wikis: None,
            workers: Some(2),
            streaming_wikis: vec!["frwiki".to_owned()],
            list_style: "comma".to_owned(),
            full_single_wiki: false,
        };
        run(&settings).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&output)
            .unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        let cell = |row: &[String], name: &str| -> String {
            row[headers.iter().position(|h| h == name).unwrap()].clone()
        };

        assert_eq!(rows.len(), 4);
        assert_eq!(cell(&rows[0], "concept_id"), "Q90");
        assert_eq!(cell(&rows[0], "enwiki_title"), "Paris");
        assert_eq!(cell(&rows[0], "frwiki_title"), "Paris");
        assert!(!cell(&rows[0], "enwiki_pagerank").is_empty());
        assert!(!cell(&rows[0], "frwiki_pagerank").is_empty());
        assert_eq!(cell(&rows[0], "direct_instance_of"), "Q515");
        assert_eq!(
            cell(&rows[0], "recursive_instance_of"),
            "Q486972,Q515"
        );

        // The UK sitelink resolves through the alias store.
        assert_eq!(cell(&rows[1], "concept_id"), "Q145");
        assert_eq!(cell(&rows[1], "enwiki_title"), "United Kingdom");
        assert!(!cell(&rows[1], "enwiki_pagerank").is_empty());
        assert_eq!(cell(&rows[1], "frwiki_title"), "");

        // Q515 has no sitelinks at all.
        assert_eq!(cell(&rows[2], "concept_id"), "Q515");
        assert_eq!(cell(&rows[2], "enwiki_title"), "");

        // A second run resumes from the populated working directory.
        std::fs::remove_file(&output).unwrap();
        run(&settings).unwrap();
        assert!(output.exists());

        // Every alias resolves back to its article through the alias
        // store.
        use storage::ArticleStoreRead;
        let working_dir = Path::new(&settings.working_dir);
        let articles = RocksArticleStore::new(&working_dir.join("enwiki")).unwrap();
        let aliases = RocksAliasStore::new(&working_dir.join("aliases_enwiki")).unwrap();
        for article in articles.iter() {
            let article = article.unwrap();
            for alias in &article.aliases {
                let canonical = aliases.get(alias).unwrap().unwrap();
                let found = articles.get(&canonical).unwrap().unwrap();
                assert_eq!(found.title, article.title);
            }
        }

        // The divergence report over the two built stores covers the one
        // concept present in both.
        let kl_output = dir.path().join("kl.tsv");
        kl_report(&settings, "enwiki", "frwiki", KlKind::JensenShannon, &kl_output).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&kl_output)
            .unwrap();
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Q90");
    }

    #[test]
    fn test_run_full_single_wiki() {
        let dir = tempfile::TempDir::new().unwrap();
        let enwiki_path = dir.path().join("enwiki-test-pages-articles.xml");
        std::fs::write(
            &enwiki_path,
            r#"<mediawiki>
  <page>
    <title>Paris</title>
    <id>1</id>
    <revision><text>Capital of [[France]].</text></revision>
  </page>
  <page>
    <title>France</title>
    <id>2</id>
    <revision><text>Contains [[Paris]].</text></revision>
  </page>
</mediawiki>"#,
        )
        .unwrap();
        let wikidata_path = dir.path().join("wikidata-test.json");
        write_wikidata_dump(&wikidata_path);

        let output = dir.path().join("enwiki-full.tsv");
        let settings = Settings {
            wikidata_dump: wikidata_path.to_str().unwrap().to_owned(),
            wiki_dumps: vec![enwiki_path.to_str().unwrap().to_owned()],
            output: output.to_str().unwrap().to_owned(),
            working_dir: dir.path().join("working").to_str().unwrap().to_owned(),
            limit: None,
            whitelisted_wikis: Some(vec!["enwiki".to_owned()]),
            workers: Some(2),
            streaming_wikis: vec![],
            list_style: "comma".to_owned(),
            full_single_wiki: true,
        };
        run(&settings).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&output)
            .unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert!(headers.contains(&"enwiki_pagerank_percentile".to_owned()));
        assert!(headers.contains(&"enwiki_inlinks".to_owned()));
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        let cell = |row: &[String], name: &str| -> String {
            row[headers.iter().position(|h| h == name).unwrap()].clone()
        };
        // Paris links to France, which maps to a concept in pass two.
        assert_eq!(cell(&rows[0], "concept_id"), "Q90");
        assert_eq!(cell(&rows[0], "enwiki_outlinks"), r#"{"Q142":1}"#);
        assert!(!dir.path().join("working/output.pass1.tsv").exists());
    }

    #[test]
    fn test_streaming_store_matches_in_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let dump_path = dir.path().join("testwiki-pages.xml");
        std::fs::write(
            &dump_path,
            r#"<mediawiki>
  <page><title>A</title><id>1</id><revision><text>[[B]]</text></revision></page>
  <page><title>B</title><id>2</id><revision><text>[[A]] [[A]]</text></revision></page>
</mediawiki>"#,
        )
        .unwrap();

        use storage::ArticleStoreRead;
        let in_memory_path = dir.path().join("m");
        build_article_store(
            &dump_path,
            &in_memory_path,
            &dir.path().join("m.bin"),
            None,
            Some(1),
            true,
        )
        .unwrap();
        let streaming_path = dir.path().join("s");
        build_article_store(
            &dump_path,
            &streaming_path,
            &dir.path().join("s.bin"),
            None,
            Some(1),
            false,
        )
        .unwrap();

        let in_memory = RocksArticleStore::new(&in_memory_path).unwrap();
        let streaming = RocksArticleStore::new(&streaming_path).unwrap();
        for title in &["A", "B"] {
            let a = in_memory.get(title).unwrap().unwrap();
            let b = streaming.get(title).unwrap().unwrap();
            assert_eq!(a.pagerank, b.pagerank);
            assert_eq!(a.pagerank_percentile, b.pagerank_percentile);
        }
    }
}
