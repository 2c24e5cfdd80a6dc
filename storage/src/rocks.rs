use pbr::ProgressBar;
use rocksdb::{Error as RocksError, IteratorMode, WriteBatch, DB as RocksDB};
use std::path::Path;

use crate::article::CanonicalArticle;
use crate::store::{ArticleStoreRead, ArticleStoreWrite, StoreError};

impl From<RocksError> for StoreError {
    fn from(error: RocksError) -> Self {
        StoreError::Open(error.into_string())
    }
}

/// Title-keyed article store backed by RocksDB. Writes are bulk during
/// pipeline population; reads during the join are random.
pub struct RocksArticleStore {
    db: RocksDB,
    chunk_factor: usize,
}

impl RocksArticleStore {
    pub fn new<P: AsRef<Path>>(path: &P) -> Result<Self, StoreError> {
        let db = RocksDB::open_default(path.as_ref())?;
        Ok(RocksArticleStore {
            db,
            chunk_factor: 20000,
        })
    }

    /// Iterate every article in the store, in key (title) order.
    pub fn iter(&self) -> impl Iterator<Item = Result<CanonicalArticle, StoreError>> + '_ {
        self.db
            .iterator(IteratorMode::Start)
            .map(|(_, value)| CanonicalArticle::from_bytes(&value).map_err(StoreError::from))
    }
}

impl ArticleStoreRead for RocksArticleStore {
    fn get(&self, title: &str) -> Result<Option<CanonicalArticle>, StoreError> {
        let value = match self.db.get(title.as_bytes()) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(err) => return Err(StoreError::Get(err.into_string())),
        };
        let value = CanonicalArticle::from_bytes(&value)?;
        Ok(Some(value))
    }
}

impl ArticleStoreWrite for RocksArticleStore {
    fn put(&mut self, article: &CanonicalArticle) -> Result<(), StoreError> {
        let value = article.to_bytes()?;
        match self.db.put(article.title_bytes(), value) {
            Ok(()) => Ok(()),
            Err(err) => Err(StoreError::Put(err.into_string())),
        }
    }

    fn put_many(&mut self, articles: &[CanonicalArticle]) -> Result<(), StoreError> {
        let mut pbar = ProgressBar::new((articles.len() / self.chunk_factor.max(1)) as u64);
        for chunk in articles.chunks(self.chunk_factor) {
            let mut batch = WriteBatch::default();
            for article in chunk {
                let value = article.to_bytes()?;
                batch.put(article.title_bytes(), value)?;
            }
            self.db
                .write(batch)
                .map_err(|err| StoreError::Put(err.into_string()))?;
            pbar.inc();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::article::LinkCounts;
    use tempfile::TempDir;

    fn article(title: &str, pagerank: f64) -> CanonicalArticle {
        let mut a = CanonicalArticle::new("1".to_owned(), title.to_owned(), LinkCounts::default());
        a.pagerank = Some(pagerank);
        a
    }

    #[test]
    fn test_store_retrieve_one_by_title() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("articles");
        let mut store = RocksArticleStore::new(&path).unwrap();
        store.put(&article("Persuasion", 0.5)).unwrap();
        let found = store.get("Persuasion").unwrap().unwrap();
        assert_eq!(found.title, "Persuasion");
        assert_eq!(found.pagerank, Some(0.5));
        assert!(store.get("Emma").unwrap().is_none());
    }

    #[test]
    fn test_store_iterates_in_title_order() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("articles");
        let mut store = RocksArticleStore::new(&path).unwrap();
        store
            .put_many(&[
                article("Persuasion", 0.5),
                article("Emma", 0.25),
                article("Mansfield Park", 0.25),
            ])
            .unwrap();

        let titles: Vec<_> = store.iter().map(|a| a.unwrap().title).collect();
        assert_eq!(titles, vec!["Emma", "Mansfield Park", "Persuasion"]);
    }
}
