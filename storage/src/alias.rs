use log::info;
use rocksdb::{IteratorMode, WriteBatch, DB as RocksDB};
use std::path::Path;
use std::str;

use crate::article::CanonicalArticle;
use crate::store::StoreError;

const ALIAS_CHUNK: usize = 20000;

/// Title-or-alias to canonical-title store for one wiki. Populated after
/// the article store is closed for writes: the identity mapping for every
/// canonical title, plus one entry per alias. A page is either a redirect
/// or a terminal article, so alias keys never collide with titles.
pub struct RocksAliasStore {
    db: RocksDB,
}

impl RocksAliasStore {
    pub fn new<P: AsRef<Path>>(path: &P) -> Result<Self, StoreError> {
        let db = RocksDB::open_default(path.as_ref())?;
        Ok(RocksAliasStore { db })
    }

    /// Resolve a title or alias to its canonical title.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(value)) => {
                let title = str::from_utf8(&value)
                    .map_err(|err| StoreError::Get(err.to_string()))?
                    .to_owned();
                Ok(Some(title))
            }
            Ok(None) => Ok(None),
            Err(err) => Err(StoreError::Get(err.into_string())),
        }
    }

    pub fn put(&mut self, key: &str, title: &str) -> Result<(), StoreError> {
        self.db
            .put(key.as_bytes(), title.as_bytes())
            .map_err(|err| StoreError::Put(err.into_string()))
    }

    /// Populate from every article of a closed article store.
    pub fn populate<I>(&mut self, articles: I) -> Result<AliasStats, StoreError>
    where
        I: IntoIterator<Item = Result<CanonicalArticle, StoreError>>,
    {
        let mut stats = AliasStats::default();
        let mut batch = WriteBatch::default();
        let mut pending = 0;
        for article in articles {
            let article = article?;
            batch.put(article.title_bytes(), article.title_bytes())?;
            stats.titles += 1;
            pending += 1;
            for alias in &article.aliases {
                batch.put(alias.as_bytes(), article.title_bytes())?;
                stats.aliases += 1;
                pending += 1;
            }
            if pending >= ALIAS_CHUNK {
                self.db
                    .write(batch)
                    .map_err(|err| StoreError::Put(err.into_string()))?;
                batch = WriteBatch::default();
                pending = 0;
            }
        }
        if pending > 0 {
            self.db
                .write(batch)
                .map_err(|err| StoreError::Put(err.into_string()))?;
        }
        info!(
            "alias store: wrote {} identity entries and {} aliases",
            stats.titles, stats.aliases
        );
        Ok(stats)
    }

    /// Iterate every (key, canonical title) pair.
    pub fn iter(&self) -> impl Iterator<Item = Result<(String, String), StoreError>> + '_ {
        self.db.iterator(IteratorMode::Start).map(|(key, value)| {
            let key = str::from_utf8(&key)
                .map_err(|err| StoreError::Get(err.to_string()))?
                .to_owned();
            let value = str::from_utf8(&value)
                .map_err(|err| StoreError::Get(err.to_string()))?
                .to_owned();
            Ok((key, value))
        })
    }
}

/// Counts reported after populating an alias store.
#[derive(Clone, Copy, Debug, Default)]
pub struct AliasStats {
    pub titles: u64,
    pub aliases: u64,
}
