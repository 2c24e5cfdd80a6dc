pub mod alias;
pub mod article;
pub mod rocks;
pub mod store;

pub use self::{
    alias::RocksAliasStore,
    article::CanonicalArticle,
    rocks::RocksArticleStore,
    store::{ArticleStoreRead, ArticleStoreWrite, StoreError},
};
