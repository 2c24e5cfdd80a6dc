use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Run configuration, read from a TOML settings file.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// Path to the Wikidata JSON dump.
    pub wikidata_dump: String,
    /// Per-language Wikipedia dump paths. The wiki name is the filename
    /// prefix before the first hyphen.
    pub wiki_dumps: Vec<String>,
    /// Path of the joined tab-separated output.
    pub output: String,
    /// Directory holding reusable per-language stores and snapshots.
    pub working_dir: String,
    /// Optional cap on pages per wiki and rows in the join.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Restrict processing to these wiki names.
    #[serde(default)]
    pub whitelisted_wikis: Option<Vec<String>>,
    /// Wikitext worker count; defaults to twice the CPU count.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Wikis whose PageRank pass re-reads from disk instead of holding
    /// the canonical collection in memory. Typically just the largest.
    #[serde(default)]
    pub streaming_wikis: Vec<String>,
    /// "comma" or "json"; serialization of list-valued columns.
    #[serde(default = "default_list_style")]
    pub list_style: String,
    /// Emit the single-wiki table with percentile, link and alias
    /// columns. Requires exactly one active wiki.
    #[serde(default)]
    pub full_single_wiki: bool,
}

fn default_list_style() -> String {
    "comma".to_owned()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let mut settings = Config::new();
        settings.merge(File::with_name(path))?;
        settings.try_into()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_settings_from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
wikidata_dump = "/data/wikidata-20200706-all.json.gz"
wiki_dumps = ["/data/enwiki-20200701-pages-articles.xml.bz2"]
output = "/data/wikilanguage.tsv"
working_dir = "working-dir-20200701"
limit = 10000
whitelisted_wikis = ["enwiki", "jawiki"]
streaming_wikis = ["enwiki"]
"#,
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.limit, Some(10000));
        assert_eq!(settings.list_style, "comma");
        assert!(!settings.full_single_wiki);
        assert_eq!(settings.whitelisted_wikis.unwrap().len(), 2);
        assert_eq!(settings.streaming_wikis, vec!["enwiki".to_owned()]);
        assert_eq!(settings.workers, None);
    }
}
