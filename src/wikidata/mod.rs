pub mod inheritance;
pub mod parser;
pub mod stream;
pub mod time;

pub use self::{
    inheritance::InheritanceGraph,
    parser::{EntityError, WikidataEntityParser},
    stream::EntityLines,
};

use fnv::FnvHashMap;
use qp_trie::{wrapper::BString, Trie};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A coordinate claim value. Altitude and precision may be absent.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GlobeCoord {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub precision: Option<f64>,
}

/// A language-neutral concept decoded from one line of the Wikidata dump.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WikidataEntity {
    pub id: String,
    pub sample_label: Option<String>,
    pub sample_coord: Option<GlobeCoord>,
    /// Epoch seconds UTC of the earliest parseable publication date.
    pub publication_date: Option<i64>,
    pub country_of_origin: Option<String>,
    pub titles_by_wiki: FnvHashMap<String, String>,
    pub direct_instance_of: BTreeSet<String>,
    pub direct_subclass_of: BTreeSet<String>,
}

/// Per-wiki tries mapping article titles to concept ids.
#[derive(Default)]
pub struct TitleConceptIndex {
    tries: FnvHashMap<String, Trie<BString, String>>,
}

impl TitleConceptIndex {
    pub fn new() -> Self {
        TitleConceptIndex::default()
    }

    pub fn insert(&mut self, wiki: &str, title: &str, concept_id: &str) {
        self.tries
            .entry(wiki.to_owned())
            .or_insert_with(Trie::new)
            .insert_str(title, concept_id.to_owned());
    }

    /// Record every sitelink of an entity.
    pub fn add_entity(&mut self, entity: &WikidataEntity) {
        for (wiki, title) in &entity.titles_by_wiki {
            self.insert(wiki, title, &entity.id);
        }
    }

    pub fn concept(&self, wiki: &str, title: &str) -> Option<&str> {
        self.tries
            .get(wiki)?
            .get_str(title)
            .map(|concept| concept.as_str())
    }

    pub fn contains_wiki(&self, wiki: &str) -> bool {
        self.tries.contains_key(wiki)
    }

    /// Concept ids sitelinked from a wiki. Empty if the wiki is unknown.
    pub fn concepts<'a>(&'a self, wiki: &str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match self.tries.get(wiki) {
            Some(trie) => Box::new(trie.iter().map(|(_, concept)| concept.as_str())),
            None => Box::new(std::iter::empty()),
        }
    }

    pub fn title_count(&self, wiki: &str) -> usize {
        self.tries
            .get(wiki)
            .map(|trie| trie.iter().count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_index_maps_titles_to_concepts() {
        let mut index = TitleConceptIndex::new();
        index.insert("enwiki", "Paris", "Q90");
        index.insert("frwiki", "Paris", "Q90");
        index.insert("enwiki", "London", "Q84");

        assert_eq!(index.concept("enwiki", "Paris"), Some("Q90"));
        assert_eq!(index.concept("frwiki", "Paris"), Some("Q90"));
        assert_eq!(index.concept("enwiki", "Berlin"), None);
        assert_eq!(index.concept("dewiki", "Paris"), None);
        assert_eq!(index.title_count("enwiki"), 2);

        let mut concepts: Vec<_> = index.concepts("enwiki").collect();
        concepts.sort();
        assert_eq!(concepts, vec!["Q84", "Q90"]);
    }
}
