use fnv::{FnvHashMap, FnvHashSet};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use crate::wikidata::parser::{self, EntityError};

/// Directed graph over concept ids with subclass-of edges running from
/// superclass to subclass. Vertices are interned the first time an id
/// appears as an entity or as a subclass-of target; Wikidata contains
/// cycles, so every traversal carries a seen-set.
#[derive(Default, Deserialize, Serialize)]
pub struct InheritanceGraph {
    index: FnvHashMap<String, u32>,
    ids: Vec<String>,
    labels: Vec<Option<String>>,
    parents: Vec<Vec<u32>>,
    children: Vec<Vec<u32>>,
}

#[derive(Debug)]
pub enum InheritanceError {
    Io(io::Error),
    Snapshot(Box<bincode::ErrorKind>),
}

impl std::error::Error for InheritanceError {}

impl fmt::Display for InheritanceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            InheritanceError::Io(err) => write!(f, "I/O error: {}", err),
            InheritanceError::Snapshot(err) => write!(f, "Snapshot error: {}", err),
        }
    }
}

impl From<io::Error> for InheritanceError {
    fn from(error: io::Error) -> Self {
        InheritanceError::Io(error)
    }
}

impl From<Box<bincode::ErrorKind>> for InheritanceError {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        InheritanceError::Snapshot(error)
    }
}

impl InheritanceGraph {
    pub fn new() -> Self {
        InheritanceGraph::default()
    }

    fn intern(&mut self, id: &str) -> u32 {
        if let Some(&index) = self.index.get(id) {
            return index;
        }
        let index = self.ids.len() as u32;
        self.index.insert(id.to_owned(), index);
        self.ids.push(id.to_owned());
        self.labels.push(None);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        index
    }

    /// Record an entity with its display label and direct superclasses.
    pub fn add_entity<'a, I>(&mut self, id: &str, label: Option<String>, superclasses: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let entity = self.intern(id);
        if label.is_some() {
            self.labels[entity as usize] = label;
        }
        for superclass in superclasses {
            let superclass = self.intern(superclass);
            self.children[superclass as usize].push(entity);
            self.parents[entity as usize].push(superclass);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Display label recorded for a concept, if any.
    pub fn label(&self, id: &str) -> Option<&str> {
        let index = *self.index.get(id)?;
        self.labels[index as usize].as_deref()
    }

    /// Every id reachable by walking subclass-of edges in reverse,
    /// including `id` itself.
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        result.insert(id.to_owned());
        let start = match self.index.get(id) {
            Some(&start) => start,
            None => return result,
        };
        let mut seen = FnvHashSet::default();
        seen.insert(start);
        let mut stack = vec![start];
        while let Some(vertex) = stack.pop() {
            for &parent in &self.parents[vertex as usize] {
                if seen.insert(parent) {
                    result.insert(self.ids[parent as usize].clone());
                    stack.push(parent);
                }
            }
        }
        result
    }

    /// Lazy deduplicated walk over everything below a concept, starting
    /// with the concept itself.
    pub fn descendants<'a>(&'a self, id: &str) -> Descendants<'a> {
        let mut queue = VecDeque::new();
        let mut seen = FnvHashSet::default();
        if let Some(&start) = self.index.get(id) {
            queue.push_back(start);
            seen.insert(start);
        }
        Descendants {
            graph: self,
            queue,
            seen,
        }
    }

    /// Stream the dump once, interning entities and subclass-of edges.
    /// Undecodable lines are skipped with a diagnostic.
    pub fn build<I>(lines: I, limit: Option<u64>) -> Result<Self, InheritanceError>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let mut graph = InheritanceGraph::new();
        let mut entities: u64 = 0;
        let mut skipped: u64 = 0;
        for line in lines {
            let line = line?;
            match extract_subclass_record(&line) {
                Ok(Some((id, label, superclasses))) => {
                    graph.add_entity(
                        &id,
                        label,
                        superclasses.iter().map(|superclass| superclass.as_str()),
                    );
                    entities += 1;
                    if entities % 10_000 == 0 {
                        info!("inheritance: reached {} entities", entities);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("inheritance: skipping line: {}", err);
                    skipped += 1;
                }
            }
            if let Some(limit) = limit {
                if entities >= limit {
                    break;
                }
            }
        }
        info!(
            "inheritance: interned {} vertices from {} entities ({} skipped)",
            graph.len(),
            entities,
            skipped
        );
        Ok(graph)
    }

    /// Write a snapshot to the working directory.
    pub fn save(&self, path: &Path) -> Result<(), InheritanceError> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a snapshot written by [`InheritanceGraph::save`].
    pub fn load(path: &Path) -> Result<Self, InheritanceError> {
        let file = File::open(path)?;
        let graph = bincode::deserialize_from(BufReader::new(file))?;
        Ok(graph)
    }
}

/// Minimal per-line decode for the inheritance pass: the entity id, its
/// English label and its subclass-of targets.
fn extract_subclass_record(
    line: &str,
) -> Result<Option<(String, Option<String>, Vec<String>)>, EntityError> {
    let value: Value = serde_json::from_str(line)?;
    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_owned();
    match value.get("type").and_then(|v| v.as_str()) {
        Some("item") => {}
        _ => return Ok(None),
    }

    let label = value
        .get("labels")
        .and_then(|labels| labels.get("en"))
        .and_then(|label| label.get("value"))
        .and_then(|v| v.as_str())
        .map(|label| label.to_owned());

    let mut superclasses = Vec::new();
    if let Some(claims) = value
        .get("claims")
        .and_then(|claims| claims.get(parser::SUBCLASS_OF))
        .and_then(|v| v.as_array())
    {
        for claim in claims {
            if let Some(target) = parser::snak_value(claim, "wikibase-entityid", &id, parser::SUBCLASS_OF)? {
                if target.get("entity-type").and_then(|v| v.as_str()) == Some("item") {
                    if let Some(target) = target.get("id").and_then(|v| v.as_str()) {
                        superclasses.push(target.to_owned());
                    }
                }
            }
        }
    }
    Ok(Some((id, label, superclasses)))
}

/// Iterator state for [`InheritanceGraph::descendants`].
pub struct Descendants<'a> {
    graph: &'a InheritanceGraph,
    queue: VecDeque<u32>,
    seen: FnvHashSet<u32>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let vertex = self.queue.pop_front()?;
        for &child in &self.graph.children[vertex as usize] {
            if self.seen.insert(child) {
                self.queue.push_back(child);
            }
        }
        Some(self.graph.ids[vertex as usize].as_str())
    }
}
