pub mod kl;

use fnv::FnvHashMap;
use log::info;
use rayon::prelude::*;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use storage::article::{read_collection, CanonicalArticle};
use storage::store::StoreError;

/// Damping factor of the random-walk model.
pub const DAMPING: f64 = 0.85;

const TOLERANCE: f64 = 1e-9;
const MAX_ITERATIONS: usize = 200;

#[derive(Debug)]
pub enum RankError {
    Source(StoreError),
    Io(io::Error),
    /// A link target survived canonicalization without a terminal page.
    UnknownTitle {
        source: String,
        target: String,
    },
}

impl std::error::Error for RankError {}

impl fmt::Display for RankError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            RankError::Source(err) => write!(f, "Source error: {}", err),
            RankError::Io(err) => write!(f, "I/O error: {}", err),
            RankError::UnknownTitle { source, target } => write!(
                f,
                "'{}' links to '{}', which is not a canonical title",
                source, target
            ),
        }
    }
}

impl From<StoreError> for RankError {
    fn from(error: StoreError) -> Self {
        RankError::Source(error)
    }
}

impl From<io::Error> for RankError {
    fn from(error: io::Error) -> Self {
        RankError::Io(error)
    }
}

/// A canonical-page collection the engine can walk more than once. The
/// engine makes one pass to assign dense indices and a second to emit
/// edges; callers typically make a third to attach results.
pub trait PageGraphSource {
    fn for_each_page(&self, f: &mut dyn FnMut(&CanonicalArticle)) -> Result<(), RankError>;
}

/// Collection held in memory; passes are free.
pub struct InMemorySource(pub Vec<CanonicalArticle>);

impl PageGraphSource for InMemorySource {
    fn for_each_page(&self, f: &mut dyn FnMut(&CanonicalArticle)) -> Result<(), RankError> {
        for page in &self.0 {
            f(page);
        }
        Ok(())
    }
}

/// Collection re-read from disk on every pass, trading memory for I/O.
pub struct CollectionSource(pub PathBuf);

impl PageGraphSource for CollectionSource {
    fn for_each_page(&self, f: &mut dyn FnMut(&CanonicalArticle)) -> Result<(), RankError> {
        let file = File::open(&self.0)?;
        for page in read_collection(BufReader::new(file)) {
            f(&page?);
        }
        Ok(())
    }
}

/// Weighted PageRank over the canonical link multigraph.
///
/// Each article contributes one weighted edge per distinct target, with
/// weight `count / sum_of_counts` so outweights sum to one. Dangling
/// articles redistribute their mass uniformly. Values are found by
/// fixed-point iteration and sum to one.
pub fn pagerank<S: PageGraphSource>(source: &S) -> Result<Vec<f64>, RankError> {
    info!("pagerank: creating title map");
    let mut title_to_index: FnvHashMap<String, u32> = FnvHashMap::default();
    source.for_each_page(&mut |page| {
        let next = title_to_index.len() as u32;
        title_to_index.entry(page.title.clone()).or_insert(next);
    })?;

    let n = title_to_index.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    info!("pagerank: adding edges for {} vertices", n);
    let mut incoming: Vec<Vec<(u32, f64)>> = vec![Vec::new(); n];
    let mut has_out = vec![false; n];
    let mut unknown: Option<(String, String)> = None;
    source.for_each_page(&mut |page| {
        if unknown.is_some() || page.links.is_empty() {
            return;
        }
        let source_index = title_to_index[&page.title];
        let norm: u64 = page.links.values().sum();
        for (target, count) in &page.links {
            match title_to_index.get(target) {
                Some(&target_index) => {
                    incoming[target_index as usize]
                        .push((source_index, *count as f64 / norm as f64));
                }
                None => {
                    unknown = Some((page.title.clone(), target.clone()));
                    return;
                }
            }
        }
        has_out[source_index as usize] = true;
    })?;
    if let Some((source, target)) = unknown {
        return Err(RankError::UnknownTitle { source, target });
    }

    info!("pagerank: computing fixed point");
    let n_f = n as f64;
    let mut ranks = vec![1.0 / n_f; n];
    for iteration in 0..MAX_ITERATIONS {
        let dangling: f64 = ranks
            .iter()
            .zip(&has_out)
            .filter(|(_, has_out)| !**has_out)
            .map(|(rank, _)| rank)
            .sum();
        let new_ranks: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|v| {
                let inflow: f64 = incoming[v]
                    .iter()
                    .map(|&(u, weight)| ranks[u as usize] * weight)
                    .sum();
                (1.0 - DAMPING) / n_f + DAMPING * (inflow + dangling / n_f)
            })
            .collect();
        let residual: f64 = new_ranks
            .iter()
            .zip(&ranks)
            .map(|(a, b)| (a - b).abs())
            .sum();
        ranks = new_ranks;
        if residual < TOLERANCE {
            info!("pagerank: converged after {} iterations", iteration + 1);
            break;
        }
    }
    Ok(ranks)
}

/// PageRank plus rank percentiles, aligned with source iteration order.
pub fn pagerank_with_percentiles<S: PageGraphSource>(
    source: &S,
) -> Result<(Vec<f64>, Vec<f64>), RankError> {
    let ranks = pagerank(source)?;
    let n = ranks.len() as f64;
    let percentiles = rank_average_ties(&ranks)
        .into_iter()
        .map(|rank| rank / n)
        .collect();
    Ok((ranks, percentiles))
}

/// One-based ranks with ties given the mean of their positions.
pub fn rank_average_ties(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j are one tie group; their rank is the average of
        // the one-based positions.
        let rank = (i + j + 2) as f64 / 2.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use storage::article::{dump_collection, LinkCounts};

    const EPSILON: f64 = 1e-6;

    fn article(title: &str, links: &[(&str, u64)]) -> CanonicalArticle {
        let mut counts = LinkCounts::default();
        for (target, count) in links {
            counts.insert((*target).to_owned(), *count);
        }
        CanonicalArticle::new("0".to_owned(), title.to_owned(), counts)
    }

    #[test]
    fn test_three_node_ring_is_uniform() {
        let source = InMemorySource(vec![
            article("X", &[("Y", 1)]),
            article("Y", &[("Z", 1)]),
            article("Z", &[("X", 1)]),
        ]);
        let (ranks, percentiles) = pagerank_with_percentiles(&source).unwrap();
        for rank in &ranks {
            assert!((rank - 1.0 / 3.0).abs() < EPSILON);
        }
        // A full tie averages to rank 2 of 3.
        for pct in &percentiles {
            assert!((pct - 2.0 / 3.0).abs() < EPSILON);
        }
    }

    #[test]
    fn test_ranks_sum_to_one_and_are_positive() {
        let source = InMemorySource(vec![
            article("A", &[("B", 3), ("C", 1)]),
            article("B", &[("A", 1)]),
            article("C", &[]),
            article("D", &[("A", 2)]),
        ]);
        let ranks = pagerank(&source).unwrap();
        let total: f64 = ranks.iter().sum();
        assert!((total - 1.0).abs() < EPSILON);
        assert!(ranks.iter().all(|r| *r > 0.0));
    }

    #[test]
    fn test_weighted_edges_favor_heavier_targets() {
        // A sends three quarters of its mass to B and one quarter to C.
        let source = InMemorySource(vec![
            article("A", &[("B", 3), ("C", 1)]),
            article("B", &[]),
            article("C", &[]),
        ]);
        let ranks = pagerank(&source).unwrap();
        assert!(ranks[1] > ranks[2]);
    }

    #[test]
    fn test_unknown_link_target_is_an_error() {
        let source = InMemorySource(vec![article("A", &[("Missing", 1)])]);
        let err = pagerank(&source).unwrap_err();
        assert!(matches!(err, RankError::UnknownTitle { .. }));
    }

    #[test]
    fn test_empty_collection_ranks_nothing() {
        let source = InMemorySource(Vec::new());
        assert!(pagerank(&source).unwrap().is_empty());
    }

    #[test]
    fn test_streaming_matches_in_memory() {
        let articles = vec![
            article("A", &[("B", 2), ("C", 1)]),
            article("B", &[("C", 1)]),
            article("C", &[("A", 5)]),
        ];

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("articles.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        let mut buf = Vec::new();
        dump_collection(articles.clone(), &mut buf).unwrap();
        file.write_all(&buf).unwrap();
        drop(file);

        let in_memory = pagerank(&InMemorySource(articles)).unwrap();
        let streamed = pagerank(&CollectionSource(path)).unwrap();
        assert_eq!(in_memory.len(), streamed.len());
        for (a, b) in in_memory.iter().zip(&streamed) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_percentiles_monotonic_in_rank() {
        let source = InMemorySource(vec![
            article("A", &[("Hub", 4), ("B", 1)]),
            article("B", &[("Hub", 1)]),
            article("C", &[("Hub", 2), ("A", 1)]),
            article("Hub", &[]),
        ]);
        let (ranks, percentiles) = pagerank_with_percentiles(&source).unwrap();
        for pct in &percentiles {
            assert!(*pct > 0.0 && *pct <= 1.0);
        }
        let mut order: Vec<usize> = (0..ranks.len()).collect();
        order.sort_by(|&a, &b| ranks[a].partial_cmp(&ranks[b]).unwrap());
        for pair in order.windows(2) {
            if ranks[pair[0]] < ranks[pair[1]] {
                assert!(percentiles[pair[0]] < percentiles[pair[1]]);
            } else {
                assert_eq!(percentiles[pair[0]], percentiles[pair[1]]);
            }
        }
    }

    #[test]
    fn test_rank_average_ties() {
        assert_eq!(rank_average_ties(&[0.1, 0.3, 0.2]), vec![1.0, 3.0, 2.0]);
        assert_eq!(rank_average_ties(&[0.5, 0.5, 0.5]), vec![2.0, 2.0, 2.0]);
        assert_eq!(
            rank_average_ties(&[0.1, 0.2, 0.2, 0.4]),
            vec![1.0, 2.5, 2.5, 4.0]
        );
        assert!(rank_average_ties(&[]).is_empty());
    }
}
