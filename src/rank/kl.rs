use fnv::FnvHashMap;
use log::info;
use std::fmt;

use crate::rank::rank_average_ties;
use crate::wikidata::TitleConceptIndex;

/// Which divergence to rank by.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KlKind {
    Forward,
    Backward,
    JensenShannon,
}

impl KlKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "forward" => Some(KlKind::Forward),
            "backward" => Some(KlKind::Backward),
            "jsd" => Some(KlKind::JensenShannon),
            _ => None,
        }
    }
}

/// A concept sitelinked, found and positively ranked in both wikis.
#[derive(Clone, Debug, PartialEq)]
pub struct CommonArticle {
    pub concept_id: String,
    pub base_title: String,
    pub target_title: String,
    pub base_pagerank: f64,
    pub target_pagerank: f64,
}

/// One output tuple of the divergence ranking.
#[derive(Clone, Debug, PartialEq)]
pub struct KlRanked {
    pub kl_contribution: f64,
    /// Average-tie rank of the contribution, normalized to (0, 1].
    pub kl_rank: f64,
    pub concept_id: String,
    pub base_title: String,
    pub target_title: String,
}

#[derive(Debug)]
pub enum KlError {
    MissingWiki(String),
    Empty,
    ZeroMass,
    ZeroPagerank { side: &'static str, title: String },
}

impl std::error::Error for KlError {}

impl fmt::Display for KlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            KlError::MissingWiki(wiki) => {
                write!(f, "The concept index doesn't contain '{}'", wiki)
            }
            KlError::Empty => write!(f, "No concepts are common to both wikis"),
            KlError::ZeroMass => write!(f, "PageRank mass over the intersection is zero"),
            KlError::ZeroPagerank { side, title } => {
                write!(f, "Found zero page-rank in {} article '{}'", side, title)
            }
        }
    }
}

/// Align two wikis' ranked articles on the concepts sitelinked in both.
///
/// Articles missing from the concept index, missing from either wiki, or
/// carrying a non-positive PageRank are filtered out, with the filter
/// counts logged.
pub fn common_articles<B, T>(
    index: &TitleConceptIndex,
    base_wiki: &str,
    base_articles: B,
    target_wiki: &str,
    target_articles: T,
) -> Result<Vec<CommonArticle>, KlError>
where
    B: IntoIterator<Item = (String, f64)>,
    T: IntoIterator<Item = (String, f64)>,
{
    if !index.contains_wiki(base_wiki) {
        return Err(KlError::MissingWiki(base_wiki.to_owned()));
    }
    if !index.contains_wiki(target_wiki) {
        return Err(KlError::MissingWiki(target_wiki.to_owned()));
    }

    type Slot = (Option<(String, f64)>, Option<(String, f64)>);
    let mut candidates: FnvHashMap<String, Slot> = FnvHashMap::default();
    for concept in index.concepts(base_wiki).chain(index.concepts(target_wiki)) {
        candidates.entry(concept.to_owned()).or_insert((None, None));
    }
    info!(
        "Found {} common candidates out of {} base and {} target titles",
        candidates.len(),
        index.title_count(base_wiki),
        index.title_count(target_wiki)
    );

    let mut not_found_base = 0u64;
    let mut zero_rank = 0u64;
    for (title, pagerank) in base_articles {
        match index.concept(base_wiki, &title) {
            Some(concept) => {
                if pagerank > 0.0 {
                    if let Some(slot) = candidates.get_mut(concept) {
                        slot.0 = Some((title, pagerank));
                    }
                } else {
                    zero_rank += 1;
                }
            }
            None => not_found_base += 1,
        }
    }
    let mut not_found_target = 0u64;
    for (title, pagerank) in target_articles {
        match index.concept(target_wiki, &title) {
            Some(concept) => {
                if pagerank > 0.0 {
                    if let Some(slot) = candidates.get_mut(concept) {
                        slot.1 = Some((title, pagerank));
                    }
                } else {
                    zero_rank += 1;
                }
            }
            None => not_found_target += 1,
        }
    }

    let mut base_only = 0u64;
    let mut target_only = 0u64;
    let mut missing_both = 0u64;
    let mut common: Vec<CommonArticle> = Vec::new();
    for (concept_id, slot) in candidates {
        match slot {
            (Some(base), Some(target)) => common.push(CommonArticle {
                concept_id,
                base_title: base.0,
                target_title: target.0,
                base_pagerank: base.1,
                target_pagerank: target.1,
            }),
            (Some(_), None) => base_only += 1,
            (None, Some(_)) => target_only += 1,
            (None, None) => missing_both += 1,
        }
    }
    info!(
        "Filtered to {} concepts: {} in {} only, {} in {} only, {} in neither, \
         {} unindexed base titles, {} unindexed target titles, {} zero-ranked",
        common.len(),
        base_only,
        base_wiki,
        target_only,
        target_wiki,
        missing_both,
        not_found_base,
        not_found_target,
        zero_rank
    );

    common.sort_by(|a, b| a.concept_id.cmp(&b.concept_id));
    Ok(common)
}

/// Per-element KL summand with the 0·log 0 = 0 convention.
fn kl_contributions(p: &[f64], q: &[f64]) -> Vec<f64> {
    p.iter()
        .zip(q)
        .map(|(&p_i, &q_i)| {
            if p_i != 0.0 {
                p_i * (p_i.ln() - q_i.ln())
            } else {
                0.0
            }
        })
        .collect()
}

/// Rank the common concepts by their divergence contribution.
///
/// The two PageRank vectors are renormalized over the intersection, the
/// per-element contribution is computed for the chosen divergence, and
/// the contributions are rank-transformed with average ties. Output is
/// sorted by contribution, ascending.
pub fn kl_divergence_rank(
    common: &[CommonArticle],
    kind: KlKind,
) -> Result<Vec<KlRanked>, KlError> {
    if common.is_empty() {
        return Err(KlError::Empty);
    }
    for article in common {
        if article.base_pagerank <= 0.0 {
            return Err(KlError::ZeroPagerank {
                side: "base",
                title: article.base_title.clone(),
            });
        }
        if article.target_pagerank <= 0.0 {
            return Err(KlError::ZeroPagerank {
                side: "target",
                title: article.target_title.clone(),
            });
        }
    }

    let base_sum: f64 = common.iter().map(|a| a.base_pagerank).sum();
    let target_sum: f64 = common.iter().map(|a| a.target_pagerank).sum();
    if base_sum <= 0.0 || target_sum <= 0.0 {
        return Err(KlError::ZeroMass);
    }
    let p: Vec<f64> = common.iter().map(|a| a.base_pagerank / base_sum).collect();
    let q: Vec<f64> = common
        .iter()
        .map(|a| a.target_pagerank / target_sum)
        .collect();

    let contributions = match kind {
        KlKind::Forward => kl_contributions(&p, &q),
        KlKind::Backward => kl_contributions(&q, &p),
        KlKind::JensenShannon => {
            let avg: Vec<f64> = p.iter().zip(&q).map(|(&p_i, &q_i)| (p_i + q_i) / 2.0).collect();
            kl_contributions(&p, &avg)
                .iter()
                .zip(kl_contributions(&q, &avg))
                .map(|(&forward, backward)| (forward + backward) / 2.0)
                .collect()
        }
    };

    let n = contributions.len() as f64;
    let ranks = rank_average_ties(&contributions);
    let mut ranked: Vec<KlRanked> = common
        .iter()
        .zip(contributions.iter().zip(ranks))
        .map(|(article, (&kl_contribution, rank))| KlRanked {
            kl_contribution,
            kl_rank: rank / n,
            concept_id: article.concept_id.clone(),
            base_title: article.base_title.clone(),
            target_title: article.target_title.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| a.kl_contribution.total_cmp(&b.kl_contribution));
    Ok(ranked)
}
