use fnv::FnvHashMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::wikidata::{time, GlobeCoord, WikidataEntity};

lazy_static! {
    static ref CONCEPT_ID: Regex = Regex::new(r"^Q\d+$").unwrap();
}

const COORDINATE: &str = "P625";
const COUNTRY_OF_ORIGIN: &str = "P495";
const PUBLICATION_DATE: &str = "P577";
const INSTANCE_OF: &str = "P31";
pub(crate) const SUBCLASS_OF: &str = "P279";

/// Decoding failures for a single entity line. The entity is skipped with
/// a diagnostic; the stream continues.
#[derive(Debug)]
pub enum EntityError {
    Json(serde_json::Error),
    MissingField { id: String, field: &'static str },
    MalformedSnak { id: String, property: String, reason: String },
    UnexpectedType { id: String, line_type: String },
    BadConceptId { id: String },
}

impl std::error::Error for EntityError {}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            EntityError::Json(err) => write!(f, "JSON error: {}", err),
            EntityError::MissingField { id, field } => {
                write!(f, "({}) no {} found in entry", id, field)
            }
            EntityError::MalformedSnak {
                id,
                property,
                reason,
            } => write!(f, "({} {}) {}", id, property, reason),
            EntityError::UnexpectedType { id, line_type } => {
                write!(f, "({}) found non-item line of type '{}'", id, line_type)
            }
            EntityError::BadConceptId { id } => {
                write!(f, "('{}') item id is not a concept id", id)
            }
        }
    }
}

impl From<serde_json::Error> for EntityError {
    fn from(error: serde_json::Error) -> Self {
        EntityError::Json(error)
    }
}

/// Extract a claim's main snak value, checking the expected value type.
///
/// Returns None for non-value snaks (novalue/somevalue). A missing
/// snaktype, a value snak without a datavalue, or a datavalue of the
/// wrong type is a decoding error for the whole entity.
pub(crate) fn snak_value<'a>(
    claim: &'a Value,
    expected_type: &str,
    id: &str,
    property: &str,
) -> Result<Option<&'a Value>, EntityError> {
    let mainsnak = claim
        .get("mainsnak")
        .ok_or_else(|| EntityError::MalformedSnak {
            id: id.to_owned(),
            property: property.to_owned(),
            reason: "main snak not found in claim".to_owned(),
        })?;
    let snaktype = mainsnak
        .get("snaktype")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EntityError::MalformedSnak {
            id: id.to_owned(),
            property: property.to_owned(),
            reason: "main snak missing snaktype".to_owned(),
        })?;
    if snaktype != "value" {
        return Ok(None);
    }
    let datavalue = mainsnak
        .get("datavalue")
        .ok_or_else(|| EntityError::MalformedSnak {
            id: id.to_owned(),
            property: property.to_owned(),
            reason: "main snak of value type without data value".to_owned(),
        })?;
    match datavalue.get("type").and_then(|v| v.as_str()) {
        Some(actual) if actual == expected_type => {}
        actual => {
            return Err(EntityError::MalformedSnak {
                id: id.to_owned(),
                property: property.to_owned(),
                reason: format!("expected type {} in {:?}", expected_type, actual),
            })
        }
    }
    datavalue
        .get("value")
        .map(Some)
        .ok_or_else(|| EntityError::MalformedSnak {
            id: id.to_owned(),
            property: property.to_owned(),
            reason: "data value without a value".to_owned(),
        })
}

/// Item-entity id carried by a wikibase-entityid value, if well-formed.
fn entity_id_of(value: &Value) -> Option<&str> {
    if value.get("entity-type").and_then(|v| v.as_str()) != Some("item") {
        return None;
    }
    value.get("id").and_then(|v| v.as_str())
}

/// Per-line decoder for the Wikidata dump.
pub struct WikidataEntityParser {
    whitelisted_wikis: Option<HashSet<String>>,
}

impl WikidataEntityParser {
    pub fn new(whitelisted_wikis: Option<HashSet<String>>) -> Self {
        WikidataEntityParser { whitelisted_wikis }
    }

    /// Decode one dump line. Property lines yield None.
    pub fn parse_line(&self, line: &str) -> Result<Option<WikidataEntity>, EntityError> {
        let value: Value = serde_json::from_str(line)?;
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_owned();
        let line_type = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EntityError::MissingField {
                id: id.clone(),
                field: "type",
            })?;
        if line_type == "property" {
            return Ok(None);
        }
        if line_type != "item" {
            return Err(EntityError::UnexpectedType {
                id,
                line_type: line_type.to_owned(),
            });
        }
        if !CONCEPT_ID.is_match(&id) {
            return Err(EntityError::BadConceptId { id });
        }

        let sitelinks = value
            .get("sitelinks")
            .and_then(|v| v.as_object())
            .ok_or_else(|| EntityError::MissingField {
                id: id.clone(),
                field: "sitelinks",
            })?;
        let mut titles_by_wiki = FnvHashMap::default();
        for (wiki, sitelink) in sitelinks {
            if let Some(whitelist) = &self.whitelisted_wikis {
                if !whitelist.contains(wiki) {
                    continue;
                }
            }
            let title = sitelink
                .get("title")
                .and_then(|v| v.as_str())
                .ok_or_else(|| EntityError::MissingField {
                    id: id.clone(),
                    field: "sitelinks.title",
                })?;
            titles_by_wiki.insert(wiki.clone(), title.to_owned());
        }

        let sample_label = extract_label(&value);

        let empty = Value::Object(serde_json::Map::new());
        let claims = value.get("claims").unwrap_or(&empty);

        let sample_coord = self.parse_globe_coordinate(claims, &id)?;
        let country_of_origin = self.parse_country_of_origin(claims, &id)?;
        let publication_date = self.parse_publication_date(claims, &id)?;
        let direct_instance_of = self.parse_entity_set(claims, INSTANCE_OF, &id)?;
        let direct_subclass_of = self.parse_entity_set(claims, SUBCLASS_OF, &id)?;

        Ok(Some(WikidataEntity {
            id,
            sample_label,
            sample_coord,
            publication_date,
            country_of_origin,
            titles_by_wiki,
            direct_instance_of,
            direct_subclass_of,
        }))
    }

    fn parse_globe_coordinate(
        &self,
        claims: &Value,
        id: &str,
    ) -> Result<Option<GlobeCoord>, EntityError> {
        let claim = match claims.get(COORDINATE).and_then(|v| v.as_array()) {
            Some(list) => match list.first() {
                Some(claim) => claim,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let value = match snak_value(claim, "globecoordinate", id, COORDINATE)? {
            Some(value) => value,
            None => return Ok(None),
        };
        let latitude = value
            .get("latitude")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| EntityError::MalformedSnak {
                id: id.to_owned(),
                property: COORDINATE.to_owned(),
                reason: "globe coordinate without a latitude".to_owned(),
            })?;
        let longitude = value
            .get("longitude")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| EntityError::MalformedSnak {
                id: id.to_owned(),
                property: COORDINATE.to_owned(),
                reason: "globe coordinate without a longitude".to_owned(),
            })?;
        Ok(Some(GlobeCoord {
            latitude,
            longitude,
            altitude: value.get("altitude").and_then(|v| v.as_f64()),
            precision: value.get("precision").and_then(|v| v.as_f64()),
        }))
    }

    fn parse_country_of_origin(
        &self,
        claims: &Value,
        id: &str,
    ) -> Result<Option<String>, EntityError> {
        let claim = match claims.get(COUNTRY_OF_ORIGIN).and_then(|v| v.as_array()) {
            Some(list) => match list.first() {
                Some(claim) => claim,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        let value = match snak_value(claim, "wikibase-entityid", id, COUNTRY_OF_ORIGIN)? {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(entity_id_of(value).map(|country| country.to_owned()))
    }

    /// Minimum parseable time across the publication-date claims.
    fn parse_publication_date(&self, claims: &Value, id: &str) -> Result<Option<i64>, EntityError> {
        let list = match claims.get(PUBLICATION_DATE).and_then(|v| v.as_array()) {
            Some(list) => list,
            None => return Ok(None),
        };
        let mut earliest: Option<i64> = None;
        for claim in list {
            if let Some(value) = snak_value(claim, "time", id, PUBLICATION_DATE)? {
                if let Some(timestamp) = time::parse_time_value(value) {
                    earliest = Some(match earliest {
                        Some(current) => current.min(timestamp),
                        None => timestamp,
                    });
                }
            }
        }
        Ok(earliest)
    }

    fn parse_entity_set(
        &self,
        claims: &Value,
        property: &str,
        id: &str,
    ) -> Result<BTreeSet<String>, EntityError> {
        let mut set = BTreeSet::new();
        let list = match claims.get(property).and_then(|v| v.as_array()) {
            Some(list) => list,
            None => return Ok(set),
        };
        for claim in list {
            if let Some(value) = snak_value(claim, "wikibase-entityid", id, property)? {
                if let Some(target) = entity_id_of(value) {
                    set.insert(target.to_owned());
                }
            }
        }
        Ok(set)
    }
}

/// The English label, or failing that the first label available.
fn extract_label(value: &Value) -> Option<String> {
    let labels = value.get("labels")?.as_object()?;
    if let Some(label) = labels
        .get("en")
        .and_then(|l| l.get("value"))
        .and_then(|v| v.as_str())
    {
        return Some(label.to_owned());
    }
    labels
        .values()
        .filter_map(|l| l.get("value").and_then(|v| v.as_str()))
        .next()
        .map(|label| label.to_owned())
}
