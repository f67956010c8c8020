//! # Document Projection
//!
//! The external shape of CREs and Standards: what queries return, what export
//! writes and what import reads back.
//!
//! ```json
//! {
//!   "doctype": "CRE",
//!   "name": "Authentication",
//!   "id": "123-456",
//!   "tags": ["identity"],
//!   "links": [
//!     { "ltype": "SAME", "document": { "doctype": "Standard", "name": "ASVS", "section": "V2" } }
//!   ]
//! }
//! ```
//!
//! Linked documents are shallow: they never carry links of their own.

use crate::primitives::split_tags;
use crate::{CreDraft, CreRecord, LinkType, StandardDraft, StandardRecord};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Accept tags as a list or as the legacy comma-joined string.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        Joined(String),
        List(BTreeSet<String>),
    }

    Ok(match Tags::deserialize(deserializer)? {
        Tags::Joined(raw) => split_tags(&raw),
        Tags::List(tags) => tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

/// A typed link to another (shallow) document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub ltype: LinkType,
    pub document: Document,
}

impl Link {
    #[must_use]
    pub fn new(ltype: LinkType, document: Document) -> Self {
        Self {
            ltype,
            document: document.shallow(),
        }
    }
}

/// CRE document body.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreDocument {
    pub name: String,
    /// External identifier, e.g. `123-456`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "deserialize_tags",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

/// Standard document body.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StandardDocument {
    pub name: String,
    #[serde(default)]
    pub section: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subsection: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hyperlink: String,
    #[serde(
        default,
        deserialize_with = "deserialize_tags",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

/// A CRE or Standard with its links.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "doctype")]
pub enum Document {
    #[serde(rename = "CRE")]
    Cre(CreDocument),
    #[serde(rename = "Standard")]
    Standard(StandardDocument),
}

impl Document {
    /// Project a CRE row, without links.
    #[must_use]
    pub fn from_cre(record: &CreRecord) -> Self {
        Self::Cre(CreDocument {
            name: record.name.clone(),
            id: record.external_id.clone(),
            description: record.description.clone(),
            tags: record.tags.clone(),
            links: Vec::new(),
        })
    }

    /// Project a Standard row, without links.
    #[must_use]
    pub fn from_standard(record: &StandardRecord) -> Self {
        Self::Standard(StandardDocument {
            name: record.name.clone(),
            section: record.section.clone(),
            subsection: record.subsection.clone(),
            version: record.version.clone(),
            hyperlink: record.link.clone(),
            tags: record.tags.clone(),
            links: Vec::new(),
        })
    }

    /// `"CRE"` or `"Standard"`.
    #[must_use]
    pub fn doctype(&self) -> &'static str {
        match self {
            Self::Cre(_) => "CRE",
            Self::Standard(_) => "Standard",
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Cre(cre) => &cre.name,
            Self::Standard(standard) => &standard.name,
        }
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        match self {
            Self::Cre(cre) => &cre.tags,
            Self::Standard(standard) => &standard.tags,
        }
    }

    #[must_use]
    pub fn links(&self) -> &[Link] {
        match self {
            Self::Cre(cre) => &cre.links,
            Self::Standard(standard) => &standard.links,
        }
    }

    fn links_mut(&mut self) -> &mut Vec<Link> {
        match self {
            Self::Cre(cre) => &mut cre.links,
            Self::Standard(standard) => &mut standard.links,
        }
    }

    /// Append a link unless an equal one is already present.
    pub fn add_link(&mut self, link: Link) -> bool {
        let links = self.links_mut();
        if links.contains(&link) {
            return false;
        }
        links.push(link);
        true
    }

    /// A copy without links.
    #[must_use]
    pub fn shallow(&self) -> Self {
        let mut copy = self.clone();
        copy.links_mut().clear();
        copy
    }

    /// Key used for Standards that nothing links to:
    /// `<name>-<section>:<subsection>:<version>`.
    #[must_use]
    pub fn standard_key(&self) -> Option<String> {
        match self {
            Self::Standard(s) => Some(format!(
                "{}-{}:{}:{}",
                s.name, s.section, s.subsection, s.version
            )),
            Self::Cre(_) => None,
        }
    }

    /// Upsert input for a CRE document.
    #[must_use]
    pub fn to_cre_draft(&self) -> Option<CreDraft> {
        match self {
            Self::Cre(cre) => Some(
                CreDraft::new(cre.name.clone(), Some(cre.id.as_str()))
                    .with_description(cre.description.clone())
                    .with_tags(cre.tags.iter().cloned()),
            ),
            Self::Standard(_) => None,
        }
    }

    /// Upsert input for a Standard document.
    #[must_use]
    pub fn to_standard_draft(&self) -> Option<StandardDraft> {
        match self {
            Self::Standard(s) => Some(
                StandardDraft::new(s.name.clone(), s.section.clone())
                    .with_subsection(s.subsection.clone())
                    .with_version(s.version.clone())
                    .with_hyperlink(s.hyperlink.clone())
                    .with_tags(s.tags.iter().cloned()),
            ),
            Self::Cre(_) => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CreId, StandardId};

    fn asvs() -> StandardRecord {
        StandardRecord {
            id: StandardId(1),
            name: "ASVS".to_string(),
            section: "V1".to_string(),
            subsection: "1.1".to_string(),
            version: "4.0".to_string(),
            link: "https://example.com/asvs".to_string(),
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn json_shape_uses_doctype_tag() {
        let mut doc = Document::from_cre(&CreRecord {
            id: CreId(1),
            external_id: "123-456".to_string(),
            name: "Authentication".to_string(),
            description: String::new(),
            tags: BTreeSet::from(["identity".to_string()]),
        });
        doc.add_link(Link::new(LinkType::Same, Document::from_standard(&asvs())));

        let value = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(value["doctype"], "CRE");
        assert_eq!(value["id"], "123-456");
        assert_eq!(value["links"][0]["ltype"], "SAME");
        assert_eq!(value["links"][0]["document"]["doctype"], "Standard");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn legacy_comma_tags_are_split() {
        let doc: Document = serde_json::from_str(
            r#"{"doctype":"Standard","name":"ASVS","section":"V1","tags":"crypto, session"}"#,
        )
        .expect("deserialize");
        assert_eq!(doc.tags().len(), 2);
        assert!(doc.tags().contains("session"));
    }

    #[test]
    fn add_link_skips_duplicates_and_links_are_shallow() {
        let standard = Document::from_standard(&asvs());
        let mut nested = standard.clone();
        nested.add_link(Link::new(LinkType::Related, standard.clone()));

        let mut doc = Document::Cre(CreDocument {
            name: "A".to_string(),
            ..CreDocument::default()
        });
        assert!(doc.add_link(Link::new(LinkType::Same, nested.clone())));
        assert!(!doc.add_link(Link::new(LinkType::Same, nested)));
        assert!(doc.add_link(Link::new(LinkType::Related, standard)));

        assert_eq!(doc.links().len(), 2);
        assert!(doc.links()[0].document.links().is_empty());
    }

    #[test]
    fn standard_key_format() {
        let doc = Document::from_standard(&asvs());
        assert_eq!(doc.standard_key().as_deref(), Some("ASVS-V1:1.1:4.0"));
        assert_eq!(doc.doctype(), "Standard");
    }
}
