//! # redb-backed Entity Store
//!
//! A disk-backed entity store using the redb embedded database.
//!
//! Every mutation runs in its own write transaction, so a failed upsert or a
//! rejected link leaves the file untouched. Rows are postcard-encoded; link
//! types are stored as their display labels so the file stays readable by
//! other tools.
//!
//! The uniqueness indexes and id counters are cached in memory and rebuilt on
//! open.

use super::{EntityStore, cre_conflict, standard_conflict};
use crate::{
    CreDraft, CreId, CreRecord, CregraphError, ExternalLinkRow, InternalLinkRow, LinkType,
    StandardDraft, StandardId, StandardRecord,
};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

type RowTable = TableDefinition<'static, u64, &'static [u8]>;
type LinkTable = TableDefinition<'static, (u64, u64), &'static str>;

/// CRE rows: CreId(u64) -> postcard `CreRecord`
const CRES: RowTable = TableDefinition::new("cres");

/// Standard rows: StandardId(u64) -> postcard `StandardRecord`
const STANDARDS: RowTable = TableDefinition::new("standards");

/// Internal links: (group, member) -> link type label
const INTERNAL_LINKS: LinkTable = TableDefinition::new("internal_links");

/// External links: (cre, standard) -> link type label
const EXTERNAL_LINKS: LinkTable = TableDefinition::new("external_links");

/// Metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_CRE_ID: &str = "next_cre_id";
const NEXT_STANDARD_ID: &str = "next_standard_id";

type StandardKey = (String, String, String);

fn io<E: Display>(e: E) -> CregraphError {
    CregraphError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CregraphError> {
    postcard::to_allocvec(value).map_err(|e| CregraphError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CregraphError> {
    postcard::from_bytes(bytes).map_err(|e| CregraphError::DeserializationError(e.to_string()))
}

fn decode_link_type(label: &str) -> Result<LinkType, CregraphError> {
    label
        .parse()
        .map_err(|_| CregraphError::DeserializationError(format!("bad link type '{label}'")))
}

/// A disk-backed entity store.
pub struct RedbStore {
    db: Database,
    /// (name, external_id) -> CreId
    cre_keys: BTreeMap<(String, String), CreId>,
    /// (name, section, subsection) -> StandardId
    standard_keys: BTreeMap<StandardKey, StandardId>,
    next_cre_id: u64,
    next_standard_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("cres", &self.cre_keys.len())
            .field("standards", &self.standard_keys.len())
            .field("next_cre_id", &self.next_cre_id)
            .field("next_standard_id", &self.next_standard_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CregraphError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            let _ = write_txn.open_table(CRES).map_err(io)?;
            let _ = write_txn.open_table(STANDARDS).map_err(io)?;
            let _ = write_txn.open_table(INTERNAL_LINKS).map_err(io)?;
            let _ = write_txn.open_table(EXTERNAL_LINKS).map_err(io)?;
            let _ = write_txn.open_table(METADATA).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        let read_txn = db.begin_read().map_err(io)?;

        let (next_cre_id, next_standard_id) = {
            let table = read_txn.open_table(METADATA).map_err(io)?;
            let cre = table.get(NEXT_CRE_ID).map_err(io)?.map(|v| v.value());
            let standard = table.get(NEXT_STANDARD_ID).map_err(io)?.map(|v| v.value());
            (cre.unwrap_or(1), standard.unwrap_or(1))
        };

        let cre_keys = {
            let table = read_txn.open_table(CRES).map_err(io)?;
            let mut keys = BTreeMap::new();
            for entry in table.iter().map_err(io)? {
                let (_, value) = entry.map_err(io)?;
                let record: CreRecord = decode(value.value())?;
                keys.insert((record.name, record.external_id), record.id);
            }
            keys
        };

        let standard_keys = {
            let table = read_txn.open_table(STANDARDS).map_err(io)?;
            let mut keys = BTreeMap::new();
            for entry in table.iter().map_err(io)? {
                let (_, value) = entry.map_err(io)?;
                let record: StandardRecord = decode(value.value())?;
                keys.insert(
                    (record.name, record.section, record.subsection),
                    record.id,
                );
            }
            keys
        };

        tracing::debug!(
            cres = cre_keys.len(),
            standards = standard_keys.len(),
            "opened redb store"
        );

        Ok(Self {
            db,
            cre_keys,
            standard_keys,
            next_cre_id,
            next_standard_id,
        })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), CregraphError> {
        self.db.compact().map_err(io)?;
        Ok(())
    }

    fn write_row(
        &self,
        table: RowTable,
        id: u64,
        bytes: &[u8],
        next_id: Option<(&str, u64)>,
    ) -> Result<(), CregraphError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut rows = write_txn.open_table(table).map_err(io)?;
            rows.insert(id, bytes).map_err(io)?;
        }
        if let Some((key, value)) = next_id {
            let mut meta = write_txn.open_table(METADATA).map_err(io)?;
            meta.insert(key, value).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn read_row<T: DeserializeOwned>(
        &self,
        table: RowTable,
        id: u64,
    ) -> Result<Option<T>, CregraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let rows = read_txn.open_table(table).map_err(io)?;
        match rows.get(id).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn read_rows<T: DeserializeOwned>(
        &self,
        table: RowTable,
    ) -> Result<Vec<T>, CregraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let rows = read_txn.open_table(table).map_err(io)?;
        let mut out = Vec::new();
        for entry in rows.iter().map_err(io)? {
            let (_, value) = entry.map_err(io)?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn read_links(
        &self,
        table: LinkTable,
        first: Option<u64>,
    ) -> Result<Vec<(u64, u64, LinkType)>, CregraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let links = read_txn.open_table(table).map_err(io)?;
        let mut out = Vec::new();
        let iter = match first {
            Some(id) => links.range((id, 0u64)..=(id, u64::MAX)).map_err(io)?,
            None => links.iter().map_err(io)?,
        };
        for entry in iter {
            let (key, value) = entry.map_err(io)?;
            let (a, b) = key.value();
            out.push((a, b, decode_link_type(value.value())?));
        }
        Ok(out)
    }

    fn read_link(
        &self,
        table: LinkTable,
        key: (u64, u64),
    ) -> Result<Option<LinkType>, CregraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let links = read_txn.open_table(table).map_err(io)?;
        match links.get(key).map_err(io)? {
            Some(label) => Ok(Some(decode_link_type(label.value())?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// ENTITYSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl EntityStore for RedbStore {
    fn insert_cre(&mut self, draft: &CreDraft) -> Result<CreRecord, CregraphError> {
        let external_id = draft.external_id.clone().unwrap_or_default();
        let key = (draft.name.clone(), external_id.clone());
        if self.cre_keys.contains_key(&key) {
            return Err(cre_conflict(&draft.name, &external_id));
        }

        let record = CreRecord {
            id: CreId(self.next_cre_id),
            external_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            tags: draft.tags.clone(),
        };
        let next_id = self.next_cre_id.saturating_add(1);
        self.write_row(
            CRES,
            record.id.0,
            &encode(&record)?,
            Some((NEXT_CRE_ID, next_id)),
        )?;

        // Update caches only after a successful commit.
        self.next_cre_id = next_id;
        self.cre_keys.insert(key, record.id);
        Ok(record)
    }

    fn update_cre(&mut self, record: &CreRecord) -> Result<(), CregraphError> {
        let Some(previous) = self.cre(record.id)? else {
            return Err(CregraphError::NotFound(format!("CRE row {}", record.id.0)));
        };
        let key = (record.name.clone(), record.external_id.clone());
        if self.cre_keys.get(&key).is_some_and(|&id| id != record.id) {
            return Err(cre_conflict(&record.name, &record.external_id));
        }

        self.write_row(CRES, record.id.0, &encode(record)?, None)?;

        self.cre_keys
            .remove(&(previous.name, previous.external_id));
        self.cre_keys.insert(key, record.id);
        Ok(())
    }

    fn cre(&self, id: CreId) -> Result<Option<CreRecord>, CregraphError> {
        self.read_row(CRES, id.0)
    }

    fn cres(&self) -> Result<Vec<CreRecord>, CregraphError> {
        self.read_rows(CRES)
    }

    fn insert_standard(&mut self, draft: &StandardDraft) -> Result<StandardRecord, CregraphError> {
        let key = (
            draft.name.clone(),
            draft.section.clone(),
            draft.subsection.clone(),
        );
        if self.standard_keys.contains_key(&key) {
            return Err(standard_conflict(
                &draft.name,
                &draft.section,
                &draft.subsection,
            ));
        }

        let record = StandardRecord {
            id: StandardId(self.next_standard_id),
            name: draft.name.clone(),
            section: draft.section.clone(),
            subsection: draft.subsection.clone(),
            version: draft.version.clone(),
            link: draft.hyperlink.clone(),
            tags: draft.tags.clone(),
        };
        let next_id = self.next_standard_id.saturating_add(1);
        self.write_row(
            STANDARDS,
            record.id.0,
            &encode(&record)?,
            Some((NEXT_STANDARD_ID, next_id)),
        )?;

        self.next_standard_id = next_id;
        self.standard_keys.insert(key, record.id);
        Ok(record)
    }

    fn update_standard(&mut self, record: &StandardRecord) -> Result<(), CregraphError> {
        let Some(previous) = self.standard(record.id)? else {
            return Err(CregraphError::NotFound(format!(
                "Standard row {}",
                record.id.0
            )));
        };
        let key = (
            record.name.clone(),
            record.section.clone(),
            record.subsection.clone(),
        );
        if self
            .standard_keys
            .get(&key)
            .is_some_and(|&id| id != record.id)
        {
            return Err(standard_conflict(
                &record.name,
                &record.section,
                &record.subsection,
            ));
        }

        self.write_row(STANDARDS, record.id.0, &encode(record)?, None)?;

        self.standard_keys
            .remove(&(previous.name, previous.section, previous.subsection));
        self.standard_keys.insert(key, record.id);
        Ok(())
    }

    fn standard(&self, id: StandardId) -> Result<Option<StandardRecord>, CregraphError> {
        self.read_row(STANDARDS, id.0)
    }

    fn standards(&self) -> Result<Vec<StandardRecord>, CregraphError> {
        self.read_rows(STANDARDS)
    }

    fn put_internal_link(&mut self, row: InternalLinkRow) -> Result<(), CregraphError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let cres = write_txn.open_table(CRES).map_err(io)?;
            for id in [row.group, row.member] {
                if cres.get(id.0).map_err(io)?.is_none() {
                    return Err(CregraphError::NotFound(format!("CRE row {}", id.0)));
                }
            }
        }
        {
            let mut links = write_txn.open_table(INTERNAL_LINKS).map_err(io)?;
            links
                .insert((row.group.0, row.member.0), row.link_type.as_str())
                .map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn internal_link(
        &self,
        group: CreId,
        member: CreId,
    ) -> Result<Option<LinkType>, CregraphError> {
        self.read_link(INTERNAL_LINKS, (group.0, member.0))
    }

    fn internal_links(&self) -> Result<Vec<InternalLinkRow>, CregraphError> {
        Ok(self
            .read_links(INTERNAL_LINKS, None)?
            .into_iter()
            .map(|(group, member, link_type)| InternalLinkRow {
                group: CreId(group),
                member: CreId(member),
                link_type,
            })
            .collect())
    }

    fn put_external_link(&mut self, row: ExternalLinkRow) -> Result<(), CregraphError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let cres = write_txn.open_table(CRES).map_err(io)?;
            if cres.get(row.cre.0).map_err(io)?.is_none() {
                return Err(CregraphError::NotFound(format!("CRE row {}", row.cre.0)));
            }
            let standards = write_txn.open_table(STANDARDS).map_err(io)?;
            if standards.get(row.standard.0).map_err(io)?.is_none() {
                return Err(CregraphError::NotFound(format!(
                    "Standard row {}",
                    row.standard.0
                )));
            }
        }
        {
            let mut links = write_txn.open_table(EXTERNAL_LINKS).map_err(io)?;
            links
                .insert((row.cre.0, row.standard.0), row.link_type.as_str())
                .map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn external_link(
        &self,
        cre: CreId,
        standard: StandardId,
    ) -> Result<Option<LinkType>, CregraphError> {
        self.read_link(EXTERNAL_LINKS, (cre.0, standard.0))
    }

    fn external_links(&self) -> Result<Vec<ExternalLinkRow>, CregraphError> {
        Ok(self
            .read_links(EXTERNAL_LINKS, None)?
            .into_iter()
            .map(|(cre, standard, link_type)| ExternalLinkRow {
                cre: CreId(cre),
                standard: StandardId(standard),
                link_type,
            })
            .collect())
    }

    fn external_links_of_cre(&self, cre: CreId) -> Result<Vec<ExternalLinkRow>, CregraphError> {
        Ok(self
            .read_links(EXTERNAL_LINKS, Some(cre.0))?
            .into_iter()
            .map(|(cre, standard, link_type)| ExternalLinkRow {
                cre: CreId(cre),
                standard: StandardId(standard),
                link_type,
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let a = store
            .insert_cre(&CreDraft::new("Authentication", Some("123-456")))
            .expect("insert");
        let b = store
            .insert_cre(&CreDraft::new("Session", Some("234-567")))
            .expect("insert");
        assert_ne!(a.id, b.id);
        assert_eq!(store.cres().expect("cres").len(), 2);

        store
            .put_internal_link(InternalLinkRow {
                group: a.id,
                member: b.id,
                link_type: LinkType::Contains,
            })
            .expect("link");
        assert_eq!(
            store.internal_link(a.id, b.id).expect("get"),
            Some(LinkType::Contains)
        );
    }

    #[test]
    fn uniqueness_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store
                .insert_cre(&CreDraft::new("Auth", Some("123-456")))
                .expect("insert");
            store
                .insert_standard(&StandardDraft::new("ASVS", "V1").with_subsection("1.1"))
                .expect("insert");
        }

        {
            let mut store = RedbStore::open(&db_path).expect("reopen db");
            let err = store
                .insert_cre(&CreDraft::new("Auth", Some("123-456")))
                .expect_err("duplicate");
            assert!(matches!(err, CregraphError::Conflict(_)));
            let err = store
                .insert_standard(&StandardDraft::new("ASVS", "V1").with_subsection("1.1"))
                .expect_err("duplicate");
            assert!(matches!(err, CregraphError::Conflict(_)));
        }
    }

    #[test]
    fn recovery_next_ids_preserved() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let last;
        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store.insert_cre(&CreDraft::new("A", Some("1"))).expect("a");
            last = store.insert_cre(&CreDraft::new("B", Some("2"))).expect("b");
        }
        {
            let mut store = RedbStore::open(&db_path).expect("reopen db");
            let next = store.insert_cre(&CreDraft::new("C", Some("3"))).expect("c");
            assert!(next.id.0 > last.id.0);
        }
    }

    #[test]
    fn update_moves_uniqueness_key() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let mut cre = store
            .insert_cre(&CreDraft::new("Auth", None).with_description("login"))
            .expect("insert");
        cre.external_id = "123-456".to_string();
        store.update_cre(&cre).expect("update");

        // The old (name, "") key is free again.
        store
            .insert_cre(&CreDraft::new("Auth", None))
            .expect("insert");
        let err = store
            .insert_cre(&CreDraft::new("Auth", Some("123-456")))
            .expect_err("duplicate");
        assert!(matches!(err, CregraphError::Conflict(_)));
    }

    #[test]
    fn link_rows_require_existing_endpoints() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let cre = store.insert_cre(&CreDraft::new("A", Some("1"))).expect("a");

        let err = store
            .put_external_link(ExternalLinkRow {
                cre: cre.id,
                standard: StandardId(99),
                link_type: LinkType::Same,
            })
            .expect_err("dangling");
        assert!(matches!(err, CregraphError::NotFound(_)));
        assert!(store.external_links().expect("links").is_empty());
    }

    #[test]
    fn external_links_range_by_cre() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let a = store.insert_cre(&CreDraft::new("A", Some("1"))).expect("a");
        let b = store.insert_cre(&CreDraft::new("B", Some("2"))).expect("b");
        let s1 = store
            .insert_standard(&StandardDraft::new("ASVS", "V1"))
            .expect("s1");
        let s2 = store
            .insert_standard(&StandardDraft::new("ASVS", "V2"))
            .expect("s2");

        for (cre, standard) in [(a.id, s1.id), (a.id, s2.id), (b.id, s2.id)] {
            store
                .put_external_link(ExternalLinkRow {
                    cre,
                    standard,
                    link_type: LinkType::Same,
                })
                .expect("link");
        }

        assert_eq!(store.external_links_of_cre(a.id).expect("of a").len(), 2);
        assert_eq!(store.external_links_of_cre(b.id).expect("of b").len(), 1);
        assert_eq!(
            store
                .external_links_of_standard(s2.id)
                .expect("of s2")
                .len(),
            2
        );
    }

    #[test]
    fn recovery_links_persist_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            let a = store.insert_cre(&CreDraft::new("A", Some("1"))).expect("a");
            let b = store.insert_cre(&CreDraft::new("B", Some("2"))).expect("b");
            store
                .put_internal_link(InternalLinkRow {
                    group: a.id,
                    member: b.id,
                    link_type: LinkType::Related,
                })
                .expect("link");
        }

        {
            let store = RedbStore::open(&db_path).expect("reopen db");
            let links = store.internal_links().expect("links");
            assert_eq!(links.len(), 1);
            assert_eq!(links[0].link_type, LinkType::Related);
        }
    }

    #[test]
    fn recovery_compact_and_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            for i in 0..50 {
                store
                    .insert_cre(&CreDraft::new(format!("CRE {i}"), Some(&i.to_string())))
                    .expect("insert");
            }
            store.compact().expect("compact");
        }

        {
            let store = RedbStore::open(&db_path).expect("reopen db");
            assert_eq!(store.cres().expect("cres").len(), 50);
        }
    }
}
