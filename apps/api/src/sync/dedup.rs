//! Entry classification: validation, duplicate detection and id repair.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::diary::DiaryEntry;
use crate::store::parse_entry;

/// Characters of `event` that take part in the composite key.
pub const EVENT_PREFIX_CHARS: usize = 50;

/// `"{date}_{emotion}_{event prefix}"` identifies near-duplicates when ids are unreliable.
pub fn composite_key(entry: &DiaryEntry) -> String {
    let prefix: String = entry.event.chars().take(EVENT_PREFIX_CHARS).collect();
    format!("{}_{}_{}", entry.date, entry.emotion, prefix)
}

/// Hyphenated RFC 4122 UUID with version 1–5 and the RFC variant, any letter case.
pub fn is_rfc4122_uuid(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    match Uuid::parse_str(id) {
        Ok(uuid) => {
            matches!(uuid.get_version_num(), 1..=5)
                && uuid.get_variant() == uuid::Variant::RFC4122
        }
        Err(_) => false,
    }
}

/// Ids and composite keys already uploaded by this process.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    ids: HashSet<String>,
    keys: HashSet<String>,
    key_by_id: HashMap<String, String>,
}

impl ProcessedSet {
    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn record(&mut self, id: &str, key: &str) {
        self.ids.insert(id.to_string());
        self.keys.insert(key.to_string());
        self.key_by_id.insert(id.to_string(), key.to_string());
    }

    /// Forgets an id and the composite key it was uploaded under, so a
    /// re-created entry with the same id counts as new. Other ids recorded
    /// under that key (a repaired entry's old id) are forgotten with it.
    pub fn forget_id(&mut self, id: &str) {
        self.ids.remove(id);
        let Some(key) = self.key_by_id.remove(id) else {
            return;
        };
        self.keys.remove(&key);
        let aliases: Vec<String> = self
            .key_by_id
            .iter()
            .filter(|(_, k)| **k == key)
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in aliases {
            self.key_by_id.remove(&alias);
            self.ids.remove(&alias);
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.keys.clear();
        self.key_by_id.clear();
    }

    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

/// An entry that survived classification and will be uploaded.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entry: DiaryEntry,
    pub key: String,
    /// Id sent to the backend: the entry's own id, or a fresh one if it was malformed.
    pub upload_id: Uuid,
    pub repaired: bool,
}

#[derive(Debug, Default)]
pub struct Classification {
    pub candidates: Vec<Candidate>,
    pub invalid: usize,
    pub duplicates: usize,
    pub already_processed: usize,
}

impl Classification {
    pub fn repaired(&self) -> usize {
        self.candidates.iter().filter(|c| c.repaired).count()
    }
}

/// Walks the stored records in order. First occurrence of a composite key
/// or of an id wins; ids compare case-insensitively, as the backend does.
pub fn classify(values: &[Value], processed: &ProcessedSet) -> Classification {
    let mut result = Classification::default();
    let mut seen_keys = HashSet::new();
    let mut seen_ids = HashSet::new();

    for (index, value) in values.iter().enumerate() {
        let Some(entry) = parse_entry(value) else {
            warn!("Skipping stored record #{index}: not a diary object");
            result.invalid += 1;
            continue;
        };
        if let Some(missing) = missing_field(&entry) {
            warn!("Skipping stored record #{index} (id '{}'): no {missing}", entry.id);
            result.invalid += 1;
            continue;
        }

        let key = composite_key(&entry);
        let id_token = entry.id.to_ascii_lowercase();
        if seen_keys.contains(&key) || seen_ids.contains(&id_token) {
            debug!("Skipping duplicate entry {}: {key}", entry.id);
            result.duplicates += 1;
            continue;
        }
        if processed.contains_key(&key) || processed.contains_id(&entry.id) {
            debug!("Skipping already processed entry {}", entry.id);
            result.already_processed += 1;
            continue;
        }
        seen_keys.insert(key.clone());
        seen_ids.insert(id_token);

        let (upload_id, repaired) = if is_rfc4122_uuid(&entry.id) {
            match Uuid::parse_str(&entry.id) {
                Ok(id) => (id, false),
                Err(_) => (Uuid::new_v4(), true),
            }
        } else {
            let fresh = Uuid::new_v4();
            warn!("Entry id '{}' is not a valid UUID, uploading as {fresh}", entry.id);
            (fresh, true)
        };

        result.candidates.push(Candidate {
            entry,
            key,
            upload_id,
            repaired,
        });
    }

    result
}

fn missing_field(entry: &DiaryEntry) -> Option<&'static str> {
    if entry.id.is_empty() {
        Some("id")
    } else if entry.date.is_empty() {
        Some("date")
    } else if entry.emotion.is_empty() {
        Some("emotion")
    } else {
        None
    }
}
