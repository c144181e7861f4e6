/// Local card store.
///
/// Keeps the card set in memory and, when opened on a file, mirrors it to a
/// JSON document with:
/// - Atomic writes (write to .tmp, fsync, rename, fsync directory)
/// - Copy-then-swap mutations: memory only changes after the file write
///   succeeded, so a failed batch leaves no trace
/// - A single write mutex serializing mutations
/// - SHA-256 content hashing to skip writes that change nothing
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{CardStorage, StorageError, UpdatedCard};
use crate::config::BoardColumns;
use crate::planner::{plan_move, DragMove};
use crate::position::{apply_assignment, column_sequence, densify_all, densify_column, normalize};
use crate::types::{Card, CardPatch, NewCard, ReorderRequest};

struct StoreState {
    cards: Vec<Card>,
    /// SHA-256 of the last serialized card set
    content_hash: String,
    version: u64,
}

pub struct LocalCardStore {
    file_path: Option<PathBuf>,
    columns: BoardColumns,
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
}

impl LocalCardStore {
    /// A store that lives only as long as the process.
    pub fn in_memory(columns: BoardColumns) -> Self {
        Self::with_cards(None, columns, Vec::new())
    }

    /// Open (or prepare to create) a store backed by `file_path`.
    /// Cards on disk that break column membership or density are repaired
    /// in memory; the repair reaches disk with the next write.
    pub fn open(file_path: &Path, columns: BoardColumns) -> Result<Self, StorageError> {
        let mut cards: Vec<Card> = match fs::read_to_string(file_path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    target: "taskboard.store",
                    "No card file at {}, starting empty",
                    file_path.display()
                );
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        if repair_positions(&mut cards, &columns) {
            log::warn!(
                target: "taskboard.store",
                "Repaired card positions loaded from {}",
                file_path.display()
            );
        }

        Ok(Self::with_cards(
            Some(file_path.to_path_buf()),
            columns,
            cards,
        ))
    }

    fn with_cards(file_path: Option<PathBuf>, columns: BoardColumns, mut cards: Vec<Card>) -> Self {
        sort_cards(&mut cards, &columns);
        let content_hash = serde_json::to_string_pretty(&cards)
            .map(|s| Self::hash_content(&s))
            .unwrap_or_default();
        Self {
            file_path,
            columns,
            state: RwLock::new(StoreState {
                cards,
                content_hash,
                version: 1,
            }),
            write_lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` on a copy of the cards, persist the result, then swap it in.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<Card>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let (mut cards, current_hash) = {
            let state = self.read_state();
            (state.cards.clone(), state.content_hash.clone())
        };

        let out = f(&mut cards)?;
        sort_cards(&mut cards, &self.columns);

        let serialized = serde_json::to_string_pretty(&cards)?;
        let content_hash = Self::hash_content(&serialized);
        if content_hash == current_hash {
            log::debug!(target: "taskboard.store", "Write skipped, content unchanged");
            return Ok(out);
        }

        if let Some(path) = &self.file_path {
            Self::atomic_write(path, &serialized)?;
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.cards = cards;
        state.content_hash = content_hash;
        state.version += 1;
        Ok(out)
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let tmp_path = path.with_extension("taskboard.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        // fsync directory for rename durability
        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

impl CardStorage for LocalCardStore {
    fn columns(&self) -> &BoardColumns {
        &self.columns
    }

    fn list_cards(&self) -> Vec<Card> {
        self.read_state().cards.clone()
    }

    fn get_card(&self, card_id: &str) -> Option<Card> {
        self.read_state()
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
    }

    fn version(&self) -> u64 {
        self.read_state().version
    }

    fn content_hash(&self) -> String {
        self.read_state().content_hash.clone()
    }

    fn create_card(&self, new_card: NewCard) -> Result<Card, StorageError> {
        let column_id = new_card.validate(&self.columns)?;
        let card = self.mutate(|cards| {
            let order = cards.iter().filter(|c| c.column_id == column_id).count() as u32;
            let card = new_card.into_card(Uuid::new_v4().to_string(), column_id.clone(), order);
            cards.push(card.clone());
            Ok(card)
        })?;
        log::info!(
            target: "taskboard.store",
            "Created card {} in {} at {}",
            card.id,
            card.column_id,
            card.order
        );
        Ok(card)
    }

    fn update_card(&self, card_id: &str, patch: &CardPatch) -> Result<UpdatedCard, StorageError> {
        self.mutate(|cards| {
            let current = cards
                .iter()
                .find(|c| c.id == card_id)
                .cloned()
                .ok_or_else(|| StorageError::CardNotFound(card_id.to_string()))?;

            let target = patch.validate(&current, &self.columns)?;

            let mut repositioned = false;
            if let Some((column_id, index)) = target {
                let drag = DragMove::new(card_id, &current.column_id, &column_id, index);
                let plan = plan_move(cards, &drag)
                    .map_err(|_| StorageError::CardNotFound(card_id.to_string()))?;
                if let Some(plan) = plan {
                    let before = cards.clone();
                    for assignment in plan.assignments() {
                        apply_assignment(cards, assignment);
                    }
                    stamp_moved(&before, cards);
                    repositioned = true;
                }
            }

            let card = cards
                .iter_mut()
                .find(|c| c.id == card_id)
                .ok_or_else(|| StorageError::CardNotFound(card_id.to_string()))?;
            patch.apply_content(card);
            Ok(UpdatedCard {
                card: card.clone(),
                repositioned,
            })
        })
    }

    fn delete_card(&self, card_id: &str) -> Result<Card, StorageError> {
        let removed = self.mutate(|cards| {
            let index = cards
                .iter()
                .position(|c| c.id == card_id)
                .ok_or_else(|| StorageError::CardNotFound(card_id.to_string()))?;
            let removed = cards.remove(index);
            let before = cards.clone();
            densify_column(cards, &removed.column_id);
            stamp_moved(&before, cards);
            Ok(removed)
        })?;
        log::info!(
            target: "taskboard.store",
            "Deleted card {} from {}",
            removed.id,
            removed.column_id
        );
        Ok(removed)
    }

    fn commit_order(&self, request: &ReorderRequest) -> Result<usize, StorageError> {
        request.validate(&self.columns)?;
        let column_id = &request.column_id;

        let changed = self.mutate(|cards| {
            let missing: Vec<String> = request
                .card_ids
                .iter()
                .filter(|id| !cards.iter().any(|c| &c.id == *id))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(StorageError::StaleReference {
                    column_id: column_id.clone(),
                    missing,
                });
            }

            // Columns that give up a card to this one must be re-ranked too.
            let mut left: Vec<String> = cards
                .iter()
                .filter(|c| request.card_ids.contains(&c.id) && &c.column_id != column_id)
                .map(|c| c.column_id.clone())
                .collect();
            left.sort();
            left.dedup();

            // Cards still in the column but not listed keep their place after the listed ones.
            let mut sequence = request.card_ids.clone();
            for id in column_sequence(cards, column_id) {
                if !request.card_ids.contains(&id) {
                    sequence.push(id);
                }
            }
            if sequence.len() > request.card_ids.len() {
                log::warn!(
                    target: "taskboard.store",
                    "Reorder of {} omitted {} cards still in the column",
                    column_id,
                    sequence.len() - request.card_ids.len()
                );
            }

            let before = cards.clone();
            apply_assignment(cards, &normalize(column_id, &sequence));
            for other in &left {
                densify_column(cards, other);
            }
            Ok(stamp_moved(&before, cards))
        })?;

        log::info!(
            target: "taskboard.store",
            "Committed order of {} ({} cards, {} moved)",
            column_id,
            request.card_ids.len(),
            changed
        );
        Ok(changed)
    }
}

fn sort_cards(cards: &mut [Card], columns: &BoardColumns) {
    cards.sort_by(|a, b| {
        columns
            .position(&a.column_id)
            .cmp(&columns.position(&b.column_id))
            .then_with(|| a.column_id.cmp(&b.column_id))
            .then_with(|| a.order.cmp(&b.order))
    });
}

/// Set `updated_at` on every card whose position differs from `before`.
/// Returns how many cards moved.
fn stamp_moved(before: &[Card], after: &mut [Card]) -> usize {
    let now = Utc::now();
    let mut moved = 0;
    for card in after.iter_mut() {
        let unchanged = before
            .iter()
            .any(|b| b.id == card.id && b.column_id == card.column_id && b.order == card.order);
        if !unchanged {
            card.updated_at = now;
            moved += 1;
        }
    }
    moved
}

/// Bring loaded cards back under the position rules: unknown columns are
/// folded into the first configured column, every column is re-ranked.
fn repair_positions(cards: &mut [Card], columns: &BoardColumns) -> bool {
    let mut repaired = false;
    if let Some(fallback) = columns.first() {
        for card in cards.iter_mut() {
            if !columns.contains(&card.column_id) {
                log::warn!(
                    target: "taskboard.store",
                    "Card {} references unknown column {}, moving to {}",
                    card.id,
                    card.column_id,
                    fallback.id
                );
                card.column_id = fallback.id.clone();
                card.order = u32::MAX;
                repaired = true;
            }
        }
    }
    repaired |= densify_all(cards);
    repaired
}
