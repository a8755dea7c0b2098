// 🧮 Split Engine - Item assignment state and per-participant totals
// Owns the receipt line items and participant list for one split session

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// DATA MODEL
// ============================================================================

/// One extracted line from a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    /// Item description as extracted (or "Total Amount" fallback)
    pub text: String,

    /// Non-negative price, currency minor-unit-agnostic
    pub price: f64,

    /// Shared items are divided evenly across all participants
    #[serde(default)]
    pub is_shared: bool,

    /// Participant ids this item is assigned to.
    /// Populated by equal split and external assignments, but total
    /// recomputation only looks at `is_shared` (flat even-split policy).
    #[serde(default)]
    pub assigned_to: Vec<String>,
}

impl ReceiptItem {
    pub fn new(text: &str, price: f64) -> Self {
        ReceiptItem {
            text: text.to_string(),
            price,
            is_shared: false,
            assigned_to: Vec::new(),
        }
    }
}

/// Someone the bill is split with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Session-scoped identity (UUID v4)
    pub id: String,

    pub name: String,

    /// Derived from the current item state, never authoritative
    #[serde(default)]
    pub total_amount: f64,
}

impl Participant {
    pub fn new(name: &str) -> Self {
        Participant {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            total_amount: 0.0,
        }
    }
}

/// Receipt-level metadata carried alongside the items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptMeta {
    pub vendor: String,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One item assignment produced by the smart-split service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub item_index: usize,
    pub is_shared: bool,
    pub assigned_to: Vec<String>,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Invalid-input failures. No mutation is performed when these are returned.
#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("participant name must not be empty")]
    EmptyName,

    #[error("add participants first")]
    NoParticipants,

    #[error("item index {index} out of range (have {len} items)")]
    ItemIndexOutOfRange { index: usize, len: usize },
}

// ============================================================================
// SPLIT SESSION
// ============================================================================

/// Ephemeral state for one split flow: items, participants, receipt meta.
/// Created when the user enters the split flow, discarded when they leave
/// or archive the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitSession {
    pub receipt: ReceiptMeta,
    pub items: Vec<ReceiptItem>,
    pub participants: Vec<Participant>,
}

impl SplitSession {
    pub fn new(receipt: ReceiptMeta, items: Vec<ReceiptItem>) -> Self {
        SplitSession {
            receipt,
            items,
            participants: Vec::new(),
        }
    }

    /// Flip the shared flag on one item and recompute all totals.
    pub fn toggle_shared(&mut self, item_index: usize) -> Result<(), SplitError> {
        let len = self.items.len();
        let item = self
            .items
            .get_mut(item_index)
            .ok_or(SplitError::ItemIndexOutOfRange {
                index: item_index,
                len,
            })?;

        item.is_shared = !item.is_shared;
        self.recompute_totals();
        Ok(())
    }

    /// Append a participant with a fresh id and a zero total.
    /// Blank names (empty after trimming) are rejected outright.
    pub fn add_participant(&mut self, name: &str) -> Result<&Participant, SplitError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SplitError::EmptyName);
        }

        self.participants.push(Participant::new(name));
        Ok(self.participants.last().unwrap())
    }

    /// Mark every item shared, assign it to everyone, and give each
    /// participant an even share of the grand total.
    pub fn apply_equal_split(&mut self) -> Result<(), SplitError> {
        if self.participants.is_empty() {
            return Err(SplitError::NoParticipants);
        }

        let all_ids: Vec<String> = self.participants.iter().map(|p| p.id.clone()).collect();
        for item in &mut self.items {
            item.is_shared = true;
            item.assigned_to = all_ids.clone();
        }

        let per_person = self.grand_total() / self.participants.len() as f64;
        for participant in &mut self.participants {
            participant.total_amount = per_person;
        }

        Ok(())
    }

    /// Recompute participant totals from the current item state.
    ///
    /// Only items flagged shared count; the shared subtotal is divided
    /// evenly across all participants. `assigned_to` is intentionally not
    /// consulted here - the split policy is the flat shared/individual
    /// toggle, not per-item allocation.
    pub fn recompute_totals(&mut self) {
        if self.participants.is_empty() {
            return;
        }

        let per_person = self.shared_subtotal() / self.participants.len() as f64;
        for participant in &mut self.participants {
            participant.total_amount = per_person;
        }
    }

    /// Apply assignments produced by the smart-split service.
    ///
    /// All-or-nothing: every index is validated before any item is touched,
    /// so one bad index rejects the whole batch.
    pub fn apply_assignments(&mut self, assignments: &[Assignment]) -> Result<(), SplitError> {
        let len = self.items.len();
        for assignment in assignments {
            if assignment.item_index >= len {
                return Err(SplitError::ItemIndexOutOfRange {
                    index: assignment.item_index,
                    len,
                });
            }
        }

        for assignment in assignments {
            let item = &mut self.items[assignment.item_index];
            item.is_shared = assignment.is_shared;
            item.assigned_to = assignment.assigned_to.clone();
        }

        self.recompute_totals();
        Ok(())
    }

    /// Sum of prices over items currently flagged shared
    pub fn shared_subtotal(&self) -> f64 {
        self.items
            .iter()
            .filter(|item| item.is_shared)
            .map(|item| item.price)
            .sum()
    }

    /// Sum of prices over all items
    pub fn grand_total(&self) -> f64 {
        self.items.iter().map(|item| item.price).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================
