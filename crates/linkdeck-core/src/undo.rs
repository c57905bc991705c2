//! Timed undo slots
//!
//! Each destructive mutation arms one compensating action holding the
//! pre-mutation value of every slice it changed. There is one slot per
//! [`UndoFamily`]; arming a slot discards whatever it held. A slot is usable
//! until its time-to-live runs out.

use linkdeck_state::StatePatch;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use ulid::Ulid;

/// Independent undo slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UndoFamily {
    /// Link, group and pool mutations
    Links,
    /// Prompt, note and profile mutations
    Prompts,
}

/// Mutation that armed an undo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Free link edited
    UpdateLink,
    /// Free link removed
    RemoveLink,
    /// Pinned link removed
    RemovePinnedLink,
    /// Group deleted
    DeleteGroup,
    /// Link pinned into a group
    Promote,
    /// Link unpinned to the free pool
    Demote,
    /// Free pool emptied
    ClearLinks,
    /// All groups deleted
    ClearGroups,
    /// Everything reset
    ClearAll,
    /// Prompt replaced by a suggested rewrite
    RewritePrompt,
    /// Prompt erased
    ClearPrompt,
    /// Link note changed
    SetNote,
    /// Link profile changed
    SetProfile,
}

impl MutationKind {
    /// Slot this mutation arms
    #[must_use]
    pub fn family(self) -> UndoFamily {
        match self {
            Self::RewritePrompt | Self::ClearPrompt | Self::SetNote | Self::SetProfile => {
                UndoFamily::Prompts
            }
            _ => UndoFamily::Links,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UpdateLink => "update link",
            Self::RemoveLink => "remove link",
            Self::RemovePinnedLink => "remove pinned link",
            Self::DeleteGroup => "delete group",
            Self::Promote => "pin link",
            Self::Demote => "unpin link",
            Self::ClearLinks => "clear links",
            Self::ClearGroups => "clear groups",
            Self::ClearAll => "clear all",
            Self::RewritePrompt => "rewrite prompt",
            Self::ClearPrompt => "clear prompt",
            Self::SetNote => "edit note",
            Self::SetProfile => "edit profile",
        };
        f.write_str(name)
    }
}

/// Handle to an armed compensating action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoTicket {
    /// Unique id
    pub id: Ulid,
    /// Mutation that armed it
    pub kind: MutationKind,
    /// When it stops being usable
    pub expires_at: Instant,
}

impl UndoTicket {
    /// Slot this ticket lives in
    #[inline]
    #[must_use]
    pub fn family(&self) -> UndoFamily {
        self.kind.family()
    }

    /// Check whether the ticket has run out
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before expiry
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Why an undo could not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UndoError {
    /// Nothing is armed in that slot
    #[error("nothing to undo")]
    NotArmed,
    /// A newer mutation replaced the ticket
    #[error("a newer change replaced this undo")]
    Superseded,
    /// The time-to-live ran out
    #[error("undo window has expired")]
    Expired,
}

#[derive(Debug)]
struct Armed {
    ticket: UndoTicket,
    snapshot: StatePatch,
}

/// One undo slot per family with a fixed time-to-live
#[derive(Debug)]
pub struct UndoManager {
    ttl: Duration,
    slots: Mutex<HashMap<UndoFamily, Armed>>,
}

impl UndoManager {
    /// Create manager with time-to-live
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Time-to-live of new tickets
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Arm the slot for `kind`, replacing its previous content
    pub fn arm(&self, kind: MutationKind, snapshot: StatePatch) -> UndoTicket {
        let ticket = UndoTicket {
            id: Ulid::new(),
            kind,
            expires_at: Instant::now() + self.ttl,
        };
        let previous = self.slots.lock().insert(
            kind.family(),
            Armed {
                ticket: ticket.clone(),
                snapshot,
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(replaced = %previous.ticket.kind, by = %kind, "undo slot re-armed");
        }
        ticket
    }

    /// Ticket currently armed for `family`, if still valid
    #[must_use]
    pub fn pending(&self, family: UndoFamily) -> Option<UndoTicket> {
        let mut slots = self.slots.lock();
        match slots.get(&family) {
            Some(armed) if armed.ticket.is_expired() => {
                slots.remove(&family);
                None
            }
            Some(armed) => Some(armed.ticket.clone()),
            None => None,
        }
    }

    /// Consume the snapshot behind `ticket`
    ///
    /// # Errors
    /// - `NotArmed` if the slot is empty
    /// - `Superseded` if another ticket took the slot
    /// - `Expired` if the time-to-live ran out (the slot is cleared)
    pub fn take(&self, ticket: &UndoTicket) -> Result<StatePatch, UndoError> {
        let family = ticket.family();
        let mut slots = self.slots.lock();
        let armed = slots.get(&family).ok_or(UndoError::NotArmed)?;
        if armed.ticket.id != ticket.id {
            return Err(UndoError::Superseded);
        }
        if armed.ticket.is_expired() {
            slots.remove(&family);
            return Err(UndoError::Expired);
        }
        slots
            .remove(&family)
            .map(|armed| armed.snapshot)
            .ok_or(UndoError::NotArmed)
    }

    /// Put a taken snapshot back, unless the slot was re-armed meanwhile
    pub fn restore(&self, ticket: UndoTicket, snapshot: StatePatch) {
        let mut slots = self.slots.lock();
        slots
            .entry(ticket.family())
            .or_insert(Armed { ticket, snapshot });
    }

    /// Empty the slot for `family`
    pub fn discard(&self, family: UndoFamily) {
        self.slots.lock().remove(&family);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdeck_state::LinkRecord;

    fn snapshot() -> StatePatch {
        StatePatch {
            links: Some(vec![LinkRecord::new("A", "https://a.example")]),
            ..StatePatch::default()
        }
    }

    #[test]
    fn families_are_independent() {
        assert_eq!(MutationKind::Demote.family(), UndoFamily::Links);
        assert_eq!(MutationKind::RewritePrompt.family(), UndoFamily::Prompts);
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_is_usable_once_before_expiry() {
        let undo = UndoManager::new(Duration::from_secs(8));
        let ticket = undo.arm(MutationKind::RemoveLink, snapshot());

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(undo.pending(UndoFamily::Links), Some(ticket.clone()));
        assert_eq!(undo.take(&ticket).unwrap(), snapshot());
        assert_eq!(undo.take(&ticket), Err(UndoError::NotArmed));
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_expires_after_ttl() {
        let undo = UndoManager::new(Duration::from_secs(8));
        let ticket = undo.arm(MutationKind::RemoveLink, snapshot());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(ticket.is_expired());
        assert_eq!(undo.take(&ticket), Err(UndoError::Expired));
        assert_eq!(undo.pending(UndoFamily::Links), None);
    }

    #[tokio::test(start_paused = true)]
    async fn arming_replaces_only_its_own_family() {
        let undo = UndoManager::new(Duration::from_secs(8));
        let link = undo.arm(MutationKind::RemoveLink, snapshot());
        let prompt = undo.arm(MutationKind::ClearPrompt, StatePatch::default());
        let newer = undo.arm(MutationKind::Demote, snapshot());

        assert_eq!(undo.take(&link), Err(UndoError::Superseded));
        assert!(undo.take(&prompt).is_ok());
        assert!(undo.take(&newer).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn discard_empties_one_family() {
        let undo = UndoManager::new(Duration::from_secs(8));
        let link = undo.arm(MutationKind::ClearAll, snapshot());
        let prompt = undo.arm(MutationKind::SetNote, StatePatch::default());

        undo.discard(UndoFamily::Prompts);
        assert_eq!(undo.take(&prompt), Err(UndoError::NotArmed));
        assert_eq!(undo.pending(UndoFamily::Links), Some(link));
    }

    #[tokio::test(start_paused = true)]
    async fn restore_does_not_clobber_newer_ticket() {
        let undo = UndoManager::new(Duration::from_secs(8));
        let first = undo.arm(MutationKind::RemoveLink, snapshot());
        let taken = undo.take(&first).unwrap();

        let second = undo.arm(MutationKind::Promote, StatePatch::default());
        undo.restore(first, taken);
        assert_eq!(undo.pending(UndoFamily::Links), Some(second));
    }
}
