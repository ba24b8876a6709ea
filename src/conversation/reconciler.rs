//! Merge optimistic local echoes with the authoritative turn stream.
//!
//! The authoritative id of a human turn is unknown at submission time, so an
//! echo is matched on role + content equivalence. The set of authoritative
//! human ids present when the echo was minted is remembered so an older turn
//! with the same text never retires a fresh echo.
//!
//! An echo whose run failed or was stopped stays visible at the point it was
//! submitted, marked as not sent. It is still retired if the runtime turns
//! out to have received it.

use super::turn::{Content, ConversationTurn, Role, TurnId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A human turn shown before the runtime confirms it
#[derive(Debug, Clone)]
pub struct LocalEcho {
    id: u64,
    content: Content,
    /// Authoritative human ids that already existed when this echo was minted
    baseline: HashSet<String>,
    /// Last authoritative turn at submission time
    after: Option<TurnId>,
    /// Authoritative id that superseded this echo. Set once, never cleared.
    superseded_by: Option<String>,
    /// The run carrying this echo failed or was stopped
    failed: bool,
}

impl LocalEcho {
    pub fn turn_id(&self) -> TurnId {
        TurnId::Local(self.id)
    }

    pub fn is_retired(&self) -> bool {
        self.superseded_by.is_some()
    }

    fn rendered(&self) -> RenderedTurn {
        RenderedTurn {
            key: self.turn_id().to_string(),
            turn: ConversationTurn::new(self.turn_id(), Role::Human, self.content.clone()),
            pending: !self.failed,
            failed: self.failed,
        }
    }
}

/// A turn as it should be rendered
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTurn {
    /// Stable render key. An authoritative turn that superseded an echo keeps
    /// the echo's key so the entry is replaced in place.
    pub key: String,
    pub turn: ConversationTurn,
    /// Still waiting for the runtime to confirm it
    pub pending: bool,
    /// Submitted but never confirmed because its run ended first
    pub failed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MessageReconciler {
    authoritative: Vec<ConversationTurn>,
    echoes: Vec<LocalEcho>,
    next_local: u64,
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a local echo for text the human just submitted.
    pub fn push_local_echo(&mut self, content: impl Into<Content>) -> TurnId {
        self.next_local += 1;
        let content = content.into();
        let baseline = self
            .authoritative
            .iter()
            .filter(|turn| turn.role == Role::Human)
            .filter_map(|turn| match &turn.id {
                TurnId::Remote(id) => Some(id.clone()),
                TurnId::Local(_) => None,
            })
            .collect();
        self.echoes.push(LocalEcho {
            id: self.next_local,
            content,
            baseline,
            after: self.authoritative.last().map(|turn| turn.id.clone()),
            superseded_by: None,
            failed: false,
        });
        TurnId::Local(self.next_local)
    }

    /// Mark every unconfirmed echo as not sent. Called when the run that
    /// carried them fails or is stopped.
    pub fn fail_outstanding(&mut self) {
        for echo in self.echoes.iter_mut().filter(|e| !e.is_retired() && !e.failed) {
            debug!("Local echo local-{} was not confirmed", echo.id);
            echo.failed = true;
        }
    }

    /// Replace the authoritative sequence with a full snapshot.
    ///
    /// The runtime may shrink its history (removed turns), so a snapshot is
    /// taken as-is. A duplicated id keeps its first position and its last
    /// content.
    pub fn apply_snapshot(&mut self, turns: Vec<ConversationTurn>) {
        let mut ordered: Vec<ConversationTurn> = Vec::with_capacity(turns.len());
        let mut index: HashMap<TurnId, usize> = HashMap::new();
        for turn in turns {
            match index.get(&turn.id).copied() {
                Some(pos) => ordered[pos] = turn,
                None => {
                    index.insert(turn.id.clone(), ordered.len());
                    ordered.push(turn);
                }
            }
        }
        self.authoritative = ordered;
        self.supersede();
    }

    /// Insert or update a single authoritative turn in delivery order.
    pub fn apply_turn(&mut self, turn: ConversationTurn) {
        match self.authoritative.iter_mut().find(|t| t.id == turn.id) {
            Some(existing) => *existing = turn,
            None => self.authoritative.push(turn),
        }
        self.supersede();
    }

    fn supersede(&mut self) {
        let mut claimed: HashSet<String> = self
            .echoes
            .iter()
            .filter_map(|echo| echo.superseded_by.clone())
            .collect();

        for echo in self.echoes.iter_mut().filter(|e| !e.is_retired()) {
            let matched = self.authoritative.iter().find_map(|turn| match &turn.id {
                TurnId::Remote(id)
                    if turn.role == Role::Human
                        && !echo.baseline.contains(id)
                        && !claimed.contains(id)
                        && turn.content.is_equivalent(&echo.content) =>
                {
                    Some(id.clone())
                }
                _ => None,
            });
            if let Some(id) = matched {
                debug!("Local echo local-{} superseded by {}", echo.id, id);
                claimed.insert(id.clone());
                echo.superseded_by = Some(id);
            }
        }

        // The runtime has moved past any pending echo older than the newest
        // confirmed one. Retired echoes are kept only while their turn is in
        // the history, since they exist to lend it their key.
        let newest_confirmed = self
            .echoes
            .iter()
            .filter(|e| e.is_retired())
            .map(|e| e.id)
            .max();
        let present: HashSet<&str> = self
            .authoritative
            .iter()
            .filter_map(|turn| match &turn.id {
                TurnId::Remote(id) => Some(id.as_str()),
                TurnId::Local(_) => None,
            })
            .collect();
        self.echoes.retain(|echo| match &echo.superseded_by {
            Some(id) => present.contains(id.as_str()),
            None if echo.failed => true,
            None => newest_confirmed.map_or(true, |newest| echo.id > newest),
        });
    }

    /// The authoritative history, in delivery order
    pub fn history(&self) -> &[ConversationTurn] {
        &self.authoritative
    }

    /// Echoes still waiting on the runtime
    pub fn outstanding_echoes(&self) -> usize {
        self.echoes
            .iter()
            .filter(|e| !e.is_retired() && !e.failed)
            .count()
    }

    /// Authoritative turns in order. A failed echo sits after the turn that
    /// was last when it was submitted, and pending echoes follow everything
    /// in submission order.
    pub fn reconciled(&self) -> Vec<RenderedTurn> {
        let keys: HashMap<&str, TurnId> = self
            .echoes
            .iter()
            .filter_map(|e| e.superseded_by.as_deref().map(|id| (id, e.turn_id())))
            .collect();
        let failed: Vec<&LocalEcho> = self
            .echoes
            .iter()
            .filter(|e| !e.is_retired() && e.failed)
            .collect();

        let mut out: Vec<RenderedTurn> = failed
            .iter()
            .filter(|e| e.after.is_none())
            .map(|e| e.rendered())
            .collect();
        for turn in &self.authoritative {
            let key = match &turn.id {
                TurnId::Remote(id) => keys
                    .get(id.as_str())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| id.clone()),
                TurnId::Local(_) => turn.id.to_string(),
            };
            out.push(RenderedTurn {
                key,
                turn: turn.clone(),
                pending: false,
                failed: false,
            });
            out.extend(
                failed
                    .iter()
                    .filter(|e| e.after.as_ref() == Some(&turn.id))
                    .map(|e| e.rendered()),
            );
        }

        // Anchor dropped out of the history
        out.extend(
            failed
                .iter()
                .filter(|e| {
                    e.after
                        .as_ref()
                        .is_some_and(|anchor| !self.authoritative.iter().any(|t| &t.id == anchor))
                })
                .map(|e| e.rendered()),
        );
        out.extend(
            self.echoes
                .iter()
                .filter(|e| !e.is_retired() && !e.failed)
                .map(LocalEcho::rendered),
        );
        out
    }
}
