use serde::{Deserialize, Serialize};

use super::reconcile::Reconciliation;
use super::snapshot::BoardSnapshot;
use crate::events::BoardEvent;
use crate::gateway::{CardGateway, GatewayError};
use crate::planner::{DragMove, ReorderPlan};
use crate::types::{Card, CardPatch, NewCard};

/// Where a dragged card was released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTarget {
    pub column_id: String,
    pub index: usize,
}

/// End of a drag gesture. `destination` is `None` when the card was
/// released outside every column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragEnd {
    pub card_id: String,
    pub source_column: String,
    pub destination: Option<DropTarget>,
}

impl DragEnd {
    pub fn to(card_id: &str, source: &str, destination: &str, index: usize) -> Self {
        Self {
            card_id: card_id.to_string(),
            source_column: source.to_string(),
            destination: Some(DropTarget {
                column_id: destination.to_string(),
                index,
            }),
        }
    }

    pub fn cancelled(card_id: &str, source: &str) -> Self {
        Self {
            card_id: card_id.to_string(),
            source_column: source.to_string(),
            destination: None,
        }
    }

    fn into_move(self) -> Option<DragMove> {
        let destination = self.destination?;
        Some(DragMove {
            card_id: self.card_id,
            source_column: self.source_column,
            destination_column: destination.column_id,
            destination_index: destination.index,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileReason {
    /// The local snapshot no longer had the card where the drag said it was.
    StaleMove,
    /// A column commit failed; the board was reloaded instead of rolled back.
    CommitFailed(GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Released outside any column. Nothing was sent.
    Cancelled,
    /// Dropped where it already was. Nothing was sent.
    NoOp,
    /// Every column commit succeeded.
    Committed(ReorderPlan),
    /// The optimistic guess was discarded and the board reloaded.
    Reconciled { reason: ReconcileReason },
}

/// One client's view of the board: a snapshot plus the gateway it syncs with.
///
/// All mutation goes through `&mut self`, so a session has a single writer.
/// Failures never roll back arithmetically; they reload (`reconcile_full`).
/// When that reload fails too, the pre-move snapshot is restored and the
/// session is marked stale until a reload succeeds.
pub struct BoardSession<G> {
    gateway: G,
    snapshot: BoardSnapshot,
    needs_reload: bool,
}

impl<G: CardGateway> BoardSession<G> {
    /// An empty session. Call [`reconcile_full`](Self::reconcile_full) to load.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            snapshot: BoardSnapshot::default(),
            needs_reload: true,
        }
    }

    pub async fn connect(gateway: G) -> Result<Self, GatewayError> {
        let mut session = Self::new(gateway);
        session.reconcile_full().await?;
        Ok(session)
    }

    pub fn snapshot(&self) -> &BoardSnapshot {
        &self.snapshot
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// True until a reload succeeds after the last failed one.
    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    /// Replace the whole snapshot with the server's card list.
    pub async fn reconcile_full(&mut self) -> Result<(), GatewayError> {
        let cards = match self.gateway.list_cards().await {
            Ok(cards) => cards,
            Err(e) => {
                self.needs_reload = true;
                return Err(e);
            }
        };
        log::debug!(target: "taskboard.session", "Reloaded {} cards", cards.len());
        self.snapshot.replace_all(cards);
        self.needs_reload = false;
        Ok(())
    }

    async fn reload_if_stale(&mut self) -> Result<(), GatewayError> {
        if self.needs_reload {
            self.reconcile_full().await?;
        }
        Ok(())
    }

    /// Plan, apply optimistically, then commit destination and source.
    ///
    /// The returned error is only ever a failed reload; commit failures are
    /// absorbed into `MoveOutcome::Reconciled`.
    pub async fn move_card(&mut self, drag: DragEnd) -> Result<MoveOutcome, GatewayError> {
        let Some(drag) = drag.into_move() else {
            return Ok(MoveOutcome::Cancelled);
        };
        self.reload_if_stale().await?;

        let plan = match self.snapshot.plan(&drag) {
            Ok(Some(plan)) => plan,
            Ok(None) => return Ok(MoveOutcome::NoOp),
            Err(e) => {
                log::warn!(target: "taskboard.session", "{}, reloading board", e);
                self.reconcile_full().await?;
                return Ok(MoveOutcome::Reconciled {
                    reason: ReconcileReason::StaleMove,
                });
            }
        };

        let baseline = self.snapshot.clone();
        self.snapshot.apply_plan(&plan);

        for assignment in plan.assignments() {
            if let Err(e) = self
                .gateway
                .commit_order(&assignment.column_id, assignment.card_ids())
                .await
            {
                log::warn!(
                    target: "taskboard.session",
                    "Commit of {} failed for move of {}: {}",
                    assignment.column_id,
                    drag.card_id,
                    e
                );
                if let Err(reload) = self.reconcile_full().await {
                    // No authoritative state to show; drop the guess.
                    self.snapshot = baseline;
                    return Err(reload);
                }
                return Ok(MoveOutcome::Reconciled {
                    reason: ReconcileReason::CommitFailed(e),
                });
            }
        }

        Ok(MoveOutcome::Committed(plan))
    }

    pub async fn create_card(&mut self, new_card: NewCard) -> Result<Card, GatewayError> {
        let card = self.gateway.create_card(new_card).await?;
        self.snapshot.apply_event(&BoardEvent::CardChanged { card: card.clone() });
        Ok(card)
    }

    /// A patch carrying `order` shifts other cards, so it is followed by a
    /// full reload rather than a single upsert. The update is committed even
    /// if that reload fails; the session is then left stale.
    pub async fn update_card(&mut self, card_id: &str, patch: CardPatch) -> Result<Card, GatewayError> {
        let moves = patch.order.is_some();
        let card = self.gateway.update_card(card_id, patch).await?;
        if moves {
            if let Err(e) = self.reconcile_full().await {
                log::warn!(
                    target: "taskboard.session",
                    "Updated card {} but reload failed: {}",
                    card.id,
                    e
                );
            }
        } else {
            self.snapshot.apply_event(&BoardEvent::CardChanged { card: card.clone() });
        }
        Ok(card)
    }

    pub async fn delete_card(&mut self, card_id: &str) -> Result<(), GatewayError> {
        self.gateway.delete_card(card_id).await?;
        self.snapshot.apply_event(&BoardEvent::CardRemoved {
            card_id: card_id.to_string(),
        });
        Ok(())
    }

    /// Merge a push event, reloading when the event asks for it or an
    /// earlier reload failed.
    pub async fn handle_event(&mut self, event: &BoardEvent) -> Result<Reconciliation, GatewayError> {
        let outcome = self.snapshot.apply_event(event);
        if outcome == Reconciliation::ReloadRequired || self.needs_reload {
            self.reconcile_full().await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChangeBroadcaster;
    use crate::config::BoardColumns;
    use crate::gateway::PersistenceGateway;
    use crate::position::check_board;
    use crate::storage::local::LocalCardStore;
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast::Receiver;

    type Gateway = PersistenceGateway<LocalCardStore>;

    /// Wraps the in-process gateway and fails commits for chosen columns,
    /// and optionally every listing.
    #[derive(Clone)]
    struct FlakyGateway {
        inner: Gateway,
        failing_columns: Arc<Mutex<Vec<String>>>,
        listing_down: Arc<Mutex<bool>>,
    }

    impl FlakyGateway {
        fn fail_column(&self, column_id: &str) {
            self.failing_columns.lock().unwrap().push(column_id.to_string());
        }

        fn set_listing_down(&self, down: bool) {
            *self.listing_down.lock().unwrap() = down;
        }

        fn recover(&self) {
            self.failing_columns.lock().unwrap().clear();
            self.set_listing_down(false);
        }
    }

    impl CardGateway for FlakyGateway {
        async fn list_cards(&self) -> Result<Vec<Card>, GatewayError> {
            let down = *self.listing_down.lock().unwrap();
            if down {
                return Err(GatewayError::Retryable("store offline".into()));
            }
            self.inner.list_cards().await
        }

        async fn create_card(&self, new_card: NewCard) -> Result<Card, GatewayError> {
            self.inner.create_card(new_card).await
        }

        async fn update_card(&self, card_id: &str, patch: CardPatch) -> Result<Card, GatewayError> {
            self.inner.update_card(card_id, patch).await
        }

        async fn delete_card(&self, card_id: &str) -> Result<(), GatewayError> {
            self.inner.delete_card(card_id).await
        }

        async fn commit_order(&self, column_id: &str, card_ids: Vec<String>) -> Result<(), GatewayError> {
            let fail = self
                .failing_columns
                .lock()
                .unwrap()
                .iter()
                .any(|c| c == column_id);
            if fail {
                return Err(GatewayError::Retryable("store offline".into()));
            }
            self.inner.commit_order(column_id, card_ids).await
        }
    }

    fn gateway() -> Gateway {
        PersistenceGateway::new(
            Arc::new(LocalCardStore::in_memory(BoardColumns::default())),
            ChangeBroadcaster::new(64),
        )
    }

    fn flaky(inner: Gateway) -> FlakyGateway {
        FlakyGateway {
            inner,
            failing_columns: Arc::new(Mutex::new(Vec::new())),
            listing_down: Arc::new(Mutex::new(false)),
        }
    }

    /// "To Do" = [A, B], "Done" = [C]; returns (A, B, C) ids.
    fn seed(gateway: &Gateway) -> (String, String, String) {
        let a = gateway.create(NewCard::titled("A")).unwrap();
        let b = gateway.create(NewCard::titled("B")).unwrap();
        let c = gateway
            .create(NewCard::titled("C").in_column("Done"))
            .unwrap();
        (a.id, b.id, c.id)
    }

    fn column_ids<G: CardGateway>(session: &BoardSession<G>, column: &str) -> Vec<String> {
        session
            .snapshot()
            .column(column)
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    async fn drain<G: CardGateway>(session: &mut BoardSession<G>, rx: &mut Receiver<BoardEvent>) {
        while let Ok(event) = rx.try_recv() {
            session.handle_event(&event).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cross_column_move_scenario() {
        let gateway = gateway();
        let (a, b, c) = seed(&gateway);
        let mut rx = gateway.broadcaster().subscribe();
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();

        let outcome = session
            .move_card(DragEnd::to(&b, "To Do", "Done", 0))
            .await
            .unwrap();

        let plan = match outcome {
            MoveOutcome::Committed(plan) => plan,
            other => panic!("expected commit, got {:?}", other),
        };
        assert_eq!(plan.destination.card_ids(), vec![b.clone(), c.clone()]);
        assert_eq!(plan.source.map(|s| s.card_ids()), Some(vec![a.clone()]));

        assert_eq!(column_ids(&session, "Done"), vec![b.clone(), c.clone()]);
        assert_eq!(column_ids(&session, "To Do"), vec![a.clone()]);

        // One orderingChanged per column commit.
        assert_eq!(rx.try_recv().unwrap(), BoardEvent::OrderingChanged);
        assert_eq!(rx.try_recv().unwrap(), BoardEvent::OrderingChanged);
        assert!(rx.try_recv().is_err());

        let server = BoardSnapshot::new(gateway.list());
        assert_eq!(server.positions(), session.snapshot().positions());
    }

    #[tokio::test]
    async fn test_cancelled_and_noop_moves_send_nothing() {
        let gateway = gateway();
        let (a, _, _) = seed(&gateway);
        let mut rx = gateway.broadcaster().subscribe();
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();

        assert_eq!(
            session.move_card(DragEnd::cancelled(&a, "To Do")).await.unwrap(),
            MoveOutcome::Cancelled
        );
        assert_eq!(
            session.move_card(DragEnd::to(&a, "To Do", "To Do", 0)).await.unwrap(),
            MoveOutcome::NoOp
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_commit_reloads_canonical_state() {
        let inner = gateway();
        let (_, b, _) = seed(&inner);
        let gateway = flaky(inner.clone());
        gateway.fail_column("Done");
        let mut session = BoardSession::connect(gateway).await.unwrap();
        let before = session.snapshot().positions();

        let outcome = session
            .move_card(DragEnd::to(&b, "To Do", "Done", 0))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            MoveOutcome::Reconciled {
                reason: ReconcileReason::CommitFailed(GatewayError::Retryable(_))
            }
        ));
        // The optimistic guess is gone: the snapshot matches the store again.
        assert_eq!(session.snapshot().positions(), before);
        assert_eq!(
            BoardSnapshot::new(inner.list()).positions(),
            session.snapshot().positions()
        );
    }

    #[tokio::test]
    async fn test_partial_cross_column_failure_heals_on_reload() {
        let inner = gateway();
        let (a, b, c) = seed(&inner);
        let gateway = flaky(inner.clone());
        gateway.fail_column("To Do");
        let mut session = BoardSession::connect(gateway).await.unwrap();

        let outcome = session
            .move_card(DragEnd::to(&a, "To Do", "Done", 1))
            .await
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Reconciled { .. }));

        // Destination landed, source commit did not; the store is still dense.
        assert_eq!(column_ids(&session, "Done"), vec![c, a]);
        assert_eq!(column_ids(&session, "To Do"), vec![b]);
        assert!(check_board(session.snapshot().cards(), inner.columns()).is_empty());
    }

    #[tokio::test]
    async fn test_stale_move_reloads_without_commit() {
        let gateway = gateway();
        let (a, _, _) = seed(&gateway);
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();
        let mut rx = gateway.broadcaster().subscribe();

        // Someone else deletes A; this session has not heard about it yet,
        // so its drag names a card the server no longer has.
        gateway.delete(&a).unwrap();
        let outcome = session
            .move_card(DragEnd::to(&a, "To Do", "Done", 0))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            MoveOutcome::Reconciled {
                reason: ReconcileReason::CommitFailed(GatewayError::StaleReference(_))
            }
        ));
        assert!(session.snapshot().get(&a).is_none());

        // Only the delete was published.
        assert!(matches!(rx.try_recv(), Ok(BoardEvent::CardRemoved { .. })));
        assert!(rx.try_recv().is_err());

        let outcome = session
            .move_card(DragEnd::to(&a, "To Do", "Done", 0))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MoveOutcome::Reconciled {
                reason: ReconcileReason::StaleMove
            }
        );
    }

    #[tokio::test]
    async fn test_second_client_converges_through_events() {
        let gateway = gateway();
        let (a, b, _) = seed(&gateway);
        let mut first = BoardSession::connect(gateway.clone()).await.unwrap();
        let mut second = BoardSession::connect(gateway.clone()).await.unwrap();
        let mut second_rx = gateway.broadcaster().subscribe();

        first
            .move_card(DragEnd::to(&b, "To Do", "Done", 0))
            .await
            .unwrap();
        drain(&mut second, &mut second_rx).await;
        assert_eq!(first.snapshot().positions(), second.snapshot().positions());

        let card = first
            .create_card(NewCard::titled("D").in_column("In Progress"))
            .await
            .unwrap();
        drain(&mut second, &mut second_rx).await;
        assert_eq!(second.snapshot().get(&card.id), Some(&card));

        first.delete_card(&a).await.unwrap();
        drain(&mut second, &mut second_rx).await;
        assert_eq!(first.snapshot().positions(), second.snapshot().positions());
    }

    #[tokio::test]
    async fn test_originator_echo_is_harmless() {
        let gateway = gateway();
        seed(&gateway);
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();
        let mut rx = gateway.broadcaster().subscribe();

        let card = session.create_card(NewCard::titled("E")).await.unwrap();
        let echo = rx.try_recv().unwrap();
        assert_eq!(
            session.handle_event(&echo).await.unwrap(),
            Reconciliation::Unchanged
        );
        assert_eq!(session.snapshot().get(&card.id), Some(&card));
        assert_eq!(session.snapshot().len(), 4);
    }

    #[tokio::test]
    async fn test_update_with_order_reloads() {
        let gateway = gateway();
        let (a, b, c) = seed(&gateway);
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();

        let patch = CardPatch {
            column_id: Some("Done".into()),
            order: Some(5),
            ..CardPatch::default()
        };
        let card = session.update_card(&a, patch).await.unwrap();
        assert_eq!(card.column_id, "Done");
        assert_eq!(column_ids(&session, "Done"), vec![c, a]);
        assert_eq!(column_ids(&session, "To Do"), vec![b]);
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_snapshot() {
        let gateway = gateway();
        let (a, _, _) = seed(&gateway);
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();
        let before = session.snapshot().clone();

        let patch = CardPatch {
            column_id: Some("Done".into()),
            ..CardPatch::default()
        };
        let err = session.update_card(&a, patch).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
        assert_eq!(session.snapshot(), &before);
        assert_eq!(gateway.list().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_commit_and_reload_restores_baseline() {
        let inner = gateway();
        let (a, b, c) = seed(&inner);
        let gateway = flaky(inner.clone());
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();
        let before = session.snapshot().positions();

        gateway.fail_column("Done");
        gateway.set_listing_down(true);
        let err = session
            .move_card(DragEnd::to(&a, "To Do", "Done", 0))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        // Nothing was committed and nothing uncommitted is shown.
        assert_eq!(session.snapshot().positions(), before);
        assert_eq!(
            BoardSnapshot::new(inner.list()).positions(),
            session.snapshot().positions()
        );
        assert!(session.needs_reload());

        // The store moves on without this session hearing about it.
        gateway.recover();
        inner.delete(&b).unwrap();
        let c_card = inner.list().into_iter().find(|card| card.id == c).unwrap();

        // Any event now triggers the reload that failed earlier.
        session
            .handle_event(&BoardEvent::CardChanged { card: c_card })
            .await
            .unwrap();
        assert!(!session.needs_reload());
        assert!(session.snapshot().get(&b).is_none());
        assert_eq!(
            BoardSnapshot::new(inner.list()).positions(),
            session.snapshot().positions()
        );
    }

    #[tokio::test]
    async fn test_stale_session_reloads_before_next_move() {
        let inner = gateway();
        let (a, b, _) = seed(&inner);
        let gateway = flaky(inner.clone());
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();

        gateway.fail_column("Done");
        gateway.set_listing_down(true);
        assert!(session
            .move_card(DragEnd::to(&a, "To Do", "Done", 0))
            .await
            .is_err());

        gateway.recover();
        inner.delete(&a).unwrap();

        // Reloaded first, so the move is planned against the real board.
        let outcome = session
            .move_card(DragEnd::to(&b, "To Do", "Done", 0))
            .await
            .unwrap();
        assert!(matches!(outcome, MoveOutcome::Committed(_)));
        assert!(session.snapshot().get(&a).is_none());
        assert_eq!(
            BoardSnapshot::new(inner.list()).positions(),
            session.snapshot().positions()
        );
    }

    #[tokio::test]
    async fn test_committed_update_survives_failed_reload() {
        let inner = gateway();
        let (a, _, c) = seed(&inner);
        let gateway = flaky(inner.clone());
        let mut session = BoardSession::connect(gateway.clone()).await.unwrap();

        gateway.set_listing_down(true);
        let patch = CardPatch {
            column_id: Some("Done".into()),
            order: Some(0),
            ..CardPatch::default()
        };
        let card = session.update_card(&a, patch).await.unwrap();
        assert_eq!(card.column_id, "Done");
        assert!(session.needs_reload());

        gateway.recover();
        session.reconcile_full().await.unwrap();
        assert_eq!(column_ids(&session, "Done"), vec![a, c]);
    }
}
