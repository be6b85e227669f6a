use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use bigroad::advisor::Advisor;
use bigroad::desk::{Action, Advice, Desk, Presenter, RoadView};
use bigroad::ledger::{Ledger, LedgerRecord};
use bigroad::outcome::{Outcome, Side};
use bigroad::road::RoadLayout;
use bigroad::session::{Direction, Feedback, Rejection};
use bigroad::store::Busy;

const USER: i64 = 42;

/// Replies from a script; `None` entries fail.
struct ScriptedAdvisor {
    replies: Mutex<VecDeque<Option<Side>>>,
    delay: Duration,
    seen: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedAdvisor {
    fn new(replies: &[Option<Side>]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().copied().collect()),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn recommend(&self, history: &[Outcome], performance: &[LedgerRecord]) -> Result<Side> {
        self.seen.lock().unwrap().push((history.len(), performance.len()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(side)) => Ok(side),
            _ => Err(anyhow!("service unavailable")),
        }
    }
}

#[derive(Default)]
struct RecordingPresenter {
    frames: Mutex<Vec<(Advice, String)>>,
}

impl RecordingPresenter {
    fn advices(&self) -> Vec<Advice> {
        self.frames.lock().unwrap().iter().map(|(a, _)| *a).collect()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn present(&self, view: &RoadView) -> Result<()> {
        self.frames.lock().unwrap().push((view.advice, view.caption.clone()));
        Ok(())
    }
}

fn desk_with(advisor: ScriptedAdvisor) -> (Desk, Arc<RecordingPresenter>) {
    let mut ledger = Ledger::in_memory().unwrap();
    ledger.init().unwrap();
    desk_on(ledger, advisor)
}

fn desk_on(ledger: Ledger, advisor: ScriptedAdvisor) -> (Desk, Arc<RecordingPresenter>) {
    let presenter = Arc::new(RecordingPresenter::default());
    let desk = Desk::new(ledger, Box::new(advisor), presenter.clone(), RoadLayout::default());
    (desk, presenter)
}

async fn play(desk: &Desk, rounds: &[Outcome]) -> RoadView {
    let mut last = None;
    for &o in rounds {
        last = Some(desk.handle(USER, Action::Record(o)).await.unwrap());
    }
    last.expect("at least one round")
}

use bigroad::outcome::Outcome::{Banker as B, Player as P, Tie as T};

#[tokio::test]
async fn test_start_shows_empty_road() {
    let (desk, presenter) = desk_with(ScriptedAdvisor::new(&[]));
    let view = desk.start(USER, "alice").await.unwrap();
    assert_eq!(view.window.total_pages, 1);
    assert_eq!(view.advice, Advice::Idle);
    assert!(view.caption.starts_with("Player 0 | Banker 0 | Tie 0"));
    assert_eq!((view.image.width, view.image.height), (660, 162));
    assert_eq!(presenter.advices(), vec![Advice::Idle]);
}

#[tokio::test]
async fn test_recording_updates_tally() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[]));
    let view = play(&desk, &[P, P, B, T]).await;
    assert!(view.caption.starts_with("Player 2 | Banker 1 | Tie 1"));
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.history(), &[P, P, B, T]);
}

#[tokio::test]
async fn test_recommend_presents_twice_then_win() {
    let advisor = ScriptedAdvisor::new(&[Some(Side::Banker)]);
    let (desk, presenter) = desk_with(advisor);
    play(&desk, &[P, B, B]).await;

    let view = desk.handle(USER, Action::Recommend).await.unwrap();
    assert_eq!(view.advice, Advice::Recommended(Side::Banker));
    assert!(view.caption.ends_with("Recommendation: Banker"));
    let advices = presenter.advices();
    assert_eq!(
        &advices[advices.len() - 2..],
        &[Advice::Analyzing, Advice::Recommended(Side::Banker)]
    );
    assert!(view
        .keyboard
        .iter()
        .flatten()
        .any(|b| b.action == Action::Feedback(Feedback::Win)));

    let view = desk.handle(USER, Action::Feedback(Feedback::Win)).await.unwrap();
    assert_eq!(view.advice, Advice::Idle);
    assert!(view.caption.contains("AI since reset: 1W 0L (100%)"));
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.history(), &[P, B, B, B]);
    assert!(session.correct().contains(&3));
    assert!(session.is_consistent());
}

#[tokio::test]
async fn test_advisor_failure_leaves_nothing_pending() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[None]));
    play(&desk, &[P]).await;

    let view = desk.handle(USER, Action::Recommend).await.unwrap();
    assert_eq!(view.advice, Advice::Unavailable);
    assert!(view.caption.ends_with("no recommendation available"));

    let err = desk.handle(USER, Action::Feedback(Feedback::Win)).await.unwrap_err();
    assert_eq!(err.downcast_ref::<Rejection>(), Some(&Rejection::NoPendingRecommendation));
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.history(), &[P]);
}

#[tokio::test]
async fn test_new_round_drops_pending_recommendation() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[Some(Side::Player)]));
    desk.handle(USER, Action::Recommend).await.unwrap();
    desk.handle(USER, Action::Record(B)).await.unwrap();
    let err = desk.handle(USER, Action::Feedback(Feedback::Loss)).await.unwrap_err();
    assert!(err.downcast_ref::<Rejection>().is_some());
}

#[tokio::test]
async fn test_loss_appends_opposite_round() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[Some(Side::Player)]));
    play(&desk, &[B]).await;
    desk.handle(USER, Action::Recommend).await.unwrap();
    let view = desk.handle(USER, Action::Feedback(Feedback::Loss)).await.unwrap();
    assert!(view.caption.contains("0W 1L (0%)"));
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.history(), &[B, B]);
    assert!(session.correct().is_empty());
}

#[tokio::test]
async fn test_loss_without_append() {
    let mut ledger = Ledger::in_memory().unwrap();
    ledger.init().unwrap();
    let presenter = Arc::new(RecordingPresenter::default());
    let desk = Desk::new(
        ledger,
        Box::new(ScriptedAdvisor::new(&[Some(Side::Player)])),
        presenter,
        RoadLayout::default(),
    )
    .with_loss_appends_round(false);

    play(&desk, &[B]).await;
    desk.handle(USER, Action::Recommend).await.unwrap();
    desk.handle(USER, Action::Feedback(Feedback::Loss)).await.unwrap();
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.history(), &[B]);
}

#[tokio::test]
async fn test_reset_scopes_ledger_summary() {
    let advisor = ScriptedAdvisor::new(&[Some(Side::Player), Some(Side::Banker)]);
    let (desk, _) = desk_with(advisor);
    play(&desk, &[P, B]).await;
    desk.handle(USER, Action::Recommend).await.unwrap();
    let view = desk.handle(USER, Action::Feedback(Feedback::Win)).await.unwrap();
    assert!(view.caption.contains("1W 0L"));

    let view = desk.handle(USER, Action::Reset).await.unwrap();
    assert!(view.caption.starts_with("Player 0 | Banker 0 | Tie 0"));
    assert!(view.caption.contains("no results yet"));
    assert_eq!(view.window.page_index, 0);
    {
        let session = desk.store().get(USER).try_acquire().unwrap();
        assert!(session.history().is_empty());
        assert!(session.correct().is_empty());
        assert_eq!(session.recommendation(), None);
    }

    desk.handle(USER, Action::Recommend).await.unwrap();
    let view = desk.handle(USER, Action::Feedback(Feedback::Loss)).await.unwrap();
    assert!(view.caption.contains("AI since reset: 0W 1L (0%)"));
}

#[tokio::test]
async fn test_advisor_sees_history_and_track_record() {
    let advisor = Arc::new(ScriptedAdvisor::new(&[Some(Side::Player), Some(Side::Player)]));

    struct Shared(Arc<ScriptedAdvisor>);

    #[async_trait]
    impl Advisor for Shared {
        async fn recommend(&self, history: &[Outcome], performance: &[LedgerRecord]) -> Result<Side> {
            self.0.recommend(history, performance).await
        }
    }

    let mut ledger = Ledger::in_memory().unwrap();
    ledger.init().unwrap();
    let desk = Desk::new(
        ledger,
        Box::new(Shared(advisor.clone())),
        Arc::new(RecordingPresenter::default()),
        RoadLayout::default(),
    );
    play(&desk, &[P, T, B]).await;
    desk.handle(USER, Action::Recommend).await.unwrap();
    desk.handle(USER, Action::Feedback(Feedback::Win)).await.unwrap();
    desk.handle(USER, Action::Recommend).await.unwrap();

    assert_eq!(*advisor.seen.lock().unwrap(), vec![(3, 0), (4, 1)]);
}

#[tokio::test]
async fn test_new_round_jumps_to_last_page() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[]));
    let alternating: Vec<Outcome> = (0..31).map(|i| if i % 2 == 0 { P } else { B }).collect();
    let view = play(&desk, &alternating).await;
    assert_eq!(view.window.total_pages, 2);
    assert_eq!(view.window.page_index, 1);

    let view = desk.handle(USER, Action::Navigate(Direction::Prev)).await.unwrap();
    assert_eq!(view.window.page_index, 0);
    let view = desk.handle(USER, Action::Navigate(Direction::Prev)).await.unwrap();
    assert_eq!(view.window.page_index, 0);

    // Ties stay on the page the user is looking at.
    let view = desk.handle(USER, Action::Record(T)).await.unwrap();
    assert_eq!(view.window.page_index, 0);

    let view = desk.handle(USER, Action::Record(P)).await.unwrap();
    assert_eq!(view.window.page_index, 1);
}

#[tokio::test]
async fn test_next_past_last_page_is_clamped() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[]));
    play(&desk, &[P]).await;
    for _ in 0..3 {
        let view = desk.handle(USER, Action::Navigate(Direction::Next)).await.unwrap();
        assert_eq!(view.window.page_index, 0);
    }
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.page(), 0);
}

#[tokio::test]
async fn test_busy_while_gate_held() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[]));
    let held = desk.store().get(USER).try_acquire().unwrap();
    let err = desk.handle(USER, Action::Record(P)).await.unwrap_err();
    assert_eq!(err.downcast_ref::<Busy>(), Some(&Busy { user_id: USER }));
    drop(held);

    desk.handle(USER, Action::Record(P)).await.unwrap();
    // Other identities were never blocked.
    desk.handle(USER + 1, Action::Record(B)).await.unwrap();
}

#[tokio::test]
async fn test_action_during_recommendation_is_turned_away() {
    let advisor = ScriptedAdvisor::new(&[Some(Side::Banker)]).slow(Duration::from_millis(50));
    let (desk, _) = desk_with(advisor);

    let (slow, fast) = tokio::join!(desk.handle(USER, Action::Recommend), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        desk.handle(USER, Action::Record(P)).await
    });
    assert_eq!(slow.unwrap().advice, Advice::Recommended(Side::Banker));
    assert!(fast.unwrap_err().downcast_ref::<Busy>().is_some());

    let session = desk.store().get(USER).try_acquire().unwrap();
    assert!(session.history().is_empty());
    assert_eq!(session.recommendation(), Some(Side::Banker));
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[]));
    desk.handle(1, Action::Record(P)).await.unwrap();
    desk.handle(2, Action::Record(B)).await.unwrap();
    desk.handle(2, Action::Reset).await.unwrap();
    let one = desk.store().get(1).try_acquire().unwrap();
    assert_eq!(one.history(), &[P]);
    assert_eq!(desk.store().session_count(), 2);
}

/// On-disk ledger whose inserts into `table` are refused by the database.
fn failing_ledger(dir: &tempfile::TempDir, table: &str) -> Ledger {
    let path = dir.path().join("ledger.sqlite");
    let path = path.to_str().unwrap();
    let mut ledger = Ledger::new(path).unwrap();
    ledger.init().unwrap();
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER refuse_{table} BEFORE INSERT ON {table}
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
    ))
    .unwrap();
    ledger
}

#[tokio::test]
async fn test_failed_feedback_write_leaves_session_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = failing_ledger(&dir, "recommendations");
    let (desk, _) = desk_on(ledger, ScriptedAdvisor::new(&[Some(Side::Player)]));
    play(&desk, &[B]).await;
    desk.handle(USER, Action::Recommend).await.unwrap();

    let err = desk.handle(USER, Action::Feedback(Feedback::Win)).await.unwrap_err();
    assert!(format!("{:#}", err).contains("disk full"));
    {
        let session = desk.store().get(USER).try_acquire().unwrap();
        assert_eq!(session.history(), &[B]);
        assert!(session.correct().is_empty());
        assert_eq!(session.recommendation(), Some(Side::Player));
    }

    let view = desk.handle(USER, Action::Record(P)).await.unwrap();
    assert!(view.caption.contains("no results yet"));
}

#[tokio::test]
async fn test_failed_reset_write_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = failing_ledger(&dir, "resets");
    let (desk, _) = desk_with_history(ledger, &[P, B, T]).await;

    assert!(desk.handle(USER, Action::Reset).await.is_err());
    let session = desk.store().get(USER).try_acquire().unwrap();
    assert_eq!(session.history(), &[P, B, T]);
}

async fn desk_with_history(ledger: Ledger, rounds: &[Outcome]) -> (Desk, Arc<RecordingPresenter>) {
    let (desk, presenter) = desk_on(ledger, ScriptedAdvisor::new(&[]));
    play(&desk, rounds).await;
    (desk, presenter)
}

#[tokio::test]
async fn test_reset_right_after_feedback_clears_record() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[Some(Side::Banker)]));
    desk.handle(USER, Action::Recommend).await.unwrap();
    desk.handle(USER, Action::Feedback(Feedback::Win)).await.unwrap();
    let view = desk.handle(USER, Action::Reset).await.unwrap();
    assert!(view.caption.contains("no results yet"));
}

#[tokio::test]
async fn test_start_again_keeps_rounds() {
    let (desk, _) = desk_with(ScriptedAdvisor::new(&[]));
    desk.start(USER, "alice").await.unwrap();
    play(&desk, &[P, B]).await;
    let view = desk.start(USER, "alice").await.unwrap();
    assert!(view.caption.starts_with("Player 1 | Banker 1 | Tie 0"));
}
