//! Event dispatch for user sessions.
//!
//! One call to [`Desk::handle`] is one user action: it takes the user's
//! session gate, applies the action, re-encodes and re-pages the road,
//! renders it and hands the result to the [`Presenter`]. A recommendation
//! request presents twice, first an "analyzing" frame and then the answer.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::advisor::Advisor;
use crate::ledger::{Ledger, LedgerRecord, LedgerSummary};
use crate::logging::{self, log, obj, v_str, Domain, Level};
use crate::outcome::{Outcome, ParseOutcomeError, Side};
use crate::road::page::PageWindow;
use crate::road::render::RoadImage;
use crate::road::RoadLayout;
use crate::session::{Direction, Feedback, Session, Tally, UserId};
use crate::store::{Busy, SessionGuard, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Record(Outcome),
    Reset,
    Navigate(Direction),
    Recommend,
    Feedback(Feedback),
}

impl Action {
    /// Short code used for buttons and the activity log.
    pub fn code(&self) -> &'static str {
        match self {
            Action::Record(Outcome::Player) => "P",
            Action::Record(Outcome::Banker) => "B",
            Action::Record(Outcome::Tie) => "T",
            Action::Reset => "reset",
            Action::Navigate(Direction::Next) => "next",
            Action::Navigate(Direction::Prev) => "prev",
            Action::Recommend => "ai",
            Action::Feedback(Feedback::Win) => "win",
            Action::Feedback(Feedback::Loss) => "loss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionError(pub String);

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action {:?}", self.0)
    }
}

impl std::error::Error for ParseActionError {}

impl From<ParseOutcomeError> for ParseActionError {
    fn from(e: ParseOutcomeError) -> Self {
        ParseActionError(e.0)
    }
}

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(Action::Reset),
            "next" | ">" => Ok(Action::Navigate(Direction::Next)),
            "prev" | "<" => Ok(Action::Navigate(Direction::Prev)),
            "ai" | "recommend" => Ok(Action::Recommend),
            "win" => Ok(Action::Feedback(Feedback::Win)),
            "loss" | "lose" => Ok(Action::Feedback(Feedback::Loss)),
            other => Ok(Action::Record(other.parse::<Outcome>()?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    fn new(label: &str, action: Action) -> Self {
        Self { label: label.to_string(), action }
    }
}

pub type Keyboard = Vec<Vec<Button>>;

/// Recommendation line shown under the road.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    Idle,
    Analyzing,
    Recommended(Side),
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct RoadView {
    pub user_id: UserId,
    pub image: RoadImage,
    pub window: PageWindow,
    pub advice: Advice,
    pub caption: String,
    pub keyboard: Keyboard,
}

/// Delivers a rendered view to the user.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn present(&self, view: &RoadView) -> Result<()>;
}

pub struct Desk {
    store: SessionStore,
    ledger: Mutex<Ledger>,
    advisor: Box<dyn Advisor>,
    presenter: Arc<dyn Presenter>,
    layout: RoadLayout,
    loss_appends_round: bool,
    prompt_limit: usize,
}

impl Desk {
    pub fn new(ledger: Ledger, advisor: Box<dyn Advisor>, presenter: Arc<dyn Presenter>, layout: RoadLayout) -> Self {
        Self {
            store: SessionStore::new(),
            ledger: Mutex::new(ledger),
            advisor,
            presenter,
            layout,
            loss_appends_round: true,
            prompt_limit: 20,
        }
    }

    pub fn with_loss_appends_round(mut self, on: bool) -> Self {
        self.loss_appends_round = on;
        self
    }

    pub fn with_prompt_limit(mut self, limit: usize) -> Self {
        self.prompt_limit = limit;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut ledger = self.ledger.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        f(&mut ledger)
    }

    /// Activity rows are observational; a failed write never blocks the user.
    fn note_activity(&self, user_id: UserId, action: &str, details: &str) {
        let ts = logging::ts_epoch_ms();
        if let Err(err) = self.with_ledger(|l| l.log_activity(user_id, action, details, ts)) {
            log(
                Level::Error,
                Domain::Ledger,
                "activity_write_failed",
                obj(&[("action", v_str(action)), ("error", v_str(&err.to_string()))]),
            );
        }
    }

    fn acquire(&self, user_id: UserId, action: &str) -> Result<SessionGuard> {
        self.store.get(user_id).try_acquire().map_err(|busy: Busy| {
            logging::log_busy(user_id, action);
            anyhow::Error::new(busy)
        })
    }

    /// First contact: register the user and show the current road.
    ///
    /// Deliberately not a reset: a repeated start shows the rounds already
    /// recorded instead of clearing them, and only [`Action::Reset`] writes a
    /// reset boundary to the ledger.
    pub async fn start(&self, user_id: UserId, username: &str) -> Result<RoadView> {
        let guard = self.acquire(user_id, "start")?;
        let ts = logging::ts_epoch_ms();
        let returning = self.with_ledger(|l| {
            let seen = l.user_seen(user_id)?;
            l.touch_user(user_id, username, ts)?;
            Ok(seen.is_some())
        })?;
        self.note_activity(user_id, "start", "");
        log(
            Level::Info,
            Domain::Session,
            "session_start",
            obj(&[
                ("user_id", json!(user_id)),
                ("returning", json!(returning)),
                ("sessions", json!(self.store.session_count())),
            ]),
        );
        self.show(user_id, guard, None).await
    }

    /// Apply one user action and present the result.
    ///
    /// Fails with [`Busy`] when the user already has an action running and
    /// with [`crate::session::Rejection`] for feedback nobody asked for.
    pub async fn handle(&self, user_id: UserId, action: Action) -> Result<RoadView> {
        let mut guard = self.acquire(user_id, action.code())?;
        self.note_activity(user_id, "button_click", action.code());

        let per_page = self.layout.cols_per_page;
        let mut advice = None;
        match action {
            Action::Record(outcome) => {
                guard.record(outcome, per_page);
                logging::log_outcome(user_id, outcome, guard.history().len(), guard.page());
            }
            Action::Reset => {
                // The ledger boundary is written before the session clears.
                let ts = logging::ts_epoch_ms();
                self.with_ledger(|l| l.record_reset(user_id, ts))?;
                let cleared = guard.history().len();
                guard.reset();
                logging::log_reset(user_id, cleared);
            }
            Action::Navigate(direction) => guard.navigate(direction),
            Action::Recommend => {
                advice = Some(self.recommend(user_id, &mut guard).await?);
            }
            Action::Feedback(feedback) => {
                let before = Session::clone(&guard);
                let applied = guard.apply_feedback(feedback, self.loss_appends_round, per_page)?;
                debug_assert!(guard.is_consistent());
                let record = LedgerRecord {
                    recommendation: applied.recommendation,
                    feedback,
                    ts: logging::ts_epoch_ms(),
                };
                if let Err(err) = self.with_ledger(|l| l.record_recommendation(user_id, &record)) {
                    // The grid may only show what the ledger has.
                    *guard = before;
                    return Err(err);
                }
                logging::log_feedback(
                    user_id,
                    applied.recommendation.as_str(),
                    feedback.as_str(),
                    applied.appended.map(|o| o.as_str()),
                );
            }
        }

        self.show(user_id, guard, advice).await
    }

    async fn recommend(&self, user_id: UserId, guard: &mut SessionGuard) -> Result<Advice> {
        guard.clear_recommendation();
        let analyzing = self.build_view(user_id, guard, Advice::Analyzing)?;
        self.presenter.present(&analyzing).await?;

        let limit = self.prompt_limit;
        let performance = self.with_ledger(|l| l.recent_records(user_id, limit))?;
        let started = Instant::now();
        let result = self.advisor.recommend(guard.history(), &performance).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(match result {
            Ok(side) => {
                guard.set_recommendation(side);
                logging::log_recommendation(user_id, Some(side.as_str()), None, elapsed_ms);
                Advice::Recommended(side)
            }
            Err(err) => {
                logging::log_recommendation(user_id, None, Some(&err.to_string()), elapsed_ms);
                Advice::Unavailable
            }
        })
    }

    async fn show(&self, user_id: UserId, mut guard: SessionGuard, advice: Option<Advice>) -> Result<RoadView> {
        let advice = advice.unwrap_or(match guard.recommendation() {
            Some(side) => Advice::Recommended(side),
            None => Advice::Idle,
        });
        let view = self.build_view(user_id, &mut guard, advice)?;
        self.presenter.present(&view).await?;
        Ok(view)
    }

    fn build_view(&self, user_id: UserId, session: &mut Session, advice: Advice) -> Result<RoadView> {
        let started = Instant::now();
        let frame = self.layout.frame(session.history(), session.correct(), session.page())?;
        session.settle_page(frame.window.page_index);
        logging::log_render(
            user_id,
            frame.window.page_index,
            frame.window.total_pages,
            frame.road.highest_column,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        logging::log_audit(user_id, "render", session.history(), session.correct().len());

        let summary = self.with_ledger(|l| l.summary_since_reset(user_id))?;
        Ok(RoadView {
            user_id,
            caption: caption(session.tally(), summary, advice),
            keyboard: keyboard(&frame.window, advice),
            image: frame.image,
            window: frame.window,
            advice,
        })
    }

    /// Wait out any running action and log where the session ended.
    pub async fn close(&self, user_id: UserId) {
        let session = self.store.get(user_id).acquire().await;
        logging::log_audit(user_id, "session_close", session.history(), session.correct().len());
        match self.with_ledger(|l| l.activity_count(user_id)) {
            Ok(actions) => log(
                Level::Info,
                Domain::Session,
                "session_close",
                obj(&[("user_id", json!(user_id)), ("actions", json!(actions))]),
            ),
            Err(err) => log(
                Level::Error,
                Domain::Ledger,
                "activity_count_failed",
                obj(&[("error", v_str(&err.to_string()))]),
            ),
        }
    }
}

pub fn caption(tally: Tally, summary: LedgerSummary, advice: Advice) -> String {
    let advice_line = match advice {
        Advice::Idle => "Recommendation: -".to_string(),
        Advice::Analyzing => "Recommendation: analyzing...".to_string(),
        Advice::Recommended(side) => format!("Recommendation: {}", side),
        Advice::Unavailable => "Recommendation: no recommendation available".to_string(),
    };
    let record = if summary.total() == 0 {
        "AI since reset: no results yet".to_string()
    } else {
        format!(
            "AI since reset: {}W {}L ({:.0}%)",
            summary.wins,
            summary.losses,
            summary.win_rate() * 100.0
        )
    };
    format!(
        "Player {} | Banker {} | Tie {}\n{}\n{}",
        tally.player, tally.banker, tally.tie, record, advice_line
    )
}

pub fn keyboard(window: &PageWindow, advice: Advice) -> Keyboard {
    let mut rows = vec![vec![
        Button::new("Player", Action::Record(Outcome::Player)),
        Button::new("Banker", Action::Record(Outcome::Banker)),
        Button::new("Tie", Action::Record(Outcome::Tie)),
    ]];
    if window.total_pages > 1 {
        rows.push(vec![
            Button::new("< Prev", Action::Navigate(Direction::Prev)),
            Button::new("Next >", Action::Navigate(Direction::Next)),
        ]);
    }
    match advice {
        Advice::Analyzing => {}
        Advice::Recommended(_) => rows.push(vec![
            Button::new("Win", Action::Feedback(Feedback::Win)),
            Button::new("Loss", Action::Feedback(Feedback::Loss)),
        ]),
        Advice::Idle | Advice::Unavailable => {
            rows.push(vec![Button::new("AI recommendation", Action::Recommend)])
        }
    }
    rows.push(vec![Button::new("Reset", Action::Reset)]);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::page::paginate;

    #[test]
    fn test_parse_actions() {
        assert_eq!("p".parse::<Action>().unwrap(), Action::Record(Outcome::Player));
        assert_eq!("Next".parse::<Action>().unwrap(), Action::Navigate(Direction::Next));
        assert_eq!("loss".parse::<Action>().unwrap(), Action::Feedback(Feedback::Loss));
        assert!("xyz".parse::<Action>().is_err());
        for a in ["P", "B", "T", "reset", "next", "prev", "ai", "win", "loss"] {
            assert_eq!(a.parse::<Action>().unwrap().code(), a);
        }
    }

    #[test]
    fn test_caption_lines() {
        let tally = Tally { player: 3, banker: 2, tie: 1 };
        let text = caption(tally, LedgerSummary { wins: 2, losses: 2 }, Advice::Recommended(Side::Banker));
        assert_eq!(
            text,
            "Player 3 | Banker 2 | Tie 1\nAI since reset: 2W 2L (50%)\nRecommendation: Banker"
        );
        let text = caption(tally, LedgerSummary::default(), Advice::Unavailable);
        assert!(text.ends_with("no recommendation available"));
        assert!(text.contains("no results yet"));
    }

    #[test]
    fn test_keyboard_layout() {
        let single = paginate(Some(3), 0, 30);
        let kb = keyboard(&single, Advice::Idle);
        assert_eq!(kb.len(), 3);
        assert_eq!(kb[1][0].action, Action::Recommend);

        let multi = paginate(Some(40), 0, 30);
        let kb = keyboard(&multi, Advice::Recommended(Side::Player));
        assert_eq!(kb.len(), 4);
        assert_eq!(kb[1][1].action, Action::Navigate(Direction::Next));
        assert_eq!(kb[2][0].action, Action::Feedback(Feedback::Win));

        let kb = keyboard(&single, Advice::Analyzing);
        assert!(kb.iter().flatten().all(|b| b.action != Action::Recommend));
    }
}
