//! Per-user session state.
//!
//! History and the correct set only change together through the methods
//! here, so every correct index always addresses a P/B round that exists.

use std::collections::BTreeSet;
use std::fmt;

use crate::outcome::{Outcome, Side};
use crate::road::{grid, page};

pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Win,
    Loss,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Win => "win",
            Feedback::Loss => "loss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoPendingRecommendation,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoPendingRecommendation => f.write_str("no recommendation is waiting for feedback"),
        }
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub player: usize,
    pub banker: usize,
    pub tie: usize,
}

/// What a feedback event did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackApplied {
    pub recommendation: Side,
    pub feedback: Feedback,
    /// Round appended to the history, if any.
    pub appended: Option<Outcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    history: Vec<Outcome>,
    correct: BTreeSet<usize>,
    page: usize,
    recommendation: Option<Side>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Outcome] {
        &self.history
    }

    pub fn correct(&self) -> &BTreeSet<usize> {
        &self.correct
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn recommendation(&self) -> Option<Side> {
        self.recommendation
    }

    pub fn tally(&self) -> Tally {
        self.history.iter().fold(Tally::default(), |mut t, o| {
            match o {
                Outcome::Player => t.player += 1,
                Outcome::Banker => t.banker += 1,
                Outcome::Tie => t.tie += 1,
            }
            t
        })
    }

    fn placed(&self) -> usize {
        self.history.iter().filter(|o| o.is_placed()).count()
    }

    /// Append a round. A P/B round moves the page to the newest column and
    /// drops any recommendation that was waiting on it.
    pub fn record(&mut self, outcome: Outcome, cols_per_page: usize) {
        self.history.push(outcome);
        self.recommendation = None;
        if outcome.is_placed() {
            self.jump_to_last_page(cols_per_page);
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.correct.clear();
        self.page = 0;
        self.recommendation = None;
    }

    pub fn navigate(&mut self, direction: Direction) {
        self.page = match direction {
            Direction::Next => self.page.saturating_add(1),
            Direction::Prev => self.page.saturating_sub(1),
        };
    }

    /// Store the index the paginator actually showed.
    pub fn settle_page(&mut self, page_index: usize) {
        self.page = page_index;
    }

    pub fn set_recommendation(&mut self, side: Side) {
        self.recommendation = Some(side);
    }

    pub fn clear_recommendation(&mut self) {
        self.recommendation = None;
    }

    /// Close out the pending recommendation.
    ///
    /// A win records the recommended side as the next round and marks it
    /// correct. A loss records the opposite side when `loss_appends_round`
    /// is set and otherwise leaves the history alone.
    pub fn apply_feedback(
        &mut self,
        feedback: Feedback,
        loss_appends_round: bool,
        cols_per_page: usize,
    ) -> Result<FeedbackApplied, Rejection> {
        let recommendation = self
            .recommendation
            .take()
            .ok_or(Rejection::NoPendingRecommendation)?;

        let appended = match feedback {
            Feedback::Win => {
                let pb_index = self.placed();
                self.history.push(recommendation.outcome());
                self.correct.insert(pb_index);
                Some(recommendation.outcome())
            }
            Feedback::Loss if loss_appends_round => {
                let actual = recommendation.opposite().outcome();
                self.history.push(actual);
                Some(actual)
            }
            Feedback::Loss => None,
        };
        if appended.is_some() {
            self.jump_to_last_page(cols_per_page);
        }

        Ok(FeedbackApplied { recommendation, feedback, appended })
    }

    fn jump_to_last_page(&mut self, cols_per_page: usize) {
        // A zero-column encode runs the cursor without building cells.
        let road = grid::encode(&self.history, &BTreeSet::new(), 0);
        self.page = page::last_page(road.highest_column, cols_per_page);
    }

    /// Every correct index addresses an existing P/B round.
    pub fn is_consistent(&self) -> bool {
        let placed = self.placed();
        self.correct.iter().all(|&i| i < placed)
    }
}
