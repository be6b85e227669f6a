use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Player,
    Banker,
    Tie,
}

impl Outcome {
    pub fn symbol(&self) -> char {
        match self {
            Outcome::Player => 'P',
            Outcome::Banker => 'B',
            Outcome::Tie => 'T',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Player => "Player",
            Outcome::Banker => "Banker",
            Outcome::Tie => "Tie",
        }
    }

    /// Player and Banker occupy grid cells; ties only annotate them.
    pub fn is_placed(&self) -> bool {
        !matches!(self, Outcome::Tie)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            Outcome::Player => Some(Side::Player),
            Outcome::Banker => Some(Side::Banker),
            Outcome::Tie => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcomeError(pub String);

impl fmt::Display for ParseOutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised outcome symbol: {:?}", self.0)
    }
}

impl std::error::Error for ParseOutcomeError {}

impl FromStr for Outcome {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" | "player" => Ok(Outcome::Player),
            "b" | "banker" => Ok(Outcome::Banker),
            "t" | "tie" => Ok(Outcome::Tie),
            _ => Err(ParseOutcomeError(s.to_string())),
        }
    }
}

/// The two placeable sides; also the shape of every recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Player,
    Banker,
}

impl Side {
    pub fn outcome(&self) -> Outcome {
        match self {
            Side::Player => Outcome::Player,
            Side::Banker => Outcome::Banker,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Player => Side::Banker,
            Side::Banker => Side::Player,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.outcome().as_str()
    }

    /// Pull a side out of free text returned by the reasoning service.
    ///
    /// The earliest whole-word mention wins, so "Banker, not Player" is Banker.
    pub fn from_reply(text: &str) -> Option<Side> {
        let lower = text.to_ascii_lowercase();
        let words = lower
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty());
        for word in words {
            match word {
                "player" | "p" => return Some(Side::Player),
                "banker" | "b" => return Some(Side::Banker),
                _ => {}
            }
        }
        None
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Outcome>()? {
            Outcome::Player => Ok(Side::Player),
            Outcome::Banker => Ok(Side::Banker),
            Outcome::Tie => Err(ParseOutcomeError(s.to_string())),
        }
    }
}

/// Compact symbol string, e.g. `"PBTP"`.
pub fn symbols(history: &[Outcome]) -> String {
    history.iter().map(Outcome::symbol).collect()
}
