//! Big Road record keeper.
//!
//! Tracks Player/Banker/Tie rounds per user, draws them as a paged Big Road
//! image and asks a reasoning service for the next-hand recommendation,
//! feeding it its own track record since the user's last reset.

pub mod advisor;
pub mod config;
pub mod desk;
pub mod ledger;
pub mod logging;
pub mod outcome;
pub mod road;
pub mod session;
pub mod store;
