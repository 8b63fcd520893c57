//! Canonical match record
//!
//! A `MatchRecord` is what one successfully fetched work item produces. Its
//! natural key is `match_id`, which always equals the identifier of the work
//! item it was fetched for. Every field that the source may fail to provide
//! has an explicit default, listed on the field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Win rate recorded when the source has no history to compute one from.
///
/// This is a data convention, not a measurement: a team without recent
/// results is treated as a coin flip.
pub const UNAVAILABLE_WIN_RATE: f64 = 50.0;

/// Head-to-head share given to both sides when they have met but neither
/// has won a map against the other.
pub const EVEN_HEAD_TO_HEAD_PERCENT: f64 = 50.0;

/// Head-to-head share recorded when the page has no head-to-head block.
pub const UNAVAILABLE_HEAD_TO_HEAD_PERCENT: f64 = 0.0;

fn unavailable_win_rate() -> f64 {
    UNAVAILABLE_WIN_RATE
}

fn unavailable_head_to_head() -> f64 {
    UNAVAILABLE_HEAD_TO_HEAD_PERCENT
}

/// Whether the match was played on LAN or online
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Lan,
    Online,
    /// The notes block did not say (default)
    #[default]
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lan => "lan",
            Self::Online => "online",
            Self::Unknown => "unknown",
        }
    }
}

/// Side that won the series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Team1,
    Team2,
    Tie,
}

impl Winner {
    /// Derives the winner from the series score
    pub fn from_scores(team1: u32, team2: u32) -> Self {
        match team1.cmp(&team2) {
            std::cmp::Ordering::Greater => Self::Team1,
            std::cmp::Ordering::Less => Self::Team2,
            std::cmp::Ordering::Equal => Self::Tie,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Team1 => "team1",
            Self::Team2 => "team2",
            Self::Tie => "tie",
        }
    }
}

/// One side of the match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResult {
    pub name: String,
    /// Maps won in the series
    pub score: u32,
}

/// Recent form of both sides, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentForm {
    #[serde(default = "unavailable_win_rate")]
    pub winner_past3: f64,
    #[serde(default = "unavailable_win_rate")]
    pub loser_past3: f64,
}

impl Default for RecentForm {
    fn default() -> Self {
        Self {
            winner_past3: UNAVAILABLE_WIN_RATE,
            loser_past3: UNAVAILABLE_WIN_RATE,
        }
    }
}

/// Maps picked during the veto, seen from the series result
///
/// Every map is `None` when the veto block is missing or does not name it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapVeto {
    #[serde(default)]
    pub winner_map: Option<String>,
    #[serde(default)]
    pub loser_map: Option<String>,
    #[serde(default)]
    pub decider: Option<String>,
}

/// Maps won by each side in previous meetings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    #[serde(default)]
    pub winner_head2head_freq: Option<u32>,
    #[serde(default)]
    pub loser_head2head_freq: Option<u32>,
    #[serde(default = "unavailable_head_to_head")]
    pub winner_head2head_percentage: f64,
    #[serde(default = "unavailable_head_to_head")]
    pub loser_head2head_percentage: f64,
}

impl HeadToHead {
    /// Derives both shares from the map counts
    ///
    /// | Counts | Shares |
    /// |--------|--------|
    /// | both known, total > 0 | rounded to two decimals |
    /// | both zero | `EVEN_HEAD_TO_HEAD_PERCENT` each |
    /// | either unknown | `UNAVAILABLE_HEAD_TO_HEAD_PERCENT` each |
    pub fn from_frequencies(winner: Option<u32>, loser: Option<u32>) -> Self {
        let (winner_pct, loser_pct) = match (winner, loser) {
            (Some(0), Some(0)) => (EVEN_HEAD_TO_HEAD_PERCENT, EVEN_HEAD_TO_HEAD_PERCENT),
            (Some(w), Some(l)) => {
                let total = f64::from(w) + f64::from(l);
                (
                    (f64::from(w) / total * 10_000.0).round() / 100.0,
                    (f64::from(l) / total * 10_000.0).round() / 100.0,
                )
            }
            _ => (
                UNAVAILABLE_HEAD_TO_HEAD_PERCENT,
                UNAVAILABLE_HEAD_TO_HEAD_PERCENT,
            ),
        };

        Self {
            winner_head2head_freq: winner,
            loser_head2head_freq: loser,
            winner_head2head_percentage: winner_pct,
            loser_head2head_percentage: loser_pct,
        }
    }
}

impl Default for HeadToHead {
    fn default() -> Self {
        Self::from_frequencies(None, None)
    }
}

/// Provenance of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

/// The structured output for one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: u64,

    /// Season bucket derived from the snapshot position
    pub season: u32,

    /// Scheduled start; `None` when the page carries no timestamp
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Event name; `None` when absent
    #[serde(default)]
    pub tournament: Option<String>,

    #[serde(default)]
    pub event_type: EventType,

    pub team1: TeamResult,
    pub team2: TeamResult,
    pub winner: Winner,

    /// Defaults to `UNAVAILABLE_WIN_RATE` on both sides
    #[serde(default)]
    pub past_3_months: RecentForm,

    /// Every map `None` when the page has no veto
    #[serde(default)]
    pub map_veto: MapVeto,

    /// Unknown counts with `UNAVAILABLE_HEAD_TO_HEAD_PERCENT` shares when absent
    #[serde(default)]
    pub head_to_head: HeadToHead,

    pub metadata: RecordMetadata,
}

impl MatchRecord {
    /// Name of the winning side, or `None` for a tie
    pub fn winner_name(&self) -> Option<&str> {
        match self.winner {
            Winner::Team1 => Some(&self.team1.name),
            Winner::Team2 => Some(&self.team2.name),
            Winner::Tie => None,
        }
    }
}

/// Maps a zero-based snapshot position to its season number (1-based)
pub fn season_for_position(position: usize, season_length: usize, max_season: u32) -> u32 {
    let season = position / season_length.max(1) + 1;
    u32::try_from(season).unwrap_or(u32::MAX).min(max_season)
}
