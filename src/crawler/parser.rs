//! HTML parser for match detail pages
//!
//! This module extracts a `MatchRecord` from a match page:
//! - Team names and series score (required)
//! - Start time, event name and LAN/online flag (optional)
//! - Forfeit notices
//! - Each side's win rate over the past three months
//! - The map veto and the head-to-head map count

use crate::record::{
    EventType, HeadToHead, MapVeto, MatchRecord, RecentForm, RecordMetadata, TeamResult, Winner,
    UNAVAILABLE_WIN_RATE,
};
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

/// What a match page turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMatch {
    Record(MatchRecord),
    /// The notes block says the match was forfeited; there is nothing to record
    Forfeit,
}

/// Provenance passed through to the record
#[derive(Debug, Clone)]
pub struct PageContext<'a> {
    pub match_id: u64,
    pub season: u32,
    pub source_url: &'a str,
    pub scraped_at: DateTime<Utc>,
}

/// Parses a match page
///
/// # Required Fields
///
/// Both team names and both series scores must be present; anything else
/// falls back to its documented default:
///
/// | Field | Source | Default |
/// |-------|--------|---------|
/// | date | `.time[data-unix]` (milliseconds) | `None` |
/// | tournament | `.event.text-ellipsis` | `None` |
/// | event_type | `(lan)` / `(online)` in `.padding.preformatted-text` | `unknown` |
/// | past_3_months | first two `.past-matches-table`s | 50.0 |
/// | map_veto | `X picked Y` / `Y was left over` lines in `.col-6.col-7-small` | `None` per map |
/// | head_to_head | `<team> <n> Wins` in `.head-to-head-listing` / `.head-to-head` | `None`, 0.0% |
///
/// # Returns
///
/// * `Ok(ParsedMatch)` - A record, or a forfeit notice
/// * `Err(String)` - A required field is missing
pub fn parse_match_page(html: &str, ctx: &PageContext<'_>) -> Result<ParsedMatch, String> {
    let document = Html::parse_document(html);

    let notes = select_text(&document, ".padding.preformatted-text").map(|t| t.to_lowercase());
    if notes.as_deref().is_some_and(|n| n.contains("forfeit")) {
        return Ok(ParsedMatch::Forfeit);
    }

    let team1 = extract_team(&document, "team1-gradient")?;
    let team2 = extract_team(&document, "team2-gradient")?;
    let winner = Winner::from_scores(team1.score, team2.score);

    let (team1_rate, team2_rate) = extract_past3_months(&document);
    let past_3_months = match winner {
        Winner::Team1 => RecentForm {
            winner_past3: team1_rate,
            loser_past3: team2_rate,
        },
        Winner::Team2 | Winner::Tie => RecentForm {
            winner_past3: team2_rate,
            loser_past3: team1_rate,
        },
    };

    let map_veto = extract_map_veto(&document, &team1.name, &team2.name, winner);
    let (team1_h2h, team2_h2h) = extract_head_to_head(&document, &team1.name, &team2.name);
    let (winner_h2h, loser_h2h) = by_result(winner, team1_h2h, team2_h2h);

    Ok(ParsedMatch::Record(MatchRecord {
        match_id: ctx.match_id,
        season: ctx.season,
        date: extract_date(&document),
        tournament: select_text(&document, ".event.text-ellipsis"),
        event_type: event_type_from_notes(notes.as_deref()),
        team1,
        team2,
        winner,
        past_3_months,
        map_veto,
        head_to_head: HeadToHead::from_frequencies(winner_h2h, loser_h2h),
        metadata: RecordMetadata {
            source_url: ctx.source_url.to_string(),
            scraped_at: ctx.scraped_at,
        },
    }))
}

/// Trimmed text of the first element matching `selector`, if non-empty
fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element_text(&element))
        .filter(|s| !s.is_empty())
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn extract_team(document: &Html, side: &str) -> Result<TeamResult, String> {
    let name = select_text(document, &format!(".{} .teamName", side))
        .ok_or_else(|| format!("missing team name in .{}", side))?;

    let score_selector = format!(".{0} .won, .{0} .lost, .{0} .tie", side);
    let score = select_text(document, &score_selector)
        .ok_or_else(|| format!("missing score in .{}", side))?
        .parse::<u32>()
        .map_err(|e| format!("unreadable score in .{}: {}", side, e))?;

    Ok(TeamResult { name, score })
}

fn extract_date(document: &Html) -> Option<DateTime<Utc>> {
    let selector = Selector::parse(".time[data-unix]").ok()?;
    let millis: i64 = document
        .select(&selector)
        .next()?
        .value()
        .attr("data-unix")?
        .trim()
        .parse()
        .ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn event_type_from_notes(notes: Option<&str>) -> EventType {
    match notes {
        Some(n) if n.contains("(lan)") => EventType::Lan,
        Some(n) if n.contains("(online)") => EventType::Online,
        _ => EventType::Unknown,
    }
}

/// Orders a per-team pair as (winner, loser); a tie keeps page order
fn by_result<T>(winner: Winner, team1: T, team2: T) -> (T, T) {
    match winner {
        Winner::Team2 => (team2, team1),
        Winner::Team1 | Winner::Tie => (team1, team2),
    }
}

/// Non-empty trimmed lines of every text node under the first match
fn text_lines(document: &Html, selector: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(selector).ok()?;
    let element = document.select(&selector).next()?;
    Some(
        element
            .text()
            .flat_map(str::lines)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Drops a leading veto step number: `3. Vitality` -> `Vitality`
fn strip_step(line: &str) -> &str {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    match rest.strip_prefix('.') {
        Some(rest) if rest.len() < line.len() - 1 => rest.trim(),
        _ => line,
    }
}

/// Loose team-name match; veto lines sometimes shorten names
fn same_team(candidate: &str, name: &str) -> bool {
    let candidate = candidate.to_lowercase();
    let name = name.to_lowercase();
    !candidate.is_empty() && (candidate.contains(&name) || name.contains(&candidate))
}

fn extract_map_veto(document: &Html, team1: &str, team2: &str, winner: Winner) -> MapVeto {
    let Some(lines) = text_lines(document, ".col-6.col-7-small") else {
        return MapVeto::default();
    };

    let mut team1_pick = None;
    let mut team2_pick = None;
    let mut decider = None;

    for line in &lines {
        let step = strip_step(line);
        if let Some((team, map)) = step.split_once(" picked ") {
            let map = Some(map.trim().to_string());
            if same_team(team.trim(), team1) {
                team1_pick = map;
            } else if same_team(team.trim(), team2) {
                team2_pick = map;
            }
        } else if let Some(map) = step.strip_suffix(" was left over") {
            decider = Some(map.trim().to_string());
        }
    }

    let (winner_map, loser_map) = by_result(winner, team1_pick, team2_pick);
    MapVeto {
        winner_map,
        loser_map,
        decider,
    }
}

/// Maps won by team1 and team2 in previous meetings
fn extract_head_to_head(document: &Html, team1: &str, team2: &str) -> (Option<u32>, Option<u32>) {
    let Some(lines) = text_lines(document, ".head-to-head-listing, .head-to-head") else {
        return (None, None);
    };

    let wins_after = |team: &str| -> Option<u32> {
        lines.windows(3).find_map(|w| {
            let is_wins = w[2].to_lowercase().starts_with("wins");
            if w[0].eq_ignore_ascii_case(team) && is_wins {
                w[1].parse().ok()
            } else {
                None
            }
        })
    };

    (wins_after(team1), wins_after(team2))
}

/// Win rates for team1 and team2 from their past-matches tables
fn extract_past3_months(document: &Html) -> (f64, f64) {
    let (Ok(tables), Ok(rows), Ok(scores)) = (
        Selector::parse(".past-matches-table"),
        Selector::parse("tr"),
        Selector::parse(".past-matches-score"),
    ) else {
        return (UNAVAILABLE_WIN_RATE, UNAVAILABLE_WIN_RATE);
    };

    let mut rates = document.select(&tables).take(2).map(|table| {
        let results = table.select(&rows).filter_map(|row| {
            let score = element_text(&row.select(&scores).next()?);
            series_win(&score)
        });
        win_rate(results)
    });

    let team1 = rates.next().unwrap_or(UNAVAILABLE_WIN_RATE);
    let team2 = rates.next().unwrap_or(UNAVAILABLE_WIN_RATE);
    (team1, team2)
}

/// `Some(true)` for a won best-of-three, `None` for best-of-five or unreadable scores
fn series_win(score: &str) -> Option<bool> {
    if score.contains('3') {
        return None;
    }
    let digits: String = score.chars().take_while(|c| c.is_ascii_digit()).collect();
    let first: u32 = digits.parse().ok()?;
    Some(first >= 2)
}

fn win_rate(results: impl Iterator<Item = bool>) -> f64 {
    let (wins, total) = results.fold((0u32, 0u32), |(w, t), won| (w + u32::from(won), t + 1));
    if total == 0 {
        return UNAVAILABLE_WIN_RATE;
    }
    (f64::from(wins) / f64::from(total) * 10_000.0).round() / 100.0
}
