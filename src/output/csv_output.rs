//! Flat CSV export
//!
//! One row per match; nested fields are spread into columns.

use crate::output::traits::{DatasetExporter, OutputResult};
use crate::record::MatchRecord;
use crate::storage::atomic_write;
use serde::Serialize;
use std::path::Path;

/// One CSV row
#[derive(Debug, Serialize)]
struct FlatRow<'a> {
    match_id: u64,
    season: u32,
    date: String,
    tournament: &'a str,
    event_type: &'static str,
    team1: &'a str,
    team1_score: u32,
    team2: &'a str,
    team2_score: u32,
    winner: &'a str,
    winner_side: &'static str,
    winner_past3: f64,
    loser_past3: f64,
    winner_map: &'a str,
    loser_map: &'a str,
    decider: &'a str,
    winner_head2head_freq: Option<u32>,
    loser_head2head_freq: Option<u32>,
    winner_head2head_percentage: f64,
    loser_head2head_percentage: f64,
    source_url: &'a str,
    scraped_at: String,
}

impl<'a> From<&'a MatchRecord> for FlatRow<'a> {
    fn from(record: &'a MatchRecord) -> Self {
        Self {
            match_id: record.match_id,
            season: record.season,
            date: record.date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            tournament: record.tournament.as_deref().unwrap_or(""),
            event_type: record.event_type.as_str(),
            team1: &record.team1.name,
            team1_score: record.team1.score,
            team2: &record.team2.name,
            team2_score: record.team2.score,
            winner: record.winner_name().unwrap_or("tie"),
            winner_side: record.winner.as_str(),
            winner_past3: record.past_3_months.winner_past3,
            loser_past3: record.past_3_months.loser_past3,
            winner_map: record.map_veto.winner_map.as_deref().unwrap_or(""),
            loser_map: record.map_veto.loser_map.as_deref().unwrap_or(""),
            decider: record.map_veto.decider.as_deref().unwrap_or(""),
            winner_head2head_freq: record.head_to_head.winner_head2head_freq,
            loser_head2head_freq: record.head_to_head.loser_head2head_freq,
            winner_head2head_percentage: record.head_to_head.winner_head2head_percentage,
            loser_head2head_percentage: record.head_to_head.loser_head2head_percentage,
            source_url: &record.metadata.source_url,
            scraped_at: record.metadata.scraped_at.to_rfc3339(),
        }
    }
}

/// Writes the dataset as a flat CSV table
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvExporter;

impl DatasetExporter for CsvExporter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn export(&self, records: &[MatchRecord], path: &Path) -> OutputResult<usize> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer.serialize(FlatRow::from(record))?;
        }
        writer.flush()?;

        let bytes = writer
            .into_inner()
            .map_err(|e| crate::output::OutputError::Write(e.to_string()))?;
        atomic_write(path, &bytes)?;
        Ok(records.len())
    }
}
