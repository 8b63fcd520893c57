//! SQLite export of the merged dataset
//!
//! The database is rebuilt from scratch on every export: it is written to a
//! hidden sibling file and renamed into place once the transaction commits.

use crate::output::traits::{DatasetExporter, OutputResult};
use crate::record::MatchRecord;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Schema of the exported database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    ordinal INTEGER NOT NULL,
    match_id INTEGER PRIMARY KEY,
    season INTEGER NOT NULL,
    date TEXT,
    tournament TEXT,
    event_type TEXT NOT NULL,
    team1 TEXT NOT NULL,
    team1_score INTEGER NOT NULL,
    team2 TEXT NOT NULL,
    team2_score INTEGER NOT NULL,
    winner TEXT NOT NULL,
    winner_past3 REAL NOT NULL,
    loser_past3 REAL NOT NULL,
    winner_map TEXT,
    loser_map TEXT,
    decider TEXT,
    winner_head2head_freq INTEGER,
    loser_head2head_freq INTEGER,
    winner_head2head_percentage REAL NOT NULL,
    loser_head2head_percentage REAL NOT NULL,
    source_url TEXT NOT NULL,
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_matches_ordinal ON matches(ordinal);
CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season);
"#;

/// Creates the schema on a fresh connection
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Writes the dataset to a SQLite database, one row per match
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteExporter;

impl DatasetExporter for SqliteExporter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn export(&self, records: &[MatchRecord], path: &Path) -> OutputResult<usize> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(path);
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }

        {
            let mut conn = Connection::open(&tmp)?;
            initialize_schema(&conn)?;

            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO matches (
                        ordinal, match_id, season, date, tournament, event_type,
                        team1, team1_score, team2, team2_score, winner,
                        winner_past3, loser_past3, winner_map, loser_map, decider,
                        winner_head2head_freq, loser_head2head_freq,
                        winner_head2head_percentage, loser_head2head_percentage,
                        source_url, scraped_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                              ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                )?;

                for (ordinal, record) in records.iter().enumerate() {
                    stmt.execute(params![
                        ordinal as i64,
                        record.match_id as i64,
                        record.season,
                        record.date.map(|d| d.to_rfc3339()),
                        record.tournament,
                        record.event_type.as_str(),
                        record.team1.name,
                        record.team1.score,
                        record.team2.name,
                        record.team2.score,
                        record.winner.as_str(),
                        record.past_3_months.winner_past3,
                        record.past_3_months.loser_past3,
                        record.map_veto.winner_map,
                        record.map_veto.loser_map,
                        record.map_veto.decider,
                        record.head_to_head.winner_head2head_freq,
                        record.head_to_head.loser_head2head_freq,
                        record.head_to_head.winner_head2head_percentage,
                        record.head_to_head.loser_head2head_percentage,
                        record.metadata.source_url,
                        record.metadata.scraped_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
        }

        std::fs::rename(&tmp, path)?;
        Ok(records.len())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "matches.db".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
