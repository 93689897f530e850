//! Map, duration and streak statistics.

use chrono::{DateTime, Utc};

use super::Tally;
use crate::models::{DurationDistribution, Game, PersonStat, ProfileId, TrendStats};

const UNKNOWN_MAP: &str = "Unknown";

/// One of the target's games, reduced to what the trends need.
struct Outcome {
    started_at: Option<DateTime<Utc>>,
    raw_started_at: String,
    won: bool,
}

/// Bucket a game length in seconds.
fn bucket(distribution: &mut DurationDistribution, seconds: u64) {
    match seconds / 60 {
        0..=9 => distribution.very_short += 1,
        10..=19 => distribution.short += 1,
        20..=29 => distribution.medium += 1,
        30..=39 => distribution.long += 1,
        _ => distribution.very_long += 1,
    }
}

/// Format an average length as `m:ss`.
fn format_length(total_seconds: u64, count: u64) -> String {
    if count == 0 {
        return "-".to_string();
    }
    let avg = (total_seconds as f64 / count as f64).round() as u64;
    format!("{}:{:02}", avg / 60, avg % 60)
}

/// Rounded win percentage over the last `n` outcomes.
fn recent_win_rate(sorted: &[Outcome], n: usize) -> u32 {
    let recent = &sorted[sorted.len().saturating_sub(n)..];
    if recent.is_empty() {
        return 0;
    }
    let wins = recent.iter().filter(|o| o.won).count();
    (wins as f64 / recent.len() as f64 * 100.0).round() as u32
}

/// Compute trend statistics for `profile_id`.
///
/// Streaks and recent win rates follow `started_at` order. Games whose
/// timestamp does not parse sort first.
pub fn analyze_trends(games: &[Game], profile_id: ProfileId) -> TrendStats {
    let mut maps: Tally<PersonStat> = Tally::new();
    let mut distribution = DurationDistribution::default();
    let mut total_duration = 0u64;
    let mut duration_count = 0u64;
    let mut longest_game = 0u64;
    let mut outcomes = Vec::new();

    for game in games {
        let Some((_, me)) = game.find_player(profile_id) else {
            continue;
        };
        let won = me.is_win();

        if let Some(seconds) = game.duration {
            total_duration += seconds;
            duration_count += 1;
            bucket(&mut distribution, seconds);
            longest_game = longest_game.max(seconds);
        }

        let map = game
            .map
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MAP);
        maps.entry(map).record(won);

        outcomes.push(Outcome {
            started_at: game.started_at_utc(),
            raw_started_at: game.started_at.clone(),
            won,
        });
    }

    outcomes.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.raw_started_at.cmp(&b.raw_started_at))
    });

    let current_win_streak = outcomes.iter().rev().take_while(|o| o.won).count() as u32;

    let (mut longest_win_streak, mut longest_loss_streak) = (0u32, 0u32);
    let (mut win_run, mut loss_run) = (0u32, 0u32);
    for o in &outcomes {
        if o.won {
            win_run += 1;
            loss_run = 0;
            longest_win_streak = longest_win_streak.max(win_run);
        } else {
            loss_run += 1;
            win_run = 0;
            longest_loss_streak = longest_loss_streak.max(loss_run);
        }
    }

    TrendStats {
        map_stats: maps.into_ranked(|m| m.games),
        duration_distribution: distribution,
        average_game_length: format_length(total_duration, duration_count),
        longest_game_seconds: longest_game,
        current_win_streak,
        longest_win_streak,
        longest_loss_streak,
        win_rate_last_10: recent_win_rate(&outcomes, 10),
        win_rate_last_50: recent_win_rate(&outcomes, 50),
    }
}
