use crate::error::SessionError;
use crate::event::{Event, Updates};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;

/// Events per channel per user, in arrival (or send) order.
#[derive(Debug, Default)]
pub struct GameEventStore {
    games: HashMap<String, HashMap<String, Vec<Event>>>,
}

impl GameEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, game: &str, user: &str, event: Event) {
        self.games
            .entry(game.to_string())
            .or_default()
            .entry(user.to_string())
            .or_default()
            .push(event);
    }

    pub fn events(&self, game: &str, user: &str) -> &[Event] {
        self.games
            .get(game)
            .and_then(|users| users.get(user))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_events(&self) -> usize {
        self.games
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }
}

/// Renders the summary report for one (game, user) pair.
///
/// Events are ordered by time (stable for ties), stats are merged with the
/// later event winning, and each stats block is listed alphabetically.
pub fn compile_summary(events: &[Event]) -> Option<String> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by_key(|event| event.time);
    let first = ordered.first()?;

    let mut general = Updates::new();
    let mut team_a = Updates::new();
    let mut team_b = Updates::new();
    for event in &ordered {
        merge(&mut general, &event.game_updates);
        merge(&mut team_a, &event.team_a_updates);
        merge(&mut team_b, &event.team_b_updates);
    }

    let mut out = String::new();
    let _ = writeln!(out, "{} vs {}", first.team_a, first.team_b);
    out.push_str("Game stats:\n");
    out.push_str("General stats:\n");
    write_stats(&mut out, &general);
    let _ = writeln!(out, "{} stats:", first.team_a);
    write_stats(&mut out, &team_a);
    let _ = writeln!(out, "{} stats:", first.team_b);
    write_stats(&mut out, &team_b);
    out.push_str("Game event reports:\n");
    for event in &ordered {
        let _ = writeln!(out, "{} - {}:", event.time, event.name);
        out.push('\n');
        out.push_str(&event.description);
        out.push_str("\n\n");
    }
    Some(out)
}

fn merge(into: &mut Updates, from: &Updates) {
    for (key, value) in from {
        into.insert(key.clone(), value.clone());
    }
}

fn write_stats(out: &mut String, stats: &Updates) {
    for (key, value) in stats {
        let _ = writeln!(out, "{key}: {value}");
    }
}

/// Replaces whatever is at `path` with `report`.
pub fn write_summary(report: &str, path: &Path) -> Result<(), SessionError> {
    let io_err = |source| SessionError::FileIo {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(report.as_bytes()).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, time: i64, general: &[(&str, &str)]) -> Event {
        Event {
            team_a: "Germany".to_string(),
            team_b: "Japan".to_string(),
            name: name.to_string(),
            time,
            game_updates: general
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            description: format!("{name} happened"),
            ..Event::default()
        }
    }

    #[test]
    fn later_timestamp_wins_regardless_of_arrival_order() {
        let events = vec![
            event("second", 2, &[("score", "1-0")]),
            event("first", 1, &[("score", "0-0")]),
        ];
        let report = compile_summary(&events).expect("report");
        assert!(report.contains("score: 1-0\n"));
        assert!(!report.contains("score: 0-0"));
    }

    #[test]
    fn reports_are_sorted_by_time() {
        let events = vec![event("e5", 5, &[]), event("e1", 1, &[]), event("e3", 3, &[])];
        let report = compile_summary(&events).expect("report");
        let p1 = report.find("1 - e1:").expect("e1");
        let p3 = report.find("3 - e3:").expect("e3");
        let p5 = report.find("5 - e5:").expect("e5");
        assert!(p1 < p3 && p3 < p5);
    }

    #[test]
    fn equal_times_keep_arrival_order() {
        let events = vec![
            event("later", 7, &[("x", "late")]),
            event("b", 7, &[("x", "b")]),
        ];
        let report = compile_summary(&events).expect("report");
        assert!(report.find("7 - later:").unwrap() < report.find("7 - b:").unwrap());
        assert!(report.contains("x: b\n"));
    }

    #[test]
    fn full_layout_with_sorted_stats() {
        let mut kickoff = event("kickoff", 0, &[("zeta", "1"), ("active", "true")]);
        kickoff.team_a_updates.insert("goals".to_string(), "0".to_string());
        kickoff.team_b_updates.insert("possession".to_string(), "49%".to_string());
        let report = compile_summary(&[kickoff]).expect("report");
        assert_eq!(
            report,
            "Germany vs Japan\n\
             Game stats:\n\
             General stats:\n\
             active: true\n\
             zeta: 1\n\
             Germany stats:\n\
             goals: 0\n\
             Japan stats:\n\
             possession: 49%\n\
             Game event reports:\n\
             0 - kickoff:\n\
             \n\
             kickoff happened\n\
             \n"
        );
    }

    #[test]
    fn empty_input_compiles_nothing() {
        assert!(compile_summary(&[]).is_none());
    }

    #[test]
    fn write_summary_replaces_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.txt");
        std::fs::write(&path, "stale content that is much longer than needed\n".repeat(50))
            .expect("seed");

        let report = compile_summary(&[event("kickoff", 0, &[])]).expect("report");
        write_summary(&report, &path).expect("write");

        let written = std::fs::read_to_string(&path).expect("read");
        assert!(written.starts_with("Germany vs Japan\n"));
        assert!(!written.contains("stale content"));
    }

    #[test]
    fn unwritable_destination_is_file_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("missing-dir").join("s.txt");
        let err = write_summary("Germany vs Japan\n", &target).unwrap_err();
        assert!(matches!(err, SessionError::FileIo { .. }));
    }

    #[test]
    fn store_keeps_arrival_order_per_user() {
        let mut store = GameEventStore::new();
        store.record("g", "u", event("a", 3, &[]));
        store.record("g", "u", event("b", 1, &[]));
        store.record("g", "other", event("c", 1, &[]));
        let names: Vec<_> = store.events("g", "u").iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.total_events(), 3);
        assert!(store.events("g", "nobody").is_empty());
    }
}
