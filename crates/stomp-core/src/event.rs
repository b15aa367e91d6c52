use crate::error::SessionError;
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

pub type Updates = BTreeMap<String, String>;

const GENERAL_HEADER: &str = "general game updates:";
const TEAM_A_HEADER: &str = "team a updates:";
const TEAM_B_HEADER: &str = "team b updates:";
const DESCRIPTION_HEADER: &str = "description:";
const SECTION_HEADERS: [&str; 4] = [
    GENERAL_HEADER,
    TEAM_A_HEADER,
    TEAM_B_HEADER,
    DESCRIPTION_HEADER,
];

/// One reported occurrence within a game.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    pub team_a: String,
    pub team_b: String,
    pub name: String,
    pub time: i64,
    pub game_updates: Updates,
    pub team_a_updates: Updates,
    pub team_b_updates: Updates,
    pub description: String,
}

impl Event {
    pub fn game_name(&self) -> String {
        game_name(&self.team_a, &self.team_b)
    }

    /// SEND body for this event, attributed to `user`.
    pub fn to_message_body(&self, user: &str) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "user: {user}");
        let _ = writeln!(body, "team a: {}", self.team_a);
        let _ = writeln!(body, "team b: {}", self.team_b);
        let _ = writeln!(body, "event name: {}", self.name);
        let _ = writeln!(body, "time: {}", self.time);
        let _ = writeln!(body, "{GENERAL_HEADER}");
        write_updates(&mut body, &self.game_updates);
        let _ = writeln!(body, "{TEAM_A_HEADER}");
        write_updates(&mut body, &self.team_a_updates);
        let _ = writeln!(body, "{TEAM_B_HEADER}");
        write_updates(&mut body, &self.team_b_updates);
        let _ = writeln!(body, "{DESCRIPTION_HEADER}");
        body.push_str(&self.description);
        body.push('\n');
        body
    }

    /// Inverse of [`Event::to_message_body`] for a body whose `user:` line
    /// has already been consumed. Missing fields default; team names fall
    /// back to the `teamA_teamB` channel name.
    pub fn from_message_body(channel: &str, body: &str) -> Self {
        let mut event = Event::default();
        let mut section = Section::Header;
        let mut description = Vec::new();

        for line in body.lines() {
            if section == Section::Description {
                description.push(line);
                continue;
            }
            match line.trim() {
                GENERAL_HEADER => {
                    section = Section::General;
                    continue;
                }
                TEAM_A_HEADER => {
                    section = Section::TeamA;
                    continue;
                }
                TEAM_B_HEADER => {
                    section = Section::TeamB;
                    continue;
                }
                DESCRIPTION_HEADER => {
                    section = Section::Description;
                    continue;
                }
                _ => {}
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match section {
                Section::Header => match key {
                    "team a" => event.team_a = value.to_string(),
                    "team b" => event.team_b = value.to_string(),
                    "event name" => event.name = value.to_string(),
                    "time" => event.time = value.parse().unwrap_or_default(),
                    _ => {}
                },
                Section::General => {
                    event.game_updates.insert(key.to_string(), value.to_string());
                }
                Section::TeamA => {
                    event
                        .team_a_updates
                        .insert(key.to_string(), value.to_string());
                }
                Section::TeamB => {
                    event
                        .team_b_updates
                        .insert(key.to_string(), value.to_string());
                }
                Section::Description => {}
            }
        }

        event.description = description.join("\n");
        if event.team_a.is_empty() && event.team_b.is_empty() {
            if let Some((a, b)) = channel.split_once('_') {
                event.team_a = a.to_string();
                event.team_b = b.to_string();
            }
        }
        event
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    General,
    TeamA,
    TeamB,
    Description,
}

fn write_updates(body: &mut String, updates: &Updates) {
    for (key, value) in updates {
        let _ = writeln!(body, "{key}:{value}");
    }
}

pub fn game_name(team_a: &str, team_b: &str) -> String {
    format!("{team_a}_{team_b}")
}

/// A parsed events file: the two teams and their events in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameBatch {
    pub team_a: String,
    pub team_b: String,
    pub events: Vec<Event>,
}

impl GameBatch {
    pub fn game_name(&self) -> String {
        game_name(&self.team_a, &self.team_b)
    }
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    #[serde(rename = "team a")]
    team_a: String,
    #[serde(rename = "team b")]
    team_b: String,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "event name")]
    name: String,
    time: i64,
    #[serde(rename = "general game updates", default, deserialize_with = "updates")]
    game_updates: Updates,
    #[serde(rename = "team a updates", default, deserialize_with = "updates")]
    team_a_updates: Updates,
    #[serde(rename = "team b updates", default, deserialize_with = "updates")]
    team_b_updates: Updates,
    #[serde(default)]
    description: String,
}

/// Scalars are stringified (strings unquoted). An update whose `key:value`
/// line would read back as a section header is rejected.
fn updates<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Updates, D::Error> {
    let values = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut updates = Updates::new();
    for (key, value) in values {
        let value = match value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let line = format!("{key}:{value}");
        if SECTION_HEADERS.contains(&line.trim()) {
            return Err(D::Error::custom(format!(
                "update `{}` collides with a section header",
                line.trim()
            )));
        }
        updates.insert(key, value);
    }
    Ok(updates)
}

pub fn parse_events_json(raw: &str) -> Result<GameBatch, serde_json::Error> {
    let batch: RawBatch = serde_json::from_str(raw)?;
    let events = batch
        .events
        .into_iter()
        .map(|event| Event {
            team_a: batch.team_a.clone(),
            team_b: batch.team_b.clone(),
            name: event.name,
            time: event.time,
            game_updates: event.game_updates,
            team_a_updates: event.team_a_updates,
            team_b_updates: event.team_b_updates,
            description: event.description,
        })
        .collect();
    Ok(GameBatch {
        team_a: batch.team_a,
        team_b: batch.team_b,
        events,
    })
}

pub fn parse_events_file(path: &Path) -> Result<GameBatch, SessionError> {
    let raw = std::fs::read_to_string(path).map_err(|err| SessionError::ParseFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    parse_events_json(&raw).map_err(|err| SessionError::ParseFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EVENTS: &str = r#"{
        "team a": "Germany",
        "team b": "Japan",
        "events": [
            {
                "event name": "kickoff",
                "time": 0,
                "general game updates": {"active": true, "before halftime": "true"},
                "team a updates": {"goals": "0", "possession": "51%"},
                "team b updates": {"goals": 0},
                "description": "And we're off!"
            },
            {
                "event name": "goal!!!!",
                "time": 1980,
                "team a updates": {"goals": "1"},
                "description": "GOOOAAALLL!!!\nWhat a strike."
            }
        ]
    }"#;

    fn kickoff() -> Event {
        parse_events_json(EVENTS).expect("parse").events.remove(0)
    }

    #[test]
    fn parses_events_and_stringifies_scalars() {
        let batch = parse_events_json(EVENTS).expect("parse");
        assert_eq!(batch.game_name(), "Germany_Japan");
        assert_eq!(batch.events.len(), 2);

        let first = &batch.events[0];
        assert_eq!(first.team_a, "Germany");
        assert_eq!(first.game_updates.get("active").map(String::as_str), Some("true"));
        assert_eq!(first.team_b_updates.get("goals").map(String::as_str), Some("0"));
        assert_eq!(first.team_a_updates.get("possession").map(String::as_str), Some("51%"));

        let second = &batch.events[1];
        assert_eq!(second.time, 1980);
        assert!(second.game_updates.is_empty());
    }

    #[test]
    fn message_body_layout() {
        let body = kickoff().to_message_body("alice");
        assert_eq!(
            body,
            "user: alice\n\
             team a: Germany\n\
             team b: Japan\n\
             event name: kickoff\n\
             time: 0\n\
             general game updates:\n\
             active:true\n\
             before halftime:true\n\
             team a updates:\n\
             goals:0\n\
             possession:51%\n\
             team b updates:\n\
             goals:0\n\
             description:\n\
             And we're off!\n"
        );
    }

    #[test]
    fn message_body_parses_back() {
        let mut batch = parse_events_json(EVENTS).expect("parse");
        let goal = batch.events.remove(1);
        let body = goal.to_message_body("bob");
        let rest = body.split_once('\n').map(|(_, rest)| rest).unwrap_or_default();
        assert_eq!(Event::from_message_body("Germany_Japan", rest), goal);
    }

    #[test]
    fn sparse_body_falls_back_to_channel_teams() {
        let event = Event::from_message_body("Spain_Italy", "event name: half\ntime: x\n");
        assert_eq!(event.team_a, "Spain");
        assert_eq!(event.team_b, "Italy");
        assert_eq!(event.name, "half");
        assert_eq!(event.time, 0);
        assert_eq!(event.description, "");
    }

    #[test]
    fn missing_file_is_a_parse_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = parse_events_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, SessionError::ParseFailure { .. }));
    }

    #[test]
    fn invalid_json_is_a_parse_failure() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"{\"team a\": ").expect("write");
        let err = parse_events_file(file.path()).unwrap_err();
        assert!(matches!(err, SessionError::ParseFailure { .. }));
    }

    #[test]
    fn events_file_round_trips_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(EVENTS.as_bytes()).expect("write");
        let batch = parse_events_file(file.path()).expect("parse");
        assert_eq!(batch.team_b, "Japan");
        assert_eq!(batch.events[1].name, "goal!!!!");
    }

    #[test]
    fn update_reading_as_section_header_is_rejected() {
        let raw = r#"{"team a": "A", "team b": "B", "events": [
            {"event name": "odd", "time": 1, "team a updates": {"description": ""}}
        ]}"#;
        let err = parse_events_json(raw).unwrap_err();
        assert!(err.to_string().contains("section header"));
    }

    #[test]
    fn reserved_word_with_value_survives_the_body() {
        let raw = r#"{"team a": "A", "team b": "B", "events": [
            {"event name": "odd", "time": 1,
             "general game updates": {"description": "wet pitch"},
             "team b updates": {"goals": "2"},
             "description": "rain"}
        ]}"#;
        let event = parse_events_json(raw).expect("parse").events.remove(0);
        let body = event.to_message_body("alice");
        let (_, rest) = body.split_once('\n').expect("user line");
        assert_eq!(Event::from_message_body("A_B", rest), event);
    }
}
