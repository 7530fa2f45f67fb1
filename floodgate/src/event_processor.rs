//! Turns the raw event feed into completion tuples.

use crate::error::EventError;
use async_trait::async_trait;
use regex::Regex;
use saltbus::events::TaggedEvent;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Tag grammar for job and runner returns. Anchored at the start; the suffix
/// (per-minion return segments and the like) is absorbed. Everything else on
/// the bus is noise to us: new-job broadcasts, progress, other namespaces.
static RET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^salt/(job|run)/([0-9]{20})/ret").expect("ret tag pattern"));

/// A job finished: its slot can be retired everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub request_id: String,
    pub input_queue: String,
    pub jid: String,
}

/// Non-blocking feed of pending events from the master bus.
#[async_trait]
pub trait EventSource: Send {
    /// Drain everything currently pending; a finite snapshot per call.
    async fn get_pending(&mut self) -> Result<Vec<TaggedEvent>, EventError>;
}

/// Completion tuples for the jids we are tracking.
///
/// Parsing is stateless: duplicate return events are harmless because the
/// first one removes the jid from the map and later ones no longer resolve.
/// A return for a jid we never knew (or already retired) is skipped.
pub fn parse_completions(
    events: &[TaggedEvent],
    jid_req_map: &HashMap<String, (String, String)>,
) -> Vec<Completion> {
    let mut completions = Vec::new();
    for event in events {
        let Some(captures) = RET_TAG.captures(&event.tag) else {
            log::trace!("ignoring event {:?}", event.tag);
            continue;
        };
        let jid = &captures[2];
        let Some((request_id, input_queue)) = jid_req_map.get(jid) else {
            log::debug!("return for unknown jid {jid}, skipping");
            continue;
        };
        log::debug!("job {jid} returned (request {request_id})");
        completions.push(Completion {
            request_id: request_id.clone(),
            input_queue: input_queue.clone(),
            jid: jid.to_string(),
        });
    }
    completions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::events_for;
    use serde_json::json;

    const JID: &str = "20161208114705304086";

    fn tracking(jid: &str) -> HashMap<String, (String, String)> {
        HashMap::from([(
            jid.to_string(),
            ("20161208114705304085".to_string(), "foo".to_string()),
        )])
    }

    #[test]
    fn extracts_the_completion_from_a_job_return() {
        let completions = parse_completions(&events_for(JID), &tracking(JID));
        assert_eq!(
            completions,
            vec![Completion {
                request_id: "20161208114705304085".to_string(),
                input_queue: "foo".to_string(),
                jid: JID.to_string(),
            }]
        );
    }

    #[test]
    fn recognises_runner_returns() {
        let events = vec![TaggedEvent {
            tag: format!("salt/run/{JID}/ret"),
            data: json!({"success": true}),
        }];
        let completions = parse_completions(&events, &tracking(JID));
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].jid, JID);
    }

    #[test]
    fn ignores_new_job_broadcasts() {
        let events = vec![TaggedEvent {
            tag: format!("salt/job/{JID}/new"),
            data: json!({"jid": JID}),
        }];
        assert!(parse_completions(&events, &tracking(JID)).is_empty());
    }

    #[test]
    fn ignores_other_namespaces_and_short_jids() {
        let events = vec![
            TaggedEvent {
                tag: format!("minion/refresh/{JID}/ret"),
                data: json!({}),
            },
            TaggedEvent {
                tag: "salt/job/12345/ret".to_string(),
                data: json!({}),
            },
            TaggedEvent {
                tag: JID.to_string(),
                data: json!({}),
            },
        ];
        assert!(parse_completions(&events, &tracking(JID)).is_empty());
    }

    #[test]
    fn skips_returns_for_untracked_jids() {
        let events = events_for("20170101000000000001");
        assert!(parse_completions(&events, &tracking(JID)).is_empty());
    }

    #[test]
    fn parsing_is_stateless() {
        let events = events_for(JID);
        let map = tracking(JID);
        let first = parse_completions(&events, &map);
        let second = parse_completions(&events, &map);
        assert_eq!(first, second);
    }
}
