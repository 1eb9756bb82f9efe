//! Presence bookkeeping: fold `presence_state` / `presence_diff` frames into
//! a current-keys set and report which keys appeared since the last sync.

use std::collections::BTreeSet;

use serde_json::Value;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    current: BTreeSet<String>,
    last_synced: BTreeSet<String>,
}

impl PresenceTracker {
    /// Apply one presence event payload without completing a sync.
    pub fn fold(&mut self, event: &str, payload: &Value) {
        match event {
            "presence_state" => {
                if let Some(state) = payload.as_object() {
                    self.current = state.keys().cloned().collect();
                }
            }
            "presence_diff" => {
                if let Some(joins) = payload.get("joins").and_then(Value::as_object) {
                    for k in joins.keys() {
                        self.current.insert(k.clone());
                    }
                }
                if let Some(leaves) = payload.get("leaves").and_then(Value::as_object) {
                    for k in leaves.keys() {
                        self.current.remove(k);
                    }
                }
            }
            _ => {}
        }
    }

    /// Complete a sync: keys newly present since the previous sync, with
    /// `own_session` excluded.
    pub fn sync(&mut self, own_session: &str) -> Vec<String> {
        let joined: Vec<String> = self
            .current
            .iter()
            .filter(|k| !self.last_synced.contains(*k) && k.as_str() != own_session)
            .cloned()
            .collect();
        self.last_synced = self.current.clone();
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_state_reports_everyone_but_self() {
        let mut p = PresenceTracker::default();
        p.fold(
            "presence_state",
            &json!({"me": {"metas": []}, "peer-a": {"metas": []}, "peer-b": {"metas": []}}),
        );
        let joined = p.sync("me");
        assert_eq!(joined, vec!["peer-a".to_string(), "peer-b".to_string()]);
    }

    #[test]
    fn diff_joins_report_once() {
        let mut p = PresenceTracker::default();
        p.fold("presence_state", &json!({"me": {}}));
        assert!(p.sync("me").is_empty());
        p.fold("presence_diff", &json!({"joins": {"peer-a": {}}, "leaves": {}}));
        assert_eq!(p.sync("me"), vec!["peer-a".to_string()]);
        // Same key again on a later sync: nothing new.
        p.fold("presence_diff", &json!({"joins": {}, "leaves": {}}));
        assert!(p.sync("me").is_empty());
    }

    #[test]
    fn leave_then_rejoin_reports_again() {
        let mut p = PresenceTracker::default();
        p.fold("presence_diff", &json!({"joins": {"peer-a": {}}}));
        assert_eq!(p.sync("me"), vec!["peer-a".to_string()]);
        p.fold("presence_diff", &json!({"leaves": {"peer-a": {}}}));
        assert!(p.sync("me").is_empty());
        p.fold("presence_diff", &json!({"joins": {"peer-a": {}}}));
        assert_eq!(p.sync("me"), vec!["peer-a".to_string()]);
    }
}
