use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info};

use crate::model::{
    Alert, AlertId, AlertRule, AlertSnapshot, NewAlertRule, RuleId, RuleIdError, RuleUpdate,
    ShieldedTransactionRecord,
};

/// Rule list, alert history and the already-alerted txid gate.
///
/// A txid that has produced one alert never produces another, whichever rule
/// would match and however often the transaction is rescanned.
#[derive(Debug, Default)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    // Newest first.
    alerts: VecDeque<Alert>,
    alerted_txids: HashSet<String>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the engine from persisted state. The gate is re-derived from
    /// the txids the restored alerts reference.
    pub fn from_snapshot(snapshot: AlertSnapshot) -> Self {
        let alerted_txids = snapshot
            .alerts
            .iter()
            .filter_map(|alert| alert.txid.clone())
            .collect();
        Self {
            rules: snapshot.rules,
            alerts: snapshot.alerts.into(),
            alerted_txids,
        }
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        AlertSnapshot {
            rules: self.rules.clone(),
            alerts: self.alerts.iter().cloned().collect(),
        }
    }

    /// Tests every enabled rule, in registration order, against each record
    /// whose txid has not alerted yet. Returns this call's alerts, newest
    /// first, after prepending them to the history.
    pub fn evaluate(&mut self, records: &[ShieldedTransactionRecord]) -> Vec<Alert> {
        let mut batch = Vec::new();

        for record in records {
            if self.alerted_txids.contains(&record.txid) {
                continue;
            }

            let fired = self
                .rules
                .iter()
                .find_map(|rule| rule.evaluate(record).map(|message| (rule, message)));

            let Some((rule, message)) = fired else {
                continue;
            };

            counter!("alerts_triggered_total", "kind" => rule.kind.as_ref().to_owned())
                .increment(1);
            info!(
                rule = rule.name.as_str(),
                txid = record.txid.as_str(),
                key_id = record.key_id.as_str(),
                "alert triggered"
            );

            let alert = Alert {
                id: AlertId::derive(&rule.id, &record.txid),
                rule_id: rule.id.clone(),
                txid: Some(record.txid.clone()),
                message,
                timestamp: Utc::now(),
                acknowledged: false,
            };
            self.alerted_txids.insert(record.txid.clone());
            batch.push(alert);
        }

        for alert in &batch {
            self.alerts.push_front(alert.clone());
        }
        batch.reverse();
        batch
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn rule(&self, id: &RuleId) -> Option<&AlertRule> {
        self.rules.iter().find(|rule| &rule.id == id)
    }

    /// Alert history, newest first.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.alerts.iter().filter(|alert| !alert.acknowledged).count()
    }

    pub fn has_alerted(&self, txid: &str) -> bool {
        self.alerted_txids.contains(txid)
    }

    pub fn add_rule(&mut self, rule: NewAlertRule) -> Result<AlertRule, RuleIdError> {
        let rule = AlertRule {
            id: RuleId::generate()?,
            name: rule.name,
            kind: rule.kind,
            threshold: rule.threshold,
            enabled: rule.enabled,
            created_at: Utc::now(),
        };
        debug!(rule_id = rule.id.as_str(), kind = rule.kind.as_ref(), "rule added");
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// Removes the rule along with every alert it produced. The txid gate is
    /// left untouched.
    pub fn remove_rule(&mut self, id: &RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| &rule.id != id);
        if self.rules.len() == before {
            return false;
        }
        self.alerts.retain(|alert| &alert.rule_id != id);
        true
    }

    /// Flips the enabled flag and returns the new value.
    pub fn toggle_rule(&mut self, id: &RuleId) -> Option<bool> {
        let rule = self.rules.iter_mut().find(|rule| &rule.id == id)?;
        rule.enabled = !rule.enabled;
        Some(rule.enabled)
    }

    pub fn update_rule(&mut self, id: &RuleId, update: RuleUpdate) -> Option<AlertRule> {
        let rule = self.rules.iter_mut().find(|rule| &rule.id == id)?;
        if let Some(name) = update.name {
            rule.name = name;
        }
        if let Some(kind) = update.kind {
            rule.kind = kind;
        }
        if let Some(threshold) = update.threshold {
            rule.threshold = threshold;
        }
        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        Some(rule.clone())
    }

    pub fn acknowledge(&mut self, id: &AlertId) -> bool {
        match self.alerts.iter_mut().find(|alert| &alert.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn acknowledge_all(&mut self) -> usize {
        let mut updated = 0;
        for alert in self.alerts.iter_mut().filter(|alert| !alert.acknowledged) {
            alert.acknowledged = true;
            updated += 1;
        }
        updated
    }

    /// Drops the alert history. Transactions that already alerted stay gated.
    pub fn clear_alerts(&mut self) {
        self.alerts.clear();
    }
}
