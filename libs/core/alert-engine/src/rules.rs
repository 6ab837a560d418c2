// [libs/core/alert-engine/src/rules.rs]
//! Effective-rule selection: the most specific matching rule wins, ties
//! broken by configuration order.

use pulse_domain::alert::{AlertRule, Metric, Scope};

/// Picks the rule that applies to `resource_id`/`tags` for `metric`, if any.
pub fn select_effective_rule<'a>(
    rules: &'a [AlertRule],
    resource_id: &str,
    tags: &[String],
    metric: Metric,
) -> Option<&'a AlertRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled && rule.metric == metric)
        .filter(|rule| matches_scope(&rule.scope, resource_id, tags))
        .max_by_key(|rule| (rule.scope.specificity(), rule.configuration_order))
}

fn matches_scope(scope: &Scope, resource_id: &str, tags: &[String]) -> bool {
    match scope {
        Scope::Global => true,
        Scope::Resource(id) => id == resource_id,
        Scope::Tag(tag) => tags.iter().any(|t| t == tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_domain::alert::Comparator;
    use std::time::Duration;

    fn rule(scope: Scope, order: u32) -> AlertRule {
        AlertRule {
            id: format!("rule-{order}"),
            scope,
            metric: Metric::Cpu,
            comparator: Comparator::Gt,
            threshold: 80.0,
            level: pulse_domain::alert::AlertLevel::Warning,
            dwell_time: Duration::from_secs(30),
            hysteresis: 0.05,
            enabled: true,
            configuration_order: order,
        }
    }

    #[test]
    fn resource_scope_beats_tag_and_global() {
        let rules = vec![
            rule(Scope::Global, 0),
            rule(Scope::Tag("prod".into()), 1),
            rule(Scope::Resource("pve-a:node1:100".into()), 2),
        ];
        let picked = select_effective_rule(&rules, "pve-a:node1:100", &["prod".into()], Metric::Cpu).unwrap();
        assert_eq!(picked.id, "rule-2");
    }

    #[test]
    fn ties_broken_by_configuration_order_last_wins() {
        let rules = vec![rule(Scope::Global, 0), rule(Scope::Global, 5)];
        let picked = select_effective_rule(&rules, "anything", &[], Metric::Cpu).unwrap();
        assert_eq!(picked.id, "rule-5");
    }

    #[test]
    fn disabled_rules_are_never_selected() {
        let mut r = rule(Scope::Global, 0);
        r.enabled = false;
        let picked = select_effective_rule(&[r], "anything", &[], Metric::Cpu);
        assert!(picked.is_none());
    }
}
