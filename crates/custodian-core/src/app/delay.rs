//! DelayPolicy - `delay_reaping_<account>[/<container>]` の解決
//!
//! 起動時に設定キーから一度だけ組み立てる。
//! container 単位の指定が account 単位の指定より優先され、該当なしは 0。

use chrono::TimeDelta;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

use super::config::ConfigError;
use crate::domain::{AccountName, ContainerName, ObjectPath};

pub const DELAY_KEY_PREFIX: &str = "delay_reaping_";

/// Upper bound for a single delay: ten years.
pub const MAX_DELAY_SECS: i64 = 10 * 365 * 86_400;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayPolicy {
    accounts: HashMap<AccountName, TimeDelta>,
    containers: HashMap<(AccountName, ContainerName), TimeDelta>,
}

impl DelayPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.containers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len() + self.containers.len()
    }

    pub fn set_account(&mut self, account: AccountName, delay: TimeDelta) {
        self.accounts.insert(account, delay);
    }

    pub fn set_container(&mut self, account: AccountName, container: ContainerName, delay: TimeDelta) {
        self.containers.insert((account, container), delay);
    }

    /// Register one configuration entry. `suffix` is the part after
    /// `delay_reaping_`, still percent-encoded.
    pub fn insert_raw(&mut self, suffix: &str, value: &toml::Value) -> Result<(), ConfigError> {
        let key = format!("{DELAY_KEY_PREFIX}{suffix}");
        let malformed = |reason: String| ConfigError::MalformedDelayKey {
            key: key.clone(),
            reason,
        };

        let segments: Vec<&str> = suffix.split('/').collect();
        if segments.len() > 2 {
            return Err(malformed("expected <account> or <account>/<container>".into()));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(malformed("empty account or container".into()));
        }
        let decoded = segments
            .iter()
            .map(|s| {
                percent_decode_str(s)
                    .decode_utf8()
                    .map(|d| d.into_owned())
                    .map_err(|e| malformed(format!("invalid percent-encoding: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let delay = parse_delay(value).map_err(malformed)?;
        let account = AccountName::new(decoded[0].as_str()).map_err(|e| malformed(e.to_string()))?;
        match decoded.get(1) {
            Some(container) => {
                let container =
                    ContainerName::new(container.as_str()).map_err(|e| malformed(e.to_string()))?;
                self.set_container(account, container, delay);
            }
            None => self.set_account(account, delay),
        }
        Ok(())
    }

    pub fn resolve(&self, account: &AccountName, container: &ContainerName) -> TimeDelta {
        if let Some(delay) = self.containers.get(&(account.clone(), container.clone())) {
            return *delay;
        }
        self.accounts.get(account).copied().unwrap_or(TimeDelta::zero())
    }

    /// Delay that applies to a task acting on `target`.
    pub fn resolve_target(&self, target: &ObjectPath) -> TimeDelta {
        self.resolve(&target.account, &target.container)
    }
}

fn parse_delay(value: &toml::Value) -> Result<TimeDelta, String> {
    let secs = match value {
        toml::Value::Integer(i) => *i as f64,
        toml::Value::Float(f) => *f,
        other => return Err(format!("expected seconds, got {}", other.type_str())),
    };
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("delay must be a non-negative number of seconds, got {secs}"));
    }
    if secs > MAX_DELAY_SECS as f64 {
        return Err(format!("delay of {secs}s exceeds the {MAX_DELAY_SECS}s limit"));
    }
    let std = std::time::Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())?;
    TimeDelta::from_std(std).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn account(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn container(s: &str) -> ContainerName {
        ContainerName::new(s).unwrap()
    }

    #[test]
    fn unmatched_scope_has_no_delay() {
        let policy = DelayPolicy::new();
        assert_eq!(policy.resolve(&account("AUTH_a"), &container("c")), TimeDelta::zero());
    }

    #[test]
    fn container_override_beats_account_override() {
        let mut policy = DelayPolicy::new();
        policy
            .insert_raw("AUTH_a", &toml::Value::Integer(100))
            .unwrap();
        policy
            .insert_raw("AUTH_a/slow", &toml::Value::Integer(900))
            .unwrap();

        assert_eq!(
            policy.resolve(&account("AUTH_a"), &container("slow")),
            TimeDelta::seconds(900)
        );
        assert_eq!(
            policy.resolve(&account("AUTH_a"), &container("other")),
            TimeDelta::seconds(100)
        );
        assert_eq!(
            policy.resolve(&account("AUTH_b"), &container("slow")),
            TimeDelta::zero()
        );
    }

    #[test]
    fn container_override_leaves_sibling_untouched() {
        let mut policy = DelayPolicy::new();
        policy
            .insert_raw("AUTH_a/c1", &toml::Value::Integer(3600))
            .unwrap();
        assert_eq!(
            policy.resolve(&account("AUTH_a"), &container("c1")),
            TimeDelta::seconds(3600)
        );
        assert_eq!(
            policy.resolve(&account("AUTH_a"), &container("c2")),
            TimeDelta::zero()
        );
    }

    #[test]
    fn segments_are_percent_decoded() {
        let mut policy = DelayPolicy::new();
        policy
            .insert_raw("AUTH_%C3%A9/my%20box", &toml::Value::Float(1.5))
            .unwrap();
        assert_eq!(
            policy.resolve(&account("AUTH_é"), &container("my box")),
            TimeDelta::milliseconds(1500)
        );
    }

    #[rstest]
    #[case("a/b/c", toml::Value::Integer(1))]
    #[case("", toml::Value::Integer(1))]
    #[case("a/", toml::Value::Integer(1))]
    #[case("/c", toml::Value::Integer(1))]
    #[case("a%2Fb/c", toml::Value::Integer(1))]
    #[case("a%FF", toml::Value::Integer(1))]
    #[case("a", toml::Value::Integer(-5))]
    #[case("a", toml::Value::String("ten".into()))]
    #[case("a", toml::Value::Integer(MAX_DELAY_SECS + 1))]
    #[case("a", toml::Value::Integer(10_000_000_000_000))]
    #[case("a/c", toml::Value::Float(1e300))]
    fn malformed_keys_are_rejected(#[case] suffix: &str, #[case] value: toml::Value) {
        let mut policy = DelayPolicy::new();
        let err = policy.insert_raw(suffix, &value).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedDelayKey { .. }));
        assert!(policy.is_empty());
    }

    #[test]
    fn delay_at_the_limit_is_accepted() {
        let mut policy = DelayPolicy::new();
        policy
            .insert_raw("AUTH_a", &toml::Value::Integer(MAX_DELAY_SECS))
            .unwrap();
        assert_eq!(
            policy.resolve(&account("AUTH_a"), &container("c")),
            TimeDelta::seconds(MAX_DELAY_SECS)
        );
    }

    #[test]
    fn resolves_against_target_path() {
        let mut policy = DelayPolicy::new();
        policy
            .insert_raw("AUTH_a/c", &toml::Value::Integer(60))
            .unwrap();
        let target = ObjectPath::parse("/AUTH_a/c/o").unwrap();
        assert_eq!(policy.resolve_target(&target), TimeDelta::seconds(60));
    }
}
