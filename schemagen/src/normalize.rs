//! Build-irrelevant field removal ahead of fingerprinting

use std::ops::Deref;

use crate::config::Configuration;

/// Caller-supplied adjustment applied to the copy being normalized
pub type NormalizationHook = dyn Fn(&mut Configuration) + Send + Sync;

/// Read-only projection of a [`Configuration`] used only for hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedConfiguration(Configuration);

impl NormalizedConfiguration {
    pub fn into_inner(self) -> Configuration {
        self.0
    }
}

impl Deref for NormalizedConfiguration {
    type Target = Configuration;

    fn deref(&self) -> &Configuration {
        &self.0
    }
}

/// Produce the canonical projection of `config`.
///
/// The caller's configuration is never touched: the projection starts from a
/// structural copy, drops the output directory, runs `hook`, then strips
/// values that serialize without carrying meaning.
pub fn normalize(
    config: &Configuration,
    hook: Option<&NormalizationHook>,
) -> NormalizedConfiguration {
    let mut copy = config.clone();
    copy.generator.target.directory = None;
    if let Some(hook) = hook {
        hook(&mut copy);
    }
    trim_defaults(&mut copy);
    NormalizedConfiguration(copy)
}

/// Remove defaults that would otherwise be serialized for no reason.
///
/// - a strategy name is redundant once matchers decide naming
/// - a connection block with nothing set is dropped entirely
pub fn trim_defaults(config: &mut Configuration) {
    if let Some(strategy) = config.generator.strategy.as_mut() {
        if strategy.matchers.is_some() {
            strategy.name = None;
        }
    }

    if config.jdbc.as_ref().is_some_and(|jdbc| jdbc.is_unset()) {
        config.jdbc = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Jdbc, MatcherRule, Matchers, Strategy};
    use std::path::PathBuf;

    fn sample() -> Configuration {
        let mut config = Configuration::default();
        config.generator.target.directory = Some(PathBuf::from("/abs/out"));
        config.generator.database.includes = Some("users|orders".into());
        config
    }

    #[test]
    fn test_output_directory_cleared() {
        let config = sample();
        let normalized = normalize(&config, None);
        assert!(normalized.generator.target.directory.is_none());
        // the caller's copy is untouched
        assert_eq!(
            config.generator.target.directory,
            Some(PathBuf::from("/abs/out"))
        );
    }

    #[test]
    fn test_hook_runs_on_copy() {
        let config = sample();
        let hook = |c: &mut Configuration| c.generator.database.includes = None;
        let normalized = normalize(&config, Some(&hook));
        assert!(normalized.generator.database.includes.is_none());
        assert!(config.generator.database.includes.is_some());
    }

    #[test]
    fn test_strategy_name_dropped_with_matchers() {
        let mut config = sample();
        config.generator.strategy = Some(Strategy {
            name: Some("com.example.Naming".into()),
            matchers: Some(Matchers {
                tables: vec![MatcherRule {
                    expression: "t_(.*)".into(),
                    transform: None,
                }],
                ..Default::default()
            }),
        });
        let normalized = normalize(&config, None);
        let strategy = normalized.generator.strategy.as_ref().unwrap();
        assert!(strategy.name.is_none());
        assert!(strategy.matchers.is_some());
    }

    #[test]
    fn test_strategy_name_kept_without_matchers() {
        let normalized = normalize(&sample(), None);
        assert!(normalized
            .generator
            .strategy
            .as_ref()
            .and_then(|s| s.name.as_ref())
            .is_some());
    }

    #[test]
    fn test_empty_jdbc_dropped() {
        let mut config = sample();
        config.jdbc = Some(Jdbc::default());
        assert!(normalize(&config, None).jdbc.is_none());

        config.jdbc = Some(Jdbc {
            url: Some("jdbc:mysql://db/app".into()),
            ..Default::default()
        });
        assert!(normalize(&config, None).jdbc.is_some());
    }

    #[test]
    fn test_idempotent() {
        let mut config = sample();
        config.jdbc = Some(Jdbc::default());
        let once = normalize(&config, None);
        let twice = normalize(&once, None);
        assert_eq!(once, twice);
    }
}
