//! Per data point reporting decisions.
//!
//! A [`Filter`] has two jobs. Given a derived data point name and its value
//! it decides whether that point is published. Given a base metric name it
//! lists the percentile thresholds to compute for that metric's
//! distribution.

use rustc_hash::FxHashSet;
use serde::Deserialize;

/// Percentile thresholds computed for every distribution by [`AcceptAll`].
pub const STANDARD_PERCENTILES: [f64; 6] = [0.50, 0.75, 0.95, 0.99, 0.999, 1.0];

/// Errors produced when building a filter from [`Config`]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A percentile threshold fell outside `[0, 1]`.
    #[error("Percentile {0} is outside [0, 1]")]
    Percentile(f64),
}

/// Decides which data points are published.
pub trait Filter: Send + Sync {
    /// Whether the data point `name` with `value` should be published.
    fn should_report(&self, name: &str, value: f64) -> bool;
    /// The percentile thresholds, each in `[0, 1]`, to compute for the
    /// distribution of base metric `name`.
    fn percentiles(&self, name: &str) -> &[f64];
}

/// Publishes everything, with [`STANDARD_PERCENTILES`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Filter for AcceptAll {
    fn should_report(&self, _name: &str, _value: f64) -> bool {
        true
    }

    fn percentiles(&self, _name: &str) -> &[f64] {
        &STANDARD_PERCENTILES
    }
}

/// Publishes nothing and computes no percentiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl Filter for RejectAll {
    fn should_report(&self, _name: &str, _value: f64) -> bool {
        false
    }

    fn percentiles(&self, _name: &str) -> &[f64] {
        &[]
    }
}

/// Publishes only points derived from a fixed set of base metric names.
///
/// A derived name belongs to base `m` when it is `m` itself, or `m` followed
/// by `.` or `-perc`. Percentiles are computed for listed metrics only.
#[derive(Debug, Clone)]
pub struct Allow {
    metrics: FxHashSet<String>,
    percentiles: Vec<f64>,
}

impl Allow {
    /// Allow `metrics`, computing `percentiles` for each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Percentile`] if any threshold is outside `[0, 1]`.
    pub fn new<I, S>(metrics: I, percentiles: Vec<f64>) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(p) = percentiles.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(Error::Percentile(*p));
        }
        Ok(Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
            percentiles,
        })
    }

    fn is_listed(&self, name: &str) -> bool {
        if self.metrics.contains(name) {
            return true;
        }
        // Walk the candidate split points instead of every listed name.
        name.char_indices()
            .filter(|(_, c)| *c == '.' || *c == '-')
            .any(|(idx, c)| {
                let (base, rest) = name.split_at(idx);
                let derived = c == '.' || rest.starts_with("-perc");
                derived && self.metrics.contains(base)
            })
    }
}

impl Filter for Allow {
    fn should_report(&self, name: &str, _value: f64) -> bool {
        self.is_listed(name)
    }

    fn percentiles(&self, name: &str) -> &[f64] {
        if self.metrics.contains(name) {
            &self.percentiles
        } else {
            &[]
        }
    }
}

fn standard_percentiles() -> Vec<f64> {
    STANDARD_PERCENTILES.to_vec()
}

/// Configuration for [`Configured`]
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum Config {
    /// See [`AcceptAll`].
    #[default]
    AcceptAll,
    /// See [`RejectAll`].
    RejectAll,
    /// See [`Allow`].
    Allow {
        /// Base metric names to publish.
        metrics: Vec<String>,
        /// Percentile thresholds for the listed metrics.
        #[serde(default = "standard_percentiles")]
        percentiles: Vec<f64>,
    },
}

/// A filter chosen by [`Config`].
#[derive(Debug, Clone)]
pub enum Configured {
    /// See [`AcceptAll`].
    AcceptAll(AcceptAll),
    /// See [`RejectAll`].
    RejectAll(RejectAll),
    /// See [`Allow`].
    Allow(Allow),
}

impl Configured {
    /// Build the filter described by `config`.
    ///
    /// # Errors
    ///
    /// See [`Allow::new`].
    pub fn new(config: Config) -> Result<Self, Error> {
        Ok(match config {
            Config::AcceptAll => Self::AcceptAll(AcceptAll),
            Config::RejectAll => Self::RejectAll(RejectAll),
            Config::Allow {
                metrics,
                percentiles,
            } => Self::Allow(Allow::new(metrics, percentiles)?),
        })
    }
}

impl Filter for Configured {
    fn should_report(&self, name: &str, value: f64) -> bool {
        match self {
            Configured::AcceptAll(inner) => inner.should_report(name, value),
            Configured::RejectAll(inner) => inner.should_report(name, value),
            Configured::Allow(inner) => inner.should_report(name, value),
        }
    }

    fn percentiles(&self, name: &str) -> &[f64] {
        match self {
            Configured::AcceptAll(inner) => inner.percentiles(name),
            Configured::RejectAll(inner) => inner.percentiles(name),
            Configured::Allow(inner) => inner.percentiles(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins() {
        assert!(AcceptAll.should_report("anything", f64::NAN));
        assert_eq!(AcceptAll.percentiles("x"), &STANDARD_PERCENTILES);
        assert!(!RejectAll.should_report("anything", 1.0));
        assert!(RejectAll.percentiles("x").is_empty());
    }

    #[test]
    fn allow_matches_derived_names() {
        let filter = Allow::new(["db.query", "hits"], vec![0.5]).unwrap();

        assert!(filter.should_report("hits", 1.0));
        assert!(filter.should_report("hits.count", 1.0));
        assert!(filter.should_report("db.query", 1.0));
        assert!(filter.should_report("db.query.mean", 1.0));
        assert!(filter.should_report("db.query-perc0.500", 1.0));

        assert!(!filter.should_report("db", 1.0));
        assert!(!filter.should_report("hitsx", 1.0));
        assert!(!filter.should_report("hits-other", 1.0));
        assert!(!filter.should_report("misses.count", 1.0));

        assert_eq!(filter.percentiles("db.query"), &[0.5]);
        assert!(filter.percentiles("misses").is_empty());
    }

    #[test]
    fn allow_rejects_bad_percentile() {
        let err = Allow::new(["a"], vec![0.5, 1.5]).unwrap_err();
        assert_eq!(err, Error::Percentile(1.5));
    }

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(with = "serde_yaml::with::singleton_map_recursive")]
        filter: Config,
    }

    #[test]
    fn config_from_yaml() {
        let wrapper: Wrapper = serde_yaml::from_str("filter: accept_all").unwrap();
        assert_eq!(wrapper.filter, Config::AcceptAll);

        let wrapper: Wrapper = serde_yaml::from_str(
            r"
filter:
  allow:
    metrics: [hits]
",
        )
        .unwrap();
        let config = wrapper.filter;
        assert_eq!(
            config,
            Config::Allow {
                metrics: vec!["hits".to_string()],
                percentiles: STANDARD_PERCENTILES.to_vec(),
            }
        );

        let filter = Configured::new(config).unwrap();
        assert!(filter.should_report("hits.count", 0.0));
        assert!(!filter.should_report("misses", 0.0));
    }
}
