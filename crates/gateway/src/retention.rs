use crate::config::RetentionSettings;
use crate::store::ArtifactStore;
use std::ops::AddAssign;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Limits applied to each storage root on every sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    pub max_age: Option<Duration>,
    pub max_artifacts: Option<usize>,
}

impl RetentionPolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some() || self.max_artifacts.is_some()
    }
}

impl From<&RetentionSettings> for RetentionPolicy {
    fn from(settings: &RetentionSettings) -> Self {
        Self {
            max_age: settings.max_age_secs.map(Duration::from_secs),
            max_artifacts: settings.max_artifacts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
}

impl AddAssign for SweepReport {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.removed += other.removed;
    }
}

/// Pick the files `policy` evicts: everything older than `max_age`, then the
/// oldest of the rest until at most `max_artifacts` remain.
pub fn select_expired(
    mut files: Vec<(PathBuf, SystemTime)>,
    policy: &RetentionPolicy,
    now: SystemTime,
) -> Vec<PathBuf> {
    // Oldest first
    files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    let mut expired = Vec::new();
    let mut kept = Vec::with_capacity(files.len());

    for (path, modified) in files {
        // Timestamps in the future count as fresh
        let age = now.duration_since(modified).unwrap_or_default();
        match policy.max_age {
            Some(max_age) if age > max_age => expired.push(path),
            _ => kept.push(path),
        }
    }

    if let Some(max_artifacts) = policy.max_artifacts {
        let excess = kept.len().saturating_sub(max_artifacts);
        expired.extend(kept.into_iter().take(excess));
    }

    expired
}

/// Background task that periodically applies a [`RetentionPolicy`].
pub struct RetentionSweeper {
    store: ArtifactStore,
    policy: RetentionPolicy,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: ArtifactStore, policy: RetentionPolicy, interval: Duration) -> Self {
        Self {
            store,
            policy,
            interval,
        }
    }

    /// Sweep once per interval until the task is dropped. Returns immediately
    /// when the policy sets no limit.
    pub async fn run(self) {
        if !self.policy.is_enabled() {
            tracing::info!("Retention disabled; artifacts are kept indefinitely");
            return;
        }

        tracing::info!(
            max_age_secs = self.policy.max_age.map(|d| d.as_secs()),
            max_artifacts = self.policy.max_artifacts,
            interval_secs = self.interval.as_secs(),
            "Starting retention sweeper"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let store = self.store.clone();
            let policy = self.policy;
            let sweep =
                tokio::task::spawn_blocking(move || store.sweep(&policy, SystemTime::now())).await;

            match sweep {
                Ok(Ok(report)) if report.removed > 0 => {
                    tracing::info!(
                        scanned = report.scanned,
                        removed = report.removed,
                        "Retention sweep complete"
                    );
                }
                Ok(Ok(report)) => {
                    tracing::debug!(scanned = report.scanned, "Retention sweep found nothing to remove");
                }
                Ok(Err(e)) => tracing::error!(error = %e, "Retention sweep failed"),
                Err(e) => tracing::error!(error = %e, "Retention sweep task panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn files(ages: &[(&str, u64)]) -> Vec<(PathBuf, SystemTime)> {
        ages.iter()
            .map(|(name, modified)| (PathBuf::from(name), at(*modified)))
            .collect()
    }

    #[test]
    fn test_disabled_policy_keeps_everything() {
        let policy = RetentionPolicy::default();

        let expired = select_expired(files(&[("a", 0), ("b", 10)]), &policy, at(1_000_000));

        assert!(!policy.is_enabled());
        assert!(expired.is_empty());
    }

    #[test]
    fn test_max_age_evicts_old_files() {
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(100)),
            max_artifacts: None,
        };

        let expired = select_expired(
            files(&[("old", 800), ("edge", 900), ("new", 950)]),
            &policy,
            at(1000),
        );

        assert_eq!(expired, vec![PathBuf::from("old")]);
    }

    #[test]
    fn test_max_artifacts_evicts_oldest_first() {
        let policy = RetentionPolicy {
            max_age: None,
            max_artifacts: Some(2),
        };

        let expired = select_expired(
            files(&[("c", 30), ("a", 10), ("d", 40), ("b", 20)]),
            &policy,
            at(100),
        );

        assert_eq!(expired, vec![PathBuf::from("a"), PathBuf::from("b")]);
    }

    #[test]
    fn test_limits_combine() {
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(50)),
            max_artifacts: Some(1),
        };

        let expired = select_expired(
            files(&[("ancient", 0), ("recent", 90), ("newest", 95)]),
            &policy,
            at(100),
        );

        assert_eq!(
            expired,
            vec![PathBuf::from("ancient"), PathBuf::from("recent")]
        );
    }

    #[test]
    fn test_future_timestamps_are_fresh() {
        let policy = RetentionPolicy {
            max_age: Some(Duration::from_secs(1)),
            max_artifacts: None,
        };

        let expired = select_expired(files(&[("skewed", 500)]), &policy, at(100));

        assert!(expired.is_empty());
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = RetentionSettings {
            max_age_secs: Some(3600),
            max_artifacts: None,
            sweep_interval_secs: 300,
        };

        let policy = RetentionPolicy::from(&settings);

        assert_eq!(policy.max_age, Some(Duration::from_secs(3600)));
        assert!(policy.is_enabled());
    }
}
