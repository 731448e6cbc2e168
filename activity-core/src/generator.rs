use anyhow::Result;
use chrono::{Datelike, Local, TimeDelta, TimeZone};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::GeneratorConfig;
use crate::event::{ActivityEvent, INVALID_SESSION, PLATFORMS, UNKNOWN_PLATFORM};

/// Activity type written when the activity could not be resolved.
pub const UNKNOWN_ACTIVITY: &str = "unknown_activity";

/// Known activity types.
pub const ACTIVITY_TYPES: [&str; 5] = ["login", "logout", "view", "click", "purchase"];

/// Format of `activity_time`.
pub const ACTIVITY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Produces one event per call.
pub trait EventSource: Send + 'static {
    fn next_event(&mut self) -> ActivityEvent;
}

/// Random activity events with injected defects.
///
/// Each field is corrupted with the probability configured in `GeneratorConfig`:
/// sessions become `invalid_session`, platforms become `Unknown`, activity times go
/// missing and activity types become `unknown_activity`. Valid platforms and
/// activity types are drawn uniformly, absent included as one more choice.
pub struct SyntheticFeed {
    config: GeneratorConfig,
    rng: StdRng,
}

impl SyntheticFeed {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self { config, rng })
    }

    fn session_id(&mut self) -> Option<String> {
        if self.rng.gen::<f64>() < self.config.invalid_session_rate {
            Some(INVALID_SESSION.to_string())
        } else {
            let bytes: [u8; 16] = self.rng.gen();
            Some(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
        }
    }

    fn platform(&mut self) -> Option<String> {
        if self.rng.gen::<f64>() < self.config.unknown_platform_rate {
            return Some(UNKNOWN_PLATFORM.to_string());
        }

        let index = self.rng.gen_range(0..=PLATFORMS.len());
        PLATFORMS.get(index).map(|p| p.to_string())
    }

    fn activity_time(&mut self) -> Option<String> {
        if self.rng.gen::<f64>() < self.config.missing_activity_time_rate {
            return None;
        }

        // Any time between the start of the year and now.
        let now = Local::now();
        let start = Local
            .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        let span = (now - start).num_seconds().max(1);
        let offset = (self.rng.gen::<f64>() * span as f64) as i64;
        let time = start + TimeDelta::seconds(offset);

        Some(time.format(ACTIVITY_TIME_FORMAT).to_string())
    }

    fn activity_type(&mut self) -> Option<String> {
        if self.rng.gen::<f64>() < self.config.unknown_activity_rate {
            return Some(UNKNOWN_ACTIVITY.to_string());
        }

        let mut choices: Vec<Option<&str>> = ACTIVITY_TYPES.iter().map(|a| Some(*a)).collect();
        choices.push(None);

        choices
            .choose(&mut self.rng)
            .copied()
            .flatten()
            .map(|a| a.to_string())
    }
}

impl EventSource for SyntheticFeed {
    fn next_event(&mut self) -> ActivityEvent {
        let user_id = self.rng.gen_range(1..=self.config.user_count);

        ActivityEvent {
            user_id: Some(user_id.to_string()),
            session_id: self.session_id(),
            platform: self.platform(),
            activity_time: self.activity_time(),
            activity_type: self.activity_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f64) -> GeneratorConfig {
        GeneratorConfig {
            user_count: 10,
            invalid_session_rate: rate,
            unknown_platform_rate: rate,
            missing_activity_time_rate: rate,
            unknown_activity_rate: rate,
            seed: Some(7),
        }
    }

    #[test]
    fn test_always_defective() -> Result<()> {
        let mut feed = SyntheticFeed::new(config(1.0))?;

        for _ in 0..100 {
            let event = feed.next_event();
            assert_eq!(event.session_id.as_deref(), Some(INVALID_SESSION));
            assert_eq!(event.platform.as_deref(), Some(UNKNOWN_PLATFORM));
            assert_eq!(event.activity_time, None);
            assert_eq!(event.activity_type.as_deref(), Some(UNKNOWN_ACTIVITY));
        }

        Ok(())
    }

    #[test]
    fn test_never_defective() -> Result<()> {
        let mut feed = SyntheticFeed::new(config(0.0))?;

        for _ in 0..200 {
            let event = feed.next_event();

            let user_id: u64 = event.user_id.as_deref().unwrap().parse()?;
            assert!((1..=10).contains(&user_id));

            let session_id = event.session_id.unwrap();
            assert_ne!(session_id, INVALID_SESSION);
            assert!(uuid::Uuid::parse_str(&session_id).is_ok());

            if let Some(platform) = event.platform.as_deref() {
                assert!(PLATFORMS.contains(&platform));
            }

            assert!(event.activity_time.is_some());
            assert_ne!(event.activity_type.as_deref(), Some(UNKNOWN_ACTIVITY));
        }

        Ok(())
    }

    #[test]
    fn test_seed_is_reproducible() -> Result<()> {
        let mut a = SyntheticFeed::new(config(0.1))?;
        let mut b = SyntheticFeed::new(config(0.1))?;

        for _ in 0..20 {
            let (x, y) = (a.next_event(), b.next_event());
            assert_eq!(x.user_id, y.user_id);
            assert_eq!(x.session_id, y.session_id);
            assert_eq!(x.platform, y.platform);
        }

        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        assert!(SyntheticFeed::new(config(2.0)).is_err());
    }
}
