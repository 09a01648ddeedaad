//! Job registry service module
//!
//! This service resolves the configured job lines into job descriptors. It
//! is a pure function of the configuration lines and the loader: each line
//! `class_path|frequency[|HH:MM]` is parsed, the app is materialized
//! through the loader, and identity, dependencies and the backfill flag
//! are read off the app. The registry never touches the state store.

use std::collections::HashMap;
use tracing::warn;

use crate::domain::app::{JobApp, JobLoader};
use crate::domain::entities::JobDescriptor;
use crate::domain::errors::ConfigError;
use crate::domain::value_objects::Frequency;

/// One parsed `class_path|frequency[|HH:MM]` configuration line
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpecLine {
    pub class_path: String,
    pub frequency: Frequency,
}

impl JobSpecLine {
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        let fields: Vec<&str> = line.split('|').map(str::trim).collect();
        let (class_path, frequency) = match fields.as_slice() {
            [class_path, frequency] => (*class_path, Frequency::parse(frequency, None)?),
            [class_path, frequency, anchor] => {
                (*class_path, Frequency::parse(frequency, Some(anchor))?)
            }
            _ => {
                return Err(ConfigError::BadJobLine {
                    line: line.to_string(),
                })
            }
        };
        if class_path.is_empty() {
            return Err(ConfigError::BadJobLine {
                line: line.to_string(),
            });
        }
        Ok(Self {
            class_path: class_path.to_string(),
            frequency,
        })
    }
}

/// A descriptor paired with its materialized app
#[derive(Debug)]
pub struct RegistryEntry {
    pub descriptor: JobDescriptor,
    pub app: Box<dyn JobApp>,
}

/// The resolved set of configured jobs, in configuration order
#[derive(Debug)]
pub struct JobRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

impl JobRegistry {
    /// Builds the registry from configuration lines
    ///
    /// Duplicate identifiers and dependencies on identifiers outside the
    /// configured set are configuration errors.
    pub fn build(lines: &[String], loader: &dyn JobLoader) -> Result<Self, ConfigError> {
        let mut entries = Vec::with_capacity(lines.len());
        let mut index = HashMap::with_capacity(lines.len());

        for line in lines {
            let spec = JobSpecLine::parse(line)?;
            let app = loader.load(&spec.class_path)?;
            let descriptor = JobDescriptor {
                identifier: app.identifier().to_string(),
                class_path: spec.class_path,
                frequency: spec.frequency,
                depends_on: app.depends_on(),
                is_backfill: app.is_backfill(),
            };
            if index.contains_key(&descriptor.identifier) {
                return Err(ConfigError::DuplicateIdentifier(descriptor.identifier));
            }
            if descriptor.is_backfill && !descriptor.frequency.is_daily_or_coarser() {
                // backfill dates are day-granularity; a sub-daily period
                // hands the same calendar date to more than one boundary
                warn!(
                    "backfill job {} has sub-daily frequency {}",
                    descriptor.identifier, descriptor.frequency
                );
            }
            index.insert(descriptor.identifier.clone(), entries.len());
            entries.push(RegistryEntry { descriptor, app });
        }

        for entry in &entries {
            for dependency in &entry.descriptor.depends_on {
                if !index.contains_key(dependency) {
                    return Err(ConfigError::UnknownDependency {
                        app: entry.descriptor.identifier.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        Ok(Self { entries, index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Identifiers in configuration order
    pub fn identifiers(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.descriptor.identifier.clone())
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn descriptor(&self, identifier: &str) -> Option<&JobDescriptor> {
        self.index
            .get(identifier)
            .map(|&position| &self.entries[position].descriptor)
    }

    /// Position of the job in the original configuration list
    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.index.get(identifier).copied()
    }

    pub fn app_mut(&mut self, identifier: &str) -> Option<&mut Box<dyn JobApp>> {
        let position = *self.index.get(identifier)?;
        Some(&mut self.entries[position].app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::{MockJobLoader, StaticLoader};
    use anyhow::Result;

    struct FixtureApp {
        identifier: &'static str,
        depends_on: Vec<String>,
    }

    impl JobApp for FixtureApp {
        fn identifier(&self) -> &str {
            self.identifier
        }

        fn depends_on(&self) -> Vec<String> {
            self.depends_on.clone()
        }

        fn execute(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn loader_with(apps: Vec<(&'static str, &'static str, Vec<String>)>) -> StaticLoader {
        let mut loader = StaticLoader::new();
        for (class_path, identifier, depends_on) in apps {
            loader.register(class_path, move || {
                Box::new(FixtureApp {
                    identifier,
                    depends_on: depends_on.clone(),
                })
            });
        }
        loader
    }

    #[test]
    fn test_parse_job_line_with_anchor() {
        let spec = JobSpecLine::parse("myapp.jobs.Reports | 1d | 02:00").unwrap();
        assert_eq!(spec.class_path, "myapp.jobs.Reports");
        assert_eq!(spec.frequency.seconds(), 86_400);
        assert!(spec.frequency.anchor().is_some());
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(matches!(
            JobSpecLine::parse("just-a-class-path"),
            Err(ConfigError::BadJobLine { .. })
        ));
        assert!(matches!(
            JobSpecLine::parse("|5m"),
            Err(ConfigError::BadJobLine { .. })
        ));
        assert!(matches!(
            JobSpecLine::parse("a|5m|02:00|extra"),
            Err(ConfigError::BadJobLine { .. })
        ));
    }

    #[test]
    fn test_build_preserves_configuration_order() {
        let loader = loader_with(vec![
            ("jobs.B", "b", vec![]),
            ("jobs.A", "a", vec![]),
        ]);
        let lines = vec!["jobs.B|5m".to_string(), "jobs.A|5m".to_string()];

        let registry = JobRegistry::build(&lines, &loader).unwrap();
        assert_eq!(registry.identifiers(), vec!["b", "a"]);
        assert_eq!(registry.position("b"), Some(0));
        assert_eq!(registry.position("a"), Some(1));
    }

    #[test]
    fn test_build_rejects_duplicate_identifiers() {
        let loader = loader_with(vec![
            ("jobs.A", "same", vec![]),
            ("jobs.B", "same", vec![]),
        ]);
        let lines = vec!["jobs.A|5m".to_string(), "jobs.B|5m".to_string()];

        let err = JobRegistry::build(&lines, &loader).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateIdentifier(id) if id == "same"));
    }

    #[test]
    fn test_build_rejects_unknown_dependencies() {
        let loader = loader_with(vec![("jobs.A", "a", vec!["ghost".to_string()])]);
        let lines = vec!["jobs.A|5m".to_string()];

        let err = JobRegistry::build(&lines, &loader).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownDependency { app, dependency }
                if app == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_sub_daily_backfill_is_accepted_with_a_warning() {
        struct SubDailyBackfillApp;

        impl JobApp for SubDailyBackfillApp {
            fn identifier(&self) -> &str {
                "hourly-history"
            }

            fn is_backfill(&self) -> bool {
                true
            }
        }

        let mut loader = StaticLoader::new();
        loader.register("jobs.HourlyHistory", || Box::new(SubDailyBackfillApp));
        let lines = vec!["jobs.HourlyHistory|1h".to_string()];

        // logged as a warning, never a configuration error
        let registry = JobRegistry::build(&lines, &loader).unwrap();
        assert!(registry.descriptor("hourly-history").unwrap().is_backfill);
    }

    #[test]
    fn test_build_consults_the_loader_once_per_line() {
        let mut loader = MockJobLoader::new();
        loader
            .expect_load()
            .times(1)
            .returning(|_| {
                Ok(Box::new(FixtureApp {
                    identifier: "only",
                    depends_on: Vec::new(),
                }))
            });

        let lines = vec!["jobs.Only|5m".to_string()];
        let registry = JobRegistry::build(&lines, &loader).unwrap();
        assert!(registry.contains("only"));
        assert_eq!(registry.descriptor("only").unwrap().class_path, "jobs.Only");
    }

    #[test]
    fn test_build_surfaces_loader_errors() {
        let loader = StaticLoader::new();
        let lines = vec!["jobs.Missing|5m".to_string()];

        let err = JobRegistry::build(&lines, &loader).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownJobClass(_)));
    }
}
