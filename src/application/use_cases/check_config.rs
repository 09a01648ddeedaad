//! Configuration validation use case module
//!
//! Validates the configured job list without touching the state store:
//! line shape, frequency, loader resolution, duplicate identifiers,
//! unknown dependencies and dependency cycles. The exit code of
//! `--configtest` is the number of misconfigured jobs, zero meaning the
//! configuration is sound.

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

use crate::application::services::registry::JobSpecLine;
use crate::domain::app::JobLoader;
use crate::domain::errors::ConfigError;

/// One misconfiguration, attributed to the job (or line) it concerns
#[derive(Debug)]
pub struct ConfigProblem {
    /// Identifier when known, otherwise the offending line or class path
    pub subject: String,
    pub error: ConfigError,
}

#[derive(Debug, Default)]
pub struct ConfigReport {
    pub problems: Vec<ConfigProblem>,
}

impl ConfigReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of distinct misconfigured jobs
    pub fn misconfigured_count(&self) -> usize {
        self.problems
            .iter()
            .map(|problem| problem.subject.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn exit_code(&self) -> u8 {
        self.misconfigured_count().min(255) as u8
    }
}

pub struct CheckConfig;

impl CheckConfig {
    pub fn execute(lines: &[String], loader: &dyn JobLoader) -> ConfigReport {
        let mut report = ConfigReport::default();
        let mut identifiers: HashMap<String, usize> = HashMap::new();
        let mut resolved: Vec<(String, Vec<String>)> = Vec::new();

        for line in lines {
            let spec = match JobSpecLine::parse(line) {
                Ok(spec) => spec,
                Err(error) => {
                    report.problems.push(ConfigProblem {
                        subject: line.clone(),
                        error,
                    });
                    continue;
                }
            };
            let app = match loader.load(&spec.class_path) {
                Ok(app) => app,
                Err(error) => {
                    report.problems.push(ConfigProblem {
                        subject: spec.class_path.clone(),
                        error,
                    });
                    continue;
                }
            };

            let identifier = app.identifier().to_string();
            if identifiers.contains_key(&identifier) {
                report.problems.push(ConfigProblem {
                    subject: identifier.clone(),
                    error: ConfigError::DuplicateIdentifier(identifier),
                });
                continue;
            }
            identifiers.insert(identifier.clone(), resolved.len());
            resolved.push((identifier, app.depends_on()));
        }

        for (identifier, depends_on) in &resolved {
            for dependency in depends_on {
                if !identifiers.contains_key(dependency) {
                    report.problems.push(ConfigProblem {
                        subject: identifier.clone(),
                        error: ConfigError::UnknownDependency {
                            app: identifier.clone(),
                            dependency: dependency.clone(),
                        },
                    });
                }
            }
        }

        // every member of a dependency cycle counts as misconfigured
        let mut graph = DiGraph::<&str, ()>::new();
        let nodes: Vec<_> = resolved
            .iter()
            .map(|(identifier, _)| graph.add_node(identifier.as_str()))
            .collect();
        for (position, (_, depends_on)) in resolved.iter().enumerate() {
            for dependency in depends_on {
                if let Some(&dep_position) = identifiers.get(dependency) {
                    graph.add_edge(nodes[dep_position], nodes[position], ());
                }
            }
        }
        for component in tarjan_scc(&graph) {
            let cyclic = component.len() > 1
                || graph.find_edge(component[0], component[0]).is_some();
            if cyclic {
                for node in component {
                    let identifier = graph[node].to_string();
                    report.problems.push(ConfigProblem {
                        subject: identifier.clone(),
                        error: ConfigError::DependencyCycle(identifier),
                    });
                }
            }
        }

        report
    }
}
