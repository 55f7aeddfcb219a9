//! Fact-set diagnostics
//!
//! Unlike [`Resolver::new`], analysis never stops at the first problem: it
//! reports every duplicate target, read-only script, self reference and
//! external table so the whole project can be reviewed at once.

use std::collections::BTreeMap;

use bqrun_core::{DependencyFact, Diagnostic, DiagnosticCode, Severity};

use crate::resolver::{OwnerIndex, ResolveError, Resolver};

/// Analyze a fact set and collect diagnostics, errors first
pub fn analyze(facts: &[DependencyFact]) -> Vec<Diagnostic> {
    let owners = OwnerIndex::from_facts(facts);
    let mut diagnostics = Vec::new();

    for (table, origins) in owners.duplicates() {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::DuplicateTarget,
                Severity::Error,
                format!("Table '{}' is created by {} scripts", table, origins.len()),
            )
            .with_tables(vec![table.clone()])
            .with_origins(origins.to_vec()),
        );
    }

    // Cycles can only be judged once ownership is unambiguous
    if diagnostics.is_empty() {
        let cycle = Resolver::new(facts.to_vec())
            .and_then(|resolver| resolver.graph())
            .and_then(|graph| graph.check_acyclic());

        if let Err(ResolveError::Cycle { origins }) = cycle {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::DependencyCycle,
                    Severity::Error,
                    format!("Circular dependency: {}", origins.join(" -> ")),
                )
                .with_origins(origins),
            );
        }
    }

    for fact in facts {
        if fact.targets().is_empty() {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::NoTargets,
                    Severity::Warn,
                    format!("{} creates no table", fact.origin()),
                )
                .with_origins(vec![fact.origin().to_string()]),
            );
        }

        let own: Vec<String> = fact
            .sources()
            .iter()
            .filter(|s| fact.writes(s))
            .cloned()
            .collect();
        if !own.is_empty() {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::SelfReference,
                    Severity::Info,
                    format!("{} reads {} table(s) it creates itself", fact.origin(), own.len()),
                )
                .with_tables(own)
                .with_origins(vec![fact.origin().to_string()]),
            );
        }
    }

    let mut readers: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for fact in facts {
        for source in fact.sources() {
            if !owners.contains(source) {
                readers
                    .entry(source.as_str())
                    .or_default()
                    .push(fact.origin().to_string());
            }
        }
    }

    for (table, origins) in readers {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::ExternalTable,
                Severity::Info,
                format!("Table '{}' is not created by any script", table),
            )
            .with_tables(vec![table.to_string()])
            .with_origins(origins),
        );
    }

    diagnostics.sort_by(|a, b| b.severity.cmp(&a.severity));
    diagnostics
}
