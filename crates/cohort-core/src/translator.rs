//! Translation between the two subject identifier schemes.

use std::collections::BTreeMap;

use cohort_common::frame::{column_strings, has_column, string_column};
use cohort_model::{CODEA, CODEB, IssueCode, IssueLog, PipelineError, Result, TableName};
use polars::prelude::DataFrame;
use tracing::{debug, warn};

/// One-to-one mapping between `codea` and `codeb`.
///
/// Both directions are exact inverses: a pair that would give either code a
/// second partner is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTranslator {
    /// codeb to codea
    forward: BTreeMap<String, String>,
    /// codea to codeb
    backward: BTreeMap<String, String>,
}

impl CodeTranslator {
    /// Build from raw `(codea, codeb)` pairs. Incomplete pairs are dropped;
    /// conflicting pairs are rejected and reported.
    pub fn from_pairs<I>(pairs: I, issues: &mut IssueLog) -> Self
    where
        I: IntoIterator<Item = (Option<String>, Option<String>)>,
    {
        let mut translator = CodeTranslator::default();
        let mut incomplete = 0u64;
        let mut conflicts = Vec::new();
        for (codea, codeb) in pairs {
            let (Some(codea), Some(codeb)) = (codea, codeb) else {
                incomplete += 1;
                continue;
            };
            let known_b = translator.backward.get(&codea);
            let known_a = translator.forward.get(&codeb);
            match (known_b, known_a) {
                (Some(b), Some(a)) if *b == codeb && *a == codea => {}
                (None, None) => {
                    translator.forward.insert(codeb.clone(), codea.clone());
                    translator.backward.insert(codea, codeb);
                }
                _ => {
                    warn!(%codea, %codeb, "identifier pair conflicts with an earlier pair");
                    conflicts.push(format!("{codea}/{codeb}"));
                }
            }
        }
        if incomplete > 0 {
            debug!(incomplete, "dropped identifier rows missing a code");
        }
        if !conflicts.is_empty() {
            issues.warn(
                IssueCode::DuplicateKey,
                TableName::CodeTranslator.prefix(),
                format!("conflicting identifier pairs rejected: {}", conflicts.join(", ")),
                Some(conflicts.len() as u64),
            );
        }
        translator
    }

    /// Build from a table holding `codea` and `codeb` columns.
    pub fn from_frame(df: &DataFrame, issues: &mut IssueLog) -> Result<Self> {
        for column in [CODEA, CODEB] {
            if !has_column(df, column) {
                return Err(PipelineError::column_not_found(
                    TableName::CodeTranslator.prefix(),
                    column,
                ));
            }
        }
        let codea = column_strings(df, CODEA)?;
        let codeb = column_strings(df, CODEB)?;
        Ok(Self::from_pairs(codea.into_iter().zip(codeb), issues))
    }

    pub fn to_codea(&self, codeb: &str) -> Option<&str> {
        self.forward.get(codeb).map(String::as_str)
    }

    pub fn to_codeb(&self, codea: &str) -> Option<&str> {
        self.backward.get(codea).map(String::as_str)
    }

    /// Translate into the scheme that `target` names.
    pub fn translate(&self, target: &str, code: &str) -> Option<&str> {
        if target == CODEA {
            self.to_codea(code)
        } else {
            self.to_codeb(code)
        }
    }

    pub fn len(&self) -> usize {
        self.backward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backward.is_empty()
    }

    /// Pairs ordered by `codea`.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.backward
            .iter()
            .map(|(codea, codeb)| (codea.as_str(), codeb.as_str()))
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let (codea, codeb): (Vec<_>, Vec<_>) = self
            .pairs()
            .map(|(a, b)| (Some(a.to_string()), Some(b.to_string())))
            .unzip();
        Ok(DataFrame::new(vec![
            string_column(CODEA, codea),
            string_column(CODEB, codeb),
        ])?)
    }
}
