//! Table merge engine.
//!
//! Tables are joined on the subject identifiers. Identifier columns are
//! always text so that codes read as numbers in one export and as text in
//! another still line up.

use std::collections::BTreeSet;

use cohort_common::frame::{
    column_i64, column_names, column_strings, filter_rows, has_column, i64_column, sort_rows_by,
    string_column, with_column,
};
use cohort_model::{CODEA, CODEB, IDENTIFIERS, IssueCode, IssueLog, PipelineError, Result};
use polars::prelude::{
    DataFrame, DataType, Expr, IntoLazy, JoinArgs, JoinCoalesce, JoinType, col, when,
};
use tracing::{debug, warn};

use crate::longitudinal::count_per_subject;
use crate::translator::CodeTranslator;

const INCOMING_SUFFIX: &str = "__incoming";

/// Join type for [`merge_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeHow {
    #[default]
    Outer,
    Left,
    Inner,
}

impl MergeHow {
    fn join_type(self) -> JoinType {
        match self {
            MergeHow::Outer => JoinType::Full,
            MergeHow::Left => JoinType::Left,
            MergeHow::Inner => JoinType::Inner,
        }
    }
}

/// Store the identifier columns as trimmed text.
pub fn normalize_identifiers(df: &DataFrame) -> Result<DataFrame> {
    let mut out = df.clone();
    for identifier in IDENTIFIERS {
        if has_column(&out, identifier) {
            let values = column_strings(&out, identifier)?;
            out = with_column(&out, string_column(identifier, values))?;
        }
    }
    Ok(out)
}

/// Add `output` holding the number of rows that share each row's `key`.
pub fn count_occurrences(df: &DataFrame, key: &str, output: &str, table: &str) -> Result<DataFrame> {
    count_per_subject(df, key, output, table)
}

/// Keep the rows whose timepoint is one of `allowed`. Timepoints stored as
/// text or as whole-number floats compare by value.
pub fn flatten_to_timepoint(
    df: &DataFrame,
    timepoint: &str,
    allowed: &[i64],
    table: &str,
) -> Result<DataFrame> {
    if !has_column(df, timepoint) {
        return Err(PipelineError::column_not_found(table, timepoint));
    }
    let keep: Vec<bool> = column_i64(df, timepoint)?
        .into_iter()
        .map(|tp| tp.is_some_and(|tp| allowed.contains(&tp)))
        .collect();
    Ok(filter_rows(df, &keep)?)
}

/// Make sure the table carries both `codea` and `codeb`.
///
/// The missing column is filled by translating the present one; rows the
/// translator does not know keep a missing value and are counted as an
/// `IdentifierAmbiguity` issue. The row count never changes.
pub fn add_identifier_columns(
    df: &DataFrame,
    translator: &CodeTranslator,
    table: &str,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let has_a = has_column(df, CODEA);
    let has_b = has_column(df, CODEB);
    let (source, target) = match (has_a, has_b) {
        (true, true) => return normalize_identifiers(df),
        (true, false) => (CODEA, CODEB),
        (false, true) => (CODEB, CODEA),
        (false, false) => {
            return Err(PipelineError::MissingIdentifier {
                table: table.to_string(),
            });
        }
    };
    let codes = column_strings(df, source)?;
    let translated: Vec<Option<String>> = codes
        .iter()
        .map(|code| {
            code.as_deref()
                .and_then(|code| translator.translate(target, code))
                .map(str::to_string)
        })
        .collect();
    let unresolved = codes
        .iter()
        .zip(&translated)
        .filter(|(code, out)| code.is_some() && out.is_none())
        .count();
    if unresolved > 0 {
        warn!(table, source, unresolved, "identifiers unknown to the translator");
        issues.warn(
            IssueCode::IdentifierAmbiguity,
            table,
            format!("{source} values with no {target} counterpart"),
            Some(unresolved as u64),
        );
    }

    let mut out = normalize_identifiers(df)?;
    let position = df
        .get_column_index(source)
        .map(|idx| if target == CODEB { idx + 1 } else { idx })
        .unwrap_or(0);
    out.insert_column(position, string_column(target, translated))?;
    Ok(out)
}

/// Identifier keys become text. Other keys become integers when every value
/// is a whole number, so `1` and `"1"` join; otherwise text.
fn normalize_key(df: &DataFrame, key: &str) -> Result<DataFrame> {
    let text = column_strings(df, key)?;
    if !IDENTIFIERS.contains(&key) {
        let numbers = column_i64(df, key)?;
        if numbers.iter().zip(&text).all(|(n, t)| n.is_some() == t.is_some()) {
            return Ok(with_column(df, i64_column(key, numbers))?);
        }
    }
    Ok(with_column(df, string_column(key, text))?)
}

/// Value of `name` after a join: the incoming table's value where it has
/// one, otherwise the existing value.
fn last_wins(name: &str, existing: &DataType, incoming: &DataType) -> Expr {
    let incoming_name = format!("{name}{INCOMING_SUFFIX}");
    let (mut current, mut newer) = (col(name), col(incoming_name.as_str()));
    if existing != incoming {
        current = current.cast(DataType::String);
        newer = newer.cast(DataType::String);
    }
    when(newer.clone().is_not_null())
        .then(newer)
        .otherwise(current)
        .alias(name)
}

fn join_pair(left: DataFrame, right: DataFrame, keys: &[&str], how: MergeHow) -> Result<DataFrame> {
    let left_columns = column_names(&left);
    let right_columns = column_names(&right);
    let key_set: BTreeSet<&str> = keys.iter().copied().collect();
    let shared: BTreeSet<&str> = right_columns
        .iter()
        .map(String::as_str)
        .filter(|name| !key_set.contains(name) && left_columns.iter().any(|l| l == name))
        .collect();

    let mut select: Vec<Expr> = Vec::with_capacity(left_columns.len() + right_columns.len());
    for name in &left_columns {
        if shared.contains(name.as_str()) {
            let existing = left.column(name)?.dtype().clone();
            let incoming = right.column(name)?.dtype().clone();
            debug!(column = %name, "column present on both sides, later table wins");
            select.push(last_wins(name, &existing, &incoming));
        } else {
            select.push(col(name.as_str()));
        }
    }
    for name in &right_columns {
        if !key_set.contains(name.as_str()) && !shared.contains(name.as_str()) {
            select.push(col(name.as_str()));
        }
    }

    let on: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();
    let mut args = JoinArgs::new(how.join_type())
        .with_coalesce(JoinCoalesce::CoalesceColumns)
        .with_suffix(Some(INCOMING_SUFFIX.into()));
    // An untranslated subject lacks one identifier in every table; the other
    // one still tells subjects apart.
    args.nulls_equal = IDENTIFIERS.iter().all(|id| keys.contains(id));
    let joined = left
        .lazy()
        .join(right.lazy(), on.clone(), on, args)
        .select(select)
        .collect()?;
    Ok(joined)
}

/// Left fold of joins over `tables` on `keys`.
///
/// Columns of earlier tables come first. When a non-key column appears in
/// more than one table, the later table's value wins wherever it is present;
/// where it is missing the earlier value is kept. When the keys include both
/// identifiers, missing key values match each other. Rows come back sorted by
/// the keys.
pub fn merge_all(tables: &[&DataFrame], keys: &[&str], how: MergeHow) -> Result<DataFrame> {
    let mut prepared = Vec::with_capacity(tables.len());
    for (idx, df) in tables.iter().enumerate() {
        for key in keys {
            if !has_column(df, key) {
                return Err(PipelineError::column_not_found(format!("merge input {idx}"), *key));
            }
        }
        let mut out = (*df).clone();
        for key in keys {
            out = normalize_key(&out, key)?;
        }
        prepared.push(out);
    }
    let mut iter = prepared.into_iter();
    let Some(mut merged) = iter.next() else {
        return Ok(DataFrame::empty());
    };
    for next in iter {
        merged = join_pair(merged, next, keys, how)?;
    }
    Ok(sort_rows_by(&merged, keys)?)
}
