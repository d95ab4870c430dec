use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::columns::{FDG_TP, FLAT_SUFFIX, MRI_TP, NP_TP, PIB_TP};

/// Every table the pipeline persists, named by its file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableName {
    CodeTranslator,
    SubjInfo,
    CogTestDates,
    CogData,
    CogTests,
    PibParams,
    FdgMetaroi,
    AsegStats,
    AsegChange,
    SubjTbl,
    NpTbl,
}

impl TableName {
    pub const ALL: [TableName; 11] = [
        TableName::CodeTranslator,
        TableName::SubjInfo,
        TableName::CogTestDates,
        TableName::CogData,
        TableName::CogTests,
        TableName::PibParams,
        TableName::FdgMetaroi,
        TableName::AsegStats,
        TableName::AsegChange,
        TableName::SubjTbl,
        TableName::NpTbl,
    ];

    /// Tables written by the gather stages and re-loaded by the merge stage.
    pub const GATHERED: [TableName; 8] = [
        TableName::CodeTranslator,
        TableName::SubjInfo,
        TableName::CogTestDates,
        TableName::CogData,
        TableName::PibParams,
        TableName::FdgMetaroi,
        TableName::AsegStats,
        TableName::AsegChange,
    ];

    /// File prefix used for persisted copies of this table.
    pub fn prefix(self) -> &'static str {
        match self {
            TableName::CodeTranslator => "codetranslator",
            TableName::SubjInfo => "subjinfo",
            TableName::CogTestDates => "cogtestdates",
            TableName::CogData => "cogdata",
            TableName::CogTests => "cogtests",
            TableName::PibParams => "pibparams",
            TableName::FdgMetaroi => "fdg_metaroi",
            TableName::AsegStats => "aseg_stats",
            TableName::AsegChange => "aseg_change",
            TableName::SubjTbl => "subjtbl",
            TableName::NpTbl => "NPtbl",
        }
    }

    /// The ordinal visit column, for per-visit tables.
    pub fn timepoint_column(self) -> Option<&'static str> {
        match self {
            TableName::CogTestDates | TableName::CogData | TableName::CogTests => Some(NP_TP),
            TableName::PibParams => Some(PIB_TP),
            TableName::FdgMetaroi => Some(FDG_TP),
            TableName::AsegStats | TableName::AsegChange => Some(MRI_TP),
            TableName::CodeTranslator
            | TableName::SubjInfo
            | TableName::SubjTbl
            | TableName::NpTbl => None,
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for TableName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TableName::ALL
            .into_iter()
            .find(|name| name.prefix().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown table name: {value}"))
    }
}

/// Key into a table set: a table as produced, or its baseline-only view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableKey {
    Base(TableName),
    Flat(TableName),
}

impl TableKey {
    pub fn name(self) -> TableName {
        match self {
            TableKey::Base(name) | TableKey::Flat(name) => name,
        }
    }

    pub fn is_flat(self) -> bool {
        matches!(self, TableKey::Flat(_))
    }
}

impl From<TableName> for TableKey {
    fn from(name: TableName) -> Self {
        TableKey::Base(name)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKey::Base(name) => write!(f, "{name}"),
            TableKey::Flat(name) => write!(f, "{name}{FLAT_SUFFIX}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_round_trip_through_from_str() {
        for name in TableName::ALL {
            assert_eq!(name.prefix().parse::<TableName>().unwrap(), name);
        }
        assert!("nope".parse::<TableName>().is_err());
    }

    #[test]
    fn flat_keys_display_with_suffix() {
        assert_eq!(TableKey::Flat(TableName::PibParams).to_string(), "pibparams_flat");
        assert_eq!(TableKey::from(TableName::NpTbl).to_string(), "NPtbl");
    }

    #[test]
    fn only_per_visit_tables_have_timepoints() {
        assert_eq!(TableName::AsegChange.timepoint_column(), Some("MRI_Tp"));
        assert_eq!(TableName::SubjInfo.timepoint_column(), None);
    }
}
