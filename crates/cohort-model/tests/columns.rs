//! Column names and helpers as other crates import them, from the crate root.

use cohort_model::{
    CODEA, CODEB, FLAT_SUFFIX, IDENTIFIERS, MRI_TP, NP_TP, PIB_TP, TableKey, TableName,
    icv_column, is_timepoint_column, slope_column,
};

#[test]
fn identifiers_are_exported_at_the_root() {
    assert_eq!(IDENTIFIERS, [CODEA, CODEB]);
    assert_eq!(CODEA, "codea");
    assert_eq!(CODEB, "codeb");
}

#[test]
fn timepoint_columns_match_table_names() {
    assert_eq!(TableName::CogTests.timepoint_column(), Some(NP_TP));
    assert_eq!(TableName::PibParams.timepoint_column(), Some(PIB_TP));
    assert_eq!(TableName::AsegStats.timepoint_column(), Some(MRI_TP));
    for name in TableName::ALL {
        if let Some(column) = name.timepoint_column() {
            assert!(is_timepoint_column(column), "{column}");
        }
    }
}

#[test]
fn derived_column_names() {
    assert_eq!(slope_column("PIB_Index"), "PIB_Index_sl");
    assert_eq!(icv_column("Left-Hippocampus"), "Left-Hippocampus_icvcorr");
    assert!(
        TableKey::Flat(TableName::FdgMetaroi)
            .to_string()
            .ends_with(FLAT_SUFFIX)
    );
}
