//! Canonical column names shared by every stage.
//!
//! Source tables are renamed onto these names as early as possible so the
//! merge stage never has to guess which spelling a normalizer produced.

pub const CODEA: &str = "codea";
pub const CODEB: &str = "codeb";

/// Both identifier columns, in join-key order.
pub const IDENTIFIERS: [&str; 2] = [CODEA, CODEB];

// Neuropsychological visits
pub const NP_TP: &str = "NP_Tp";
pub const NP_DATE: &str = "NP_Date";
pub const NP_AGE: &str = "NP_Age";
pub const NP_DATE_BL: &str = "NP_DateBL";
pub const NP_AGE_BL: &str = "NP_AgeBL";
pub const NP_YRS_REL_BL: &str = "NP_YrsRelBL";
pub const NP_FOLLOWUP_TIME: &str = "NP_Followup_Time";
pub const NP_NO_TPS: &str = "NP_NoTps";

/// Raw test-type names renamed during the cognitive date reshape.
pub const RAW_SESSION_AGE: &str = "AgeatSession";
pub const RAW_SESSION_DATE: &str = "NeuropsychExamTestDate";

// Genotype
pub const APOE1: &str = "APOE1";
pub const APOE2: &str = "APOE2";
pub const APOE_PRESENCE: &str = "APOE_presence";
pub const APOE_DOSE: &str = "APOE_dose";

// Amyloid imaging
pub const PIB_TP: &str = "PIB_Tp";
pub const PIB_SCANDATE: &str = "PIB_Scandate";
pub const PIB_INDEX: &str = "PIB_Index";
pub const PIB_AGE: &str = "PIB_Age";
pub const PIB_POS: &str = "PIB_Pos";
pub const PIB_SLOPE: &str = "PIB_sl";
pub const PIB_AGEPOS: &str = "PIB_agepos";
pub const PIB_NO_TPS: &str = "PIB_NoTps";

// Structural MRI
pub const MRI_TP: &str = "MRI_Tp";
pub const MRI_SCANDATE: &str = "MRI_Scandate";
pub const MRI_NO_TPS: &str = "MRI_NoTps";

// FDG
pub const FDG_TP: &str = "FDG_Tp";
pub const FDG_VAL: &str = "FDG_val";

pub const SLOPE_SUFFIX: &str = "_sl";
pub const ICV_SUFFIX: &str = "_icvcorr";
pub const FLAT_SUFFIX: &str = "_flat";

/// Name of the slope column derived from `column`.
pub fn slope_column(column: &str) -> String {
    format!("{column}{SLOPE_SUFFIX}")
}

/// Name of the intracranial-volume corrected column derived from `column`.
pub fn icv_column(column: &str) -> String {
    format!("{column}{ICV_SUFFIX}")
}

/// True for the `*_Tp` ordinal visit columns.
pub fn is_timepoint_column(column: &str) -> bool {
    column.ends_with("_Tp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        assert_eq!(slope_column("F0"), "F0_sl");
        assert_eq!(icv_column("Left-Hippocampus"), "Left-Hippocampus_icvcorr");
        assert!(is_timepoint_column(PIB_TP));
        assert!(!is_timepoint_column(PIB_SCANDATE));
    }
}
