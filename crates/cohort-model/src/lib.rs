pub mod columns;
pub mod config;
pub mod error;
pub mod issues;
pub mod table;

pub use columns::{
    APOE_DOSE, APOE_PRESENCE, APOE1, APOE2, CODEA, CODEB, FDG_TP, FDG_VAL, FLAT_SUFFIX,
    ICV_SUFFIX, IDENTIFIERS, MRI_NO_TPS, MRI_SCANDATE, MRI_TP, NP_AGE, NP_AGE_BL, NP_DATE,
    NP_DATE_BL, NP_FOLLOWUP_TIME, NP_NO_TPS, NP_TP, NP_YRS_REL_BL, PIB_AGE, PIB_AGEPOS,
    PIB_INDEX, PIB_NO_TPS, PIB_POS, PIB_SCANDATE, PIB_SLOPE, PIB_TP, RAW_SESSION_AGE,
    RAW_SESSION_DATE, SLOPE_SUFFIX, icv_column, is_timepoint_column, slope_column,
};
pub use config::{
    CogTestDatesConfig, FactorConfig, FdgConfig, MergeConfig, MriConfig, NamingConfig, PibConfig,
    PipelineConfig, TranslatorConfig,
};
pub use error::{PipelineError, Result};
pub use issues::{DataIssue, IssueCode, IssueLog, IssueSeverity};
pub use table::{TableKey, TableName};
