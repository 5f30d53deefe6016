//! # Domain Models
//!
//! Validated identifiers and the time key shared by every metric table.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Timestamp`] | Timezone-naive time key |
//! | [`EntityCode`] | Cross-sectional unit (ticker) |
//! | [`TableName`] | `[namespace.]table` identifier |
//! | [`MetricLabel`] | Value stored in the `metric_name` column |
//! | [`MetricTable`] | Explicit table ↔ label association |
//! | [`ConflictPolicy`] | Primary-key collision handling for writes |
//! | [`JoinKind`] | Index alignment when merging wide frames |

mod entity;
mod join;
mod policy;
mod table;
mod timestamp;

pub use entity::{EntityCode, MAX_ENTITY_CODE_LEN};
pub use join::JoinKind;
pub use policy::ConflictPolicy;
pub use table::{
    MetricLabel, MetricTable, TableName, DEFAULT_NAMESPACE, MAX_IDENTIFIER_LEN,
    MAX_METRIC_LABEL_LEN,
};
pub use timestamp::Timestamp;
