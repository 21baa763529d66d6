pub mod broker_cell;
pub mod conditions;
pub mod pull_subscription;
pub mod storage_source;
pub mod topic;
