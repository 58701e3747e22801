pub mod count_aggregator;
pub mod expression;
pub mod filter;
pub mod hash_join;
pub mod multi_column_join;
pub mod partition_assigner;
pub mod radix_partition;
pub mod semi_join;
