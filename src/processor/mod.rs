pub mod category_list;
pub mod cleaning_pipeline;
pub mod feature_extractor;
pub mod outlier_filter;
pub mod payment_profile;
pub mod record_sanitizer;
pub mod rule_miner;
pub mod score_aggregator;
pub mod seasonality;
pub mod transaction_structurer;

pub use category_list::*;
pub use cleaning_pipeline::*;
pub use feature_extractor::*;
pub use outlier_filter::*;
pub use payment_profile::*;
pub use record_sanitizer::*;
pub use rule_miner::*;
pub use score_aggregator::*;
pub use seasonality::*;
pub use transaction_structurer::*;
