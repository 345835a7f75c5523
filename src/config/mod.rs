pub mod category_config;
pub mod pipeline_config;
pub mod rules_config;
pub mod scoring_config;

pub use category_config::SubcategoryMap;
pub use pipeline_config::*;
pub use rules_config::*;
pub use scoring_config::*;
