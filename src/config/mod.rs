pub mod render_config;
pub mod site_config;
pub mod store_config;
pub mod summary_config;

pub use render_config::RenderConfig;
pub use site_config::*;
pub use store_config::StoreConfig;
pub use summary_config::SummaryConfig;
