// Market data domain
pub mod bar;
pub mod feature_window;

pub use bar::{BarTable, MarketBar};
pub use feature_window::FeatureWindow;
