pub mod mae;
pub mod metrics;
pub mod mse;

pub use mae::MaeLoss;
pub use metrics::RegressionReport;
pub use mse::MseLoss;
