//! Risk-tier model portfolios, age adjustment and allocation validation

mod etf;
mod mapper;
mod models;

pub use etf::{EtfCandidate, blended_expense_ratio, etf_recommendations};
pub use mapper::{CONCENTRATION_LIMIT, MAX_AGE_DEFENSIVE, PortfolioMapper, SleeveShift};
pub use models::RiskTier;
