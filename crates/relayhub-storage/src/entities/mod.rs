pub mod request_stats;

pub use request_stats::Entity as RequestStats;
