pub mod feed;
pub mod postgres;
pub mod rate_limit;
pub mod soccer;
pub mod us_sports;

pub use feed::{FeedRegistry, FetchError, ProviderFeed, RawEvent};
pub use postgres::PostgresStore;
pub use rate_limit::RateLimiter;
pub use soccer::SoccerFeed;
pub use us_sports::UsSportsFeed;
