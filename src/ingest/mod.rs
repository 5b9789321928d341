//! Block ingestion: feed subscriber, action router and dispatcher loop

pub mod dispatcher;
pub mod feed;
pub mod notify;
pub mod position;
pub mod router;

pub use dispatcher::{Dispatcher, DispatcherConfig, IngestOutcome, IngestState};
pub use feed::{spawn_subscriber, FeedSubjects};
pub use notify::BlockWaiter;
pub use position::IngestPosition;
pub use router::{Route, Router, RouterConfig};
