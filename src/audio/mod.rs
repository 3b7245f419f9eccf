pub mod queue;
pub mod registry;
pub mod session;
pub mod sink;

pub use queue::TrackQueue;
pub use registry::SessionRegistry;
pub use session::{Session, SessionConfig, SessionState};
pub use sink::{AudioSink, SongbirdSink};
