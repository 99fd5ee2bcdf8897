pub mod driver;
pub mod frontends;

pub use driver::{
    flush_outputs, Driver, DriverError, FileOutput, FinishedFile, FlushError, OutputTarget,
    TraversalEvents,
};
pub use frontends::{Frontend, FrontendError, FrontendRequest};
