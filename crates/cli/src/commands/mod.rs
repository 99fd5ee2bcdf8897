pub mod instrument;
pub mod util;

pub use instrument::*;
pub use util::*;
