pub mod router;

pub use router::{RunCommand, check_deprecated};
