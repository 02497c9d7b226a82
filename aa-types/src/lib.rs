mod gas;
mod status;
mod userop;

pub use gas::*;
pub use status::*;
pub use userop::*;
