pub mod align;
pub mod check;
pub mod run;
pub mod summary;

pub use align::*;
pub use check::*;
pub use run::*;
pub use summary::*;
