pub mod models;
pub mod traits;
pub mod vocab;

pub use models::*;
pub use traits::*;
pub use vocab::*;
