pub mod entities;
pub mod stripe;
pub mod wire;

pub use entities::*;
pub use stripe::*;
pub use wire::*;
