mod charge;
mod subscriber;

pub use charge::*;
pub use subscriber::*;
