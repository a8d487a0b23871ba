mod course;
mod intent;
mod payment;
mod subscription;
mod user;

pub use course::*;
pub use intent::*;
pub use payment::*;
pub use subscription::*;
pub use user::*;
