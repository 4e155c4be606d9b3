pub mod approval;
pub mod attendance;
pub mod contact;
pub mod course;
pub mod offline;
pub mod user;
pub mod video;

pub use approval::*;
pub use attendance::*;
pub use contact::*;
pub use course::*;
pub use offline::*;
pub use user::*;
pub use video::*;
