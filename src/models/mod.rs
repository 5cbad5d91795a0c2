pub mod account;
pub mod booking;
pub mod job_post;
pub mod notification;
pub mod price_list;
pub mod review;
pub mod service;
pub mod subscription;
pub mod work_post;

pub use account::*;
pub use booking::*;
pub use job_post::*;
pub use notification::*;
pub use price_list::*;
pub use review::*;
pub use service::*;
pub use subscription::*;
pub use work_post::*;
