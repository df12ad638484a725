//! Repository traits for metadata operations.

pub mod channels;
pub mod sessions;
pub mod uploads;

pub use channels::ChannelRepo;
pub use sessions::SessionRepo;
pub use uploads::UploadRepo;
