pub mod event;
pub mod gallery;
pub mod image;
pub mod settings;
pub mod user;

pub use event::EventRepository;
pub use gallery::GalleryRepository;
pub use image::ImageRepository;
pub use settings::SettingsRepository;
pub use user::UserRepository;
